//! McpTool: one server tool exposed as a [`cirrus_types::Tool`].

use crate::client::{McpClient, McpToolInfo};
use cirrus_types::{ToolDefinition, ToolError, ToolOutput, ToolOutputContent};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A tool backed by an MCP server.
///
/// The tool keeps the server's own name. Collisions between servers are
/// resolved by whoever registers the tools.
pub struct McpTool {
    info: McpToolInfo,
    client: Arc<McpClient>,
}

impl McpTool {
    pub fn new(info: McpToolInfo, client: Arc<McpClient>) -> Self {
        Self { info, client }
    }

    /// Every tool the connected server advertises.
    pub fn all_from(client: &Arc<McpClient>) -> Vec<Self> {
        client
            .tools()
            .iter()
            .cloned()
            .map(|info| Self::new(info, Arc::clone(client)))
            .collect()
    }

    pub fn server_name(&self) -> &str {
        self.client.server_name()
    }
}

impl cirrus_types::Tool for McpTool {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.info.name.clone(),
            description: self.info.description.clone(),
            parameters: self.info.input_schema.clone(),
        }
    }

    fn execute(
        &self,
        input: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, ToolError>> + Send + '_>> {
        Box::pin(async move {
            let result = self
                .client
                .call_tool(&self.info.name, input)
                .await
                .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

            Ok(ToolOutput {
                content: vec![ToolOutputContent::Text {
                    text: result.text(),
                }],
                is_error: result.is_error,
            })
        })
    }
}
