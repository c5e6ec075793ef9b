//! Tool trait and related types.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

use crate::ToolDefinition;
use crate::error::ToolError;

/// Result of executing a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// The output content blocks.
    pub content: Vec<ToolOutputContent>,
    /// Whether the provider reported the call as failed.
    pub is_error: bool,
}

/// A single piece of tool output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolOutputContent {
    Text { text: String },
    Image { mime_type: String, data: String },
}

impl ToolOutput {
    /// Create a successful text output.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolOutputContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Create an error text output.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolOutputContent::Text { text: text.into() }],
            is_error: true,
        }
    }

    /// Flatten the output into the text handed back to the model.
    ///
    /// Images cannot travel in a `tool` message, so they become a placeholder.
    pub fn to_text(&self) -> String {
        self.content
            .iter()
            .map(|c| match c {
                ToolOutputContent::Text { text } => text.clone(),
                ToolOutputContent::Image { mime_type, data } => {
                    format!("[image: {mime_type}, {} bytes base64]", data.len())
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A callable tool exposed to the model.
///
/// Implemented by MCP-backed tools and by test doubles.
pub trait Tool: Send + Sync {
    /// The unique name of this tool (used in API requests).
    fn name(&self) -> &str;

    /// The tool definition to send to the API (name, description, parameters).
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given JSON arguments.
    fn execute(
        &self,
        input: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, ToolError>> + Send + '_>>;
}
