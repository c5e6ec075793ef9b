//! MCP client for one server: handshake, tool discovery and tool calls.

use crate::config::McpServerConfig;
use crate::error::McpError;
use crate::jsonrpc::JsonRpcResponse;
use crate::transport::StdioTransport;
use serde::Deserialize;
use std::time::Duration;

const PROTOCOL_VERSION: &str = "2024-11-05";
const CLIENT_NAME: &str = "cirrus";

/// Attempts at `tools/list` before giving up on a slow-starting server.
const LIST_ATTEMPTS: u32 = 3;
const LIST_RETRY_PAUSE: Duration = Duration::from_millis(500);

/// A tool advertised by an MCP server.
#[derive(Debug, Clone)]
pub struct McpToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Result of a `tools/call`.
#[derive(Debug, Clone)]
pub struct McpToolResult {
    pub content: Vec<McpToolContent>,
    pub is_error: bool,
}

/// One content item of a tool result.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum McpToolContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: EmbeddedResource,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddedResource {
    pub uri: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl McpToolResult {
    /// Flatten the content into the text handed back to the model.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|item| match item {
                McpToolContent::Text { text } => Some(text.clone()),
                McpToolContent::Image { data, mime_type } => {
                    Some(format!("[image: {mime_type}, {} bytes base64]", data.len()))
                }
                McpToolContent::Resource { resource } => Some(
                    resource
                        .text
                        .clone()
                        .unwrap_or_else(|| format!("[resource: {}]", resource.uri)),
                ),
                McpToolContent::Unsupported => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Deserialize)]
struct InitializeResult {
    #[serde(default, rename = "serverInfo")]
    server_info: Option<ServerInfo>,
}

#[derive(Deserialize)]
struct ServerInfo {
    name: String,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Deserialize)]
struct ToolsListResult {
    #[serde(default)]
    tools: Vec<ToolEntry>,
    #[serde(default, rename = "nextCursor")]
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct ToolEntry {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "default_schema", rename = "inputSchema")]
    input_schema: serde_json::Value,
}

fn default_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

#[derive(Deserialize)]
struct ToolCallResult {
    #[serde(default)]
    content: Vec<McpToolContent>,
    #[serde(default, rename = "isError")]
    is_error: bool,
}

/// A connected MCP server.
pub struct McpClient {
    name: String,
    transport: StdioTransport,
    tools: Vec<McpToolInfo>,
}

impl McpClient {
    /// Spawn the server, run the handshake and discover its tools.
    pub async fn connect(name: impl Into<String>, config: &McpServerConfig) -> Result<Self, McpError> {
        let name = name.into();
        tracing::info!(server = %name, "Starting MCP server: {}", config.command_line());
        let transport = StdioTransport::spawn(&name, config)?;

        let mut client = Self {
            name,
            transport,
            tools: Vec::new(),
        };

        match client.handshake().await {
            Ok(()) => Ok(client),
            Err(e) => {
                client.shutdown().await;
                Err(e)
            }
        }
    }

    async fn handshake(&mut self) -> Result<(), McpError> {
        let init_params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": CLIENT_NAME,
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        let resp = self
            .transport
            .send_request("initialize", Some(init_params))
            .await?;
        let init: InitializeResult = self.result_of(resp, "initialize")?;
        if let Some(info) = init.server_info {
            tracing::debug!(
                server = %self.name,
                "Handshake with {} {}",
                info.name,
                info.version.unwrap_or_default()
            );
        }

        self.transport
            .send_notification("notifications/initialized", None)
            .await?;

        let mut attempt = 1;
        self.tools = loop {
            match self.list_tools().await {
                Ok(tools) => break tools,
                Err(e @ McpError::ServerNotRunning { .. }) => return Err(e),
                Err(e) if attempt >= LIST_ATTEMPTS => return Err(e),
                Err(e) => {
                    tracing::debug!(server = %self.name, "tools/list failed (attempt {attempt}): {e}");
                    attempt += 1;
                    tokio::time::sleep(LIST_RETRY_PAUSE).await;
                }
            }
        };

        tracing::info!(server = %self.name, "MCP server connected with {} tools", self.tools.len());
        Ok(())
    }

    /// Every tool the server advertises, following `nextCursor` pages.
    async fn list_tools(&self) -> Result<Vec<McpToolInfo>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor
                .as_ref()
                .map(|c| serde_json::json!({ "cursor": c }));
            let resp = self.transport.send_request("tools/list", params).await?;
            let page: ToolsListResult = self.result_of(resp, "tools/list")?;

            tools.extend(page.tools.into_iter().map(|t| McpToolInfo {
                name: t.name,
                description: t.description.unwrap_or_default(),
                input_schema: t.input_schema,
            }));

            match page.next_cursor {
                Some(next) if !next.is_empty() && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        Ok(tools)
    }

    /// Invoke one tool by its server-side name.
    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<McpToolResult, McpError> {
        let params = serde_json::json!({
            "name": tool_name,
            "arguments": arguments,
        });
        let resp = self
            .transport
            .send_request("tools/call", Some(params))
            .await?;
        let result: ToolCallResult = self.result_of(resp, "tools/call")?;

        Ok(McpToolResult {
            content: result.content,
            is_error: result.is_error,
        })
    }

    fn result_of<T: serde::de::DeserializeOwned>(
        &self,
        resp: JsonRpcResponse,
        method: &str,
    ) -> Result<T, McpError> {
        if let Some(err) = resp.error {
            return Err(McpError::JsonRpc {
                server: self.name.clone(),
                code: err.code,
                message: err.message,
            });
        }
        let result = resp.result.ok_or_else(|| {
            McpError::Protocol(format!("{method} response has neither result nor error"))
        })?;
        serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("Failed to parse {method} result: {e}")))
    }

    pub fn tools(&self) -> &[McpToolInfo] {
        &self.tools
    }

    pub fn server_name(&self) -> &str {
        &self.name
    }

    /// Stop the server process.
    pub async fn shutdown(&self) {
        tracing::debug!(server = %self.name, "Shutting down MCP server");
        self.transport.shutdown().await;
    }
}
