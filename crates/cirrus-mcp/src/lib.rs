//! MCP (Model Context Protocol) client for Cirrus tool providers.
//!
//! Each provider is a child process speaking newline-delimited JSON-RPC 2.0
//! over stdio. A client spawns it, performs the handshake, discovers its
//! tools and forwards calls to it.

pub mod client;
pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod tool;
mod transport;

pub use client::{McpClient, McpToolContent, McpToolInfo, McpToolResult};
pub use config::McpServerConfig;
pub use error::McpError;
pub use tool::McpTool;
