//! NDJSON relay events and their mapping from agent events.

use bytes::Bytes;
use cirrus_core::AgentEvent;
use cirrus_types::{ToolError, Usage};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One line of a `/chat` response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    Session {
        session_id: Uuid,
    },
    Status {
        message: String,
    },
    Chunk {
        content: String,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: String,
    },
    ToolResult {
        id: String,
        name: String,
        content: String,
        is_error: bool,
    },
    Error {
        message: String,
        fatal: bool,
    },
    Done {
        usage: Usage,
    },
}

impl RelayEvent {
    pub fn status(message: impl Into<String>) -> Self {
        RelayEvent::Status {
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        RelayEvent::Error {
            message: message.into(),
            fatal: true,
        }
    }

    /// `done` or a fatal `error`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RelayEvent::Done { .. } | RelayEvent::Error { fatal: true, .. }
        )
    }

    /// The event serialized as one newline-terminated JSON line.
    pub fn to_line(&self) -> Bytes {
        match serde_json::to_string(self) {
            Ok(mut line) => {
                line.push('\n');
                Bytes::from(line)
            }
            Err(e) => {
                tracing::error!("Failed to encode relay event: {e}");
                Bytes::from_static(b"{\"type\":\"error\",\"message\":\"encoding failed\",\"fatal\":true}\n")
            }
        }
    }
}

/// Turns the driver's events into relay events.
///
/// `Usage` is held back and attached to `done`. `Cancelled` is dropped
/// because the turn's error result is reported instead.
#[derive(Debug, Default)]
pub struct EventMapper {
    usage: Usage,
}

impl EventMapper {
    pub fn map(&mut self, event: AgentEvent) -> Option<RelayEvent> {
        let relay = match event {
            AgentEvent::Status(message) => RelayEvent::Status { message },
            AgentEvent::AgentStarted { agent } => RelayEvent::status(format!("{agent} is working")),
            AgentEvent::TextDelta(content) => RelayEvent::Chunk { content },
            AgentEvent::ToolCall {
                id,
                name,
                arguments,
            } => RelayEvent::ToolCall {
                id,
                name,
                arguments,
            },
            AgentEvent::ToolResult {
                id,
                name,
                output,
                is_error,
            } => RelayEvent::ToolResult {
                id,
                name,
                content: output,
                is_error,
            },
            AgentEvent::UnknownTool { name, .. } => RelayEvent::Error {
                message: ToolError::UnknownTool { name }.to_string(),
                fatal: false,
            },
            AgentEvent::Error(message) => RelayEvent::Error {
                message,
                fatal: false,
            },
            AgentEvent::Usage(usage) => {
                self.usage = usage;
                return None;
            }
            AgentEvent::Done => RelayEvent::Done {
                usage: std::mem::take(&mut self.usage),
            },
            AgentEvent::Cancelled => return None,
        };
        Some(relay)
    }
}
