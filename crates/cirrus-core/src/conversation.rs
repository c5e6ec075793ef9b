//! Conversation history and the per-conversation session state.

use chrono::{DateTime, Utc};
use cirrus_tools::ToolManager;
use cirrus_types::{Message, Role};
use uuid::Uuid;

/// Ordered, role-tagged message history. The system prompt is not stored
/// here; agents prepend their own on every request.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            messages: Vec::new(),
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Forget the history. The id is kept.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Text of the most recent assistant message that carries text.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && m.content.is_some())
            .map(|m| m.text())
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything one conversation owns: its history and its running tool
/// providers. Drivers mutate a session one turn at a time.
pub struct Session {
    pub conversation: Conversation,
    pub tools: ToolManager,
}

impl Session {
    pub fn new(tools: ToolManager) -> Self {
        Self {
            conversation: Conversation::new(),
            tools,
        }
    }

    pub fn id(&self) -> Uuid {
        self.conversation.id
    }

    /// Stop the session's providers. The history survives.
    pub async fn shutdown(&mut self) {
        tracing::debug!(session = %self.id(), "Shutting down session tools");
        self.tools.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirrus_types::ToolCall;

    #[test]
    fn new_conversations_get_distinct_ids() {
        let a = Conversation::new();
        let b = Conversation::new();
        assert_ne!(a.id, b.id);
        assert!(a.is_empty());
    }

    #[test]
    fn clear_keeps_identity() {
        let mut conv = Conversation::new();
        let id = conv.id;
        conv.push(Message::user("hi"));
        conv.clear();
        assert!(conv.is_empty());
        assert_eq!(conv.id, id);
    }

    #[test]
    fn last_assistant_text_skips_tool_only_turns() {
        let mut conv = Conversation::new();
        conv.push(Message::user("list subscriptions"));
        conv.push(Message::assistant("Checking."));
        conv.push(Message::assistant_with_tools(
            String::new(),
            vec![ToolCall::new("call_1", "subscription", "{}")],
        ));
        conv.push(Message::tool_result("call_1", "subscription", "[]"));
        assert_eq!(conv.last_assistant_text(), Some("Checking."));
        assert_eq!(conv.len(), 4);
    }
}
