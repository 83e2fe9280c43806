//! Append-only conversation history.

use crate::model::{Message, Role, ToolCall, ToolResult};

/// The ordered turns of one conversation.
///
/// Turns are only ever appended; there is no way to edit or drop one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    turns: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a system turn.
    pub fn with_system(text: impl Into<String>) -> Self {
        Self {
            turns: vec![Message::system(text)],
        }
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Message::user(text));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.turns.push(Message::assistant(text));
    }

    /// An assistant turn carrying the invocations it proposed.
    pub fn push_invocations(&mut self, text: impl Into<String>, calls: Vec<ToolCall>) {
        self.turns.push(Message::assistant_with_calls(text, calls));
    }

    pub fn push_result(&mut self, result: ToolResult) {
        self.turns.push(Message::tool_result(result));
    }

    pub fn turns(&self) -> &[Message] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Message> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// True until the first non-system turn is appended.
    pub fn is_fresh(&self) -> bool {
        self.turns.iter().all(|m| m.role == Role::System)
    }
}
