use serde::{Deserialize, Serialize};

use crate::constants::PENDING_SENTINEL;
use crate::llm_interaction::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One visible line of dialogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Set only on the placeholder, never on a real reply.
    #[serde(default)]
    pub pending: bool,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            pending: false,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            pending: false,
        }
    }

    /// Placeholder shown while a request is outstanding.
    pub fn pending() -> Self {
        Self {
            pending: true,
            ..Self::assistant(PENDING_SENTINEL)
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }
}

/// Ordered dialogue plus at most one trailing pending placeholder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Appends the pending placeholder. Does nothing if one is already present.
    pub fn push_pending(&mut self) {
        if self.has_pending() {
            tracing::debug!("Pending placeholder already present, not adding another");
            return;
        }
        self.messages.push(Message::pending());
    }

    /// Replaces the trailing placeholder with the resolved message.
    pub fn resolve_pending(&mut self, message: Message) {
        debug_assert!(self.has_pending(), "resolve_pending without a placeholder");
        if self.has_pending() {
            self.messages.pop();
        }
        self.messages.push(message);
    }

    /// Drops the trailing placeholder, if any.
    pub fn remove_pending(&mut self) {
        if self.has_pending() {
            self.messages.pop();
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn reset_to(&mut self, message: Message) {
        self.messages.clear();
        self.messages.push(message);
    }

    pub fn has_pending(&self) -> bool {
        self.messages.last().is_some_and(Message::is_pending)
    }

    pub fn has_user_messages(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::User)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The message the speech bubble shows: the trailing entry when it belongs to the hat.
    pub fn latest_assistant(&self) -> Option<&Message> {
        self.messages.last().filter(|m| m.role == Role::Assistant)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Wire messages for a request, never including the placeholder.
    pub fn to_context(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| !m.is_pending())
            .map(ChatMessage::from)
            .collect()
    }
}
