//! Core protocol types shared by every provider adapter
//!
//! The conversation contract is deliberately small:
//! - Messages carry a free-form role string and plain text
//! - Outbound message notifications are tagged with a [`MessageMode`]
//! - Roles are mapped onto provider vocabularies through [`RoleClass`]

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// How an outbound message notification should be applied by the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageMode {
    /// Incremental delta to append to the message being received
    Append,
    /// Full text of a single-shot response
    Complete,
    /// Terminal marker closing a sequence of appends, carries no text
    Done,
}

impl MessageMode {
    /// Whether this notification ends the request lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageMode::Complete | MessageMode::Done)
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Free-form role (`user`, `assistant`, `system`, `human`, `bot`, ...)
    #[serde(default)]
    pub role: String,

    /// Text content
    #[serde(default)]
    pub text: String,
}

impl Message {
    /// Create a message with an arbitrary role
    pub fn new(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            text: text.into(),
        }
    }

    /// Create a system message
    pub fn system(text: impl Into<String>) -> Self {
        Self::new("system", text)
    }

    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::new("user", text)
    }

    /// Create an assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new("assistant", text)
    }

    /// Role class derived from the free-form role
    pub fn role_class(&self) -> RoleClass {
        RoleClass::of(&self.role)
    }
}

/// Normalized role used as the join key between conversation state and
/// provider wire formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleClass {
    System,
    User,
    Assistant,
}

impl RoleClass {
    /// Classify a free-form role by case-insensitive substring match.
    ///
    /// `system` takes precedence over `user`/`human`; anything else,
    /// including an empty role, is the assistant.
    pub fn of(role: &str) -> Self {
        let role = role.to_lowercase();
        if role.contains("system") {
            RoleClass::System
        } else if role.contains("user") || role.contains("human") {
            RoleClass::User
        } else {
            RoleClass::Assistant
        }
    }

    /// Role name used by OpenAI-compatible chat APIs and Anthropic messages
    pub fn as_chat_role(&self) -> &'static str {
        match self {
            RoleClass::System => "system",
            RoleClass::User => "user",
            RoleClass::Assistant => "assistant",
        }
    }
}

/// Caller-owned state for a single request
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    /// Ordered conversation history, the last message is the newest
    pub messages: Vec<Message>,

    /// Cancellation handle observed by every suspension point
    pub cancel: CancellationToken,

    /// Context appended to error summaries (e.g. " while continuing chat")
    pub extra_text: String,
}

impl ConversationState {
    /// Create a state with a fresh cancellation token
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            cancel: CancellationToken::new(),
            extra_text: String::new(),
        }
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Set the error context text
    pub fn with_extra_text(mut self, extra_text: impl Into<String>) -> Self {
        self.extra_text = extra_text.into();
        self
    }

    /// Messages that carry text; empty ones never reach a provider
    pub fn non_empty_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| !m.text.is_empty())
    }

    /// Whether the caller has requested cancellation
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Non-content notification: protocol progress, token usage, poll states
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub text: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<serde_json::Value>,
}

impl LogMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: Vec::new(),
        }
    }

    /// Attach a structured payload
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data.push(data);
        self
    }
}
