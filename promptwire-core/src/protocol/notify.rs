//! Outbound notification interface
//!
//! Adapters report everything through three hooks: message notifications,
//! log notifications and error notifications. [`ChannelSink`] turns the hooks
//! into a stream of [`Notification`] values.

use super::types::{ConversationState, LogMessage, Message, MessageMode};
use crate::providers::error::ProviderError;
use reqwest::StatusCode;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Error report delivered to the error hook
#[derive(Debug, Clone)]
pub struct ErrorNotice {
    /// Composed text: summary, caller context, cause and HTTP status
    pub text: String,

    /// Underlying cause
    pub error: Arc<ProviderError>,

    /// HTTP status of the failing response, if any
    pub status: Option<StatusCode>,
}

impl ErrorNotice {
    /// Compose the user-visible error text for a failure within a request
    pub fn compose(error: ProviderError, state: &ConversationState) -> Self {
        let status = error.status();
        let http = match status {
            Some(status) if !status.is_success() => match status.canonical_reason() {
                Some(reason) => format!(" (HTTP code: {} {})", status.as_u16(), reason),
                None => format!(" (HTTP code: {})", status.as_u16()),
            },
            _ => String::new(),
        };
        let text = format!(
            "{}{}: {}{}",
            error.summary(),
            state.extra_text,
            error,
            http
        );
        Self {
            text,
            error: Arc::new(error),
            status,
        }
    }
}

/// One notification, as delivered through [`ChannelSink`]
#[derive(Debug, Clone)]
pub enum Notification {
    Message { message: Message, mode: MessageMode },
    Log(LogMessage),
    Error(ErrorNotice),
}

/// Receiver of adapter notifications
pub trait NotificationSink: Send + Sync {
    /// Message content: appended delta, complete text or terminal marker
    fn on_message(&self, message: Message, mode: MessageMode);

    /// Protocol progress that is not message content
    fn on_log(&self, log: LogMessage);

    /// The single user-visible failure surface
    fn on_error(&self, notice: ErrorNotice);
}

/// Sink forwarding every notification into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::debug!("Notification receiver dropped");
        }
    }
}

impl NotificationSink for ChannelSink {
    fn on_message(&self, message: Message, mode: MessageMode) {
        self.send(Notification::Message { message, mode });
    }

    fn on_log(&self, log: LogMessage) {
        self.send(Notification::Log(log));
    }

    fn on_error(&self, notice: ErrorNotice) {
        self.send(Notification::Error(notice));
    }
}
