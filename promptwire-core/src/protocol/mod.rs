//! Protocol module for the normalized conversation contract
//!
//! This module defines the provider-agnostic data model:
//! - Conversation state owned by the caller
//! - Messages with free-form roles and their normalized role classes
//! - The notification hooks every adapter reports through

pub mod notify;
pub mod types;

pub use notify::{ChannelSink, ErrorNotice, Notification, NotificationSink};
pub use types::{ConversationState, LogMessage, Message, MessageMode, RoleClass};
