//! Promptwire Core Library
//!
//! A uniform client for heterogeneous text-generation HTTP APIs. A
//! conversation goes in, a stream of message notifications comes out:
//!
//! ```no_run
//! use promptwire_core::config::{GenerationOptions, ProviderRecord};
//! use promptwire_core::protocol::{ChannelSink, ConversationState, Message};
//! use promptwire_core::registry::Registry;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let record = ProviderRecord::new("openai-chat", "GPT")
//!     .with_setting("key", "sk-...")
//!     .with_setting("model", "gpt-4")
//!     .with_setting("stream", true);
//! let connection = Registry::global()
//!     .create_connection(Some(&record), None, &GenerationOptions::default())?
//!     .expect("provider selected");
//!
//! let (sink, mut notifications) = ChannelSink::new();
//! let state = ConversationState::new(vec![Message::new("user", "Hello")]);
//! connection.send_request(&state, &sink).await;
//! while let Ok(notification) = notifications.try_recv() {
//!     println!("{:?}", notification);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod http;
pub mod protocol;
pub mod providers;
pub mod proxy;
pub mod registry;

pub use providers::{Connection, RequestOutcome};
pub use registry::Registry;

/// Returns the version of the Promptwire Core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
