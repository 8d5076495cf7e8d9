//! Provider adapters
//!
//! One adapter per backend family. Each translates the normalized
//! conversation into the backend's request shape and its responses (plain,
//! streamed, polled or session based) back into notifications.

pub mod adapter;
pub mod anthropic;
pub mod azure;
pub mod chatbotkit;
pub mod error;
pub mod openai;
pub mod pusher;
pub mod spellbook;
pub mod steamship;

pub use adapter::{
    AuthScheme, Connection, Notifier, Provider, ProviderContext, RequestOutcome,
};
pub use error::{ProviderError, ProviderResult};

// Re-export concrete providers
pub use anthropic::{AnthropicMessagesProvider, AnthropicTextProvider};
pub use azure::AzureOpenAIChatProvider;
pub use chatbotkit::ChatBotKitProvider;
pub use openai::{OpenAIChatProvider, OpenAITextProvider};
pub use spellbook::SpellbookProvider;
pub use steamship::SteamShipPluginProvider;
