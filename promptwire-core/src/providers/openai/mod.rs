//! OpenAI provider implementation
//!
//! Adapters for the OpenAI completion and chat completion endpoints. The
//! request types and the stream relay are shared with the Azure adapter.

mod client;
pub mod streaming;
pub mod types;

pub use client::{OpenAIChatProvider, OpenAITextProvider, OPENAI_BASE_URL};
pub use streaming::{relay_stream, ChunkShape};
pub use types::{OpenAIChatRequest, OpenAICompletionRequest, OpenAIMessage, OpenAISampling};
