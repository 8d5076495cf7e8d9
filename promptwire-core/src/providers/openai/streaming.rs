//! Streaming support for OpenAI-style responses
//!
//! Shared by the OpenAI text, OpenAI chat and Azure chat adapters.

use super::types::ASSISTANT_ROLE;
use crate::http::error::extract_error_message;
use crate::protocol::{ConversationState, LogMessage};
use crate::providers::adapter::{response_events, Notifier};
use crate::providers::error::{ProviderError, ProviderResult};
use futures::StreamExt;
use reqwest::Response;
use serde_json::Value;
use tracing::{debug, warn};

/// Data payload that ends the stream
const DONE_MARKER: &str = "[DONE]";

/// Where the text of a chunk lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkShape {
    /// `choices[0].text`
    Completion,
    /// `choices[0].delta.content`
    ChatDelta,
}

impl ChunkShape {
    fn text(self, choice: &Value) -> Option<&str> {
        let pointer = match self {
            ChunkShape::Completion => "/text",
            ChunkShape::ChatDelta => "/delta/content",
        };
        choice.pointer(pointer).and_then(Value::as_str)
    }
}

/// Relay a streamed response as append notifications followed by done
pub async fn relay_stream(
    response: Response,
    shape: ChunkShape,
    state: &ConversationState,
    notifier: &Notifier<'_>,
) -> ProviderResult<()> {
    let events = response_events(response, &state.cancel);
    tokio::pin!(events);

    while let Some(event) = events.next().await {
        let event = event?;
        if event.data.trim() == DONE_MARKER {
            debug!("Stream finished");
            break;
        }

        let Some(json) = event.json else {
            warn!("Skipping unparseable stream chunk: {}", event.data);
            continue;
        };

        if json.get("error").is_some() {
            let message = extract_error_message(&json).unwrap_or_else(|| "Unknown".to_string());
            return Err(ProviderError::remote(message, None));
        }

        match json.pointer("/choices/0") {
            Some(choice) => {
                if let Some(text) = shape.text(choice).filter(|t| !t.is_empty()) {
                    notifier.append(ASSISTANT_ROLE, text);
                }
            }
            None => {
                if let Some(usage) = json.get("usage") {
                    let log = LogMessage::new(format!(
                        "Usage (prompt: {} tokens, completion: {} tokens)",
                        usage["prompt_tokens"], usage["completion_tokens"]
                    ))
                    .with_data(json.clone());
                    notifier.log(log);
                }
            }
        }
    }

    if state.is_cancelled() {
        return Err(ProviderError::Cancelled);
    }
    notifier.done(ASSISTANT_ROLE);
    Ok(())
}
