//! OpenAI API types
//!
//! Request bodies for the completion and chat completion endpoints, and
//! helpers reading the fields we need out of responses.

use crate::config::GenerationParams;
use crate::protocol::Message;
use serde::Serialize;
use serde_json::Value;

/// Role every OpenAI-style reply is reported with
pub const ASSISTANT_ROLE: &str = "assistant";

/// Sampling parameters shared by both endpoints
#[derive(Debug, Default, Serialize)]
pub struct OpenAISampling {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
}

impl From<&GenerationParams> for OpenAISampling {
    fn from(params: &GenerationParams) -> Self {
        Self {
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            frequency_penalty: params.frequency_penalty,
            presence_penalty: params.presence_penalty,
        }
    }
}

/// Legacy completion request
#[derive(Debug, Serialize)]
pub struct OpenAICompletionRequest<'a> {
    pub prompt: String,
    pub model: &'a str,

    #[serde(flatten)]
    pub sampling: OpenAISampling,

    pub stream: bool,
}

/// Chat completion request
#[derive(Debug, Serialize)]
pub struct OpenAIChatRequest<'a> {
    pub messages: Vec<OpenAIMessage<'a>>,

    /// Azure selects the model through the deployment instead
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,

    #[serde(flatten)]
    pub sampling: OpenAISampling,

    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenAIMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

impl<'a> From<&'a Message> for OpenAIMessage<'a> {
    fn from(message: &'a Message) -> Self {
        Self {
            role: message.role_class().as_chat_role(),
            content: &message.text,
        }
    }
}

/// Every text followed by a blank line
pub fn completion_prompt<'a>(messages: impl Iterator<Item = &'a Message>) -> String {
    messages.map(|m| format!("{}\n\n", m.text)).collect()
}

/// Text of the first choice of a completion response
pub fn completion_text(json: &Value) -> &str {
    json.pointer("/choices/0/text")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

/// Content of the first choice of a chat completion response
pub fn chat_text(json: &Value) -> &str {
    json.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
}
