//! Anthropic provider implementation
//!
//! Adapters for the legacy text completion API and the messages API.
//! Both authenticate with `X-Api-Key` and pin the API version header.

use super::adapter::{
    endpoint_url, response_events, AuthScheme, Notifier, Provider, ProviderContext,
};
use super::error::{ProviderError, ProviderResult};
use crate::config::EndpointConfig;
use crate::http::error::extract_error_message;
use crate::http::SseEvent;
use crate::protocol::{ConversationState, LogMessage, Message, RoleClass};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Method, Response};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Default API root
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Value of the `anthropic-version` header
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Token limit sent to the messages API when none is configured
pub const DEFAULT_MAX_TOKENS: i64 = 1024;

const HUMAN_PROMPT: &str = "\n\nHuman:";
const ASSISTANT_PROMPT: &str = "\n\nAssistant:";
const ASSISTANT_ROLE: &str = "assistant";

/// Shared request plumbing of the two Anthropic adapters
struct AnthropicEndpoint {
    config: EndpointConfig,
    context: ProviderContext,
}

impl AnthropicEndpoint {
    async fn send<T: Serialize + Sync>(
        &self,
        provider: &str,
        path: &str,
        body: &T,
        state: &ConversationState,
    ) -> ProviderResult<Response> {
        let url = endpoint_url(&self.config, &self.context.proxy, ANTHROPIC_BASE_URL, path);
        debug!("Sending {} request to {}", provider, url);

        let client = &self.context.client;
        let request = AuthScheme::XApiKey
            .apply(client.request(Method::POST, &url), &self.config.key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body);
        client.send(provider, request, &state.cancel).await
    }
}

/// Failure reported inside a stream
fn stream_error(json: &Value) -> ProviderError {
    let message = extract_error_message(json).unwrap_or_else(|| "Unknown".to_string());
    ProviderError::remote(message, None)
}

#[derive(Debug, Serialize)]
struct TextRequest<'a> {
    prompt: String,
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens_to_sample: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    stop_sequences: [&'static str; 1],
    stream: bool,
}

/// Build a Human/Assistant transcript ending with an open assistant turn
pub fn text_prompt<'a>(messages: impl Iterator<Item = &'a Message>) -> String {
    let mut prompt = String::new();
    let mut last = None;
    for message in messages {
        let class = message.role_class();
        match class {
            RoleClass::System => {}
            RoleClass::User => {
                prompt.push_str(HUMAN_PROMPT);
                prompt.push(' ');
            }
            RoleClass::Assistant => {
                prompt.push_str(ASSISTANT_PROMPT);
                prompt.push(' ');
            }
        }
        prompt.push_str(&message.text);
        last = Some(class);
    }
    if last != Some(RoleClass::Assistant) {
        prompt.push_str(ASSISTANT_PROMPT);
    }
    prompt
}

/// Adapter for the `/v1/complete` endpoint
pub struct AnthropicTextProvider {
    endpoint: AnthropicEndpoint,
}

impl AnthropicTextProvider {
    pub fn new(config: EndpointConfig, context: ProviderContext) -> Self {
        Self {
            endpoint: AnthropicEndpoint { config, context },
        }
    }

    async fn relay(
        &self,
        response: Response,
        state: &ConversationState,
        notifier: &Notifier<'_>,
    ) -> ProviderResult<()> {
        let events = response_events(response, &state.cancel);
        tokio::pin!(events);

        while let Some(event) = events.next().await {
            let event = event?;
            let Some(json) = event.json.as_ref() else {
                warn!("Skipping unparseable stream chunk: {}", event.data);
                continue;
            };
            match event.kind() {
                Some("completion") => {
                    if let Some(text) = json["completion"].as_str().filter(|t| !t.is_empty()) {
                        notifier.append(ASSISTANT_ROLE, text);
                    }
                }
                Some("ping") => notifier.log(LogMessage::new("Event ping").with_data(json.clone())),
                Some("error") => return Err(stream_error(json)),
                other => debug!("Ignoring stream event {:?}", other),
            }
        }

        if state.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        notifier.done(ASSISTANT_ROLE);
        Ok(())
    }
}

#[async_trait]
impl Provider for AnthropicTextProvider {
    fn name(&self) -> &str {
        "anthropic-text"
    }

    async fn execute(
        &self,
        state: &ConversationState,
        notifier: &Notifier<'_>,
    ) -> ProviderResult<()> {
        let endpoint = &self.endpoint;
        let body = TextRequest {
            prompt: text_prompt(state.non_empty_messages()),
            model: &endpoint.config.model,
            max_tokens_to_sample: endpoint.context.params.max_tokens,
            temperature: endpoint.context.params.temperature,
            stop_sequences: [HUMAN_PROMPT],
            stream: endpoint.config.stream,
        };
        let response = endpoint.send(self.name(), "v1/complete", &body, state).await?;

        if endpoint.config.stream {
            return self.relay(response, state, notifier).await;
        }

        let json = endpoint.context.client.read_json(response, &state.cancel).await?;
        notifier.complete(
            ASSISTANT_ROLE,
            json["completion"].as_str().unwrap_or_default(),
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    messages: Vec<ChatTurn>,
    #[serde(skip_serializing_if = "String::is_empty")]
    system: String,
    model: &'a str,
    max_tokens: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    stream: bool,
}

#[derive(Debug, PartialEq, Serialize)]
struct ChatTurn {
    role: &'static str,
    content: String,
}

/// Split a conversation into the system prompt and the chat turns
fn messages_payload<'a>(messages: impl Iterator<Item = &'a Message>) -> (String, Vec<ChatTurn>) {
    let mut system = Vec::new();
    let mut turns = Vec::new();
    for message in messages {
        match message.role_class() {
            RoleClass::System => system.push(message.text.as_str()),
            class => turns.push(ChatTurn {
                role: class.as_chat_role(),
                content: message.text.trim_end().to_string(),
            }),
        }
    }
    (system.join("\n").trim().to_string(), turns)
}

/// Concatenated text blocks of a messages API response
fn content_text(json: &Value) -> String {
    json["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|block| block["text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Token accounting collected while a messages stream runs
#[derive(Debug, Default)]
struct StreamUsage {
    input_tokens: u64,
    output_tokens: u64,
}

impl StreamUsage {
    /// Map one stream event to notifications
    fn observe(
        &mut self,
        event: &SseEvent,
        json: &Value,
        notifier: &Notifier<'_>,
    ) -> ProviderResult<()> {
        let kind = event.kind().unwrap_or_default();
        match kind {
            "content_block_delta" => {
                if let Some(text) = json.pointer("/delta/text").and_then(Value::as_str) {
                    if !text.is_empty() {
                        notifier.append(ASSISTANT_ROLE, text);
                    }
                }
            }
            "message_start" => {
                self.input_tokens = json
                    .pointer("/message/usage/input_tokens")
                    .or_else(|| json.pointer("/usage/input_tokens"))
                    .and_then(Value::as_u64)
                    .unwrap_or_default();
                notifier.log(
                    LogMessage::new(format!("Message sent (input: {} tokens)", self.input_tokens))
                        .with_data(json.clone()),
                );
            }
            "message_delta" => {
                if let Some(output) = json.pointer("/usage/output_tokens").and_then(Value::as_u64) {
                    self.output_tokens = output;
                }
                debug!("Message delta, output so far: {} tokens", self.output_tokens);
            }
            "message_stop" => notifier.log(
                LogMessage::new(format!(
                    "Message received (input: {} tokens, output: {} tokens)",
                    self.input_tokens, self.output_tokens
                ))
                .with_data(json.clone()),
            ),
            "error" => return Err(stream_error(json)),
            "" => debug!("Ignoring untyped stream event: {}", event.data),
            other => notifier.log(
                LogMessage::new(format!("Event {}", other)).with_data(json.clone()),
            ),
        }
        Ok(())
    }
}

/// Adapter for the `/v1/messages` endpoint
pub struct AnthropicMessagesProvider {
    endpoint: AnthropicEndpoint,
}

impl AnthropicMessagesProvider {
    pub fn new(config: EndpointConfig, context: ProviderContext) -> Self {
        Self {
            endpoint: AnthropicEndpoint { config, context },
        }
    }

    async fn relay(
        &self,
        response: Response,
        state: &ConversationState,
        notifier: &Notifier<'_>,
    ) -> ProviderResult<()> {
        let events = response_events(response, &state.cancel);
        tokio::pin!(events);

        let mut usage = StreamUsage::default();
        while let Some(event) = events.next().await {
            let event = event?;
            let Some(json) = event.json.as_ref() else {
                warn!("Skipping unparseable stream chunk: {}", event.data);
                continue;
            };
            usage.observe(&event, json, notifier)?;
        }

        if state.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        notifier.done(ASSISTANT_ROLE);
        Ok(())
    }
}

#[async_trait]
impl Provider for AnthropicMessagesProvider {
    fn name(&self) -> &str {
        "anthropic-messages"
    }

    async fn execute(
        &self,
        state: &ConversationState,
        notifier: &Notifier<'_>,
    ) -> ProviderResult<()> {
        let endpoint = &self.endpoint;
        let (system, messages) = messages_payload(state.non_empty_messages());
        let body = MessagesRequest {
            messages,
            system,
            model: &endpoint.config.model,
            max_tokens: endpoint
                .context
                .params
                .max_tokens
                .unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: endpoint.context.params.temperature,
            stream: endpoint.config.stream,
        };
        let response = endpoint.send(self.name(), "v1/messages", &body, state).await?;

        if endpoint.config.stream {
            return self.relay(response, state, notifier).await;
        }

        let json = endpoint.context.client.read_json(response, &state.cancel).await?;
        notifier.complete(ASSISTANT_ROLE, content_text(&json));
        Ok(())
    }
}
