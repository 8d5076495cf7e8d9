//! OpenAI text and chat adapters

use super::streaming::{relay_stream, ChunkShape};
use super::types::{
    chat_text, completion_prompt, completion_text, OpenAIChatRequest, OpenAICompletionRequest,
    OpenAIMessage, OpenAISampling, ASSISTANT_ROLE,
};
use crate::config::EndpointConfig;
use crate::protocol::ConversationState;
use crate::providers::adapter::{endpoint_url, AuthScheme, Notifier, Provider, ProviderContext};
use crate::providers::error::ProviderResult;
use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use tracing::debug;

/// Default API root for both OpenAI endpoints
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Shared request plumbing of the two OpenAI adapters
struct OpenAIEndpoint {
    config: EndpointConfig,
    context: ProviderContext,
    auth: AuthScheme,
}

impl OpenAIEndpoint {
    async fn run<T: Serialize + Sync>(
        &self,
        provider: &str,
        path: &str,
        body: &T,
        shape: ChunkShape,
        state: &ConversationState,
        notifier: &Notifier<'_>,
    ) -> ProviderResult<()> {
        let url = endpoint_url(&self.config, &self.context.proxy, OPENAI_BASE_URL, path);
        debug!("Sending {} request to {}", provider, url);

        let client = &self.context.client;
        let request = self
            .auth
            .apply(client.request(Method::POST, &url), &self.config.key)
            .json(body);
        let response = client.send(provider, request, &state.cancel).await?;

        if self.config.stream {
            return relay_stream(response, shape, state, notifier).await;
        }

        let json = client.read_json(response, &state.cancel).await?;
        let text = match shape {
            ChunkShape::Completion => completion_text(&json),
            ChunkShape::ChatDelta => chat_text(&json),
        };
        notifier.complete(ASSISTANT_ROLE, text);
        Ok(())
    }
}

/// Adapter for the legacy `/completions` endpoint
pub struct OpenAITextProvider {
    endpoint: OpenAIEndpoint,
}

impl OpenAITextProvider {
    pub fn new(config: EndpointConfig, context: ProviderContext) -> Self {
        Self {
            endpoint: OpenAIEndpoint {
                config,
                context,
                auth: AuthScheme::BearerWithApiKey,
            },
        }
    }
}

#[async_trait]
impl Provider for OpenAITextProvider {
    fn name(&self) -> &str {
        "openai-text"
    }

    async fn execute(
        &self,
        state: &ConversationState,
        notifier: &Notifier<'_>,
    ) -> ProviderResult<()> {
        let endpoint = &self.endpoint;
        let body = OpenAICompletionRequest {
            prompt: completion_prompt(state.non_empty_messages()),
            model: &endpoint.config.model,
            sampling: OpenAISampling::from(&endpoint.context.params),
            stream: endpoint.config.stream,
        };
        endpoint
            .run(
                self.name(),
                "completions",
                &body,
                ChunkShape::Completion,
                state,
                notifier,
            )
            .await
    }
}

/// Adapter for the `/chat/completions` endpoint
pub struct OpenAIChatProvider {
    endpoint: OpenAIEndpoint,
}

impl OpenAIChatProvider {
    /// The key `-` sends no credentials, for local OpenAI-compatible servers
    pub fn new(config: EndpointConfig, context: ProviderContext) -> Self {
        Self {
            endpoint: OpenAIEndpoint {
                config,
                context,
                auth: AuthScheme::OptionalBearerWithApiKey,
            },
        }
    }
}

#[async_trait]
impl Provider for OpenAIChatProvider {
    fn name(&self) -> &str {
        "openai-chat"
    }

    async fn execute(
        &self,
        state: &ConversationState,
        notifier: &Notifier<'_>,
    ) -> ProviderResult<()> {
        let endpoint = &self.endpoint;
        let body = OpenAIChatRequest {
            messages: state.non_empty_messages().map(OpenAIMessage::from).collect(),
            model: Some(&endpoint.config.model),
            sampling: OpenAISampling::from(&endpoint.context.params),
            stream: endpoint.config.stream,
        };
        endpoint
            .run(
                self.name(),
                "chat/completions",
                &body,
                ChunkShape::ChatDelta,
                state,
                notifier,
            )
            .await
    }
}
