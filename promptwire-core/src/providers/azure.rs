//! Azure OpenAI chat adapter
//!
//! Same wire format as OpenAI chat; the model is picked by the deployment
//! in the URL and the key travels in the `Api-Key` header.

use super::adapter::{AuthScheme, Notifier, Provider, ProviderContext};
use super::error::{ProviderError, ProviderResult};
use super::openai::types::{chat_text, ASSISTANT_ROLE};
use super::openai::{relay_stream, ChunkShape, OpenAIChatRequest, OpenAIMessage, OpenAISampling};
use crate::config::AzureConfig;
use crate::protocol::ConversationState;
use async_trait::async_trait;
use reqwest::Method;
use url::Url;

pub struct AzureOpenAIChatProvider {
    config: AzureConfig,
    context: ProviderContext,
}

impl AzureOpenAIChatProvider {
    pub fn new(config: AzureConfig, context: ProviderContext) -> Self {
        Self { config, context }
    }

    /// Deployment URL before proxying
    pub fn deployment_url(&self) -> ProviderResult<String> {
        let resource = &self.config.resource;
        if resource.is_empty()
            || !resource
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(ProviderError::Configuration(format!(
                "Invalid Azure resource name '{}'",
                resource
            )));
        }

        let mut url = Url::parse(&format!("https://{}.openai.azure.com/", resource))
            .map_err(|e| ProviderError::Configuration(format!("Invalid Azure resource: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::Configuration("Azure URL cannot have a path".to_string()))?
            .extend([
                "openai",
                "deployments",
                self.config.deployment.as_str(),
                "chat",
                "completions",
            ]);
        url.query_pairs_mut()
            .append_pair("api-version", &self.config.api_version);
        Ok(url.to_string())
    }
}

#[async_trait]
impl Provider for AzureOpenAIChatProvider {
    fn name(&self) -> &str {
        "azure-openai-chat"
    }

    async fn execute(
        &self,
        state: &ConversationState,
        notifier: &Notifier<'_>,
    ) -> ProviderResult<()> {
        let body = OpenAIChatRequest {
            messages: state.non_empty_messages().map(OpenAIMessage::from).collect(),
            model: None,
            sampling: OpenAISampling::from(&self.context.params),
            stream: self.config.stream,
        };

        let url = self.context.proxy.modify_url(&self.deployment_url()?);
        let client = &self.context.client;
        let request = AuthScheme::ApiKey
            .apply(client.request(Method::POST, &url), &self.config.key)
            .json(&body);
        let response = client.send(self.name(), request, &state.cancel).await?;

        if self.config.stream {
            return relay_stream(response, ChunkShape::ChatDelta, state, notifier).await;
        }

        let json = client.read_json(response, &state.cancel).await?;
        notifier.complete(ASSISTANT_ROLE, chat_text(&json));
        Ok(())
    }
}
