//! Scale Spellbook adapter, called directly or through the Fish relay

use super::adapter::{base_or, AuthScheme, Notifier, Provider, ProviderContext};
use super::error::{ProviderError, ProviderResult};
use crate::config::SpellbookConfig;
use crate::protocol::ConversationState;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

/// Public Fish relay endpoint
pub const FISH_RELAY_URL: &str = "https://fishtailprotocol.com/projects/betterGPT4/scale-api.php";

const ASSISTANT_ROLE: &str = "assistant";

/// How requests reach the deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpellbookRoute {
    /// POST to the deployment URL with Basic auth
    Direct,
    /// POST to the Fish relay, which forwards to the deployment URL
    FishRelay,
}

pub struct SpellbookProvider {
    config: SpellbookConfig,
    context: ProviderContext,
    route: SpellbookRoute,
}

impl SpellbookProvider {
    pub fn new(config: SpellbookConfig, context: ProviderContext) -> Self {
        Self {
            config,
            context,
            route: SpellbookRoute::Direct,
        }
    }

    pub fn fish(config: SpellbookConfig, context: ProviderContext) -> Self {
        Self {
            config,
            context,
            route: SpellbookRoute::FishRelay,
        }
    }

    fn request(&self, text: &str) -> ProviderResult<reqwest::RequestBuilder> {
        let client = &self.context.client;
        let request = match self.route {
            SpellbookRoute::Direct => {
                if self.config.url.is_empty() {
                    return Err(ProviderError::Configuration(
                        "No deployment URL configured".to_string(),
                    ));
                }
                let url = self.context.proxy.modify_url(&self.config.url);
                AuthScheme::Basic
                    .apply(client.request(Method::POST, &url), &self.config.key)
                    .json(&json!({ "input": { "input": text } }))
            }
            SpellbookRoute::FishRelay => {
                let relay = base_or(&self.config.relay_url, FISH_RELAY_URL);
                let url = self.context.proxy.modify_url(relay);
                AuthScheme::None
                    .apply(client.request(Method::POST, &url), &self.config.key)
                    .json(&json!({
                        "OAIToken": self.config.key.expose_secret(),
                        "scaleURL": self.config.url,
                        "chatLog": text,
                    }))
            }
        };
        Ok(request)
    }
}

/// Deployment output, or the failure the deployment reported
fn deployment_output(json: &Value, status: Option<StatusCode>) -> ProviderResult<String> {
    let output = json.get("output").filter(|o| !o.is_null());
    let message = json.get("message").filter(|m| !m.is_null());
    match (output, message) {
        (Some(output), None) => Ok(match output {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }),
        (_, message) => {
            let message = message
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
                .unwrap_or("Unknown");
            Err(ProviderError::remote(message, status))
        }
    }
}

#[async_trait]
impl Provider for SpellbookProvider {
    fn name(&self) -> &str {
        match self.route {
            SpellbookRoute::Direct => "scale-spellbook",
            SpellbookRoute::FishRelay => "scale-spellbook-fish",
        }
    }

    async fn execute(
        &self,
        state: &ConversationState,
        notifier: &Notifier<'_>,
    ) -> ProviderResult<()> {
        let text = state
            .non_empty_messages()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let request = self.request(&text)?;

        let client = &self.context.client;
        let response = client.send(self.name(), request, &state.cancel).await?;
        let status = response.status();
        let mut json = client.read_json(response, &state.cancel).await?;

        if self.route == SpellbookRoute::FishRelay {
            json = json.get_mut("response").map(Value::take).unwrap_or_default();
        }

        let output = deployment_output(&json, Some(status))?;
        notifier.complete(ASSISTANT_ROLE, output);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_output() {
        assert_eq!(deployment_output(&json!({"output": "done"}), None).unwrap(), "done");

        let err = deployment_output(&json!({"output": "x", "message": "quota"}), None).unwrap_err();
        assert_eq!(err.to_string(), "quota");
        assert_eq!(err.summary(), "Received error message");

        let err = deployment_output(&json!({}), None).unwrap_err();
        assert_eq!(err.to_string(), "Unknown");

        let err = deployment_output(&Value::Null, Some(StatusCode::OK)).unwrap_err();
        assert_eq!(err.to_string(), "Unknown");
    }
}
