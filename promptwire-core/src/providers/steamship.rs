//! SteamShip plugin adapter
//!
//! Generation is asynchronous: `generate` returns a task id which is polled
//! through `task/status` until the task carries output or fails.

use super::adapter::{base_or, join_url, AuthScheme, Notifier, Provider, ProviderContext};
use super::error::{ProviderError, ProviderResult};
use crate::config::SteamShipConfig;
use crate::http::cancellable_sleep;
use crate::http::error::code_text;
use crate::protocol::ConversationState;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Default API root
pub const STEAMSHIP_BASE_URL: &str = "https://api.steamship.com/api/v1/";

/// Delay between two status polls
pub const POLL_INTERVAL: Duration = Duration::from_millis(2000);

pub struct SteamShipPluginProvider {
    config: SteamShipConfig,
    context: ProviderContext,
    poll_interval: Duration,
}

impl SteamShipPluginProvider {
    pub fn new(config: SteamShipConfig, context: ProviderContext) -> Self {
        Self {
            config,
            context,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Override the delay between status polls
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn call_api(
        &self,
        path: &str,
        body: &Value,
        state: &ConversationState,
    ) -> ProviderResult<Value> {
        let base = base_or(&self.config.url, STEAMSHIP_BASE_URL);
        let url = self.context.proxy.modify_url(&join_url(base, path)?);

        let client = &self.context.client;
        let request = AuthScheme::Bearer
            .apply(client.request(Method::POST, &url), &self.config.key)
            .header("X-Workspace-Handle", &self.config.workspace)
            .json(body);
        let response = client.send(self.name(), request, &state.cancel).await?;
        let status = response.status();
        let json = client.read_json(response, &state.cancel).await?;

        if json.pointer("/status/state").and_then(Value::as_str) == Some("failed") {
            return Err(ProviderError::remote(failure_message(&json), Some(status)));
        }
        Ok(json)
    }
}

/// `"{statusCode}: {statusMessage}"`, without the code when absent
fn failure_message(json: &Value) -> String {
    let status = &json["status"];
    let message = status["statusMessage"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| status["statusMessage"].to_string());
    match status.get("statusCode").and_then(code_text) {
        Some(code) => format!("{}: {}", code, message),
        None => message,
    }
}

/// Text and role of the first output block
fn output_block(data: &Value) -> ProviderResult<(&str, &str)> {
    let block = data
        .pointer("/blocks/0")
        .ok_or_else(|| ProviderError::protocol("Failed to receive message", "No output block"))?;
    let text = block["text"].as_str().unwrap_or_default();
    let role = block["tags"]
        .as_array()
        .and_then(|tags| {
            tags.iter()
                .find(|tag| tag["kind"].as_str() == Some("role"))
                .and_then(|tag| tag["name"].as_str())
        })
        .unwrap_or("assistant");
    Ok((text, role))
}

#[async_trait]
impl Provider for SteamShipPluginProvider {
    fn name(&self) -> &str {
        "steamship-plugin"
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
        let generate = json!({
            "appendOutputToFile": false,
            "text": text,
            "pluginInstance": self.config.workspace,
        });
        let json = self.call_api("plugin/instance/generate", &generate, state).await?;

        let task_id = json
            .pointer("/status/taskId")
            .filter(|id| !id.is_null())
            .cloned()
            .ok_or_else(|| ProviderError::protocol("Failed to generate", "No task id"))?;
        notifier.log_text("Sending message (done: generate)");

        let poll = json!({ "taskId": task_id });
        let mut previous_state = String::new();
        loop {
            let json = self.call_api("task/status", &poll, state).await?;

            if let Some(data) = json.get("data").filter(|d| !d.is_null()) {
                let (text, role) = output_block(data)?;
                notifier.complete(role, text);
                return Ok(());
            }

            let task_state = json
                .pointer("/status/state")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if task_state != previous_state {
                previous_state = task_state.to_string();
                notifier.log_text(format!("Sending message ({})", previous_state));
            } else {
                debug!("Task still {}", task_state);
            }

            cancellable_sleep(&state.cancel, self.poll_interval).await?;
        }
    }
}
