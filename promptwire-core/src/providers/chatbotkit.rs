//! ChatBotKit conversation adapter
//!
//! Each request runs a full remote conversation: create, send, receive and
//! delete. Streamed replies arrive over a Pusher channel while `receive` is
//! in flight.

use super::adapter::{base_or, join_url, AuthScheme, Notifier, Provider, ProviderContext};
use super::error::{ProviderError, ProviderResult};
use super::pusher::{PusherEvent, PusherSocket, CONNECT_TIMEOUT, PUSHER_URL};
use crate::config::ChatBotKitConfig;
use crate::http::error::code_text;
use crate::protocol::{ConversationState, LogMessage, Message, MessageMode, RoleClass};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Default API root
pub const CHATBOTKIT_BASE_URL: &str = "https://api.chatbotkit.com/v1/";

/// Message types ChatBotKit understands natively
pub const NATIVE_ROLES: [&str; 5] = ["user", "bot", "context", "instruction", "backstory"];

const BOT_ROLE: &str = "bot";

pub struct ChatBotKitProvider {
    config: ChatBotKitConfig,
    context: ProviderContext,
    /// Bound on the Pusher handshake
    connect_timeout: Duration,
    /// How long to wait for the end of the token batch once `receive` returned
    idle_timeout: Duration,
}

impl ChatBotKitProvider {
    pub fn new(config: ChatBotKitConfig, context: ProviderContext) -> Self {
        Self {
            config,
            context,
            connect_timeout: CONNECT_TIMEOUT,
            idle_timeout: CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    async fn call_api(
        &self,
        path: &str,
        body: &Value,
        state: &ConversationState,
        notifier: Option<&Notifier<'_>>,
    ) -> ProviderResult<Value> {
        let base = base_or(&self.config.url, CHATBOTKIT_BASE_URL);
        let url = self.context.proxy.modify_url(&join_url(base, path)?);

        let client = &self.context.client;
        let request = AuthScheme::Bearer
            .apply(client.request(Method::POST, &url), &self.config.key)
            .json(body);
        let response = client.send(self.name(), request, &state.cancel).await?;
        let status = response.status();
        let json = client.read_json(response, &state.cancel).await?;

        if let Some(message) = json.get("message").filter(|m| !m.is_null()) {
            let message = message
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| message.to_string());
            let text = match json.get("code").and_then(code_text) {
                Some(code) => format!("{}: {}", code, message),
                None => message,
            };
            return Err(ProviderError::remote(text, Some(status)));
        }

        if let Some(notifier) = notifier {
            notifier.log(
                LogMessage::new(format!("Sending message (done: {})", task_name(path)))
                    .with_data(json.clone()),
            );
        }
        Ok(json)
    }

    /// Send the new message and collect the reply
    async fn converse(
        &self,
        conversation_id: &str,
        text: &str,
        state: &ConversationState,
        notifier: &Notifier<'_>,
    ) -> ProviderResult<(Message, MessageMode)> {
        let send = json!({ "text": text, "entities": [] });
        self.call_api(
            &format!("conversation/{}/send", conversation_id),
            &send,
            state,
            Some(notifier),
        )
        .await?;

        let receive_path = format!("conversation/{}/receive", conversation_id);
        if !self.config.stream {
            let json = self
                .call_api(&receive_path, &json!({ "parse": false }), state, Some(notifier))
                .await?;
            let text = json["text"].as_str().unwrap_or_default();
            return Ok((Message::new(BOT_ROLE, text), MessageMode::Complete));
        }

        let socket_url = base_or(&self.config.socket_url, PUSHER_URL);
        let mut socket =
            PusherSocket::connect_with_timeout(socket_url, self.connect_timeout, &state.cancel)
                .await?;
        let channel = Uuid::new_v4().to_string();
        socket.subscribe(&channel).await?;
        debug!("Subscribed to channel {}", channel);

        let receive = json!({ "parse": false, "channel": channel });
        let result = self
            .stream_reply(&mut socket, &receive_path, &receive, state, notifier)
            .await;
        socket.close().await;
        result?;

        Ok((Message::new(BOT_ROLE, ""), MessageMode::Done))
    }

    /// Run `receive` while forwarding token batches from the socket
    async fn stream_reply(
        &self,
        socket: &mut PusherSocket,
        receive_path: &str,
        receive: &Value,
        state: &ConversationState,
        notifier: &Notifier<'_>,
    ) -> ProviderResult<()> {
        let request = self.call_api(receive_path, receive, state, Some(notifier));
        tokio::pin!(request);

        let mut received = false;
        let mut ended = false;
        while !(received && ended) {
            tokio::select! {
                _ = state.cancel.cancelled() => return Err(ProviderError::Cancelled),
                result = &mut request, if !received => {
                    result?;
                    received = true;
                }
                event = socket.next_event(), if !ended => match event? {
                    Some(PusherEvent::Tokens(tokens)) => {
                        if !tokens.is_empty() {
                            notifier.append(BOT_ROLE, tokens);
                        }
                    }
                    Some(PusherEvent::End) => ended = true,
                    None => {
                        debug!("Pusher connection closed before the end of the reply");
                        ended = true;
                    }
                },
                _ = tokio::time::sleep(self.idle_timeout), if received => {
                    warn!("No end of token batch within {:?}", self.idle_timeout);
                    break;
                }
            }
        }
        Ok(())
    }
}

/// `conversation/{id}/send` is logged as `conversation - send`
fn task_name(path: &str) -> String {
    match (path.split_once('/'), path.rsplit_once('/')) {
        (Some((first, _)), Some((_, last))) => format!("{} - {}", first, last),
        _ => path.to_string(),
    }
}

/// ChatBotKit message type for a conversation role
fn message_type(role: &str) -> &str {
    if NATIVE_ROLES.contains(&role) {
        return role;
    }
    match RoleClass::of(role) {
        RoleClass::System => "backstory",
        RoleClass::User => "user",
        RoleClass::Assistant => BOT_ROLE,
    }
}

fn is_backstory(message: &Message) -> bool {
    message_type(&message.role) == "backstory"
}

#[async_trait]
impl Provider for ChatBotKitProvider {
    fn name(&self) -> &str {
        "chatbotkit"
    }

    async fn execute(
        &self,
        state: &ConversationState,
        notifier: &Notifier<'_>,
    ) -> ProviderResult<()> {
        let messages: Vec<&Message> = state.non_empty_messages().collect();
        let backstory = messages
            .iter()
            .filter(|m| is_backstory(m))
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let chat: Vec<&Message> = messages.into_iter().filter(|m| !is_backstory(m)).collect();
        let Some((new_message, history)) = chat.split_last() else {
            return Err(ProviderError::protocol(
                "Failed to send message",
                "No message to send",
            ));
        };

        let create = json!({
            "backstory": backstory,
            "model": self.config.model,
            "datasetId": "",
            "skillsetId": "",
            "messages": history
                .iter()
                .map(|m| json!({ "type": message_type(&m.role), "text": m.text }))
                .collect::<Vec<_>>(),
        });
        let json = self
            .call_api("conversation/create", &create, state, Some(notifier))
            .await?;
        let conversation_id = match &json["id"] {
            Value::String(id) => id.clone(),
            Value::Null => {
                return Err(ProviderError::protocol(
                    "Failed to send message",
                    "No conversation id",
                ))
            }
            other => other.to_string(),
        };

        let reply = self
            .converse(&conversation_id, &new_message.text, state, notifier)
            .await;

        if !state.is_cancelled() {
            let delete = format!("conversation/{}/delete", conversation_id);
            if let Err(e) = self.call_api(&delete, &json!({}), state, None).await {
                warn!("Failed to delete conversation {}: {}", conversation_id, e);
            }
        }

        let (message, mode) = reply?;
        notifier.message(message, mode);
        Ok(())
    }
}
