//! Pusher channel client used for ChatBotKit token streaming
//!
//! Speaks just enough of Pusher protocol 7 to subscribe to one public
//! channel and read the token batches published on it.

use super::error::{ProviderError, ProviderResult};
use crate::http::cancellable;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// ChatBotKit's Pusher application on the `mt1` cluster
pub const PUSHER_URL: &str =
    "wss://ws-mt1.pusher.com/app/a9198d6754ae6285290b?protocol=7&client=js&version=8.0.1";

/// Bound on connecting and waiting for `pusher:connection_established`
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One JSON frame as sent by the server
#[derive(Debug, Clone, Deserialize)]
pub struct PusherFrame {
    pub event: String,
    #[serde(default)]
    pub channel: Option<String>,
    /// Usually a JSON document encoded as a string
    #[serde(default)]
    pub data: Value,
}

impl PusherFrame {
    /// Decoded `data` payload
    pub fn payload(&self) -> Value {
        match &self.data {
            Value::String(text) => serde_json::from_str(text).unwrap_or(Value::Null),
            other => other.clone(),
        }
    }
}

/// Channel events relevant to token streaming
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PusherEvent {
    /// A batch of generated tokens, joined
    Tokens(String),
    /// The reply is complete
    End,
}

/// An established Pusher connection
pub struct PusherSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl PusherSocket {
    /// Connect and wait until the server confirms the connection
    pub async fn connect_with_timeout(
        url: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ProviderResult<Self> {
        match cancellable(cancel, tokio::time::timeout(timeout, Self::handshake(url))).await? {
            Ok(result) => result,
            Err(_) => Err(ProviderError::ConnectTimeout(timeout)),
        }
    }

    async fn handshake(url: &str) -> ProviderResult<Self> {
        let (mut stream, _) = connect_async(url).await?;
        loop {
            match stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    let frame = parse_frame(&text)?;
                    if frame.event == "pusher:connection_established" {
                        debug!("Pusher connection established");
                        return Ok(Self { stream });
                    }
                    debug!("Ignoring {} before connection was established", frame.event);
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    return Err(ProviderError::Socket(
                        "connection closed during handshake".to_string(),
                    ));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Subscribe to a public channel
    pub async fn subscribe(&mut self, channel: &str) -> ProviderResult<()> {
        let frame = json!({
            "event": "pusher:subscribe",
            "data": { "auth": "", "channel": channel },
        });
        self.stream.send(WsMessage::Text(frame.to_string())).await?;
        Ok(())
    }

    /// Next token event; `None` once the connection closes
    pub async fn next_event(&mut self) -> ProviderResult<Option<PusherEvent>> {
        while let Some(message) = self.stream.next().await {
            let text = match message? {
                WsMessage::Text(text) => text,
                WsMessage::Close(_) => return Ok(None),
                _ => continue,
            };

            let frame = match parse_frame(&text) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Skipping malformed Pusher frame: {}", e);
                    continue;
                }
            };

            match frame.event.as_str() {
                "pusher:ping" => {
                    let pong = json!({ "event": "pusher:pong", "data": {} });
                    self.stream.send(WsMessage::Text(pong.to_string())).await?;
                }
                "pusher:error" => {
                    let payload = frame.payload();
                    let message = payload["message"]
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| payload.to_string());
                    return Err(ProviderError::Socket(message));
                }
                "batchTokensBegin" => debug!("Token batch started on {:?}", frame.channel),
                "batchTokensAvailable" => {
                    let tokens = frame.payload()["tokens"]
                        .as_array()
                        .map(|tokens| {
                            tokens
                                .iter()
                                .filter_map(Value::as_str)
                                .collect::<String>()
                        })
                        .unwrap_or_default();
                    return Ok(Some(PusherEvent::Tokens(tokens)));
                }
                "batchTokensEnd" => {
                    debug!("Token batch ended: {}", frame.payload()["messageId"]);
                    return Ok(Some(PusherEvent::End));
                }
                other => debug!("Ignoring Pusher event {}", other),
            }
        }
        Ok(None)
    }

    /// Close the connection, ignoring failures
    pub async fn close(mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("Pusher close failed: {}", e);
        }
    }
}

fn parse_frame(text: &str) -> ProviderResult<PusherFrame> {
    serde_json::from_str(text).map_err(|e| ProviderError::Socket(format!("invalid frame: {}", e)))
}
