//! Provider adapter trait and the request funnel
//!
//! Every backend family implements [`Provider`]. A [`Connection`] wraps one
//! adapter and turns its `Result` into notifications, so callers only ever
//! observe the [`NotificationSink`] hooks and a [`RequestOutcome`].

use super::error::{ProviderError, ProviderResult};
use crate::config::{EndpointConfig, GenerationParams, SecretString};
use crate::http::{sse_events, CancellableSseStream, HttpClient};
use crate::protocol::{
    ConversationState, ErrorNotice, LogMessage, Message, MessageMode, NotificationSink,
};
use crate::proxy::Proxy;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::{RequestBuilder, Response};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Core trait every text-generation backend adapter implements
#[async_trait]
pub trait Provider: Send + Sync {
    /// Family identifier used in logs
    fn name(&self) -> &str;

    /// Run one request, reporting content through the notifier.
    ///
    /// Returning `Ok` means the terminal notification was delivered.
    async fn execute(&self, state: &ConversationState, notifier: &Notifier<'_>)
        -> ProviderResult<()>;
}

/// Everything an adapter needs besides its family settings
#[derive(Debug, Clone)]
pub struct ProviderContext {
    pub client: HttpClient,
    pub proxy: Proxy,
    pub params: GenerationParams,
}

impl ProviderContext {
    pub fn new(client: HttpClient, proxy: Proxy, params: GenerationParams) -> Self {
        Self {
            client,
            proxy,
            params,
        }
    }
}

/// Cancellation-aware wrapper around a notification sink
///
/// Once the token fires, message and log notifications are dropped.
pub struct Notifier<'a> {
    sink: &'a dyn NotificationSink,
    cancel: &'a CancellationToken,
    finished: AtomicBool,
}

impl<'a> Notifier<'a> {
    pub fn new(sink: &'a dyn NotificationSink, cancel: &'a CancellationToken) -> Self {
        Self {
            sink,
            cancel,
            finished: AtomicBool::new(false),
        }
    }

    pub fn message(&self, message: Message, mode: MessageMode) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.sink.on_message(message, mode);
        if mode != MessageMode::Append {
            self.finished.store(true, Ordering::Release);
        }
    }

    /// Whether a `Complete` or `Done` notification reached the sink
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn append(&self, role: &str, text: impl Into<String>) {
        self.message(Message::new(role, text), MessageMode::Append);
    }

    pub fn complete(&self, role: &str, text: impl Into<String>) {
        self.message(Message::new(role, text), MessageMode::Complete);
    }

    /// End a streamed reply
    pub fn done(&self, role: &str) {
        self.message(Message::new(role, ""), MessageMode::Done);
    }

    pub fn log(&self, log: LogMessage) {
        if self.cancel.is_cancelled() {
            return;
        }
        debug!("{}", log.text);
        self.sink.on_log(log);
    }

    pub fn log_text(&self, text: impl Into<String>) {
        self.log(LogMessage::new(text));
    }
}

/// Outcome of [`Connection::send_request`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The terminal notification was delivered
    Completed,
    /// An error notice was delivered
    Failed,
    /// The caller cancelled; nothing further was reported
    Cancelled,
}

/// A ready-to-use adapter built from a provider record
pub struct Connection {
    provider: Box<dyn Provider>,
}

impl Connection {
    pub fn new(provider: Box<dyn Provider>) -> Self {
        Self { provider }
    }

    /// Family identifier of the wrapped adapter
    pub fn name(&self) -> &str {
        self.provider.name()
    }

    /// Run one request and report its result through `sink`.
    ///
    /// Errors never escape: they become an error notice, or nothing at all
    /// when the request was cancelled.
    pub async fn send_request(
        &self,
        state: &ConversationState,
        sink: &dyn NotificationSink,
    ) -> RequestOutcome {
        let notifier = Notifier::new(sink, &state.cancel);
        match self.provider.execute(state, &notifier).await {
            Ok(()) if notifier.is_finished() => RequestOutcome::Completed,
            Ok(()) => RequestOutcome::Cancelled,
            Err(err) if err.is_cancelled() || state.is_cancelled() => {
                debug!("Request to {} cancelled", self.provider.name());
                RequestOutcome::Cancelled
            }
            Err(err) => {
                warn!("Request to {} failed: {}", self.provider.name(), err);
                sink.on_error(ErrorNotice::compose(err, state));
                RequestOutcome::Failed
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("provider", &self.provider.name())
            .finish()
    }
}

/// How a family authenticates its requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// Bearer plus `Api-Key`
    BearerWithApiKey,
    /// As `BearerWithApiKey`, but the key `-` disables both
    OptionalBearerWithApiKey,
    /// `Api-Key: <key>`
    ApiKey,
    /// `X-Api-Key: <key>`
    XApiKey,
    /// `Authorization: Basic <key>`, the key is sent as configured
    Basic,
    /// Credentials travel in the payload
    None,
}

impl AuthScheme {
    /// Add the authentication headers for `key` to a request
    pub fn apply(self, request: RequestBuilder, key: &SecretString) -> RequestBuilder {
        let key = key.expose_secret();
        match self {
            AuthScheme::Bearer => request.bearer_auth(key),
            AuthScheme::OptionalBearerWithApiKey if key == "-" => request,
            AuthScheme::BearerWithApiKey | AuthScheme::OptionalBearerWithApiKey => {
                request.bearer_auth(key).header("Api-Key", key)
            }
            AuthScheme::ApiKey => request.header("Api-Key", key),
            AuthScheme::XApiKey => request.header("X-Api-Key", key),
            AuthScheme::Basic => request.header("Authorization", format!("Basic {}", key)),
            AuthScheme::None => request,
        }
    }
}

/// Append an endpoint path to a base URL
pub fn append_path(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Resolve an API path against a base URL the way a browser resolves links
pub fn join_url(base: &str, path: &str) -> ProviderResult<String> {
    let base = url::Url::parse(base)
        .map_err(|e| ProviderError::Configuration(format!("Invalid base URL '{}': {}", base, e)))?;
    let joined = base
        .join(path)
        .map_err(|e| ProviderError::Configuration(format!("Invalid API path '{}': {}", path, e)))?;
    Ok(joined.to_string())
}

/// Configured base, or the family default when empty
pub fn base_or<'a>(configured: &'a str, default: &'a str) -> &'a str {
    if configured.is_empty() {
        default
    } else {
        configured
    }
}

/// Request URL for the OpenAI and Anthropic families.
///
/// With `raw_url` the configured URL is used verbatim, bypassing the proxy.
pub fn endpoint_url(
    config: &EndpointConfig,
    proxy: &Proxy,
    default_base: &str,
    path: &str,
) -> String {
    if config.raw_url {
        return config.url.clone();
    }
    proxy.modify_url(&append_path(base_or(&config.url, default_base), path))
}

/// Boxed response body accepted by the SSE parser
pub type ResponseBody = BoxStream<'static, reqwest::Result<Bytes>>;

/// Parse a streamed response body as SSE events
pub fn response_events(
    response: Response,
    cancel: &CancellationToken,
) -> CancellableSseStream<ResponseBody> {
    sse_events(response.bytes_stream().boxed(), cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ChannelSink, Notification};

    struct Scripted(Result<(), fn() -> ProviderError>);

    #[async_trait]
    impl Provider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn execute(
            &self,
            _state: &ConversationState,
            notifier: &Notifier<'_>,
        ) -> ProviderResult<()> {
            match self.0 {
                Ok(()) => {
                    notifier.complete("assistant", "hi");
                    Ok(())
                }
                Err(make) => Err(make()),
            }
        }
    }

    #[tokio::test]
    async fn test_completed_request() {
        let (sink, mut rx) = ChannelSink::new();
        let connection = Connection::new(Box::new(Scripted(Ok(()))));
        let state = ConversationState::new(vec![Message::user("hello")]);

        assert_eq!(
            connection.send_request(&state, &sink).await,
            RequestOutcome::Completed
        );
        match rx.try_recv().unwrap() {
            Notification::Message { message, mode } => {
                assert_eq!(message.text, "hi");
                assert_eq!(mode, MessageMode::Complete);
            }
            other => panic!("unexpected notification: {:?}", other),
        }
    }

    /// Delivers its reply, then the caller cancels
    struct CancelledAfterReply;

    #[async_trait]
    impl Provider for CancelledAfterReply {
        fn name(&self) -> &str {
            "cancelled-after-reply"
        }

        async fn execute(
            &self,
            state: &ConversationState,
            notifier: &Notifier<'_>,
        ) -> ProviderResult<()> {
            notifier.complete("assistant", "hi");
            state.cancel.cancel();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cancel_after_reply_still_completes() {
        let (sink, mut rx) = ChannelSink::new();
        let connection = Connection::new(Box::new(CancelledAfterReply));
        let state = ConversationState::new(vec![Message::user("hello")]);

        assert_eq!(
            connection.send_request(&state, &sink).await,
            RequestOutcome::Completed
        );
        assert!(matches!(rx.try_recv(), Ok(Notification::Message { .. })));
    }

    #[tokio::test]
    async fn test_failed_request_reports_notice() {
        let (sink, mut rx) = ChannelSink::new();
        let connection = Connection::new(Box::new(Scripted(Err(|| {
            ProviderError::remote("Unknown", None)
        }))));
        let state = ConversationState::new(vec![]).with_extra_text(" while chatting");

        assert_eq!(
            connection.send_request(&state, &sink).await,
            RequestOutcome::Failed
        );
        match rx.try_recv().unwrap() {
            Notification::Error(notice) => {
                assert_eq!(notice.text, "Received error message while chatting: Unknown");
            }
            other => panic!("unexpected notification: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_request_is_silent() {
        let (sink, mut rx) = ChannelSink::new();
        let connection = Connection::new(Box::new(Scripted(Err(|| ProviderError::Cancelled))));
        let state = ConversationState::new(vec![]);

        assert_eq!(
            connection.send_request(&state, &sink).await,
            RequestOutcome::Cancelled
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_notifier_suppresses_after_cancel() {
        let (sink, mut rx) = ChannelSink::new();
        let cancel = CancellationToken::new();
        let notifier = Notifier::new(&sink, &cancel);

        notifier.append("assistant", "a");
        cancel.cancel();
        notifier.append("assistant", "b");
        notifier.log_text("ignored");

        assert!(matches!(rx.try_recv(), Ok(Notification::Message { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_url_helpers() {
        assert_eq!(
            append_path("https://api.openai.com/v1/", "/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            join_url("https://api.steamship.com/api/v1/", "task/status").unwrap(),
            "https://api.steamship.com/api/v1/task/status"
        );
        assert_eq!(
            join_url("https://api.chatbotkit.com/v1", "conversation/create").unwrap(),
            "https://api.chatbotkit.com/conversation/create"
        );
        assert!(join_url("not a url", "x").is_err());
        assert_eq!(base_or("", "https://d"), "https://d");
        assert_eq!(base_or("https://c", "https://d"), "https://c");
    }

    #[test]
    fn test_endpoint_url() {
        let mut config = EndpointConfig::default();
        let proxy = Proxy::CorsAnywhere {
            base: "https://relay/".to_string(),
        };
        assert_eq!(
            endpoint_url(&config, &proxy, "https://api.openai.com/v1", "completions"),
            "https://relay/https://api.openai.com/v1/completions"
        );

        config.url = "http://localhost:1234/custom".to_string();
        config.raw_url = true;
        assert_eq!(
            endpoint_url(&config, &proxy, "https://api.openai.com/v1", "completions"),
            "http://localhost:1234/custom"
        );
    }

    #[test]
    fn test_auth_schemes() {
        let client = reqwest::Client::new();
        let key = SecretString::new("sk-test");
        let build = |scheme: AuthScheme, key: &SecretString| {
            scheme
                .apply(client.post("http://localhost/"), key)
                .build()
                .unwrap()
        };

        let request = build(AuthScheme::BearerWithApiKey, &key);
        assert_eq!(request.headers()["authorization"], "Bearer sk-test");
        assert_eq!(request.headers()["api-key"], "sk-test");

        let request = build(AuthScheme::OptionalBearerWithApiKey, &key);
        assert_eq!(request.headers()["authorization"], "Bearer sk-test");

        let request = build(AuthScheme::OptionalBearerWithApiKey, &SecretString::new("-"));
        assert!(request.headers().get("authorization").is_none());
        assert!(request.headers().get("api-key").is_none());

        let request = build(AuthScheme::BearerWithApiKey, &SecretString::new("-"));
        assert_eq!(request.headers()["authorization"], "Bearer -");

        let request = build(AuthScheme::XApiKey, &key);
        assert_eq!(request.headers()["x-api-key"], "sk-test");

        let request = build(AuthScheme::Basic, &key);
        assert_eq!(request.headers()["authorization"], "Basic sk-test");

        let request = build(AuthScheme::None, &key);
        assert!(request.headers().is_empty());
    }
}
