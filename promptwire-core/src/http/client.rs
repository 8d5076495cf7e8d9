//! HTTP client implementation using reqwest

use super::cancellable;
use super::error::map_http_error;
use crate::providers::error::{ProviderError, ProviderResult};
use reqwest::{Client, ClientBuilder, Method, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default user agent
const USER_AGENT: &str = concat!("promptwire/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client with connection pooling
///
/// No overall request timeout is set: streamed completions may legitimately
/// stay open for minutes, and cancellation is the caller's exit path.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> ProviderResult<Self> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .map_err(|e| {
                ProviderError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    /// Start building a request
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Send a request, racing it against cancellation.
    ///
    /// Non-success responses are consumed and mapped to
    /// [`ProviderError::Status`].
    pub async fn send(
        &self,
        provider: &str,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> ProviderResult<Response> {
        let request_id = Uuid::new_v4();
        let request = request.header("X-Request-ID", request_id.to_string());

        info!("Sending request to {} [request_id: {}]", provider, request_id);

        let response = cancellable(cancel, request.send())
            .await?
            .map_err(|e| {
                warn!("Request error for {} [request_id: {}]: {}", provider, request_id, e);
                ProviderError::transport(e)
            })?;

        let status = response.status();
        debug!(
            "Received HTTP response {} from {} [request_id: {}] headers: {:?}",
            status,
            provider,
            request_id,
            response.headers()
        );

        if !status.is_success() {
            let body = cancellable(cancel, response.text()).await?.ok();
            warn!(
                "Request failed with status {} for {} [request_id: {}]",
                status, provider, request_id
            );
            return Err(map_http_error(status, body));
        }

        Ok(response)
    }

    /// Read a full response body and parse it as JSON
    pub async fn read_json(
        &self,
        response: Response,
        cancel: &CancellationToken,
    ) -> ProviderResult<Value> {
        let status = response.status();
        let text = cancellable(cancel, response.text())
            .await?
            .map_err(|source| ProviderError::Transport {
                summary: "Failed to decode message",
                source,
            })?;

        serde_json::from_str(&text).map_err(|e| ProviderError::decode(&text, Some(status), e))
    }

    /// Send a JSON request and parse the JSON response
    pub async fn send_json(
        &self,
        provider: &str,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> ProviderResult<Value> {
        let response = self.send(provider, request, cancel).await?;
        self.read_json(response, cancel).await
    }
}
