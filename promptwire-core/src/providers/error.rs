//! Provider error types and handling

use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Bodies longer than this are not echoed back when they fail to parse
pub const MAX_ECHOED_BODY_CHARS: usize = 4096;

/// Raw error bodies are truncated to this many characters
pub const MAX_ERROR_BODY_CHARS: usize = 256;

/// Errors that can occur when interacting with text-generation backends
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network or connection failure, including timeouts
    #[error("{source}")]
    Transport {
        summary: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    /// Response body was not valid JSON
    #[error("{source}")]
    Decode {
        /// Raw body, or a generic note when the body is too large to show
        preview: String,
        status: Option<StatusCode>,
        #[source]
        source: serde_json::Error,
    },

    /// The provider reported a logical failure in a successful response
    #[error("{message}")]
    Remote {
        summary: &'static str,
        message: String,
        status: Option<StatusCode>,
    },

    /// The response did not have the shape the protocol requires
    #[error("{message}")]
    Protocol {
        summary: &'static str,
        message: String,
    },

    /// Pub/sub socket failure
    #[error("{0}")]
    Socket(String),

    /// Pub/sub socket did not become ready in time
    #[error("connection not established within {0:?}")]
    ConnectTimeout(Duration),

    /// Invalid adapter configuration
    #[error("{0}")]
    Configuration(String),

    /// The caller cancelled the request
    #[error("request cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Create a transport error with the default summary
    pub fn transport(source: reqwest::Error) -> Self {
        Self::Transport {
            summary: "Query failed",
            source,
        }
    }

    /// Create a decode error, applying the body echo policy
    pub fn decode(body: &str, status: Option<StatusCode>, source: serde_json::Error) -> Self {
        let preview = if body.chars().count() > MAX_ECHOED_BODY_CHARS {
            "Failed to parse message".to_string()
        } else {
            body.to_string()
        };
        Self::Decode {
            preview,
            status,
            source,
        }
    }

    /// Create a provider-reported failure
    pub fn remote(message: impl Into<String>, status: Option<StatusCode>) -> Self {
        Self::Remote {
            summary: "Received error message",
            message: message.into(),
            status,
        }
    }

    /// Create a protocol violation error
    pub fn protocol(summary: &'static str, message: impl Into<String>) -> Self {
        Self::Protocol {
            summary,
            message: message.into(),
        }
    }

    /// Short user-facing description of what failed
    pub fn summary(&self) -> &str {
        match self {
            Self::Transport { summary, .. } => summary,
            Self::Status { .. } => "Query failed",
            Self::Decode { preview, .. } => preview,
            Self::Remote { summary, .. } => summary,
            Self::Protocol { summary, .. } => summary,
            Self::Socket(_) | Self::ConnectTimeout(_) => "Failed to receive message",
            Self::Configuration(_) => "Invalid configuration",
            Self::Cancelled => "Cancelled",
        }
    }

    /// HTTP status of the response that caused the error, if any
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Transport { source, .. } => source.status(),
            Self::Status { status, .. } => Some(*status),
            Self::Decode { status, .. } => *status,
            Self::Remote { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether this error only reflects a cancellation by the caller
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::transport(err)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ProviderError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ProviderError::Socket(err.to_string())
    }
}

/// Truncate a raw body to at most [`MAX_ERROR_BODY_CHARS`] characters
pub fn truncate_body(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}
