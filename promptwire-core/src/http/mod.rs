//! HTTP layer shared by every provider adapter
//!
//! This module handles:
//! - Connection pooling and cancellation-aware request dispatch
//! - Error mapping for non-success responses
//! - Incremental line splitting and SSE event assembly for streamed bodies

pub mod client;
pub mod error;
pub mod lines;
pub mod sse;

pub use client::HttpClient;
pub use lines::{LineDecoder, LineStream};
pub use sse::{sse_events, CancellableSseStream, EventId, SseAssembler, SseEvent, SseStream};

use crate::providers::error::{ProviderError, ProviderResult};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Run a future unless the token is cancelled first
pub async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    future: F,
) -> ProviderResult<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProviderError::Cancelled),
        output = future => Ok(output),
    }
}

/// Sleep for the given duration unless cancelled first
pub async fn cancellable_sleep(
    cancel: &CancellationToken,
    duration: std::time::Duration,
) -> ProviderResult<()> {
    cancellable(cancel, tokio::time::sleep(duration)).await
}
