//! Server-Sent Events assembly
//!
//! Lines produced by [`LineStream`](super::lines::LineStream) are grouped into
//! events following the SSE dispatch rules: a blank line emits whatever the
//! preceding field lines accumulated.

use super::lines::LineStream;
use futures::stream::TakeUntil;
use futures::{ready, Stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// Value of an `id:` field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventId {
    Numeric(i64),
    Text(String),
}

impl EventId {
    fn parse(value: &str) -> Self {
        value
            .parse::<i64>()
            .map(EventId::Numeric)
            .unwrap_or_else(|_| EventId::Text(value.to_string()))
    }
}

/// A parsed SSE event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseEvent {
    /// Event type from the latest `event:` line
    pub event: Option<String>,

    /// Last event id
    pub id: Option<EventId>,

    /// Reconnection interval in milliseconds
    pub retry: Option<u64>,

    /// All `data:` lines joined with `\n`
    pub data: String,

    /// `data` parsed as JSON, when it is valid JSON
    pub json: Option<Value>,
}

impl SseEvent {
    /// Event type, or the `type` member of the JSON payload
    pub fn kind(&self) -> Option<&str> {
        self.event
            .as_deref()
            .or_else(|| self.json.as_ref()?.get("type")?.as_str())
    }
}

/// Accumulates SSE field lines into events
#[derive(Debug, Default)]
pub struct SseAssembler {
    event: Option<String>,
    id: Option<EventId>,
    retry: Option<u64>,
    data: Vec<String>,
    dirty: bool,
}

impl SseAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line, returning an event when the line completes one
    pub fn push_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }

        // No colon, or a colon at offset zero (comment): nothing to record
        let (field, value) = match line.find(':') {
            Some(0) | None => return None,
            Some(pos) => (&line[..pos], &line[pos + 1..]),
        };
        let value = value.strip_prefix(' ').unwrap_or(value);

        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(EventId::parse(value)),
            "retry" => self.retry = value.trim().parse().ok(),
            _ => return None,
        }
        self.dirty = true;
        None
    }

    /// Whether fields have accumulated since the last dispatch
    pub fn has_pending(&self) -> bool {
        self.dirty
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if !std::mem::take(&mut self.dirty) {
            return None;
        }

        let data = std::mem::take(&mut self.data).join("\n");
        let json = if data.is_empty() {
            None
        } else {
            serde_json::from_str(&data).ok()
        };

        Some(SseEvent {
            event: self.event.take(),
            id: self.id.take(),
            retry: self.retry.take(),
            data,
            json,
        })
    }
}

/// Stream of SSE events over a fallible byte-chunk stream
///
/// An event still accumulating when the body ends is discarded.
pub struct SseStream<S> {
    lines: LineStream<S>,
    assembler: SseAssembler,
    ready: VecDeque<SseEvent>,
}

impl<S> SseStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            lines: LineStream::new(inner),
            assembler: SseAssembler::new(),
            ready: VecDeque::new(),
        }
    }
}

impl<S, B, E> Stream for SseStream<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    type Item = Result<SseEvent, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(event) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }

            match ready!(Pin::new(&mut this.lines).poll_next(cx)) {
                Some(Ok(line)) => {
                    if let Some(event) = this.assembler.push_line(&line) {
                        this.ready.push_back(event);
                    }
                }
                Some(Err(err)) => return Poll::Ready(Some(Err(err))),
                None => {
                    if this.assembler.has_pending() {
                        tracing::debug!("Discarding incomplete event at end of stream");
                    }
                    return Poll::Ready(None);
                }
            }
        }
    }
}

/// Event stream that ends quietly once the token is cancelled
pub type CancellableSseStream<S> = TakeUntil<SseStream<S>, WaitForCancellationFutureOwned>;

/// Parse a response body as SSE, stopping early on cancellation
pub fn sse_events<S>(body: S, cancel: &CancellationToken) -> CancellableSseStream<S>
where
    S: Stream + Unpin,
    SseStream<S>: Stream,
{
    SseStream::new(body).take_until(cancel.clone().cancelled_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use serde_json::json;

    fn assemble(input: &str) -> Vec<SseEvent> {
        let mut assembler = SseAssembler::new();
        input
            .split('\n')
            .filter_map(|line| assembler.push_line(line))
            .collect()
    }

    #[test]
    fn test_multiline_data_and_event_name() {
        let events = assemble("event: foo\ndata: a\ndata: b\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.as_deref(), Some("foo"));
        assert_eq!(events[0].data, "a\nb");
        assert!(events[0].json.is_none());
    }

    #[test]
    fn test_blank_lines_alone_emit_nothing() {
        assert!(assemble("\n\n\n").is_empty());
    }

    #[test]
    fn test_json_payload() {
        let events = assemble("data: {\"x\":1}\n\n");
        assert_eq!(events[0].json, Some(json!({"x": 1})));
    }

    #[test]
    fn test_invalid_json_still_emits() {
        let events = assemble("data: not-json\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "not-json");
        assert!(events[0].json.is_none());
    }

    #[test]
    fn test_comments_and_invalid_lines_ignored() {
        let events = assemble(": keep-alive\nnonsense\ndata: x\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn test_comment_only_block_emits_nothing() {
        assert!(assemble(": ping\n\n").is_empty());
    }

    #[test]
    fn test_id_and_retry() {
        let events = assemble("id: 42\nretry: 3000\ndata: a\n\nid: abc\nretry: soon\ndata: b\n\n");
        assert_eq!(events[0].id, Some(EventId::Numeric(42)));
        assert_eq!(events[0].retry, Some(3000));
        assert_eq!(events[1].id, Some(EventId::Text("abc".to_string())));
        assert_eq!(events[1].retry, None);
    }

    #[test]
    fn test_latest_event_name_wins() {
        let events = assemble("event: a\nevent: b\ndata: x\n\n");
        assert_eq!(events[0].event.as_deref(), Some("b"));
    }

    #[test]
    fn test_event_without_data() {
        let events = assemble("event: ping\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "");
        assert!(events[0].json.is_none());
    }

    #[test]
    fn test_value_without_space_and_extra_colons() {
        let events = assemble("data:{\"t\":\"a:b\"}\n\n");
        assert_eq!(events[0].json, Some(json!({"t": "a:b"})));
    }

    #[test]
    fn test_kind_falls_back_to_json_type() {
        let events = assemble("data: {\"type\":\"message_stop\"}\n\n");
        assert_eq!(events[0].kind(), Some("message_stop"));
    }

    #[tokio::test]
    async fn test_stream_across_chunks() {
        let chunks: Vec<Result<&[u8], ()>> = vec![
            Ok(&b"event: delta\r\nda"[..]),
            Ok(&b"ta: {\"n\":1}\r"[..]),
            Ok(&b"\n\r\ndata: tail"[..]),
        ];
        let events: Vec<_> = SseStream::new(stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 1);
        let event = events[0].as_ref().unwrap();
        assert_eq!(event.event.as_deref(), Some("delta"));
        assert_eq!(event.json, Some(json!({"n": 1})));
    }

    #[tokio::test]
    async fn test_cancelled_stream_ends_without_error() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let chunks: Vec<Result<&[u8], ()>> = vec![Ok(&b"data: a\n\n"[..])];
        let events: Vec<_> = sse_events(stream::iter(chunks), &cancel).collect().await;
        assert!(events.is_empty());
    }
}
