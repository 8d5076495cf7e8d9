//! Chunk-boundary invariance of the line and SSE decoders

use bytes::Bytes;
use futures::{stream, StreamExt};
use promptwire_core::http::{sse_events, LineDecoder, SseEvent};
use proptest::prelude::*;
use std::convert::Infallible;
use tokio_test::block_on;
use tokio_util::sync::CancellationToken;

fn decode_all(chunks: &[&[u8]]) -> Vec<String> {
    let mut decoder = LineDecoder::new();
    let mut lines: Vec<String> = chunks.iter().flat_map(|c| decoder.feed(c)).collect();
    lines.extend(decoder.finish());
    lines
}

/// Split `bytes` at the given (unsorted, possibly repeated) offsets
fn split_at<'a>(bytes: &'a [u8], cuts: &[usize]) -> Vec<&'a [u8]> {
    let mut cuts: Vec<usize> = cuts.iter().map(|c| c % (bytes.len() + 1)).collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for cut in cuts {
        chunks.push(&bytes[start..cut]);
        start = cut;
    }
    chunks.push(&bytes[start..]);
    chunks
}

fn events(chunks: Vec<Vec<u8>>) -> Vec<SseEvent> {
    let body = stream::iter(
        chunks
            .into_iter()
            .map(|c| Ok::<_, Infallible>(Bytes::from(c))),
    );
    let cancel = CancellationToken::new();
    block_on(
        sse_events(body, &cancel)
            .map(|event| event.unwrap())
            .collect::<Vec<_>>(),
    )
}

fn line_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            "[a-z :{}\"]{0,12}",
            Just("héllo wörld ✓".to_string()),
            Just("日本語".to_string()),
        ],
        0..3,
    )
    .prop_map(|parts| parts.concat())
}

fn terminator_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("\n"), Just("\r\n"), Just("\r")]
}

proptest! {
    #[test]
    fn prop_lines_ignore_chunk_boundaries(
        lines in prop::collection::vec((line_strategy(), terminator_strategy()), 0..8),
        cuts in prop::collection::vec(any::<usize>(), 0..10),
    ) {
        let text: String = lines.iter().map(|(l, t)| format!("{}{}", l, t)).collect();
        let bytes = text.as_bytes();

        let whole = decode_all(&[bytes]);
        let chunked = decode_all(&split_at(bytes, &cuts));
        prop_assert_eq!(&whole, &chunked);

        // A bare CR followed by an empty LF-terminated line reads as one CRLF
        let merged = lines
            .windows(2)
            .any(|w| w[0].1 == "\r" && w[1].0.is_empty() && w[1].1 == "\n");
        if !merged {
            let expected: Vec<String> = lines.iter().map(|(l, _)| l.clone()).collect();
            prop_assert_eq!(whole, expected);
        }
    }

    #[test]
    fn prop_sse_events_ignore_chunk_boundaries(
        payloads in prop::collection::vec("[a-z0-9]{1,8}", 1..5),
        crlf in any::<bool>(),
        cuts in prop::collection::vec(any::<usize>(), 0..10),
    ) {
        let eol = if crlf { "\r\n" } else { "\n" };
        let body: String = payloads
            .iter()
            .map(|p| format!("event: chunk{eol}data: {{\"text\":\"{p}\"}}{eol}{eol}"))
            .collect();
        let bytes = body.as_bytes();

        let whole = events(vec![bytes.to_vec()]);
        let chunked = events(split_at(bytes, &cuts).into_iter().map(<[u8]>::to_vec).collect());
        prop_assert_eq!(&whole, &chunked);

        let texts: Vec<String> = whole
            .iter()
            .map(|e| e.json.as_ref().unwrap()["text"].as_str().unwrap().to_string())
            .collect();
        prop_assert_eq!(texts, payloads);
        prop_assert!(whole.iter().all(|e| e.kind() == Some("chunk")));
    }
}

#[test]
fn test_trailing_partial_event_is_dropped() {
    let body = b"data: {\"a\":1}\n\ndata: {\"b\":2}".to_vec();
    let events = events(vec![body]);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data, "{\"a\":1}");
}

#[test]
fn test_cancelled_stream_yields_nothing() {
    let body = stream::iter(vec![Ok::<_, Infallible>(Bytes::from_static(b"data: x\n\n"))]);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let events: Vec<_> = block_on(sse_events(body, &cancel).collect());
    assert!(events.is_empty());
}
