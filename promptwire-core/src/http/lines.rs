//! Incremental line splitting for streamed response bodies
//!
//! Chunk boundaries are arbitrary: a `\r\n` pair or a multi-byte UTF-8
//! character may be split across two chunks. Splitting happens on raw bytes
//! and text is decoded per completed line, so neither case can corrupt output.

use bytes::BytesMut;
use futures::{ready, Stream};
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Splits a byte stream into lines without their terminators
#[derive(Debug)]
pub struct LineDecoder {
    buffer: BytesMut,
    /// Treat a bare `\r` as a line terminator
    split_bare_cr: bool,
    /// The previous chunk ended on a `\r` that already terminated a line
    pending_cr: bool,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LineDecoder {
    /// Decoder recognizing `\n`, `\r\n` and bare `\r`
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            split_bare_cr: true,
            pending_cr: false,
        }
    }

    /// Decoder recognizing only `\n` and `\r\n`; a bare `\r` stays in the line
    pub fn without_bare_cr() -> Self {
        Self {
            split_bare_cr: false,
            ..Self::new()
        }
    }

    /// Feed a chunk and return every line it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &byte in chunk {
            if self.pending_cr {
                self.pending_cr = false;
                if byte == b'\n' {
                    continue;
                }
            }

            match byte {
                b'\n' => {
                    if !self.split_bare_cr && self.buffer.last() == Some(&b'\r') {
                        self.buffer.truncate(self.buffer.len() - 1);
                    }
                    lines.push(self.take_line());
                }
                b'\r' if self.split_bare_cr => {
                    lines.push(self.take_line());
                    self.pending_cr = true;
                }
                _ => self.buffer.extend_from_slice(&[byte]),
            }
        }

        lines
    }

    /// Flush the final unterminated line at end of stream
    pub fn finish(&mut self) -> Option<String> {
        self.pending_cr = false;
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }

    /// Whether a partial line is buffered
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    fn take_line(&mut self) -> String {
        let line = self.buffer.split();
        String::from_utf8_lossy(&line).into_owned()
    }
}

/// Stream of lines over a fallible byte-chunk stream
///
/// Ends after the inner stream ends (flushing the last line) or right after
/// yielding the first inner error.
pub struct LineStream<S> {
    inner: S,
    decoder: LineDecoder,
    ready: VecDeque<String>,
    done: bool,
}

impl<S> LineStream<S> {
    pub fn new(inner: S) -> Self {
        Self::with_decoder(inner, LineDecoder::new())
    }

    pub fn with_decoder(inner: S, decoder: LineDecoder) -> Self {
        Self {
            inner,
            decoder,
            ready: VecDeque::new(),
            done: false,
        }
    }
}

impl<S, B, E> Stream for LineStream<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    type Item = Result<String, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(line) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(line)));
            }
            if this.done {
                return Poll::Ready(None);
            }

            match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
                Some(Ok(chunk)) => {
                    let lines = this.decoder.feed(chunk.as_ref());
                    this.ready.extend(lines);
                }
                Some(Err(err)) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(err)));
                }
                None => {
                    this.done = true;
                    this.ready.extend(this.decoder.finish());
                }
            }
        }
    }
}
