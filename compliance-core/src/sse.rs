//! Decoder for the completion API's server-sent-event delta stream.
//!
//! The decoder is deliberately decoupled from both the HTTP client and the
//! response-writing side: it consumes raw byte chunks and yields extracted
//! text fragments, so it can be tested against canned line sequences.

use bytes::Bytes;
use futures::{Stream, StreamExt, future, stream};
use serde_json::Value;

use crate::error::{ComplianceError, Result};

/// Prefix marking payload lines in the upstream event stream
const DATA_PREFIX: &str = "data: ";
/// Literal payload that terminates a completion stream
const DONE_SENTINEL: &str = "[DONE]";
/// Location of the incremental text inside each streamed chunk
const DELTA_PATH: &str = "/choices/0/delta/content";

enum LineOutcome {
    Fragment(String),
    Done,
    Nothing,
}

/// Incremental decoder for `data:`-framed delta lines.
///
/// Fed transport chunks as they arrive, it reassembles lines split across
/// chunk boundaries, extracts the text fragment from each parseable payload
/// and stops at the `[DONE]` sentinel. Lines that are not payload lines, or
/// whose payload fails to parse, are skipped without aborting the stream.
#[derive(Debug, Default)]
pub struct DeltaDecoder {
    buffer: String,
    done: bool,
}

impl DeltaDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the sentinel has been seen or the decoder was halted.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Stop decoding; later chunks produce no further fragments.
    pub fn halt(&mut self) {
        self.done = true;
    }

    /// Feed one transport chunk, returning the fragments completed by it
    /// in arrival order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut fragments = Vec::new();
        if self.done {
            return fragments;
        }

        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            match decode_line(line.trim_end_matches(['\r', '\n'])) {
                LineOutcome::Fragment(text) => fragments.push(text),
                LineOutcome::Done => {
                    self.done = true;
                    break;
                }
                LineOutcome::Nothing => {}
            }
        }
        fragments
    }
}

fn decode_line(line: &str) -> LineOutcome {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return LineOutcome::Nothing;
    };
    if payload == DONE_SENTINEL {
        return LineOutcome::Done;
    }

    let chunk: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        // malformed payload lines are dropped, the stream continues
        Err(_) => return LineOutcome::Nothing,
    };

    match chunk.pointer(DELTA_PATH).and_then(Value::as_str) {
        Some(text) if !text.is_empty() => LineOutcome::Fragment(text.to_string()),
        _ => LineOutcome::Nothing,
    }
}

/// Adapt an upstream byte stream into an ordered stream of text fragments.
///
/// Fragments are emitted in extraction order, one chunk decoded at a time.
/// The `[DONE]` sentinel ends the stream cleanly; a transport error yields
/// exactly one final `Err` item and then the stream terminates, so a caller
/// that has already committed response headers can still surface a single
/// in-band diagnostic.
pub fn delta_stream<S, E>(upstream: S) -> impl Stream<Item = Result<String>>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: std::fmt::Display,
{
    upstream
        .scan(DeltaDecoder::new(), |decoder, next| {
            if decoder.is_done() {
                return future::ready(None);
            }
            let items: Vec<Result<String>> = match next {
                Ok(chunk) => decoder.feed(&chunk).into_iter().map(Ok).collect(),
                Err(err) => {
                    decoder.halt();
                    vec![Err(ComplianceError::UpstreamTransport(err.to_string()))]
                }
            };
            future::ready(Some(stream::iter(items)))
        })
        .flatten()
}
