//! Server-sent event decoding into cumulative snapshots.
//!
//! OpenAI-compatible providers stream `data: {json}` lines whose
//! `choices[0].delta.content` carries a text fragment. The decoder
//! concatenates fragments and emits the full text so far after each one.

use std::collections::VecDeque;
use std::fmt::Display;

use futures_util::{stream, Stream, StreamExt};
use serde_json::Value;

use crate::infrastructure::ports::{LlmError, SnapshotStream};

const DONE_MARKER: &str = "[DONE]";

/// Incremental line decoder. Bytes may arrive split anywhere, including in
/// the middle of a UTF-8 sequence; only complete lines are decoded.
#[derive(Debug, Default)]
pub struct SnapshotDecoder {
    buffer: Vec<u8>,
    content: String,
    finished: bool,
}

impl SnapshotDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `[DONE]` or an error event has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed raw bytes, returning the snapshots completed by them.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<String, LlmError>> {
        if self.finished {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
            if let Some(item) = self.decode_line(&line) {
                out.push(item);
            }
            if self.finished {
                self.buffer.clear();
                break;
            }
        }
        out
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<Result<String, LlmError>> {
        if self.finished || self.buffer.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&std::mem::take(&mut self.buffer)).into_owned();
        let item = self.decode_line(&line);
        self.finished = true;
        item
    }

    fn decode_line(&mut self, line: &str) -> Option<Result<String, LlmError>> {
        let line = line.trim_end_matches('\r');
        // comments, `event:`, `id:` and blank separators carry no content
        let data = line.strip_prefix("data:")?.trim_start();
        if data.is_empty() {
            return None;
        }
        if data == DONE_MARKER {
            self.finished = true;
            return None;
        }

        let json: Value = match serde_json::from_str(data) {
            Ok(json) => json,
            Err(e) => {
                self.finished = true;
                return Some(Err(LlmError::InvalidResponse(format!(
                    "Malformed stream event: {}",
                    e
                ))));
            }
        };

        if let Some(error) = json.get("error") {
            self.finished = true;
            return Some(Err(stream_error(error)));
        }

        let fragment = json["choices"]
            .get(0)
            .and_then(|c| c.get("delta").or_else(|| c.get("message")))
            .and_then(|d| d.get("content"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if fragment.is_empty() {
            return None;
        }

        self.content.push_str(fragment);
        Some(Ok(self.content.clone()))
    }
}

fn stream_error(error: &Value) -> LlmError {
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| error.as_str().map(str::to_string))
        .unwrap_or_else(|| error.to_string());
    let code = error.get("code").and_then(Value::as_str).unwrap_or_default();
    match code {
        "rate_limit_exceeded" => LlmError::RateLimited(message),
        "invalid_api_key" => LlmError::Unauthorized(message),
        _ => LlmError::InvalidResponse(message),
    }
}

struct DecodeState<S> {
    bytes: std::pin::Pin<Box<S>>,
    decoder: SnapshotDecoder,
    pending: VecDeque<Result<String, LlmError>>,
    done: bool,
}

/// Adapt a raw byte stream (e.g. `reqwest::Response::bytes_stream`) into a
/// [`SnapshotStream`]. Ends after `[DONE]`, after the first error item, or
/// when the byte stream ends.
pub fn snapshot_stream<S, B, E>(bytes: S) -> SnapshotStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: SnapshotDecoder::new(),
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.pending.clear();
                    state.done = true;
                }
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let items = state.decoder.feed(chunk.as_ref());
                    state.pending.extend(items);
                }
                Some(Err(e)) => {
                    state.done = true;
                    state.pending.push_back(Err(LlmError::Network(e.to_string())));
                }
                None => {
                    state.done = true;
                    state.pending.extend(state.decoder.finish());
                }
            }
            if state.decoder.is_finished() {
                state.done = true;
            }
        }
    }))
}
