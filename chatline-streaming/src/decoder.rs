//! Line-oriented Server-Sent Events decoding.
//!
//! Completion endpoints frame their streamed output as `data: <json>` lines
//! and finish with `data: [DONE]`. [`SseLineDecoder`] turns arbitrarily
//! split byte reads into the ordered sequence of parsed JSON payloads.
//! Only lines terminated by a line break are ever parsed, so the decoded
//! output does not depend on where the reads were split.

use crate::error::{StreamError, StreamResult};
use serde_json::Value;
use tracing::{debug, trace, warn};

/// Largest unterminated line the decoder will hold.
pub const MAX_BUFFER_SIZE: usize = 10 * 1024 * 1024;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Decoder state.
///
/// `Done` and `Aborted` are terminal: no further input is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Nothing buffered; waiting for the next read.
    AwaitingBytes,
    /// Holding an incomplete line.
    Buffering,
    /// Processing complete lines.
    Emitting,
    /// Sentinel seen or input ended.
    Done,
    /// Decoding was cancelled or failed.
    Aborted,
}

impl DecoderState {
    /// Whether this state accepts no further input.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

enum Line {
    Skip,
    Chunk(Value),
    Done,
}

/// Incremental decoder for `data:`-framed JSON lines.
#[derive(Debug)]
pub struct SseLineDecoder {
    buffer: String,
    utf8_carry: Vec<u8>,
    state: DecoderState,
    max_buffer: usize,
}

impl Default for SseLineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseLineDecoder {
    /// Create a decoder with the default buffer limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_buffer(MAX_BUFFER_SIZE)
    }

    /// Create a decoder with a custom buffer limit.
    #[must_use]
    pub fn with_max_buffer(max_buffer: usize) -> Self {
        Self {
            buffer: String::new(),
            utf8_carry: Vec::new(),
            state: DecoderState::AwaitingBytes,
            max_buffer,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Whether the decoder has reached `Done` or `Aborted`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Bytes currently held for an incomplete line.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len() + self.utf8_carry.len()
    }

    /// Feed one physical read and return every payload it completes.
    ///
    /// Input after the `[DONE]` sentinel, including the rest of this read,
    /// is ignored.
    pub fn feed(&mut self, bytes: &[u8]) -> StreamResult<Vec<Value>> {
        if self.state.is_terminal() {
            return Ok(Vec::new());
        }

        self.state = DecoderState::Buffering;
        self.append_utf8(bytes);

        self.state = DecoderState::Emitting;
        let mut chunks = Vec::new();
        let mut consumed = 0;

        while let Some(offset) = self.buffer[consumed..].find(['\n', '\r']) {
            let end = consumed + offset;
            let line = parse_line(&self.buffer[consumed..end]);
            consumed = end + 1;

            match line {
                Line::Skip => {}
                Line::Chunk(value) => chunks.push(value),
                Line::Done => {
                    debug!(chunks = chunks.len(), "Stream sentinel received");
                    self.state = DecoderState::Done;
                    self.buffer.clear();
                    self.utf8_carry.clear();
                    return Ok(chunks);
                }
            }
        }

        self.buffer.drain(..consumed);

        if self.buffered_len() > self.max_buffer {
            warn!(
                buffered = self.buffered_len(),
                limit = self.max_buffer,
                "Stream line exceeded buffer limit"
            );
            self.abort();
            return Err(StreamError::BufferOverflow {
                limit: self.max_buffer,
            });
        }

        self.state = if self.buffered_len() == 0 {
            DecoderState::AwaitingBytes
        } else {
            DecoderState::Buffering
        };

        Ok(chunks)
    }

    /// Signal end of input.
    ///
    /// An unterminated trailing line is discarded.
    pub fn finish(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        if !self.buffer.trim().is_empty() || !self.utf8_carry.is_empty() {
            debug!(
                discarded = self.buffered_len(),
                "Discarding unterminated trailing line"
            );
        }
        self.buffer.clear();
        self.utf8_carry.clear();
        self.state = DecoderState::Done;
    }

    /// Stop decoding. Later input is ignored.
    pub fn abort(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.buffer.clear();
        self.utf8_carry.clear();
        self.state = DecoderState::Aborted;
    }

    /// Append bytes as text, holding back a UTF-8 sequence cut by the read.
    fn append_utf8(&mut self, bytes: &[u8]) {
        let joined;
        let mut rest: &[u8] = if self.utf8_carry.is_empty() {
            bytes
        } else {
            self.utf8_carry.extend_from_slice(bytes);
            joined = std::mem::take(&mut self.utf8_carry);
            &joined
        };

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(err) => {
                    let (valid, tail) = rest.split_at(err.valid_up_to());
                    self.buffer
                        .push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            rest = &tail[len..];
                        }
                        None => {
                            self.utf8_carry = tail.to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }
}

fn parse_line(raw: &str) -> Line {
    let line = raw.trim();
    if line.is_empty() || line.starts_with(':') {
        return Line::Skip;
    }

    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        trace!(line, "Ignoring non-data field");
        return Line::Skip;
    };
    let data = data.trim_start();

    if data == DONE_SENTINEL {
        return Line::Done;
    }

    match serde_json::from_str(data) {
        Ok(value) => Line::Chunk(value),
        Err(error) => {
            warn!(error = %error, frame = data, "Skipping malformed stream frame");
            Line::Skip
        }
    }
}
