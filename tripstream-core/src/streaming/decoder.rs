//! Line-oriented decoder for server-sent event bodies
//!
//! Bytes are buffered until a full line is available, so a line (or a multi-byte
//! UTF-8 sequence) split across two network chunks is decoded only once it is
//! complete. Each `data:` line holds one JSON event envelope.

use crate::config::constants::sse;
use crate::streaming::event::{EventDecodeError, StreamEvent};
use tracing::{debug, warn};

/// Outcome of decoding one complete line
#[derive(Debug)]
pub enum DecodedLine {
    Event(StreamEvent),
    /// A `data:` line whose payload could not be decoded; skipped by callers
    Malformed {
        raw: String,
        error: EventDecodeError,
    },
    /// `data: [DONE]`
    Done,
}

/// Incremental decoder; feed it chunks with [`SseDecoder::push`]
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and decode every line it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<DecodedLine> {
        self.buffer.extend_from_slice(chunk);

        let mut decoded = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.buffer[consumed..].iter().position(|byte| *byte == b'\n') {
            let line_end = consumed + offset;
            if let Some(line) = Self::handle_line(&self.buffer[consumed..line_end]) {
                decoded.push(line);
            }
            consumed = line_end + 1;
        }

        if consumed > 0 {
            self.buffer.drain(..consumed);
        }

        decoded
    }

    /// Decode whatever is left once the body has ended
    pub fn finish(&mut self) -> Vec<DecodedLine> {
        let remaining = std::mem::take(&mut self.buffer);
        Self::handle_line(&remaining).into_iter().collect()
    }

    /// Bytes held back waiting for a line terminator
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    fn handle_line(raw_line: &[u8]) -> Option<DecodedLine> {
        let text = String::from_utf8_lossy(raw_line);
        let line = text.trim_end_matches('\r');

        if line.trim().is_empty() || line.starts_with(sse::COMMENT_PREFIX) {
            return None;
        }

        if line.starts_with(sse::EVENT_PREFIX)
            || line.starts_with(sse::ID_PREFIX)
            || line.starts_with(sse::RETRY_PREFIX)
        {
            return None;
        }

        let Some(data) = line.strip_prefix(sse::DATA_PREFIX) else {
            debug!(line = %line, "ignoring line without data prefix");
            return None;
        };

        let data = data.trim();
        if data.is_empty() {
            return None;
        }
        if data == sse::DONE_MARKER {
            return Some(DecodedLine::Done);
        }

        match StreamEvent::from_json(data) {
            Ok(event) => Some(DecodedLine::Event(event)),
            Err(error) => {
                warn!(%error, raw = %data, "skipping malformed stream event");
                Some(DecodedLine::Malformed {
                    raw: data.to_string(),
                    error,
                })
            }
        }
    }
}
