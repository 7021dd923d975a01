use crate::client::BodyReader;
use crate::streaming::decoder::{DecodedLine, SseDecoder};
use crate::streaming::{StreamEvent, StreamingError, StreamingMetrics};
use std::collections::VecDeque;
use std::time::Instant;
use tokio::time::{Duration, timeout};

/// Item produced by [`EventReader::next`]
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderItem {
    Event(StreamEvent),
    /// The body ended or sent `[DONE]`
    Done,
}

/// Pulls chunks from a [`BodyReader`] and yields decoded events one at a time.
///
/// `next` is cancel-safe: dropping its future between chunks loses nothing,
/// which lets the lifecycle controller race it against a cancellation token.
#[derive(Debug)]
pub struct EventReader {
    body: BodyReader,
    decoder: SseDecoder,
    pending: VecDeque<StreamEvent>,
    finished: bool,
    chunk_timeout: Duration,
    first_chunk_timeout: Duration,
    metrics: StreamingMetrics,
}

impl EventReader {
    pub fn new(body: BodyReader, first_chunk_timeout: Duration, chunk_timeout: Duration) -> Self {
        let metrics = StreamingMetrics {
            request_start_time: Some(Instant::now()),
            ..StreamingMetrics::default()
        };

        Self {
            body,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
            chunk_timeout,
            first_chunk_timeout,
            metrics,
        }
    }

    /// Next decoded event, `Done` at the end of the body
    pub async fn next(&mut self) -> Result<ReaderItem, StreamingError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                self.metrics.total_events += 1;
                return Ok(ReaderItem::Event(event));
            }
            if self.finished {
                return Ok(ReaderItem::Done);
            }

            let (limit, operation) = if self.metrics.first_chunk_time.is_none() {
                (self.first_chunk_timeout, "first_chunk")
            } else {
                (self.chunk_timeout, "chunk")
            };

            match timeout(limit, self.body.read()).await {
                Ok(Some(Ok(bytes))) => {
                    if self.metrics.first_chunk_time.is_none() {
                        self.metrics.first_chunk_time = Some(Instant::now());
                    }
                    self.metrics.total_chunks += 1;
                    self.metrics.total_bytes += bytes.len();
                    let decoded = self.decoder.push(&bytes);
                    self.enqueue(decoded);
                }
                Ok(Some(Err(error))) => return Err(error),
                Ok(None) => {
                    let decoded = self.decoder.finish();
                    self.enqueue(decoded);
                    self.finished = true;
                }
                Err(_) => {
                    return Err(StreamingError::Timeout {
                        operation: operation.to_string(),
                        duration: limit,
                    });
                }
            }
        }
    }

    fn enqueue(&mut self, decoded: Vec<DecodedLine>) {
        for line in decoded {
            if self.finished {
                break;
            }
            match line {
                DecodedLine::Event(event) => self.pending.push_back(event),
                DecodedLine::Malformed { .. } => self.metrics.malformed_events += 1,
                DecodedLine::Done => self.finished = true,
            }
        }
    }

    /// Release the underlying body; subsequent reads report `Done`
    pub fn cancel(&mut self) {
        self.pending.clear();
        self.finished = true;
        self.body.cancel();
    }

    pub fn metrics(&self) -> &StreamingMetrics {
        &self.metrics
    }
}
