pub mod decoder;
pub mod errors;
pub mod event;
pub mod reader;

pub use decoder::{DecodedLine, SseDecoder};
pub use errors::StreamingError;
pub use event::{
    ChunkPayload, CompletePayload, EventDecodeError, PoiPayload, ProgressPayload, StartPayload,
    StreamEvent,
};
pub use reader::{EventReader, ReaderItem};

use std::time::{Duration, Instant};

/// Per-stream counters for monitoring and debugging
#[derive(Debug, Clone, Default)]
pub struct StreamingMetrics {
    pub request_start_time: Option<Instant>,
    pub first_chunk_time: Option<Instant>,
    pub total_chunks: usize,
    pub total_bytes: usize,
    pub total_events: usize,
    pub malformed_events: usize,
    pub retry_count: usize,
}

impl StreamingMetrics {
    /// Time from sending the request to the first body chunk
    pub fn first_chunk_latency(&self) -> Option<Duration> {
        match (self.request_start_time, self.first_chunk_time) {
            (Some(start), Some(first)) => Some(first.saturating_duration_since(start)),
            _ => None,
        }
    }
}
