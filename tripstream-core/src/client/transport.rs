use crate::streaming::StreamingError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

/// Body of a POST that opens a stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub message: String,
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl StreamRequest {
    pub fn new(message: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            domain: domain.into(),
            city: None,
            session_id: None,
        }
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

type CancelHook = Box<dyn FnOnce() + Send + 'static>;

/// Chunked response body plus an optional hook run when the reader is cancelled.
///
/// The hook runs at most once, however many times [`BodyReader::cancel`] is called.
pub struct BodyReader {
    stream: Option<BoxStream<'static, Result<Bytes, StreamingError>>>,
    on_cancel: Option<CancelHook>,
}

impl BodyReader {
    pub fn new<S>(stream: S) -> Self
    where
        S: futures::Stream<Item = Result<Bytes, StreamingError>> + Send + 'static,
    {
        Self {
            stream: Some(stream.boxed()),
            on_cancel: None,
        }
    }

    pub fn with_cancel_hook<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_cancel = Some(Box::new(hook));
        self
    }

    /// Next chunk, or `None` at end of body (and after cancellation)
    pub async fn read(&mut self) -> Option<Result<Bytes, StreamingError>> {
        match self.stream.as_mut() {
            Some(stream) => stream.next().await,
            None => None,
        }
    }

    /// Release the body and run the cancel hook
    pub fn cancel(&mut self) {
        self.stream.take();
        if let Some(hook) = self.on_cancel.take() {
            hook();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.stream.is_none()
    }
}

impl std::fmt::Debug for BodyReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyReader")
            .field("open", &self.stream.is_some())
            .field("has_cancel_hook", &self.on_cancel.is_some())
            .finish()
    }
}

/// Source of event streams; the HTTP backend in production, fakes in tests
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Send the request and return the body once the response headers are accepted
    async fn open(&self, request: &StreamRequest) -> Result<BodyReader, StreamingError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn cancel_hook_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let chunks: Vec<Result<Bytes, StreamingError>> =
            vec![Ok(Bytes::from_static(b"data: {}\n"))];
        let mut reader = BodyReader::new(futures::stream::iter(chunks)).with_cancel_hook(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(reader.read().await.is_some());
        reader.cancel();
        reader.cancel();

        assert!(reader.is_cancelled());
        assert!(reader.read().await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
