//! HTTP transport for event streams
//!
//! [`HttpTransport`] posts a [`StreamRequest`] to the configured endpoint and hands
//! back the chunked body as a [`BodyReader`]. Non-success statuses are turned into
//! [`StreamingError::Api`] before any body is read.

pub mod config;
pub mod retry;
pub mod transport;

pub use config::ClientConfig;
pub use retry::{Backoff, RetryConfig, backoff_delay};
pub use transport::{BodyReader, EventTransport, StreamRequest};

use crate::config::constants::sse;
use crate::streaming::StreamingError;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client as ReqwestClient;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::debug;

#[derive(Clone)]
pub struct HttpTransport {
    endpoint: String,
    http: ReqwestClient,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, StreamingError> {
        Self::with_config(endpoint, ClientConfig::default())
    }

    /// Create a transport with custom client configuration
    pub fn with_config(
        endpoint: impl Into<String>,
        config: ClientConfig,
    ) -> Result<Self, StreamingError> {
        // No overall request timeout: streams legitimately stay open for minutes.
        let http = ReqwestClient::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout())
            .tcp_keepalive(config.tcp_keepalive())
            .connect_timeout(config.connect_timeout())
            .user_agent(&config.user_agent)
            .build()
            .map_err(|error| StreamingError::Network {
                message: format!("failed to build HTTP client: {error}"),
                is_retryable: false,
            })?;

        Ok(Self {
            endpoint: endpoint.into(),
            http,
            config,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Get current client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[async_trait]
impl EventTransport for HttpTransport {
    async fn open(&self, request: &StreamRequest) -> Result<BodyReader, StreamingError> {
        debug!(endpoint = %self.endpoint, domain = %request.domain, "opening event stream");

        let response = self
            .http
            .post(&self.endpoint)
            .header(ACCEPT, sse::CONTENT_TYPE)
            .json(request)
            .send()
            .await
            .map_err(StreamingError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamingError::from_status(status.as_u16(), body));
        }

        if let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
        {
            if !content_type.starts_with(sse::CONTENT_TYPE) {
                debug!(%content_type, "event stream served with unexpected content type");
            }
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(StreamingError::from_reqwest));
        Ok(BodyReader::new(body))
    }
}
