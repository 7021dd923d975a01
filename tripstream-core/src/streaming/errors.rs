use std::time::Duration;

/// Failures that end a stream, as opposed to per-event problems which are skipped
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamingError {
    /// Connection, DNS, TLS or body read failures
    #[error("Network error: {message}")]
    Network { message: String, is_retryable: bool },

    /// The backend answered with a non-success status
    #[error("HTTP {status_code}: {message}")]
    Api {
        status_code: u16,
        message: String,
        is_retryable: bool,
    },

    #[error("Timeout during {operation} after {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// The backend closed the stream without sending anything usable
    #[error("Stream error: {message}")]
    Stream { message: String },

    /// Persisting the session failed
    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl StreamingError {
    /// Whether opening the stream again may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { is_retryable, .. } | Self::Api { is_retryable, .. } => *is_retryable,
            Self::Timeout { .. } => true,
            Self::Stream { .. } | Self::Storage { .. } => false,
        }
    }

    pub fn from_status(status_code: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let message = if body.trim().is_empty() {
            reqwest::StatusCode::from_u16(status_code)
                .ok()
                .and_then(|status| status.canonical_reason())
                .unwrap_or("Unexpected status")
                .to_string()
        } else {
            body
        };

        Self::Api {
            status_code,
            message,
            is_retryable: matches!(status_code, 408 | 429 | 500 | 502 | 503 | 504),
        }
    }

    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::Network {
                message: format!("request timeout: {error}"),
                is_retryable: true,
            };
        }
        if let Some(status) = error.status() {
            return Self::from_status(status.as_u16(), error.to_string());
        }

        // Builder and URL errors fail the same way on every attempt.
        Self::Network {
            message: error.to_string(),
            is_retryable: error.is_connect() || error.is_body(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_render_like_http_lines() {
        let error = StreamingError::from_status(500, "");
        assert_eq!(error.to_string(), "HTTP 500: Internal Server Error");
        assert!(error.is_retryable());

        let error = StreamingError::from_status(404, "no such endpoint");
        assert_eq!(error.to_string(), "HTTP 404: no such endpoint");
        assert!(!error.is_retryable());

        let error = StreamingError::from_status(418, "");
        assert_eq!(error.to_string(), "HTTP 418: I'm a teapot");
        assert_eq!(StreamingError::from_status(599, " ").to_string(), "HTTP 599: Unexpected status");
    }

    #[test]
    fn malformed_endpoints_are_not_retried() {
        let Err(error) = reqwest::Client::new().post("not a url").build() else {
            panic!("relative url should not build");
        };
        let error = StreamingError::from_reqwest(error);
        assert!(matches!(error, StreamingError::Network { .. }));
        assert!(!error.is_retryable());
    }
}
