use crate::config::constants::defaults;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Stream endpoint and timing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    /// Backend endpoint that accepts the POST and answers with an event stream
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Maximum silence between two chunks once the stream is flowing
    #[serde(default = "default_chunk_timeout")]
    pub chunk_timeout_secs: u64,

    /// Maximum wait for the first chunk after the response headers arrive
    #[serde(default = "default_first_chunk_timeout")]
    pub first_chunk_timeout_secs: u64,

    /// A session that has not completed within this window is expired
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            chunk_timeout_secs: default_chunk_timeout(),
            first_chunk_timeout_secs: default_first_chunk_timeout(),
            session_timeout_secs: default_session_timeout(),
        }
    }
}

impl StreamConfig {
    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs)
    }

    pub fn first_chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.first_chunk_timeout_secs)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}

fn default_endpoint() -> String {
    defaults::DEFAULT_ENDPOINT.to_string()
}
fn default_chunk_timeout() -> u64 {
    defaults::CHUNK_TIMEOUT_SECS
}
fn default_first_chunk_timeout() -> u64 {
    defaults::FIRST_CHUNK_TIMEOUT_SECS
}
fn default_session_timeout() -> u64 {
    defaults::SESSION_TIMEOUT_SECS
}
