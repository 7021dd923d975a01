use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the HTTP client that opens event streams
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Maximum number of idle connections per host
    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle_per_host: usize,
    /// How long to keep idle connections alive
    #[serde(default = "default_pool_idle_timeout")]
    pub pool_idle_timeout_secs: u64,
    /// TCP keepalive duration
    #[serde(default = "default_tcp_keepalive")]
    pub tcp_keepalive_secs: u64,
    /// Connection timeout
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// User agent string
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: default_pool_max_idle(),
            pool_idle_timeout_secs: default_pool_idle_timeout(),
            tcp_keepalive_secs: default_tcp_keepalive(),
            connect_timeout_secs: default_connect_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl ClientConfig {
    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }

    pub fn tcp_keepalive(&self) -> Duration {
        Duration::from_secs(self.tcp_keepalive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_pool_max_idle() -> usize {
    10
}
fn default_pool_idle_timeout() -> u64 {
    90
}
fn default_tcp_keepalive() -> u64 {
    60
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_user_agent() -> String {
    format!("tripstream/{}", env!("CARGO_PKG_VERSION"))
}
