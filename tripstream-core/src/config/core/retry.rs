use crate::config::constants::defaults;
use serde::{Deserialize, Serialize};

/// Retry policy for opening a stream
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrySettings {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Multiplicative jitter applied on both sides of the computed delay
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            jitter_ratio: default_jitter_ratio(),
        }
    }
}

fn default_max_attempts() -> u32 {
    defaults::MAX_ATTEMPTS
}
fn default_base_delay() -> u64 {
    defaults::BASE_DELAY_MS
}
fn default_max_delay() -> u64 {
    defaults::MAX_DELAY_MS
}
fn default_jitter_ratio() -> f64 {
    defaults::JITTER_RATIO
}
