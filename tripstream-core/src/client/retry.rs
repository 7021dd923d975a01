use crate::config::core::RetrySettings;
use crate::streaming::StreamingError;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Retry configuration for opening streams
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Multiplicative jitter, applied as `1 ± jitter_ratio`
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            jitter_ratio: settings.jitter_ratio,
        }
    }
}

/// Exponential backoff with multiplicative jitter.
///
/// `min(base * 2^attempt, max)` scaled by a factor drawn uniformly from
/// `[1 - jitter_ratio, 1 + jitter_ratio]`; the result never exceeds
/// `max * (1 + jitter_ratio)`.
pub fn backoff_delay<R>(
    attempt: u32,
    base: Duration,
    max: Duration,
    jitter_ratio: f64,
    rng: &mut R,
) -> Duration
where
    R: Rng,
{
    let base_ms = base.as_millis() as f64;
    let max_ms = max.as_millis() as f64;
    let exponent = attempt.min(62) as i32;
    let capped = (base_ms * 2f64.powi(exponent)).min(max_ms);

    let ratio = jitter_ratio.clamp(0.0, 1.0);
    let factor = if ratio > 0.0 {
        1.0 + rng.gen_range(-ratio..=ratio)
    } else {
        1.0
    };

    Duration::from_millis((capped * factor).max(0.0) as u64)
}

/// Retry policy with its own randomness source
#[derive(Debug)]
pub struct Backoff {
    config: RetryConfig,
    rng: Mutex<StdRng>,
}

impl Backoff {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic jitter for tests and reproducible runs
    pub fn with_seed(config: RetryConfig, seed: u64) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay before retry number `attempt` (0 = first retry)
    pub fn delay(&self, attempt: u32) -> Duration {
        let mut rng = self.rng.lock();
        backoff_delay(
            attempt,
            self.config.initial_delay,
            self.config.max_delay,
            self.config.jitter_ratio,
            &mut *rng,
        )
    }

    /// Whether a failed open should be attempted again.
    ///
    /// `attempts_made` counts the attempts that already failed.
    pub fn should_retry(&self, attempts_made: u32, error: &StreamingError) -> bool {
        attempts_made < self.config.max_attempts && error.is_retryable()
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
