//! Automatic reconnection policy for the subscription socket.

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

/// Configuration for automatic reconnection.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts. `None` means infinite retries.
    pub max_attempts: Option<u32>,
    /// Initial delay between reconnection attempts.
    #[serde(with = "millis")]
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts.
    #[serde(with = "millis")]
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Create a new reconnect configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of reconnection attempts.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Set the initial delay between reconnection attempts.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between reconnection attempts.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier for exponential backoff.
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Whether another attempt is allowed after `attempts` failed ones.
    pub(crate) fn allows_attempt(&self, attempts: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts < max)
    }

    /// Delay before the given attempt (0-indexed), with ±10% jitter.
    pub(crate) fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay_ms = self.initial_delay.as_millis() as f64;
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay_ms = base_delay_ms * self.backoff_multiplier.powi(exponent);
        let delay_ms = delay_ms.min(self.max_delay.as_millis() as f64).max(0.0) as i64;

        let jitter_range = delay_ms / 10;
        let jitter = if jitter_range > 0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0
        };

        Duration::from_millis((delay_ms + jitter).max(0) as u64)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
