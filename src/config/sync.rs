//! Sync loop and push retry configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

fn default_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_push_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Background synchronisation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Whether the periodic sync loop runs.
    #[serde(default)]
    pub enabled: bool,
    /// Time between sync cycles.
    #[serde(default = "default_interval", with = "duration")]
    pub interval: Duration,
    /// Upper bound on a single status push.
    #[serde(default = "default_push_timeout", with = "duration")]
    pub push_timeout: Duration,
    /// Backoff for failed status pushes.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: default_interval(),
            push_timeout: default_push_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry settings for failed pushes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts before a push is given up (default 5).
    pub max_attempts: Option<u32>,
    /// Delay before the first retry (default 1s).
    #[serde(default, with = "duration")]
    pub initial_delay: Duration,
    /// Maximum delay between retries (default 5m).
    #[serde(default, with = "duration")]
    pub max_delay: Duration,
    /// Factor by which delay increases after each retry (default 2).
    pub multiplier: Option<f64>,
}

impl RetryConfig {
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.unwrap_or(5)
    }

    /// Delay to wait after the given number of failed attempts.
    pub fn delay_after(&self, failures: u32) -> Duration {
        let initial = if self.initial_delay.is_zero() {
            Duration::from_secs(1)
        } else {
            self.initial_delay
        };
        let max = if self.max_delay.is_zero() {
            Duration::from_secs(300)
        } else {
            self.max_delay
        };
        let multiplier = self.multiplier.unwrap_or(2.0).max(1.0);

        let exponent = failures.saturating_sub(1).min(32) as i32;
        let secs = initial.as_secs_f64() * multiplier.powi(exponent);
        if secs.is_finite() && secs < max.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            max
        }
    }
}
