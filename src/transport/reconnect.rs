//! Retry delay policy for the reconnect supervisor
//!
//! The default policy is a fixed 5 second delay with no attempt limit. The
//! same knobs allow capped exponential backoff with jitter.

use std::time::Duration;
use tracing::debug;

/// Reconnection configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectionConfig {
    /// Maximum number of consecutive retries (0 = infinite)
    pub max_attempts: u32,

    /// Delay before the first retry after a failure
    pub initial_delay: Duration,

    /// Upper bound for any retry delay
    pub max_delay: Duration,

    /// Growth factor per consecutive failure (1.0 = fixed delay)
    pub backoff_multiplier: f64,

    /// Jitter factor to randomize delays (0.0 - 1.0)
    pub jitter_factor: f64,
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }
}

/// Tracks consecutive failures and hands out retry delays
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectionConfig,
    attempt_count: u32,
}

impl Backoff {
    pub fn new(config: ReconnectionConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    pub fn config(&self) -> &ReconnectionConfig {
        &self.config
    }

    /// Retries handed out since the last reset
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Forget previous failures, e.g. after a session opened
    pub fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Delay for the next retry, or `None` once `max_attempts` is exhausted
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.config.max_attempts > 0 && self.attempt_count >= self.config.max_attempts {
            debug!(
                "Retry budget of {} attempts exhausted",
                self.config.max_attempts
            );
            return None;
        }

        self.attempt_count += 1;
        Some(self.delay_for_attempt(self.attempt_count))
    }

    /// Exponential backoff delay with jitter for the given 1-based attempt
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay = self.config.initial_delay.as_secs_f64();
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let backoff_delay = base_delay * self.config.backoff_multiplier.powi(exponent);

        let clamped_delay = backoff_delay.min(self.config.max_delay.as_secs_f64());

        if self.config.jitter_factor <= 0.0 {
            return Duration::from_secs_f64(clamped_delay);
        }

        let jitter_range = clamped_delay * self.config.jitter_factor;
        let jitter = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range;
        let final_delay = (clamped_delay + jitter).max(0.0);

        Duration::from_secs_f64(final_delay)
    }
}
