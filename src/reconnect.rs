//! Reconnection backoff schedule.
//!
//! Successive attempts are spaced by `base_delay * multiplier^attempt`,
//! capped at `max_delay`. The attempt counter resets only on a successful
//! transition to connected.

use crate::options::ConnectionOptions;
use std::time::Duration;

/// Computes the delay before each reconnection attempt.
#[derive(Debug)]
pub struct ReconnectSchedule {
    base_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    max_attempts: Option<u32>,
    attempts: u32,
}

impl ReconnectSchedule {
    /// Build a schedule from connection options.
    pub fn from_options(options: &ConnectionOptions) -> Self {
        Self {
            base_delay: Duration::from_millis(options.reconnect_delay_ms),
            multiplier: options.reconnect_multiplier,
            max_delay: Duration::from_millis(options.max_reconnect_delay_ms),
            max_attempts: options.max_reconnect_attempts,
            attempts: 0,
        }
    }

    /// Delay for a given zero-based attempt index.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let factor = self.multiplier.max(1.0).powi(attempt.min(64) as i32);
        let delay_ms = (base_ms * factor).min(self.max_delay.as_millis() as f64);
        Duration::from_millis(delay_ms as u64)
    }

    /// Consume the next attempt and return its delay, or `None` when the
    /// attempt budget is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if self.attempts >= max {
                return None;
            }
        }
        let delay = self.delay_for_attempt(self.attempts);
        self.attempts += 1;
        Some(delay)
    }

    /// Reset the attempt counter; called on a successful connection.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Number of attempts consumed since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
