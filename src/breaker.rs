//! Circuit breaker gating connection attempts.
//!
//! Counts consecutive connection failures; once the threshold is reached
//! the breaker opens and every attempt is rejected without touching the
//! transport factory until the cooldown elapses. The first attempt after
//! the cooldown auto-closes the breaker. The failure count resets only on
//! a successful transition to connected.

use std::time::Duration;
use tokio::time::Instant;

/// Failure-count gate over connection attempts.
#[derive(Debug)]
pub struct CircuitBreaker {
    max_consecutive_errors: u32,
    cooldown: Duration,
    consecutive_errors: u32,
    open_until: Option<Instant>,
}

impl CircuitBreaker {
    /// Create a breaker that opens after `max_consecutive_errors` failures
    /// and stays open for `cooldown`.
    pub fn new(max_consecutive_errors: u32, cooldown: Duration) -> Self {
        Self {
            max_consecutive_errors,
            cooldown,
            consecutive_errors: 0,
            open_until: None,
        }
    }

    /// Guard evaluated at the top of every connection attempt.
    ///
    /// Returns how much cooldown remains when the attempt must be blocked.
    /// A call made after the cooldown has elapsed closes the breaker and
    /// lets the attempt proceed.
    pub fn blocked_for(&mut self, now: Instant) -> Option<Duration> {
        match self.open_until {
            Some(until) if now < until => Some(until - now),
            Some(_) => {
                // Cooldown elapsed; auto-close on the next attempt.
                self.open_until = None;
                None
            },
            None => None,
        }
    }

    /// Record a failed attempt. Returns `true` when this failure tripped
    /// the breaker open.
    pub fn record_failure(&mut self, now: Instant) -> bool {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        if self.open_until.is_none() && self.consecutive_errors >= self.max_consecutive_errors {
            self.open_until = Some(now + self.cooldown);
            return true;
        }
        false
    }

    /// Record a successful connection; clears the failure count and closes
    /// the breaker.
    pub fn record_success(&mut self) {
        self.consecutive_errors = 0;
        self.open_until = None;
    }

    /// Whether the breaker is currently open (cooldown may have elapsed).
    pub fn is_open(&self) -> bool {
        self.open_until.is_some()
    }

    /// Current consecutive failure count.
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }
}
