//! Connection-level options for the realtime client.

use serde::{Deserialize, Serialize};

/// Options controlling reconnection, failure isolation and outbound
/// buffering for a realtime connection.
///
/// Separate from [`PulseLinkTimeouts`](crate::PulseLinkTimeouts), which
/// controls connection establishment and heartbeat timing.
///
/// # Example
///
/// ```rust
/// use pulse_link::ConnectionOptions;
///
/// let options = ConnectionOptions::default()
///     .with_auto_reconnect(true)
///     .with_reconnect_delay_ms(2000)
///     .with_max_reconnect_attempts(Some(10));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Enable automatic reconnection on connection loss.
    /// Default: true
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Initial delay in milliseconds between reconnection attempts.
    /// Grows by `reconnect_multiplier` per failed attempt, capped at
    /// `max_reconnect_delay_ms`.
    /// Default: 1000ms
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Multiplier applied to the reconnect delay per failed attempt.
    /// Default: 2.0
    #[serde(default = "default_reconnect_multiplier")]
    pub reconnect_multiplier: f64,

    /// Maximum delay between reconnection attempts.
    /// Default: 30000ms (30 seconds)
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,

    /// Maximum number of reconnection attempts before giving up.
    /// Default: None (infinite retries)
    #[serde(default)]
    pub max_reconnect_attempts: Option<u32>,

    /// Number of consecutive connection failures that opens the circuit
    /// breaker. While open, no transport is created until the cooldown
    /// elapses. Default: 5
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,

    /// How long the circuit breaker stays open after tripping.
    /// Default: 30000ms (30 seconds)
    #[serde(default = "default_breaker_cooldown_ms")]
    pub breaker_cooldown_ms: u64,

    /// Maximum number of outbound messages buffered while disconnected.
    /// When full, the oldest entry is dropped to make room.
    /// Default: 100
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Maximum number of flush retries per buffered message before it is
    /// dropped. Default: 3
    #[serde(default = "default_max_message_retries")]
    pub max_message_retries: u32,
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_reconnect_multiplier() -> f64 {
    2.0
}

fn default_max_reconnect_delay_ms() -> u64 {
    30000
}

fn default_max_consecutive_errors() -> u32 {
    5
}

fn default_breaker_cooldown_ms() -> u64 {
    30000
}

fn default_max_queue_size() -> usize {
    100
}

fn default_max_message_retries() -> u32 {
    3
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            reconnect_delay_ms: 1000,
            reconnect_multiplier: 2.0,
            max_reconnect_delay_ms: 30000,
            max_reconnect_attempts: None,
            max_consecutive_errors: 5,
            breaker_cooldown_ms: 30000,
            max_queue_size: 100,
            max_message_retries: 3,
        }
    }
}

impl ConnectionOptions {
    /// Create new connection options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to automatically reconnect on connection loss.
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the initial delay between reconnection attempts (milliseconds).
    pub fn with_reconnect_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect_delay_ms = delay_ms;
        self
    }

    /// Set the backoff multiplier applied per failed attempt.
    pub fn with_reconnect_multiplier(mut self, multiplier: f64) -> Self {
        self.reconnect_multiplier = multiplier;
        self
    }

    /// Set the maximum delay between reconnection attempts (milliseconds).
    pub fn with_max_reconnect_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_reconnect_delay_ms = max_delay_ms;
        self
    }

    /// Set the maximum number of reconnection attempts.
    /// Pass None for infinite retries.
    pub fn with_max_reconnect_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self
    }

    /// Set the consecutive-failure count that opens the circuit breaker.
    pub fn with_max_consecutive_errors(mut self, max_errors: u32) -> Self {
        self.max_consecutive_errors = max_errors;
        self
    }

    /// Set the circuit breaker cooldown (milliseconds).
    pub fn with_breaker_cooldown_ms(mut self, cooldown_ms: u64) -> Self {
        self.breaker_cooldown_ms = cooldown_ms;
        self
    }

    /// Set the outbound buffer capacity.
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    /// Set the per-message flush retry cap.
    pub fn with_max_message_retries(mut self, retries: u32) -> Self {
        self.max_message_retries = retries;
        self
    }
}
