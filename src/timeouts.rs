//! Timeout configuration for pulse-link connections.
//!
//! Centralizes the timing knobs that govern connection establishment and
//! liveness detection.

use std::time::Duration;

/// Timing configuration for a realtime connection.
///
/// # Examples
///
/// ```rust
/// use pulse_link::PulseLinkTimeouts;
/// use std::time::Duration;
///
/// // Use defaults (recommended for most cases)
/// let timeouts = PulseLinkTimeouts::default();
///
/// // Custom timing for high-latency environments
/// let timeouts = PulseLinkTimeouts::builder()
///     .connection_timeout(Duration::from_secs(30))
///     .heartbeat_interval(Duration::from_secs(45))
///     .build();
///
/// // Aggressive timing for local development
/// let timeouts = PulseLinkTimeouts::fast();
/// ```
#[derive(Debug, Clone)]
pub struct PulseLinkTimeouts {
    /// Timeout for establishing the transport (TCP + TLS + handshake).
    /// Set to 0 to wait indefinitely. Default: 10 seconds
    pub connection_timeout: Duration,

    /// Interval between application-level ping frames while connected.
    /// Set to 0 to disable the heartbeat entirely.
    /// Default: 30 seconds
    pub heartbeat_interval: Duration,

    /// Maximum time to wait for a pong after sending a ping. If no pong
    /// arrives within this window the connection is considered dead and
    /// is torn down through the normal failure path.
    /// Set to 0 to disable pong timeout checking.
    /// Default: 10 seconds
    pub heartbeat_timeout: Duration,
}

impl Default for PulseLinkTimeouts {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(10),
        }
    }
}

impl PulseLinkTimeouts {
    /// Create a new builder for custom timing configuration.
    pub fn builder() -> PulseLinkTimeoutsBuilder {
        PulseLinkTimeoutsBuilder::new()
    }

    /// Timing optimized for fast local development.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(5),
        }
    }

    /// Timing optimized for high-latency or unreliable networks.
    pub fn relaxed() -> Self {
        Self {
            connection_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(60),
            heartbeat_timeout: Duration::from_secs(30),
        }
    }

    /// Check if a duration represents "no timeout" (zero or absurdly large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365)
    }
}

/// Builder for creating custom [`PulseLinkTimeouts`] configurations.
#[derive(Debug, Clone)]
pub struct PulseLinkTimeoutsBuilder {
    timeouts: PulseLinkTimeouts,
}

impl PulseLinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: PulseLinkTimeouts::default(),
        }
    }

    /// Set the transport establishment timeout. Zero waits indefinitely.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    /// Set the transport establishment timeout in seconds.
    pub fn connection_timeout_secs(self, secs: u64) -> Self {
        self.connection_timeout(Duration::from_secs(secs))
    }

    /// Set the ping interval. Zero disables the heartbeat.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.timeouts.heartbeat_interval = interval;
        self
    }

    /// Set the ping interval in seconds. Zero disables the heartbeat.
    pub fn heartbeat_interval_secs(self, secs: u64) -> Self {
        self.heartbeat_interval(Duration::from_secs(secs))
    }

    /// Set the pong timeout. Zero disables pong timeout checking.
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.heartbeat_timeout = timeout;
        self
    }

    /// Set the pong timeout in seconds. Zero disables pong timeout checking.
    pub fn heartbeat_timeout_secs(self, secs: u64) -> Self {
        self.heartbeat_timeout(Duration::from_secs(secs))
    }

    /// Build the timeout configuration.
    pub fn build(self) -> PulseLinkTimeouts {
        self.timeouts
    }
}
