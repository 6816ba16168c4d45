//! Heartbeat bookkeeping for liveness detection.
//!
//! While connected, the connection task sends a ping every
//! `heartbeat_interval` and arms a pong deadline. A transport can remain
//! technically open while the remote stops responding, so an unanswered
//! ping is treated as a connection failure through the same path as a
//! transport error. The deadline math lives here; the timer arms live in
//! the connection task's select loop.

use std::time::Duration;
use tokio::time::Instant;

/// Far enough into the future to be effectively "never" without
/// overflowing `Instant + Duration`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Ping/pong state for one connection.
#[derive(Debug)]
pub struct HeartbeatState {
    interval: Duration,
    timeout: Duration,
    last_ping_sent_at: Option<Instant>,
    last_pong_received_at: Option<Instant>,
    awaiting_pong: bool,
    next_ping_at: Instant,
}

impl HeartbeatState {
    /// Create heartbeat state. A zero `interval` disables pings entirely;
    /// a zero `timeout` disables the pong deadline.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            last_ping_sent_at: None,
            last_pong_received_at: None,
            awaiting_pong: false,
            next_ping_at: Instant::now() + FAR_FUTURE,
        }
    }

    /// Whether pings are enabled at all.
    pub fn enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Whether an unanswered ping should fail the connection.
    pub fn timeout_enabled(&self) -> bool {
        self.enabled() && !self.timeout.is_zero()
    }

    /// Re-arm for a fresh connection.
    pub fn reset(&mut self, now: Instant) {
        self.last_ping_sent_at = None;
        self.last_pong_received_at = None;
        self.awaiting_pong = false;
        self.next_ping_at = if self.enabled() {
            now + self.interval
        } else {
            now + FAR_FUTURE
        };
    }

    /// When the next ping is due.
    pub fn next_ping_at(&self) -> Instant {
        self.next_ping_at
    }

    /// Deadline for the currently outstanding ping, if any.
    pub fn pong_deadline(&self) -> Instant {
        match (self.awaiting_pong, self.last_ping_sent_at) {
            (true, Some(sent)) if self.timeout_enabled() => sent + self.timeout,
            _ => Instant::now() + FAR_FUTURE,
        }
    }

    /// Record that a ping was written; arms the pong deadline and
    /// schedules the next ping.
    pub fn record_ping(&mut self, now: Instant) {
        self.last_ping_sent_at = Some(now);
        self.awaiting_pong = self.timeout_enabled();
        self.next_ping_at = now + self.interval;
    }

    /// Record an inbound pong; clears the outstanding deadline.
    pub fn record_pong(&mut self, now: Instant) {
        self.last_pong_received_at = Some(now);
        self.awaiting_pong = false;
    }

    /// Whether a pong is outstanding.
    pub fn awaiting_pong(&self) -> bool {
        self.awaiting_pong
    }

    /// Whether the outstanding ping has gone unanswered past the timeout.
    pub fn is_expired(&self, now: Instant) -> bool {
        match (self.awaiting_pong, self.last_ping_sent_at) {
            (true, Some(sent)) if self.timeout_enabled() => now >= sent + self.timeout,
            _ => false,
        }
    }
}

/// Latency sample from an echoed ping timestamp (both in unix millis).
pub fn latency_from_echo(sent_ms: u64, now_ms: u64) -> u64 {
    now_ms.saturating_sub(sent_ms)
}
