//! Error types for pulse-link.

use std::time::Duration;
use thiserror::Error;

/// Result type for pulse-link operations
pub type Result<T> = std::result::Result<T, PulseLinkError>;

/// Errors that can occur while talking to a realtime channel service.
///
/// Most failures never surface through this type: transport errors,
/// abnormal closes, heartbeat timeouts, parse failures and send failures
/// are reported as [`ClientEvent`](crate::ClientEvent)s so that a single
/// bad frame or flaky socket cannot poison unrelated callers. The only
/// async call that legitimately returns an error is `connect()`, and only
/// for failures of that specific attempt.
#[derive(Error, Debug)]
pub enum PulseLinkError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Circuit breaker open; next attempt allowed in {retry_in_ms}ms")]
    CircuitBreakerOpen { retry_in_ms: u64 },

    #[error("Auth fetch failed for channel '{channel}': {message}")]
    AuthFetch { channel: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Client task is not running")]
    ClientClosed,
}

impl From<serde_json::Error> for PulseLinkError {
    fn from(err: serde_json::Error) -> Self {
        PulseLinkError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for PulseLinkError {
    fn from(err: reqwest::Error) -> Self {
        PulseLinkError::Transport(err.to_string())
    }
}
