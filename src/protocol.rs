//! Wire frame codec for the Pusher-style channel protocol.
//!
//! Every frame on the wire is a JSON envelope `{"event", "data", "channel"?}`.
//! Inbound `data` is frequently double-encoded (a JSON document inside a JSON
//! string); decoding unwraps exactly one such level. Reserved events
//! (connection establishment, ping/pong, subscription acks) are consumed by
//! the connection task and never reach application consumers.

use crate::error::{PulseLinkError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Sent by the server once the session is up; `data` carries `socket_id`.
pub const EVENT_CONNECTION_ESTABLISHED: &str = "pusher:connection_established";
/// Client request to join a channel.
pub const EVENT_SUBSCRIBE: &str = "pusher:subscribe";
/// Client request to leave a channel.
pub const EVENT_UNSUBSCRIBE: &str = "pusher:unsubscribe";
/// Server acknowledgement of a successful channel subscription.
pub const EVENT_SUBSCRIPTION_SUCCEEDED: &str = "pusher_internal:subscription_succeeded";
/// Application-level liveness probe.
pub const EVENT_PING: &str = "ping";
/// Application-level liveness reply, echoing the ping's payload.
pub const EVENT_PONG: &str = "pong";

/// One discrete message exchanged over the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Event name; reserved names are listed as constants in this module.
    pub event: String,

    /// Event payload. Decoding unwraps one level of JSON-in-string.
    #[serde(default)]
    pub data: Value,

    /// Channel the event is scoped to, when the server attributes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

impl Frame {
    /// Create a frame with an event name and payload.
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
            channel: None,
        }
    }

    /// Build a subscribe frame. `auth` is empty for public channels.
    pub fn subscribe(channel: &str, auth: &str) -> Self {
        Self::new(
            EVENT_SUBSCRIBE,
            json!({ "auth": auth, "channel": channel }),
        )
    }

    /// Build an unsubscribe frame.
    pub fn unsubscribe(channel: &str) -> Self {
        Self::new(EVENT_UNSUBSCRIBE, json!({ "channel": channel }))
    }

    /// Build a ping frame carrying the current timestamp (millis).
    pub fn ping(timestamp_ms: u64) -> Self {
        Self::new(EVENT_PING, json!({ "timestamp": timestamp_ms }))
    }

    /// Build a pong frame echoing a ping's payload verbatim.
    pub fn pong(data: Value) -> Self {
        Self::new(EVENT_PONG, data)
    }

    /// Serialize the frame for the wire.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a frame from wire text.
    ///
    /// When `data` arrives as a JSON-encoded string, it is parsed one
    /// further level; a string that is not valid JSON is kept as-is.
    pub fn decode(text: &str) -> Result<Frame> {
        let mut frame: Frame = serde_json::from_str(text)
            .map_err(|e| PulseLinkError::Serialization(format!("malformed frame: {}", e)))?;

        if let Value::String(inner) = &frame.data {
            if let Ok(parsed) = serde_json::from_str::<Value>(inner) {
                frame.data = parsed;
            }
        }

        Ok(frame)
    }

    /// Extract the session id from a connection-established frame.
    pub fn socket_id(&self) -> Option<&str> {
        self.data.get("socket_id").and_then(Value::as_str)
    }

    /// Extract the timestamp (millis) from a ping/pong payload.
    pub fn timestamp_ms(&self) -> Option<u64> {
        self.data.get("timestamp").and_then(Value::as_u64)
    }

    /// Whether this event name is reserved for the protocol layer.
    pub fn is_reserved(&self) -> bool {
        matches!(
            self.event.as_str(),
            EVENT_CONNECTION_ESTABLISHED
                | EVENT_SUBSCRIPTION_SUCCEEDED
                | EVENT_PING
                | EVENT_PONG
        )
    }
}
