//! Observable events and lifecycle callbacks for the realtime client.
//!
//! Two complementary surfaces exist:
//!
//! - A typed [`ClientEvent`] stream (`PulseLinkClient::take_events`)
//!   carrying every observable event, including application traffic.
//! - Optional [`EventHandlers`] callbacks for the common lifecycle hooks
//!   (`on_connect`, `on_disconnect`, `on_error`) plus raw send/receive
//!   debug hooks.
//!
//! Failures only ever surface through these; no handler inside the
//! connection task throws.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Reason for a close/disconnect event.
#[derive(Debug, Clone)]
pub struct DisconnectReason {
    /// Human-readable description of why the connection closed.
    pub message: String,
    /// Close code, if available (e.g. 1000 = normal, 1006 = abnormal).
    pub code: Option<u16>,
}

impl DisconnectReason {
    /// Create a new disconnect reason with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Create a new disconnect reason with a message and close code.
    pub fn with_code(message: impl Into<String>, code: u16) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code {
            write!(f, "{} (code: {})", self.message, code)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

/// Error information passed to the `on_error` handler and carried by
/// [`ClientEvent::Error`].
#[derive(Debug, Clone)]
pub struct ConnectionError {
    /// Human-readable error message.
    pub message: String,
    /// Whether this error is recoverable (i.e. auto-reconnect may succeed).
    pub recoverable: bool,
}

impl ConnectionError {
    /// Create a new connection error.
    pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            recoverable,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Typed events observable by external consumers.
///
/// Consumers distinguish "connecting" (transient), "reconnecting" (watch
/// `Connecting` after a `Close`/`Error`) and "gave up"
/// (`MaxReconnectsReached`) purely from this stream; internal counters are
/// never exposed.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A connection attempt has started.
    Connecting,
    /// The transport is open. The session id arrives slightly later with
    /// the connection-established frame and drives re-subscription.
    Open,
    /// The transport closed.
    Close { reason: DisconnectReason },
    /// A transport, heartbeat or auth failure occurred.
    Error { error: ConnectionError },
    /// Application traffic: any non-reserved frame, forwarded verbatim.
    Message {
        event: String,
        data: Value,
        channel: Option<String>,
    },
    /// A channel subscription was acknowledged by the server.
    SubscriptionSucceeded { channel: String },
    /// A pong arrived; `latency_ms` is derived from the echoed timestamp.
    Pong { latency_ms: u64 },
    /// An inbound frame could not be decoded. The connection is unaffected.
    ParseError { message: String, raw: String },
    /// A write failed; the message was re-queued for a later flush.
    SendError { message: String },
    /// Too many consecutive failures; connection attempts are suppressed
    /// until the cooldown elapses.
    CircuitBreakerOpen { reset_in_ms: u64 },
    /// The reconnect attempt budget is exhausted; manual `connect()` is
    /// required to resume.
    MaxReconnectsReached { attempts: u32 },
    /// `disconnect()` completed; auto-reconnect is disarmed.
    Disconnected,
}

/// Type alias for the on_connect callback.
pub type OnConnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Type alias for the on_disconnect callback.
pub type OnDisconnectCallback = Arc<dyn Fn(DisconnectReason) + Send + Sync>;

/// Type alias for the on_error callback.
pub type OnErrorCallback = Arc<dyn Fn(ConnectionError) + Send + Sync>;

/// Type alias for the on_receive callback (debug hook for inbound text).
pub type OnReceiveCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Type alias for the on_send callback (debug hook for outbound text).
pub type OnSendCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Connection lifecycle event handlers.
///
/// All handlers are optional. Handlers are `Send + Sync` so they work with
/// the async tokio runtime.
///
/// # Example
///
/// ```rust
/// use pulse_link::EventHandlers;
///
/// let handlers = EventHandlers::new()
///     .on_connect(|| println!("Connected!"))
///     .on_disconnect(|reason| println!("Disconnected: {}", reason))
///     .on_error(|error| eprintln!("Connection error: {}", error));
/// ```
#[derive(Clone, Default)]
pub struct EventHandlers {
    pub(crate) on_connect: Option<OnConnectCallback>,
    pub(crate) on_disconnect: Option<OnDisconnectCallback>,
    pub(crate) on_error: Option<OnErrorCallback>,
    pub(crate) on_receive: Option<OnReceiveCallback>,
    pub(crate) on_send: Option<OnSendCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_receive", &self.on_receive.is_some())
            .field("on_send", &self.on_send.is_some())
            .finish()
    }
}

impl EventHandlers {
    /// Create a new empty `EventHandlers` (no callbacks registered).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked when the connection is established.
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when the connection is closed.
    pub fn on_disconnect(mut self, f: impl Fn(DisconnectReason) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when a connection error occurs.
    pub fn on_error(mut self, f: impl Fn(ConnectionError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Register a debug hook for every raw inbound frame.
    pub fn on_receive(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_receive = Some(Arc::new(f));
        self
    }

    /// Register a debug hook for every raw outbound frame.
    pub fn on_send(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_send = Some(Arc::new(f));
        self
    }
}

/// Fans events out to the typed stream and the lifecycle callbacks.
///
/// Emission never blocks the connection task: if the consumer falls behind
/// and the stream fills up, the event is dropped and logged.
#[derive(Clone)]
pub(crate) struct EventSink {
    event_tx: mpsc::Sender<ClientEvent>,
    handlers: EventHandlers,
}

impl EventSink {
    pub(crate) fn new(event_tx: mpsc::Sender<ClientEvent>, handlers: EventHandlers) -> Self {
        Self { event_tx, handlers }
    }

    /// Emit a typed event and invoke the matching lifecycle callback.
    pub(crate) fn emit(&self, event: ClientEvent) {
        match &event {
            ClientEvent::Open => {
                if let Some(cb) = &self.handlers.on_connect {
                    cb();
                }
            },
            ClientEvent::Close { reason } => {
                if let Some(cb) = &self.handlers.on_disconnect {
                    cb(reason.clone());
                }
            },
            ClientEvent::Error { error } => {
                if let Some(cb) = &self.handlers.on_error {
                    cb(error.clone());
                }
            },
            _ => {},
        }

        if let Err(mpsc::error::TrySendError::Full(dropped)) = self.event_tx.try_send(event) {
            log::warn!("[pulse-link] Event stream full, dropping {:?}", dropped);
        }
    }

    /// Invoke the inbound debug hook.
    pub(crate) fn emit_receive(&self, raw: &str) {
        if let Some(cb) = &self.handlers.on_receive {
            cb(raw);
        }
    }

    /// Invoke the outbound debug hook.
    pub(crate) fn emit_send(&self, raw: &str) {
        if let Some(cb) = &self.handlers.on_send {
            cb(raw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_disconnect_reason_display() {
        let reason = DisconnectReason::new("server closed connection");
        assert_eq!(reason.to_string(), "server closed connection");

        let reason = DisconnectReason::with_code("abnormal close", 1006);
        assert_eq!(reason.to_string(), "abnormal close (code: 1006)");
    }

    #[tokio::test]
    async fn test_sink_fans_out_to_stream_and_callbacks() {
        let connects = Arc::new(AtomicUsize::new(0));
        let connects_cb = connects.clone();
        let handlers = EventHandlers::new().on_connect(move || {
            connects_cb.fetch_add(1, Ordering::SeqCst);
        });

        let (tx, mut rx) = mpsc::channel(8);
        let sink = EventSink::new(tx, handlers);

        sink.emit(ClientEvent::Open);
        sink.emit(ClientEvent::Connecting);

        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert!(matches!(rx.recv().await, Some(ClientEvent::Open)));
        assert!(matches!(rx.recv().await, Some(ClientEvent::Connecting)));
    }

    #[tokio::test]
    async fn test_sink_drops_when_stream_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = EventSink::new(tx, EventHandlers::new());

        sink.emit(ClientEvent::Connecting);
        sink.emit(ClientEvent::Disconnected); // dropped, stream full

        assert!(matches!(rx.recv().await, Some(ClientEvent::Connecting)));
        assert!(rx.try_recv().is_err());
    }
}
