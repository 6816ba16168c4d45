//! Public client handle.
//!
//! [`PulseLinkClient`] is a cheap-to-clone handle over a background task
//! that owns the transport and all connection state. Every method is a
//! command sent over a channel; `connect()` and `disconnect()` wait for
//! the task's acknowledgement, everything else is fire-and-forget.

use crate::{
    auth::{ArcAuthProvider, ChannelAuthProvider, NullAuthProvider},
    connection::{connection_task, ConnCmd, TaskContext},
    error::{PulseLinkError, Result},
    events::{ClientEvent, EventHandlers, EventSink},
    options::ConnectionOptions,
    timeouts::PulseLinkTimeouts,
    transport::{validate_endpoint, TransportFactory, WsTransportFactory},
};
use serde_json::Value;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::{mpsc, oneshot, Mutex};

/// Command channel depth between the handle and the background task.
const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Event stream depth; events are dropped (with a warning) past this.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A resilient realtime connection client.
///
/// Maintains a single logical connection that survives transport
/// failures: automatic reconnection with exponential backoff, a circuit
/// breaker over consecutive failures, heartbeat liveness checks, an
/// outbound queue for messages sent while offline, and channel
/// subscriptions that are re-established (with fresh auth) after every
/// reconnect.
///
/// ```no_run
/// # async fn run() -> pulse_link::Result<()> {
/// let client = pulse_link::PulseLinkClient::builder("wss://realtime.example.com/app/key")
///     .build()?;
/// client.connect().await?;
/// client.subscribe("orders");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PulseLinkClient {
    cmd_tx: mpsc::Sender<ConnCmd>,
    connected: Arc<AtomicBool>,
    events: Arc<Mutex<Option<mpsc::Receiver<ClientEvent>>>>,
}

impl PulseLinkClient {
    /// Start building a client for the given `ws://` or `wss://` endpoint.
    pub fn builder(url: impl Into<String>) -> PulseLinkClientBuilder {
        PulseLinkClientBuilder::new(url)
    }

    /// Open the connection.
    ///
    /// Resolves once the transport is open, or with an error on timeout,
    /// immediate failure, or an open circuit breaker
    /// ([`PulseLinkError::CircuitBreakerOpen`]). A no-op when already
    /// connected. Also re-arms auto-reconnect after a prior
    /// [`disconnect`](Self::disconnect).
    pub async fn connect(&self) -> Result<()> {
        let (result_tx, result_rx) = oneshot::channel();
        self.send_cmd(ConnCmd::Connect { result_tx }).await?;
        result_rx.await.map_err(|_| PulseLinkError::ClientClosed)?
    }

    /// Close the connection with a normal code and disarm auto-reconnect.
    ///
    /// Pending reconnect timers are cancelled and the outbound queue is
    /// dropped. Subscriptions are kept and re-established on the next
    /// explicit [`connect`](Self::connect).
    pub async fn disconnect(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send_cmd(ConnCmd::Disconnect { done_tx }).await?;
        done_rx.await.map_err(|_| PulseLinkError::ClientClosed)
    }

    /// Send an application event.
    ///
    /// Delivered immediately when connected; otherwise buffered (bounded,
    /// oldest dropped first) and flushed in order on the next connect.
    pub async fn send(&self, event: impl Into<String>, data: Value) -> Result<()> {
        self.send_cmd(ConnCmd::Send {
            event: event.into(),
            data,
        })
        .await
    }

    /// Add a channel to the desired subscription set.
    ///
    /// Subscribed now if a session is established, and automatically
    /// after every future reconnect. `private-` and `presence-` channels
    /// get a fresh auth token (scoped to the session id) each time.
    pub fn subscribe(&self, channel: impl Into<String>) {
        self.send_cmd_sync(ConnCmd::Subscribe {
            channel: channel.into(),
        });
    }

    /// Remove a channel from the desired set and unsubscribe if connected.
    pub fn unsubscribe(&self, channel: impl Into<String>) {
        self.send_cmd_sync(ConnCmd::Unsubscribe {
            channel: channel.into(),
        });
    }

    /// Whether a transport is currently open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Take the event stream. Returns `None` after the first call; only
    /// one consumer can own the receiver.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<ClientEvent>> {
        self.events.lock().await.take()
    }

    async fn send_cmd(&self, cmd: ConnCmd) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| PulseLinkError::ClientClosed)
    }

    fn send_cmd_sync(&self, cmd: ConnCmd) {
        if self.cmd_tx.try_send(cmd).is_err() {
            log::warn!("[pulse-link] Command dropped: connection task unavailable");
        }
    }
}

impl std::fmt::Debug for PulseLinkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PulseLinkClient")
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Builder for [`PulseLinkClient`].
pub struct PulseLinkClientBuilder {
    url: String,
    options: ConnectionOptions,
    timeouts: PulseLinkTimeouts,
    handlers: EventHandlers,
    auth: Option<ArcAuthProvider>,
    factory: Option<Arc<dyn TransportFactory>>,
}

impl PulseLinkClientBuilder {
    fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            options: ConnectionOptions::default(),
            timeouts: PulseLinkTimeouts::default(),
            handlers: EventHandlers::default(),
            auth: None,
            factory: None,
        }
    }

    /// Reconnection, breaker and queue tuning.
    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Connection and heartbeat timeouts.
    pub fn timeouts(mut self, timeouts: PulseLinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Callback hooks invoked alongside the event stream.
    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    /// Auth token source for `private-`/`presence-` channels.
    pub fn auth_provider(mut self, provider: impl ChannelAuthProvider + 'static) -> Self {
        self.auth = Some(Arc::new(provider));
        self
    }

    /// Replace the transport layer; used by tests.
    pub fn transport_factory(mut self, factory: impl TransportFactory + 'static) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Validate the endpoint and spawn the background connection task.
    ///
    /// Must be called from within a tokio runtime. The task exits when
    /// the last client handle is dropped.
    pub fn build(self) -> Result<PulseLinkClient> {
        validate_endpoint(&self.url)?;

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));

        let ctx = TaskContext {
            url: self.url,
            options: self.options,
            timeouts: self.timeouts,
            factory: self
                .factory
                .unwrap_or_else(|| Arc::new(WsTransportFactory::default())),
            auth: self.auth.unwrap_or_else(|| Arc::new(NullAuthProvider)),
            sink: EventSink::new(event_tx, self.handlers),
            connected: Arc::clone(&connected),
        };

        tokio::spawn(connection_task(cmd_rx, ctx));

        Ok(PulseLinkClient {
            cmd_tx,
            connected,
            events: Arc::new(Mutex::new(Some(event_rx))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_rejects_invalid_url() {
        let err = PulseLinkClient::builder("http://example.com")
            .build()
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        assert!(err.contains("ws"), "unexpected error: {}", err);
    }

    #[tokio::test]
    async fn take_events_yields_once() {
        let client = PulseLinkClient::builder("ws://localhost:1234/app/key")
            .build()
            .unwrap();
        assert!(client.take_events().await.is_some());
        assert!(client.take_events().await.is_none());
    }

    #[tokio::test]
    async fn starts_disconnected() {
        let client = PulseLinkClient::builder("ws://localhost:1234/app/key")
            .build()
            .unwrap();
        assert!(!client.is_connected());
    }
}
