//! Shared test harness: a scripted in-memory transport.
//!
//! `MockFactory` hands out `MockTransport`s backed by channels. Tests
//! inject inbound frames and failures through the per-connection
//! `MockConn` handle and assert on the frames the client wrote.

#![allow(dead_code)]

use async_trait::async_trait;
use pulse_link::{
    ClientEvent, ConnectionOptions, PulseLinkError, PulseLinkTimeouts, Result, Transport,
    TransportEvent, TransportFactory,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Handle to one accepted mock connection.
pub struct MockConn {
    inbound: mpsc::UnboundedSender<TransportEvent>,
    sent: Arc<Mutex<Vec<String>>>,
    write_fail: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl MockConn {
    /// Inject an inbound text frame.
    pub fn inject_text(&self, text: impl Into<String>) {
        let _ = self.inbound.send(TransportEvent::Text(text.into()));
    }

    /// Inject a remote close.
    pub fn inject_close(&self, code: u16, reason: &str) {
        let _ = self.inbound.send(TransportEvent::Closed {
            code: Some(code),
            reason: reason.to_string(),
        });
    }

    /// Inject a transport error.
    pub fn inject_error(&self, message: &str) {
        let _ = self
            .inbound
            .send(TransportEvent::Error(message.to_string()));
    }

    /// Inject a connection-established frame carrying `socket_id`,
    /// with the data payload double-encoded as the wire format requires.
    pub fn establish(&self, socket_id: &str) {
        let data = json!({ "socket_id": socket_id }).to_string();
        self.inject_text(
            json!({ "event": "pusher:connection_established", "data": data }).to_string(),
        );
    }

    /// Everything written to this connection so far.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Sent frames whose `event` field equals `event`.
    pub fn sent_with_event(&self, event: &str) -> Vec<serde_json::Value> {
        self.sent()
            .iter()
            .filter_map(|text| serde_json::from_str::<serde_json::Value>(text).ok())
            .filter(|v| v.get("event").and_then(|e| e.as_str()) == Some(event))
            .collect()
    }

    /// Make subsequent writes fail.
    pub fn fail_writes(&self, fail: bool) {
        self.write_fail.store(fail, Ordering::SeqCst);
    }

    /// Whether the client closed this connection.
    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Poll until `pred` holds over the sent frames.
    pub async fn wait_for_sent(&self, pred: impl Fn(&[String]) -> bool, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if pred(&self.sent()) {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("timed out waiting for sent frames; got {:?}", self.sent());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

struct MockTransport {
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    sent: Arc<Mutex<Vec<String>>>,
    write_fail: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        if self.write_fail.load(Ordering::SeqCst) {
            return Err(PulseLinkError::Transport("scripted write failure".into()));
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        self.inbound.recv().await
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Factory that records every connection and can be scripted to fail or
/// hang upcoming dial attempts.
#[derive(Clone, Default)]
pub struct MockFactory {
    conns: Arc<Mutex<Vec<Arc<MockConn>>>>,
    connects: Arc<AtomicUsize>,
    fail_next: Arc<AtomicUsize>,
    hang_next: Arc<AtomicUsize>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` dial attempts.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Hang the next `n` dial attempts (for timeout tests).
    pub fn hang_next(&self, n: usize) {
        self.hang_next.store(n, Ordering::SeqCst);
    }

    /// Number of dial attempts that reached the factory (including
    /// scripted failures, excluding breaker-suppressed attempts).
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Handle to the `i`-th accepted connection (0-based).
    pub fn conn(&self, i: usize) -> Arc<MockConn> {
        Arc::clone(&self.conns.lock().unwrap()[i])
    }

    /// Poll until at least `n` connections were accepted.
    pub async fn wait_for_conns(&self, n: usize, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.conns.lock().unwrap().len() >= n {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "timed out waiting for {} connections (got {})",
                    n,
                    self.conns.lock().unwrap().len()
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl TransportFactory for MockFactory {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>> {
        if self
            .hang_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            self.connects.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("hung connect should be cancelled by the timeout");
        }

        self.connects.fetch_add(1, Ordering::SeqCst);

        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PulseLinkError::Transport("scripted dial failure".into()));
        }

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let write_fail = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));

        self.conns.lock().unwrap().push(Arc::new(MockConn {
            inbound: inbound_tx,
            sent: Arc::clone(&sent),
            write_fail: Arc::clone(&write_fail),
            closed: Arc::clone(&closed),
        }));

        Ok(Box::new(MockTransport {
            inbound: inbound_rx,
            sent,
            write_fail,
            closed,
        }))
    }
}

/// Initialize logging once per test binary; `RUST_LOG` controls output.
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Options tuned for fast test runs: 10ms base reconnect delay.
pub fn fast_options() -> ConnectionOptions {
    init_test_logging();
    ConnectionOptions::new()
        .with_reconnect_delay_ms(10)
        .with_max_reconnect_delay_ms(50)
        .with_breaker_cooldown_ms(200)
        .with_max_consecutive_errors(100)
}

/// Timeouts that keep the heartbeat out of the way unless a test wants it.
pub fn quiet_timeouts() -> PulseLinkTimeouts {
    PulseLinkTimeouts::builder()
        .connection_timeout(Duration::from_secs(5))
        .heartbeat_interval(Duration::from_secs(60))
        .heartbeat_timeout(Duration::from_secs(60))
        .build()
}

/// Receive events until `pred` matches one, with a deadline.
pub async fn wait_for_event(
    rx: &mut mpsc::Receiver<ClientEvent>,
    timeout: Duration,
    pred: impl Fn(&ClientEvent) -> bool,
) -> ClientEvent {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Some(event)) if pred(&event) => return event,
            Ok(Some(_)) => continue,
            Ok(None) => panic!("event stream closed while waiting"),
            Err(_) => panic!("timed out waiting for event"),
        }
    }
}

/// Drain whatever events are immediately available.
pub fn drain_events(rx: &mut mpsc::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
