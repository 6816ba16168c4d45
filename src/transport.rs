//! Transport abstraction and the tokio-tungstenite implementation.
//!
//! The connection task talks to an abstract [`Transport`] so tests can
//! substitute a scripted in-memory transport. The production factory
//! dials a WebSocket with tokio-tungstenite; protocol-level ping frames
//! are answered here and never surface to the connection task (the
//! application-level heartbeat is JSON text and flows through normally).

use crate::error::{PulseLinkError, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One event read from the transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// A text frame.
    Text(String),
    /// The remote closed the connection. `code` is absent for an abrupt
    /// teardown without a close frame.
    Closed { code: Option<u16>, reason: String },
    /// The transport reported an error; the connection is unusable.
    Error(String),
}

/// A live bidirectional streaming connection.
#[async_trait::async_trait]
pub trait Transport: Send {
    /// Write one text frame.
    async fn send_text(&mut self, text: &str) -> Result<()>;

    /// Read the next event. `None` means the stream ended without a close
    /// frame and is treated as an abnormal close.
    async fn recv(&mut self) -> Option<TransportEvent>;

    /// Close with a normal status code. Best-effort.
    async fn close(&mut self);
}

/// Creates transports for a URL; substitutable for testing.
#[async_trait::async_trait]
pub trait TransportFactory: Send + Sync + 'static {
    /// Open a new transport to `url`.
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>>;
}

/// Validate a realtime endpoint URL (ws/wss scheme, host present).
pub(crate) fn validate_endpoint(url: &str) -> Result<Url> {
    let parsed = Url::parse(url.trim())
        .map_err(|e| PulseLinkError::Configuration(format!("Invalid url '{}': {}", url, e)))?;

    match parsed.scheme() {
        "ws" | "wss" => {},
        other => {
            return Err(PulseLinkError::Configuration(format!(
                "url must use ws:// or wss:// (found '{}')",
                other
            )));
        },
    }

    if parsed.host_str().is_none() {
        return Err(PulseLinkError::Configuration(
            "url must include a host".to_string(),
        ));
    }

    Ok(parsed)
}

/// Production WebSocket transport factory.
#[derive(Debug, Default, Clone)]
pub struct WsTransportFactory;

impl WsTransportFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl TransportFactory for WsTransportFactory {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        validate_endpoint(url)?;
        log::debug!("[pulse-link] Dialing {}", url);
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| PulseLinkError::Transport(format!("Connection failed: {}", e)))?;
        Ok(Box::new(WsTransport { inner: stream }))
    }
}

struct WsTransport {
    inner: WsStream,
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| PulseLinkError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(TransportEvent::Text(text.to_string())),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Some(TransportEvent::Text(text)),
                    Err(_) => {
                        log::warn!("[pulse-link] Dropping non-UTF-8 binary frame");
                        continue;
                    },
                },
                Ok(Message::Ping(payload)) => {
                    // Protocol-level keepalive; answer without surfacing.
                    let _ = self.inner.send(Message::Pong(payload)).await;
                    continue;
                },
                Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Ok(Message::Close(frame)) => {
                    let (code, reason) = match frame {
                        Some(f) => (Some(u16::from(f.code)), f.reason.to_string()),
                        None => (None, "server closed connection".to_string()),
                    };
                    return Some(TransportEvent::Closed { code, reason });
                },
                Err(e) => return Some(TransportEvent::Error(e.to_string())),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.inner.close(None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_endpoint_accepts_ws_schemes() {
        assert!(validate_endpoint("ws://localhost:6001/app/key").is_ok());
        assert!(validate_endpoint("wss://ws.example.com/app/key?protocol=7").is_ok());
    }

    #[test]
    fn test_validate_endpoint_rejects_http() {
        let err = validate_endpoint("http://example.com").unwrap_err();
        assert!(matches!(err, PulseLinkError::Configuration(_)));
    }

    #[test]
    fn test_validate_endpoint_rejects_garbage() {
        assert!(validate_endpoint("not a url").is_err());
    }
}
