//! # pulse-link
//!
//! A resilient realtime connection client: one logical connection that
//! survives transport failures.
//!
//! The client maintains a WebSocket to a Pusher-style realtime endpoint
//! and layers reliability on top:
//!
//! - **Automatic reconnection** with exponential backoff and an optional
//!   attempt budget
//! - **Circuit breaker**: after too many consecutive failures, connection
//!   attempts are suppressed for a cooldown period
//! - **Heartbeat liveness**: application-level ping/pong with timestamps;
//!   a missed pong tears the connection down and triggers a reconnect
//! - **Outbound buffering**: messages sent while offline are queued
//!   (bounded, oldest dropped first) and flushed in order on reconnect
//! - **Durable subscriptions**: channels are re-subscribed after every
//!   reconnect, with fresh auth tokens for `private-`/`presence-`
//!   channels scoped to the new session id
//!
//! ## Quick start
//!
//! ```no_run
//! use pulse_link::{ClientEvent, PulseLinkClient};
//!
//! #[tokio::main]
//! async fn main() -> pulse_link::Result<()> {
//!     let client = PulseLinkClient::builder("wss://realtime.example.com/app/key").build()?;
//!     let mut events = client.take_events().await.ok_or(pulse_link::PulseLinkError::ClientClosed)?;
//!
//!     client.connect().await?;
//!     client.subscribe("orders");
//!
//!     while let Some(event) = events.recv().await {
//!         if let ClientEvent::Message { event, data, .. } = event {
//!             println!("{}: {}", event, data);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Private channels need a [`ChannelAuthProvider`]; [`HttpAuthProvider`]
//! covers the common HTTP-endpoint case.

pub mod auth;
pub mod breaker;
pub mod client;
mod connection;
pub mod error;
pub mod events;
pub mod heartbeat;
pub mod options;
pub mod protocol;
pub mod queue;
pub mod reconnect;
pub mod subscriptions;
pub mod timeouts;
pub mod transport;

pub use auth::{channel_requires_auth, ArcAuthProvider, ChannelAuthProvider, HttpAuthProvider};
pub use client::{PulseLinkClient, PulseLinkClientBuilder};
pub use error::{PulseLinkError, Result};
pub use events::{ClientEvent, ConnectionError, DisconnectReason, EventHandlers};
pub use options::ConnectionOptions;
pub use protocol::Frame;
pub use timeouts::PulseLinkTimeouts;
pub use transport::{Transport, TransportEvent, TransportFactory, WsTransportFactory};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
