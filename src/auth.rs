//! Per-channel authentication for private and presence channels.
//!
//! Channels whose name starts with `private-` or `presence-` require a
//! signed token scoped to `{channel, socket_id}`. Tokens are bound to the
//! session id of the current connection, so they are re-fetched from the
//! provider after every reconnect and never cached across sessions.
//!
//! ## Custom providers
//!
//! ```rust,no_run
//! use pulse_link::ChannelAuthProvider;
//!
//! struct MySigner { /* ... */ }
//!
//! #[async_trait::async_trait]
//! impl ChannelAuthProvider for MySigner {
//!     async fn fetch_token(&self, channel: &str, socket_id: &str) -> pulse_link::Result<String> {
//!         // sign `{socket_id}:{channel}` here
//!         Ok("key:signature".into())
//!     }
//! }
//! ```

use crate::error::{PulseLinkError, Result};
use serde::Deserialize;
use std::sync::Arc;

/// Whether a channel name requires a signed subscription token.
pub fn channel_requires_auth(channel: &str) -> bool {
    channel.starts_with("private-") || channel.starts_with("presence-")
}

/// Async provider of per-channel subscription tokens.
///
/// Invoked only at subscribe time, once per `{channel, socket_id}` pair.
/// A rejection skips that channel's subscription; other channels proceed.
#[async_trait::async_trait]
pub trait ChannelAuthProvider: Send + Sync + 'static {
    /// Return a signed token authorizing `channel` for the session
    /// identified by `socket_id`.
    async fn fetch_token(&self, channel: &str, socket_id: &str) -> Result<String>;
}

/// A boxed, reference-counted [`ChannelAuthProvider`].
pub type ArcAuthProvider = Arc<dyn ChannelAuthProvider>;

/// Provider for deployments that only use public channels.
///
/// Rejects every fetch, so subscribing to a `private-`/`presence-`
/// channel surfaces an auth error event while public channels work
/// normally.
#[derive(Debug, Default, Clone)]
pub struct NullAuthProvider;

#[async_trait::async_trait]
impl ChannelAuthProvider for NullAuthProvider {
    async fn fetch_token(&self, channel: &str, _socket_id: &str) -> Result<String> {
        Err(PulseLinkError::AuthFetch {
            channel: channel.to_string(),
            message: "no auth provider configured".to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct AuthEndpointResponse {
    auth: String,
}

/// Standard HTTP channel-auth flow: POSTs `channel` and `socket_id` as a
/// form body to an auth endpoint and reads `{"auth": "<token>"}`.
///
/// # Example
///
/// ```rust,no_run
/// use pulse_link::HttpAuthProvider;
///
/// let provider = HttpAuthProvider::new("https://example.com/broadcasting/auth")
///     .with_bearer_token("session-token");
/// ```
#[derive(Debug, Clone)]
pub struct HttpAuthProvider {
    endpoint: String,
    bearer_token: Option<String>,
    http: reqwest::Client,
}

impl HttpAuthProvider {
    /// Create a provider posting to `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            bearer_token: None,
            http: reqwest::Client::new(),
        }
    }

    /// Attach a bearer token to every auth request.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}

#[async_trait::async_trait]
impl ChannelAuthProvider for HttpAuthProvider {
    async fn fetch_token(&self, channel: &str, socket_id: &str) -> Result<String> {
        log::debug!(
            "[pulse-link] Fetching auth token for channel '{}' (socket_id={})",
            channel,
            socket_id
        );

        let mut request = self
            .http
            .post(&self.endpoint)
            .form(&[("channel_name", channel), ("socket_id", socket_id)]);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| PulseLinkError::AuthFetch {
            channel: channel.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PulseLinkError::AuthFetch {
                channel: channel.to_string(),
                message: format!("auth endpoint returned {}", status),
            });
        }

        let body: AuthEndpointResponse =
            response.json().await.map_err(|e| PulseLinkError::AuthFetch {
                channel: channel.to_string(),
                message: format!("invalid auth response: {}", e),
            })?;

        Ok(body.auth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_requires_auth() {
        assert!(channel_requires_auth("private-chatroom_42"));
        assert!(channel_requires_auth("presence-lobby"));
        assert!(!channel_requires_auth("chatroom_42"));
        assert!(!channel_requires_auth("privateer")); // prefix must match exactly
    }

    #[tokio::test]
    async fn test_null_provider_rejects() {
        let provider = NullAuthProvider;
        let err = provider
            .fetch_token("private-room", "1.1")
            .await
            .unwrap_err();
        assert!(matches!(err, PulseLinkError::AuthFetch { channel, .. } if channel == "private-room"));
    }

    #[test]
    fn test_http_provider_builder() {
        let provider = HttpAuthProvider::new("https://example.com/auth").with_bearer_token("tok");
        assert_eq!(provider.endpoint, "https://example.com/auth");
        assert_eq!(provider.bearer_token.as_deref(), Some("tok"));
    }
}
