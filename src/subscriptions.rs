//! Desired-channel registry.
//!
//! Tracks the set of channels the client wants to be subscribed to,
//! independent of connection state. Every member is re-issued as a
//! subscribe frame after each successful reconnect; removal while
//! connected sends an unsubscribe frame immediately and prevents
//! re-subscription on later reconnects.

use crate::auth::channel_requires_auth;
use std::collections::HashMap;

/// One desired channel membership.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Channel name.
    pub channel: String,
    /// Token fetched for the current session, if the channel needs one.
    /// Session-bound: cleared on every new connection.
    pub auth_token: Option<String>,
}

impl Subscription {
    /// Whether this channel needs a signed token to subscribe.
    pub fn requires_auth(&self) -> bool {
        channel_requires_auth(&self.channel)
    }
}

/// The desired set of channel subscriptions.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    channels: HashMap<String, Subscription>,
}

impl SubscriptionRegistry {
    /// Add a channel to the desired set. Returns `false` if it was
    /// already present (subscribe is idempotent).
    pub fn add(&mut self, channel: &str) -> bool {
        if self.channels.contains_key(channel) {
            return false;
        }
        self.channels.insert(
            channel.to_string(),
            Subscription {
                channel: channel.to_string(),
                auth_token: None,
            },
        );
        true
    }

    /// Remove a channel from the desired set. Returns `true` if it was
    /// present.
    pub fn remove(&mut self, channel: &str) -> bool {
        self.channels.remove(channel).is_some()
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    /// Snapshot of desired channel names (unordered).
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    /// Store the token fetched for a channel in the current session.
    pub fn set_token(&mut self, channel: &str, token: String) {
        if let Some(sub) = self.channels.get_mut(channel) {
            sub.auth_token = Some(token);
        }
    }

    /// Drop all session-bound tokens; called on every new connection,
    /// since tokens are scoped to a socket id and cannot be reused.
    pub fn clear_tokens(&mut self) {
        for sub in self.channels.values_mut() {
            sub.auth_token = None;
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
