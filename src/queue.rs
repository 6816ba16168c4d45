//! Bounded outbound buffer for sends issued while disconnected.
//!
//! This is a best-effort buffer, not a durable outbox: when full, the
//! oldest entry is dropped to make room (control-plane freshness matters
//! more than any individual buffered send), and a message that keeps
//! failing to flush is dropped once it exceeds its retry cap.

use std::collections::VecDeque;
use tokio::time::Instant;

/// One buffered outbound message.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    /// Serialized frame text, ready to write.
    pub payload: String,
    /// When the message entered the queue.
    pub enqueued_at: Instant,
    /// Failed flush attempts so far.
    pub retries: u32,
}

/// Bounded FIFO buffer with drop-oldest overflow and per-message retries.
#[derive(Debug)]
pub struct OutboundQueue {
    entries: VecDeque<QueuedMessage>,
    max_size: usize,
    max_retries: u32,
}

impl OutboundQueue {
    /// Create a queue holding at most `max_size` messages, each retried at
    /// most `max_retries` times on flush failure.
    pub fn new(max_size: usize, max_retries: u32) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_size.min(64)),
            max_size,
            max_retries,
        }
    }

    /// Append a message. When the queue is full the oldest entry is
    /// dropped first; returns the dropped payload in that case.
    pub fn push(&mut self, payload: String) -> Option<String> {
        let dropped = if self.entries.len() >= self.max_size {
            self.entries.pop_front().map(|m| m.payload)
        } else {
            None
        };
        self.entries.push_back(QueuedMessage {
            payload,
            enqueued_at: Instant::now(),
            retries: 0,
        });
        dropped
    }

    /// Take the oldest message for flushing.
    pub fn pop_front(&mut self) -> Option<QueuedMessage> {
        self.entries.pop_front()
    }

    /// Return a message whose flush failed. Increments its retry count and
    /// puts it back at the front to preserve order; returns `false` when
    /// the retry cap is exceeded and the message is dropped instead.
    pub fn requeue_front(&mut self, mut message: QueuedMessage) -> bool {
        message.retries += 1;
        if message.retries > self.max_retries {
            return false;
        }
        self.entries.push_front(message);
        true
    }

    /// Discard everything (used by `disconnect()`).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
