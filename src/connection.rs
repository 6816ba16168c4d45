//! Background connection task: owns the transport and all timers.
//!
//! The public [`PulseLinkClient`](crate::PulseLinkClient) sends commands
//! over an mpsc channel; this task is the only owner of the transport
//! handle, the heartbeat deadlines, the outbound queue, the circuit
//! breaker and the reconnect schedule. Because commands and transport
//! events are handled to completion one at a time, state transitions are
//! atomic relative to each other without locks, and no timer can outlive
//! the state that armed it.
//!
//! Lifecycle:
//! 1. `Connect` opens a transport (gated by the circuit breaker) and
//!    resolves the caller's future on open
//! 2. The select loop multiplexes transport reads, commands, the ping
//!    tick and the pong deadline
//! 3. On close/error/heartbeat-timeout: tear down, record the failure,
//!    schedule a reconnect with exponential backoff
//! 4. On each established session: fetch fresh per-channel auth and
//!    re-subscribe every desired channel

use crate::{
    auth::{channel_requires_auth, ArcAuthProvider},
    breaker::CircuitBreaker,
    error::{PulseLinkError, Result},
    events::{ClientEvent, ConnectionError, DisconnectReason, EventSink},
    heartbeat::{latency_from_echo, HeartbeatState},
    options::ConnectionOptions,
    protocol::{
        Frame, EVENT_CONNECTION_ESTABLISHED, EVENT_PING, EVENT_PONG,
        EVENT_SUBSCRIPTION_SUCCEEDED,
    },
    queue::OutboundQueue,
    reconnect::ReconnectSchedule,
    subscriptions::SubscriptionRegistry,
    timeouts::PulseLinkTimeouts,
    transport::{Transport, TransportEvent, TransportFactory},
};
use serde_json::Value;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Maximum sleep duration that won't overflow `Instant + Duration`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Normal close status code.
const CLOSE_NORMAL: u16 = 1000;

/// Current time in millis since Unix epoch.
fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ── Commands ────────────────────────────────────────────────────────────────

/// Commands sent from the public API to the background connection task.
pub(crate) enum ConnCmd {
    /// Open the connection. Resolves on transport open, rejects on
    /// timeout, immediate failure or an open circuit breaker. A no-op
    /// (immediate Ok) when already connected.
    Connect {
        result_tx: oneshot::Sender<Result<()>>,
    },
    /// Close with a normal code, disarm auto-reconnect, drain the queue.
    Disconnect { done_tx: oneshot::Sender<()> },
    /// Send an application frame; buffered while disconnected.
    Send { event: String, data: Value },
    /// Add a channel to the desired set.
    Subscribe { channel: String },
    /// Remove a channel from the desired set.
    Unsubscribe { channel: String },
}

/// Everything the task needs, fixed at construction.
pub(crate) struct TaskContext {
    pub url: String,
    pub options: ConnectionOptions,
    pub timeouts: PulseLinkTimeouts,
    pub factory: Arc<dyn TransportFactory>,
    pub auth: ArcAuthProvider,
    pub sink: EventSink,
    /// Mirror of the connected state for cheap `is_connected()` reads.
    pub connected: Arc<AtomicBool>,
}

/// The one live connection, when there is one.
struct Session {
    transport: Box<dyn Transport>,
    /// Session id from the connection-established frame; subscribes wait
    /// for it because auth tokens are scoped to it.
    socket_id: Option<String>,
}

// ── Background connection task ──────────────────────────────────────────────

pub(crate) async fn connection_task(mut cmd_rx: mpsc::Receiver<ConnCmd>, ctx: TaskContext) {
    let mut registry = SubscriptionRegistry::default();
    let mut queue = OutboundQueue::new(ctx.options.max_queue_size, ctx.options.max_message_retries);
    let mut breaker = CircuitBreaker::new(
        ctx.options.max_consecutive_errors,
        Duration::from_millis(ctx.options.breaker_cooldown_ms),
    );
    let mut schedule = ReconnectSchedule::from_options(&ctx.options);
    let mut heartbeat = HeartbeatState::new(
        ctx.timeouts.heartbeat_interval,
        ctx.timeouts.heartbeat_timeout,
    );
    let mut session: Option<Session> = None;
    // Deadline of the next scheduled reconnect attempt, if any.
    let mut retry_at: Option<Instant> = None;
    // Cleared by `Disconnect`; a later explicit `Connect` re-arms it.
    let mut reconnect_armed = false;

    loop {
        if let Some(sess) = session.as_mut() {
            let ping_sleep = tokio::time::sleep_until(heartbeat.next_ping_at());
            tokio::pin!(ping_sleep);
            let pong_sleep = tokio::time::sleep_until(heartbeat.pong_deadline());
            tokio::pin!(pong_sleep);

            tokio::select! {
                biased;

                // Pong deadline: the last ping went unanswered.
                _ = &mut pong_sleep, if heartbeat.awaiting_pong() => {
                    log::warn!(
                        "[pulse-link] Heartbeat timeout ({:?}): no pong, treating connection as dead",
                        ctx.timeouts.heartbeat_timeout,
                    );
                    ctx.sink.emit(ClientEvent::Error {
                        error: ConnectionError::new(
                            format!("Heartbeat timeout ({:?})", ctx.timeouts.heartbeat_timeout),
                            true,
                        ),
                    });
                    ctx.sink.emit(ClientEvent::Close {
                        reason: DisconnectReason::new("heartbeat timeout"),
                    });
                    ctx.connected.store(false, Ordering::SeqCst);
                    session = None;
                    retry_at = schedule_retry(&ctx, &mut breaker, &mut schedule, reconnect_armed, true);
                }

                // Commands from the public API.
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(ConnCmd::Connect { result_tx }) => {
                            // Already connected: no-op by design.
                            reconnect_armed = true;
                            let _ = result_tx.send(Ok(()));
                        },
                        Some(ConnCmd::Disconnect { done_tx }) => {
                            reconnect_armed = false;
                            retry_at = None;
                            queue.clear();
                            sess.transport.close().await;
                            session = None;
                            ctx.connected.store(false, Ordering::SeqCst);
                            log::info!("[pulse-link] Disconnected (code {})", CLOSE_NORMAL);
                            ctx.sink.emit(ClientEvent::Disconnected);
                            let _ = done_tx.send(());
                        },
                        Some(ConnCmd::Send { event, data }) => {
                            match Frame::new(event, data).encode() {
                                Ok(text) => match sess.transport.send_text(&text).await {
                                    Ok(()) => ctx.sink.emit_send(&text),
                                    Err(e) => {
                                        // Write failure falls back to the enqueue path;
                                        // never surfaced to the caller.
                                        ctx.sink.emit(ClientEvent::SendError {
                                            message: e.to_string(),
                                        });
                                        if queue.push(text).is_some() {
                                            log::warn!("[pulse-link] Outbound queue full, dropped oldest message");
                                        }
                                    },
                                },
                                Err(e) => log::error!("[pulse-link] Failed to encode frame: {}", e),
                            }
                        },
                        Some(ConnCmd::Subscribe { channel }) => {
                            if registry.add(&channel) {
                                // Sent now only once the session id is known;
                                // otherwise the established handler covers it.
                                if let Some(sid) = sess.socket_id.clone() {
                                    subscribe_channel(
                                        sess.transport.as_mut(),
                                        &mut registry,
                                        &ctx,
                                        &channel,
                                        &sid,
                                    )
                                    .await;
                                }
                            }
                        },
                        Some(ConnCmd::Unsubscribe { channel }) => {
                            if registry.remove(&channel) {
                                send_frame(sess.transport.as_mut(), &Frame::unsubscribe(&channel), &ctx.sink)
                                    .await;
                            }
                        },
                        None => {
                            // All client handles dropped.
                            sess.transport.close().await;
                            ctx.connected.store(false, Ordering::SeqCst);
                            return;
                        },
                    }
                }

                // Ping tick.
                _ = &mut ping_sleep, if heartbeat.enabled() && !heartbeat.awaiting_pong() => {
                    let ping = Frame::ping(now_unix_ms());
                    let sent = match ping.encode() {
                        Ok(text) => match sess.transport.send_text(&text).await {
                            Ok(()) => {
                                ctx.sink.emit_send(&text);
                                true
                            },
                            Err(e) => {
                                log::warn!("[pulse-link] Failed to send ping: {}", e);
                                ctx.sink.emit(ClientEvent::Error {
                                    error: ConnectionError::new(format!("Ping failed: {}", e), true),
                                });
                                false
                            },
                        },
                        Err(e) => {
                            log::error!("[pulse-link] Failed to encode ping: {}", e);
                            true // do not tear down over a codec bug
                        },
                    };
                    if sent {
                        heartbeat.record_ping(Instant::now());
                    } else {
                        ctx.sink.emit(ClientEvent::Close {
                            reason: DisconnectReason::new("ping write failed"),
                        });
                        ctx.connected.store(false, Ordering::SeqCst);
                        session = None;
                        retry_at = schedule_retry(&ctx, &mut breaker, &mut schedule, reconnect_armed, true);
                    }
                }

                // Transport events.
                ev = sess.transport.recv() => {
                    match ev {
                        Some(TransportEvent::Text(text)) => {
                            ctx.sink.emit_receive(&text);
                            handle_frame(sess, &mut registry, &mut heartbeat, &ctx, text).await;
                        },
                        Some(TransportEvent::Closed { code, reason }) => {
                            let clean = code == Some(CLOSE_NORMAL);
                            log::info!(
                                "[pulse-link] Connection closed by remote (code={:?}): {}",
                                code, reason,
                            );
                            ctx.sink.emit(ClientEvent::Close {
                                reason: match code {
                                    Some(c) => DisconnectReason::with_code(reason, c),
                                    None => DisconnectReason::new(reason),
                                },
                            });
                            ctx.connected.store(false, Ordering::SeqCst);
                            session = None;
                            // A clean remote close still reconnects (the
                            // subscription must stay alive) but is not a
                            // failure for the breaker.
                            retry_at = schedule_retry(&ctx, &mut breaker, &mut schedule, reconnect_armed, !clean);
                        },
                        Some(TransportEvent::Error(message)) => {
                            log::warn!("[pulse-link] Transport error: {}", message);
                            ctx.sink.emit(ClientEvent::Error {
                                error: ConnectionError::new(message.clone(), true),
                            });
                            ctx.sink.emit(ClientEvent::Close {
                                reason: DisconnectReason::new(format!("transport error: {}", message)),
                            });
                            ctx.connected.store(false, Ordering::SeqCst);
                            session = None;
                            retry_at = schedule_retry(&ctx, &mut breaker, &mut schedule, reconnect_armed, true);
                        },
                        None => {
                            ctx.sink.emit(ClientEvent::Close {
                                reason: DisconnectReason::new("stream ended"),
                            });
                            ctx.connected.store(false, Ordering::SeqCst);
                            session = None;
                            retry_at = schedule_retry(&ctx, &mut breaker, &mut schedule, reconnect_armed, true);
                        },
                    }
                }
            }
        } else {
            // ── Disconnected: wait for commands or the scheduled retry ──
            let retry_sleep = tokio::time::sleep_until(
                retry_at.unwrap_or_else(|| Instant::now() + FAR_FUTURE),
            );
            tokio::pin!(retry_sleep);

            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(ConnCmd::Connect { result_tx }) => {
                            reconnect_armed = true;
                            match try_connect(&ctx, &mut breaker).await {
                                Ok(transport) => {
                                    retry_at = None;
                                    session = Some(open_session(
                                        transport,
                                        &ctx,
                                        &mut breaker,
                                        &mut schedule,
                                        &mut heartbeat,
                                        &mut registry,
                                        &mut queue,
                                    ).await);
                                    let _ = result_tx.send(Ok(()));
                                },
                                Err(e) => {
                                    let counts = !matches!(e, PulseLinkError::CircuitBreakerOpen { .. });
                                    if counts {
                                        ctx.sink.emit(ClientEvent::Error {
                                            error: ConnectionError::new(e.to_string(), true),
                                        });
                                    }
                                    retry_at = schedule_retry(&ctx, &mut breaker, &mut schedule, reconnect_armed, counts);
                                    let _ = result_tx.send(Err(e));
                                },
                            }
                        },
                        Some(ConnCmd::Disconnect { done_tx }) => {
                            reconnect_armed = false;
                            retry_at = None;
                            queue.clear();
                            ctx.sink.emit(ClientEvent::Disconnected);
                            let _ = done_tx.send(());
                        },
                        Some(ConnCmd::Send { event, data }) => {
                            match Frame::new(event, data).encode() {
                                Ok(text) => {
                                    if queue.push(text).is_some() {
                                        log::warn!("[pulse-link] Outbound queue full, dropped oldest message");
                                    }
                                },
                                Err(e) => log::error!("[pulse-link] Failed to encode frame: {}", e),
                            }
                        },
                        Some(ConnCmd::Subscribe { channel }) => {
                            // Subscribed automatically on the next connect.
                            registry.add(&channel);
                        },
                        Some(ConnCmd::Unsubscribe { channel }) => {
                            registry.remove(&channel);
                        },
                        None => return,
                    }
                }

                // Scheduled reconnect attempt.
                _ = &mut retry_sleep, if retry_at.is_some() => {
                    retry_at = None;
                    match try_connect(&ctx, &mut breaker).await {
                        Ok(transport) => {
                            log::info!("[pulse-link] Reconnection successful");
                            session = Some(open_session(
                                transport,
                                &ctx,
                                &mut breaker,
                                &mut schedule,
                                &mut heartbeat,
                                &mut registry,
                                &mut queue,
                            ).await);
                        },
                        Err(e) => {
                            let counts = !matches!(e, PulseLinkError::CircuitBreakerOpen { .. });
                            log::warn!(
                                "[pulse-link] Reconnection attempt {} failed: {}",
                                schedule.attempts(), e,
                            );
                            if counts {
                                ctx.sink.emit(ClientEvent::Error {
                                    error: ConnectionError::new(e.to_string(), true),
                                });
                            }
                            retry_at = schedule_retry(&ctx, &mut breaker, &mut schedule, reconnect_armed, counts);
                        },
                    }
                }
            }
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// One connection attempt: breaker guard, then the factory with the
/// configured timeout. Emits `Connecting` only when actually dialing.
async fn try_connect(ctx: &TaskContext, breaker: &mut CircuitBreaker) -> Result<Box<dyn Transport>> {
    if let Some(remaining) = breaker.blocked_for(Instant::now()) {
        log::debug!(
            "[pulse-link] Circuit breaker open, rejecting connect ({:?} remaining)",
            remaining,
        );
        return Err(PulseLinkError::CircuitBreakerOpen {
            retry_in_ms: remaining.as_millis() as u64,
        });
    }

    ctx.sink.emit(ClientEvent::Connecting);
    log::info!("[pulse-link] Connecting to {}", ctx.url);

    let connect = ctx.factory.connect(&ctx.url);
    if PulseLinkTimeouts::is_no_timeout(ctx.timeouts.connection_timeout) {
        connect.await
    } else {
        match tokio::time::timeout(ctx.timeouts.connection_timeout, connect).await {
            Ok(result) => result,
            Err(_) => Err(PulseLinkError::ConnectTimeout(ctx.timeouts.connection_timeout)),
        }
    }
}

/// Successful open: reset failure tracking, start the heartbeat, flush
/// the queue. Subscribes are deferred to the connection-established frame
/// because auth tokens are scoped to the session id it carries.
async fn open_session(
    mut transport: Box<dyn Transport>,
    ctx: &TaskContext,
    breaker: &mut CircuitBreaker,
    schedule: &mut ReconnectSchedule,
    heartbeat: &mut HeartbeatState,
    registry: &mut SubscriptionRegistry,
    queue: &mut OutboundQueue,
) -> Session {
    breaker.record_success();
    schedule.reset();
    registry.clear_tokens();
    heartbeat.reset(Instant::now());
    ctx.connected.store(true, Ordering::SeqCst);
    log::info!("[pulse-link] Connected to {}", ctx.url);
    ctx.sink.emit(ClientEvent::Open);

    flush_queue(transport.as_mut(), queue, &ctx.sink).await;

    Session {
        transport,
        socket_id: None,
    }
}

/// Compute the next retry deadline after a failure or close.
///
/// `count_failure` feeds the circuit breaker; a retry is never scheduled
/// earlier than the breaker's cooldown end.
fn schedule_retry(
    ctx: &TaskContext,
    breaker: &mut CircuitBreaker,
    schedule: &mut ReconnectSchedule,
    reconnect_armed: bool,
    count_failure: bool,
) -> Option<Instant> {
    let now = Instant::now();
    if count_failure && breaker.record_failure(now) {
        log::warn!(
            "[pulse-link] Circuit breaker open after {} consecutive errors (cooldown {}ms)",
            breaker.consecutive_errors(),
            ctx.options.breaker_cooldown_ms,
        );
        ctx.sink.emit(ClientEvent::CircuitBreakerOpen {
            reset_in_ms: ctx.options.breaker_cooldown_ms,
        });
    }

    if !reconnect_armed || !ctx.options.auto_reconnect {
        return None;
    }

    match schedule.next_delay() {
        Some(delay) => {
            let mut at = now + delay;
            if let Some(block) = breaker.blocked_for(now) {
                at = at.max(now + block);
            }
            log::info!(
                "[pulse-link] Reconnecting in {}ms (attempt {})",
                (at - now).as_millis(),
                schedule.attempts(),
            );
            Some(at)
        },
        None => {
            log::warn!(
                "[pulse-link] Max reconnection attempts ({}) reached",
                schedule.attempts(),
            );
            ctx.sink.emit(ClientEvent::MaxReconnectsReached {
                attempts: schedule.attempts(),
            });
            None
        },
    }
}

/// Flush buffered sends in enqueue order. A failure re-queues the message
/// at the front (bounded by its retry cap) and stops the flush; the
/// transport is likely dying and its close event will follow.
async fn flush_queue(transport: &mut dyn Transport, queue: &mut OutboundQueue, sink: &EventSink) {
    if queue.is_empty() {
        return;
    }
    log::debug!("[pulse-link] Flushing {} buffered message(s)", queue.len());
    while let Some(msg) = queue.pop_front() {
        match transport.send_text(&msg.payload).await {
            Ok(()) => sink.emit_send(&msg.payload),
            Err(e) => {
                sink.emit(ClientEvent::SendError {
                    message: e.to_string(),
                });
                if !queue.requeue_front(msg) {
                    log::warn!("[pulse-link] Dropping buffered message after retry cap");
                }
                break;
            },
        }
    }
}

/// Subscribe one channel, fetching a fresh session-scoped token when the
/// channel requires auth. An auth failure skips only this channel.
async fn subscribe_channel(
    transport: &mut dyn Transport,
    registry: &mut SubscriptionRegistry,
    ctx: &TaskContext,
    channel: &str,
    socket_id: &str,
) {
    let auth = if channel_requires_auth(channel) {
        match ctx.auth.fetch_token(channel, socket_id).await {
            Ok(token) => {
                registry.set_token(channel, token.clone());
                token
            },
            Err(e) => {
                log::warn!("[pulse-link] Skipping subscribe to '{}': {}", channel, e);
                ctx.sink.emit(ClientEvent::Error {
                    error: ConnectionError::new(e.to_string(), true),
                });
                return;
            },
        }
    } else {
        String::new()
    };

    send_frame(transport, &Frame::subscribe(channel, &auth), &ctx.sink).await;
}

/// Encode and write one frame; failures become `SendError` events.
async fn send_frame(transport: &mut dyn Transport, frame: &Frame, sink: &EventSink) -> bool {
    match frame.encode() {
        Ok(text) => match transport.send_text(&text).await {
            Ok(()) => {
                sink.emit_send(&text);
                true
            },
            Err(e) => {
                sink.emit(ClientEvent::SendError {
                    message: e.to_string(),
                });
                false
            },
        },
        Err(e) => {
            log::error!("[pulse-link] Failed to encode frame: {}", e);
            false
        },
    }
}

/// Dispatch one inbound frame. Reserved events are consumed here; all
/// other events are re-emitted verbatim. A malformed frame emits exactly
/// one `ParseError` and leaves the connection untouched.
async fn handle_frame(
    sess: &mut Session,
    registry: &mut SubscriptionRegistry,
    heartbeat: &mut HeartbeatState,
    ctx: &TaskContext,
    text: String,
) {
    let frame = match Frame::decode(&text) {
        Ok(frame) => frame,
        Err(e) => {
            log::warn!("[pulse-link] Failed to parse frame: {}", e);
            ctx.sink.emit(ClientEvent::ParseError {
                message: e.to_string(),
                raw: text,
            });
            return;
        },
    };

    if frame.event == EVENT_CONNECTION_ESTABLISHED {
        sess.socket_id = frame.socket_id().map(str::to_string);
        log::info!(
            "[pulse-link] Session established (socket_id={:?})",
            sess.socket_id,
        );
        let sid = sess.socket_id.clone().unwrap_or_default();
        // Every desired channel is re-issued against the new session.
        for channel in registry.channel_names() {
            subscribe_channel(sess.transport.as_mut(), registry, ctx, &channel, &sid).await;
        }
    } else if frame.event == EVENT_PING {
        // Answer immediately, echoing the payload verbatim.
        send_frame(sess.transport.as_mut(), &Frame::pong(frame.data), &ctx.sink).await;
    } else if frame.event == EVENT_PONG {
        heartbeat.record_pong(Instant::now());
        let latency_ms = frame
            .timestamp_ms()
            .map(|sent| latency_from_echo(sent, now_unix_ms()))
            .unwrap_or(0);
        ctx.sink.emit(ClientEvent::Pong { latency_ms });
    } else if frame.event == EVENT_SUBSCRIPTION_SUCCEEDED {
        let channel = frame.channel.unwrap_or_default();
        log::debug!("[pulse-link] Subscription to '{}' acknowledged", channel);
        ctx.sink.emit(ClientEvent::SubscriptionSucceeded { channel });
    } else {
        ctx.sink.emit(ClientEvent::Message {
            event: frame.event,
            data: frame.data,
            channel: frame.channel,
        });
    }
}
