//! Per-connection WebSocket handling.
//!
//! # Architecture
//!
//! ```text
//! Peer      Reader task     Processor          Sink   Membership      Writer task
//!   │            │               │                │         │               │
//!   ├─ frame ───>│               │                │         │               │
//!   │            ├─ Inbound ────>│ (bounded, 1)   │         │               │
//!   │            │               ├─ append() ────>│         │               │
//!   │            │               ├─ broadcast() ───────────>│               │
//!   │            │               │                │         ├─ Delivery ───>│
//!   │<──────────────────────────────────────────────────────────── text ─────┤
//!   │            │               │<── BroadcastReport ──────┤               │
//! ```
//!
//! The reader task keeps reading the socket while an event is being
//! processed, so pongs are seen even when the sink or a broadcast is slow.
//! Events are handed to the processor through a channel of capacity one and
//! processed strictly one at a time: the next event is not taken until the
//! previous one has been persisted and its broadcast has settled. Once
//! processing of an event has started it runs to completion, even if the
//! connection goes away meanwhile.
//!
//! The writer task owns the sending half of the socket. It writes
//! deliveries, sends pings, and drops the peer when a pong is overdue or a
//! write blocks for longer than one ping round.
//!
//! # Lifecycle
//!
//! `Connecting → Open → (Closing | Faulted) → Closed`. A frame that does not
//! parse as an event faults the connection: it is closed with code 1007 and
//! removed from the broadcast set. Other connections are unaffected.

use crate::membership::{Delivery, DeliveryError, PeerHandle, PeerId};
use crate::state::{AppState, ConnectionSettings};
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use cartstream_core::event::Event;
use cartstream_runtime::liveness::{Liveness, LivenessCheck};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Close code for a frame that is not a valid event (RFC 6455 §7.4.1).
const CLOSE_INVALID_PAYLOAD: u16 = 1007;

/// Where a connection is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgraded, not yet in the broadcast set.
    Connecting,
    /// Registered; frames are being read and deliveries written.
    Open,
    /// The peer closed the connection or the transport ended.
    Closing,
    /// The peer sent a malformed frame or stopped answering pings.
    Faulted,
    /// Removed from the broadcast set; the socket is gone.
    Closed,
}

impl ConnectionState {
    /// Whether moving to `next` is a legal step.
    #[must_use]
    pub const fn can_become(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Open | Self::Closed)
                | (Self::Open, Self::Closing | Self::Faulted)
                | (Self::Closing | Self::Faulted, Self::Closed)
        )
    }
}

struct Lifecycle {
    peer: PeerId,
    state: ConnectionState,
}

impl Lifecycle {
    const fn new(peer: PeerId) -> Self {
        Self {
            peer,
            state: ConnectionState::Connecting,
        }
    }

    fn advance(&mut self, next: ConnectionState) {
        if self.state.can_become(next) {
            debug!(peer = %self.peer, from = ?self.state, to = ?next, "Connection state changed");
            self.state = next;
        } else {
            warn!(peer = %self.peer, from = ?self.state, to = ?next, "Ignoring invalid state change");
        }
    }
}

/// Signals from the reader task to the writer task.
#[derive(Debug, Default)]
struct PeerActivity {
    /// Notified on every inbound frame.
    heard: Notify,
    /// Set while the reader waits for the processor to take the next event.
    backlogged: AtomicBool,
}

impl PeerActivity {
    fn is_backlogged(&self) -> bool {
        self.backlogged.load(Ordering::Acquire)
    }
}

/// A parsed event and the text it arrived as.
struct Inbound {
    event: Event,
    payload: Arc<str>,
}

/// Why the connection stopped.
#[derive(Debug)]
enum ReadOutcome {
    /// Close frame or end of stream.
    PeerClosed,
    /// Transport error while reading, or the peer stopped responding.
    Transport(String),
    /// A frame was not a valid event.
    Malformed(String),
    /// The membership actor is gone; the broker is shutting down.
    BrokerStopped,
}

/// Why the writer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterExit {
    /// Asked to close by the connection handler.
    Closed,
    /// A write to the socket failed.
    SendFailed,
    /// A pong did not arrive in time, or a write stalled.
    LivenessExpired,
}

/// WebSocket upgrade handler.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn handle(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    debug!("WebSocket connection requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Run one connection from upgrade to close.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let peer = state.membership.next_peer_id();
    let settings = state.settings;
    let mut lifecycle = Lifecycle::new(peer);

    let (sink, stream) = socket.split();
    let (outbox, deliveries) = mpsc::channel(settings.peer_queue_capacity);
    let activity = Arc::new(PeerActivity::default());
    let (close_tx, close_rx) = oneshot::channel();

    let mut writer = tokio::spawn(write_loop(
        peer,
        sink,
        deliveries,
        Arc::clone(&activity),
        close_rx,
        settings,
    ));

    if state
        .membership
        .register(PeerHandle::new(peer, outbox))
        .await
        .is_err()
    {
        warn!(peer = %peer, "Membership unavailable, dropping connection");
        lifecycle.advance(ConnectionState::Closed);
        writer.abort();
        return;
    }
    lifecycle.advance(ConnectionState::Open);
    info!(peer = %peer, "WebSocket connection established");

    let (inbound_tx, mut inbound) = mpsc::channel(1);
    let mut reader = tokio::spawn(read_loop(stream, inbound_tx, Arc::clone(&activity)));

    let mut writer_exit = None;
    let outcome = loop {
        tokio::select! {
            biased;

            exit = &mut writer => {
                let exit = exit.unwrap_or(WriterExit::SendFailed);
                writer_exit = Some(exit);
                break match exit {
                    WriterExit::LivenessExpired => ReadOutcome::Transport("peer unresponsive".to_string()),
                    WriterExit::SendFailed | WriterExit::Closed => ReadOutcome::PeerClosed,
                };
            }

            received = inbound.recv() => {
                let Some(Inbound { event, payload }) = received else {
                    break (&mut reader)
                        .await
                        .unwrap_or_else(|e| ReadOutcome::Transport(e.to_string()));
                };
                // Not raced against the writer: a started event always
                // finishes.
                if process(peer, &event, payload, &state).await.is_err() {
                    break ReadOutcome::BrokerStopped;
                }
            }
        }
    };
    reader.abort();

    let close_frame = match &outcome {
        ReadOutcome::Malformed(reason) => {
            warn!(peer = %peer, reason = %reason, "Malformed message, closing connection");
            crate::metrics::record_malformed_message();
            lifecycle.advance(ConnectionState::Faulted);
            Some(CloseFrame {
                code: CLOSE_INVALID_PAYLOAD,
                reason: "invalid event".into(),
            })
        }
        ReadOutcome::Transport(reason) => {
            warn!(peer = %peer, reason = %reason, "Connection failed");
            lifecycle.advance(ConnectionState::Faulted);
            None
        }
        ReadOutcome::PeerClosed | ReadOutcome::BrokerStopped => {
            lifecycle.advance(ConnectionState::Closing);
            None
        }
    };

    if state.membership.unregister(peer).await.is_err() {
        debug!(peer = %peer, "Membership already stopped");
    }

    if writer_exit.is_none() {
        let _ = close_tx.send(close_frame);
        if tokio::time::timeout(settings.close_grace, &mut writer)
            .await
            .is_err()
        {
            writer.abort();
        }
    }

    lifecycle.advance(ConnectionState::Closed);
    info!(peer = %peer, "WebSocket connection closed");
}

/// Read frames and hand parsed events to the processor, in arrival order.
///
/// Stops at the first frame that is not a valid event; events queued before
/// it are still processed.
async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    inbound: mpsc::Sender<Inbound>,
    activity: Arc<PeerActivity>,
) -> ReadOutcome {
    while let Some(frame) = stream.next().await {
        activity.heard.notify_one();

        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => return ReadOutcome::Malformed(format!("binary frame is not UTF-8: {e}")),
            },
            Ok(Message::Pong(_) | Message::Ping(_)) => continue,
            Ok(Message::Close(_)) => return ReadOutcome::PeerClosed,
            Err(e) => return ReadOutcome::Transport(e.to_string()),
        };

        let event = match Event::from_json(&text) {
            Ok(event) => event,
            Err(e) => return ReadOutcome::Malformed(e.to_string()),
        };

        let item = Inbound {
            event,
            payload: Arc::from(text),
        };
        match inbound.try_send(item) {
            Ok(()) => {}
            Err(TrySendError::Full(item)) => {
                activity.backlogged.store(true, Ordering::Release);
                let queued = inbound.send(item).await;
                activity.backlogged.store(false, Ordering::Release);
                if queued.is_err() {
                    return ReadOutcome::BrokerStopped;
                }
            }
            Err(TrySendError::Closed(_)) => return ReadOutcome::BrokerStopped,
        }
    }

    ReadOutcome::PeerClosed
}

/// Persist then broadcast one event, and wait for the broadcast to settle.
///
/// A sink failure is logged and counted; the broadcast goes ahead anyway.
async fn process(
    peer: PeerId,
    event: &Event,
    payload: Arc<str>,
    state: &AppState,
) -> Result<(), crate::membership::MembershipError> {
    crate::metrics::record_event_received();
    debug!(
        peer = %peer,
        event_id = %event.event_id().as_str(),
        action = %event.action(),
        "Event received"
    );

    if let Err(e) = state.sink.append(event).await {
        warn!(
            peer = %peer,
            event_id = %event.event_id().as_str(),
            error = %e,
            "Failed to persist event"
        );
        crate::metrics::record_persist_failure();
    }

    let report = state.membership.broadcast(payload).await?;
    debug!(
        peer = %peer,
        event_id = %event.event_id().as_str(),
        delivered = report.delivered,
        failed = report.failed,
        "Broadcast settled"
    );
    Ok(())
}

/// Own the sending half: deliveries, pings and the final close frame.
async fn write_loop(
    peer: PeerId,
    mut sink: SplitSink<WebSocket, Message>,
    mut deliveries: mpsc::Receiver<Delivery>,
    activity: Arc<PeerActivity>,
    mut close: oneshot::Receiver<Option<CloseFrame<'static>>>,
    settings: ConnectionSettings,
) -> WriterExit {
    let mut liveness = Liveness::new(settings.ping_interval, settings.ping_timeout, Instant::now());
    let stall_limit = liveness.stall_limit();

    loop {
        tokio::select! {
            biased;

            frame = &mut close => {
                let frame = frame.unwrap_or(None);
                match tokio::time::timeout(stall_limit, sink.send(Message::Close(frame))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!(peer = %peer, error = %e, "Close frame not sent"),
                    Err(_) => debug!(peer = %peer, "Close frame not sent in time"),
                }
                return WriterExit::Closed;
            }

            () = activity.heard.notified() => liveness.pong_received(),

            delivery = deliveries.recv() => {
                let Some(delivery) = delivery else {
                    return WriterExit::Closed;
                };
                let message = Message::Text(delivery.payload().to_string());
                match tokio::time::timeout(stall_limit, sink.send(message)).await {
                    Ok(Ok(())) => delivery.complete(Ok(())),
                    Ok(Err(e)) => {
                        delivery.complete(Err(DeliveryError::Send(e.to_string())));
                        return WriterExit::SendFailed;
                    }
                    Err(_) => {
                        warn!(peer = %peer, "Peer stopped reading, closing connection");
                        delivery.complete(Err(DeliveryError::Stalled));
                        return WriterExit::LivenessExpired;
                    }
                }
            }

            () = tokio::time::sleep_until(liveness.deadline()) => {
                match liveness.poll(Instant::now()) {
                    LivenessCheck::SendPing => {
                        match tokio::time::timeout(stall_limit, sink.send(Message::Ping(Vec::new()))).await {
                            Ok(Ok(())) => liveness.ping_sent(Instant::now()),
                            Ok(Err(_)) => return WriterExit::SendFailed,
                            Err(_) => {
                                warn!(peer = %peer, "Peer stopped reading, closing connection");
                                return WriterExit::LivenessExpired;
                            }
                        }
                    }
                    LivenessCheck::Expired if activity.is_backlogged() => {
                        // Pongs may be queued behind events not yet taken.
                        debug!(peer = %peer, "Reader backlogged, deferring liveness check");
                        liveness.pong_received();
                    }
                    LivenessCheck::Expired => {
                        warn!(peer = %peer, "Pong not received in time, closing connection");
                        let _ = tokio::time::timeout(stall_limit, sink.send(Message::Close(None))).await;
                        return WriterExit::LivenessExpired;
                    }
                    LivenessCheck::Idle => {}
                }
            }
        }
    }
}
