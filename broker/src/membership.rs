//! Broadcast membership.
//!
//! The set of connected peers is owned by a single actor task. Everything
//! else talks to it through the cloneable [`Membership`] handle, so there is
//! no shared lock and no global state.
//!
//! # Architecture
//!
//! ```text
//! connection A ──┐                         ┌──> writer A ──> socket A
//! connection B ──┼─ Command ──> actor ─────┼──> writer B ──> socket B
//! connection C ──┘   (mpsc)      │ spawn   └──> writer C ──> socket C
//!                                └──> fan_out (join_all, one attempt per peer)
//! ```
//!
//! A broadcast snapshots the members at the moment the actor handles it and
//! fans out in a spawned task, so one slow peer never blocks registration,
//! removal or other broadcasts.

use futures::future::join_all;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Capacity of the actor's command queue.
const COMMAND_CAPACITY: usize = 1024;

/// Identifier of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(u64);

impl PeerId {
    /// Wrap a raw ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Why a delivery to one peer failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The peer's writer is gone.
    #[error("peer is no longer connected")]
    PeerGone,

    /// Writing to the socket failed.
    #[error("send failed: {0}")]
    Send(String),

    /// The write did not complete in time; the peer stopped reading.
    #[error("peer stopped reading")]
    Stalled,
}

/// One message queued for a peer's writer, with a channel to report the
/// outcome back to the broadcaster.
#[derive(Debug)]
pub struct Delivery {
    payload: Arc<str>,
    ack: oneshot::Sender<Result<(), DeliveryError>>,
}

impl Delivery {
    /// The serialized event.
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Report the outcome of the write.
    pub fn complete(self, result: Result<(), DeliveryError>) {
        // The broadcaster may have stopped waiting.
        let _ = self.ack.send(result);
    }
}

/// Address of a connected peer: its ID and the queue feeding its writer.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    id: PeerId,
    outbox: mpsc::Sender<Delivery>,
}

impl PeerHandle {
    /// Create a handle.
    #[must_use]
    pub const fn new(id: PeerId, outbox: mpsc::Sender<Delivery>) -> Self {
        Self { id, outbox }
    }

    /// The peer's ID.
    #[must_use]
    pub const fn id(&self) -> PeerId {
        self.id
    }

    /// Queue `payload` for the peer and wait until its writer has sent it.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::PeerGone`] if the writer stopped before
    /// handling the message, or the writer's own error if the send failed.
    pub async fn deliver(&self, payload: Arc<str>) -> Result<(), DeliveryError> {
        let (ack, done) = oneshot::channel();
        self.outbox
            .send(Delivery { payload, ack })
            .await
            .map_err(|_| DeliveryError::PeerGone)?;
        done.await.map_err(|_| DeliveryError::PeerGone)?
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Peers the message was written to
    pub delivered: usize,
    /// Peers the write failed for
    pub failed: usize,
}

impl BroadcastReport {
    /// Members in the snapshot the broadcast went to.
    #[must_use]
    pub const fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

/// The membership actor has stopped.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("membership actor is not running")]
pub struct MembershipError;

#[derive(Debug)]
enum Command {
    Register {
        peer: PeerHandle,
        reply: oneshot::Sender<usize>,
    },
    Unregister {
        id: PeerId,
        reply: oneshot::Sender<bool>,
    },
    Broadcast {
        payload: Arc<str>,
        reply: oneshot::Sender<BroadcastReport>,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
}

/// Handle to the membership actor.
///
/// The actor stops once every handle has been dropped.
#[derive(Debug, Clone)]
pub struct Membership {
    commands: mpsc::Sender<Command>,
    next_id: Arc<AtomicU64>,
}

impl Membership {
    /// Start the actor on the current runtime.
    #[must_use]
    pub fn spawn() -> Self {
        let (commands, inbox) = mpsc::channel(COMMAND_CAPACITY);
        tokio::spawn(run(inbox));

        Self {
            commands,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// A fresh peer ID, unique for the life of this membership.
    #[must_use]
    pub fn next_peer_id(&self) -> PeerId {
        PeerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, MembershipError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| MembershipError)?;
        response.await.map_err(|_| MembershipError)
    }

    /// Add a peer; returns the member count afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`MembershipError`] if the actor has stopped.
    pub async fn register(&self, peer: PeerHandle) -> Result<usize, MembershipError> {
        self.request(|reply| Command::Register { peer, reply }).await
    }

    /// Remove a peer; returns whether it was a member.
    ///
    /// # Errors
    ///
    /// Returns [`MembershipError`] if the actor has stopped.
    pub async fn unregister(&self, id: PeerId) -> Result<bool, MembershipError> {
        self.request(|reply| Command::Unregister { id, reply }).await
    }

    /// Send `payload` to every current member and wait until each attempt
    /// has settled.
    ///
    /// # Errors
    ///
    /// Returns [`MembershipError`] if the actor has stopped.
    pub async fn broadcast(&self, payload: Arc<str>) -> Result<BroadcastReport, MembershipError> {
        self.request(|reply| Command::Broadcast { payload, reply })
            .await
    }

    /// Number of current members.
    ///
    /// # Errors
    ///
    /// Returns [`MembershipError`] if the actor has stopped.
    pub async fn count(&self) -> Result<usize, MembershipError> {
        self.request(|reply| Command::Count { reply }).await
    }
}

async fn run(mut inbox: mpsc::Receiver<Command>) {
    let mut peers: BTreeMap<PeerId, PeerHandle> = BTreeMap::new();

    while let Some(command) = inbox.recv().await {
        match command {
            Command::Register { peer, reply } => {
                let id = peer.id();
                peers.insert(id, peer);
                tracing::info!(peer = %id, peers = peers.len(), "Peer joined");
                crate::metrics::set_connected_peers(peers.len());
                let _ = reply.send(peers.len());
            }
            Command::Unregister { id, reply } => {
                let removed = peers.remove(&id).is_some();
                if removed {
                    tracing::info!(peer = %id, peers = peers.len(), "Peer left");
                    crate::metrics::set_connected_peers(peers.len());
                }
                let _ = reply.send(removed);
            }
            Command::Broadcast { payload, reply } => {
                let snapshot: Vec<PeerHandle> = peers.values().cloned().collect();
                tokio::spawn(async move {
                    let report = fan_out(snapshot, payload).await;
                    let _ = reply.send(report);
                });
            }
            Command::Count { reply } => {
                let _ = reply.send(peers.len());
            }
        }
    }

    tracing::debug!("Membership actor stopped");
}

async fn fan_out(peers: Vec<PeerHandle>, payload: Arc<str>) -> BroadcastReport {
    let attempts = peers.iter().map(|peer| {
        let payload = Arc::clone(&payload);
        async move { (peer.id(), peer.deliver(payload).await) }
    });

    let mut report = BroadcastReport::default();
    for (peer, result) in join_all(attempts).await {
        match result {
            Ok(()) => {
                report.delivered += 1;
                crate::metrics::record_delivery(true);
            }
            Err(e) => {
                report.failed += 1;
                crate::metrics::record_delivery(false);
                tracing::warn!(peer = %peer, error = %e, "Delivery failed");
            }
        }
    }
    report
}
