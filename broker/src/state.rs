//! Application state shared by every connection handler.

use crate::membership::Membership;
use cartstream_core::sink::EventSink;
use std::sync::Arc;
use std::time::Duration;

/// Per-connection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Time between pings sent to the peer
    pub ping_interval: Duration,
    /// Time a ping may go unanswered before the peer is dropped
    pub ping_timeout: Duration,
    /// Deliveries buffered for the peer's writer
    pub peer_queue_capacity: usize,
    /// Time the writer gets to flush a close frame once the reader stops
    pub close_grace: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(20),
            ping_timeout: Duration::from_secs(20),
            peer_queue_capacity: 64,
            close_grace: Duration::from_secs(5),
        }
    }
}

/// State handed to the WebSocket route.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast membership
    pub membership: Membership,
    /// Persistence sink every received event is appended to
    pub sink: Arc<dyn EventSink>,
    /// Per-connection behavior
    pub settings: ConnectionSettings,
}

impl AppState {
    /// Create the state.
    #[must_use]
    pub fn new(membership: Membership, sink: Arc<dyn EventSink>, settings: ConnectionSettings) -> Self {
        Self {
            membership,
            sink,
            settings,
        }
    }
}
