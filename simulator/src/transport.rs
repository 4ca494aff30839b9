//! Transport client.
//!
//! Keeps one outbound WebSocket connection to the broker and streams
//! generated events over it as text frames. Sending is fire-and-forget: the
//! broker's echo of every event (including our own) is read and discarded so
//! the broker's writes to this peer never back up.
//!
//! When the connection drops the client waits the retry policy's interval
//! and reconnects. The event that failed to send is dropped; nothing is
//! replayed. With the default policy it never gives up.

use cartstream_core::event::Event;
use cartstream_runtime::liveness::{Liveness, LivenessCheck};
use cartstream_runtime::retry::{RetryPolicy, retry_with_policy};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default time between pings.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(10);

/// Default time a ping may go unanswered.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that stop the transport client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The retry policy's cap was reached without connecting.
    #[error("gave up connecting to {url}: {reason}")]
    RetriesExhausted {
        /// Broker URL
        url: String,
        /// Last connection error
        reason: String,
    },
}

/// How a connected session ended.
#[derive(Debug)]
enum SessionEnd {
    /// The generator channel closed; the run is over.
    ChannelClosed,
    /// The connection failed and should be re-established.
    Failed(String),
}

/// Streams events from a channel to the broker.
#[derive(Debug, Clone)]
pub struct TransportClient {
    url: String,
    policy: RetryPolicy,
    ping_interval: Duration,
    ping_timeout: Duration,
}

impl TransportClient {
    /// Client for the broker at `url` with default policy and liveness.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            policy: RetryPolicy::default(),
            ping_interval: DEFAULT_PING_INTERVAL,
            ping_timeout: DEFAULT_PING_TIMEOUT,
        }
    }

    /// Replace the reconnect policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the ping schedule.
    #[must_use]
    pub const fn with_liveness(mut self, interval: Duration, timeout: Duration) -> Self {
        self.ping_interval = interval;
        self.ping_timeout = timeout;
        self
    }

    /// Send every event from `events` until the channel closes.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::RetriesExhausted`] if the policy has a cap
    /// and it is reached while trying to connect.
    pub async fn run(&self, mut events: mpsc::Receiver<Event>) -> Result<(), TransportError> {
        loop {
            let socket = self.connect().await?;
            info!(url = %self.url, "Connected to broker");

            match self.session(socket, &mut events).await {
                SessionEnd::ChannelClosed => {
                    info!("Event channel closed, transport stopping");
                    return Ok(());
                }
                SessionEnd::Failed(reason) => {
                    warn!(
                        reason = %reason,
                        retry_in_ms = self.policy.interval.as_millis(),
                        "Connection lost, reconnecting"
                    );
                    tokio::time::sleep(self.policy.interval).await;
                }
            }
        }
    }

    async fn connect(&self) -> Result<Socket, TransportError> {
        retry_with_policy(&self.policy, || async {
            connect_async(self.url.as_str())
                .await
                .map(|(socket, _response)| socket)
        })
        .await
        .map_err(|e| TransportError::RetriesExhausted {
            url: self.url.clone(),
            reason: e.to_string(),
        })
    }

    async fn session(&self, socket: Socket, events: &mut mpsc::Receiver<Event>) -> SessionEnd {
        let (mut sink, mut stream) = socket.split();
        let mut liveness = Liveness::new(self.ping_interval, self.ping_timeout, Instant::now());
        let mut sent = 0usize;

        let end = loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        close(&mut sink).await;
                        break SessionEnd::ChannelClosed;
                    };
                    if let Err(reason) = send_event(&mut sink, &event).await {
                        break SessionEnd::Failed(reason);
                    }
                    sent += 1;
                }

                frame = stream.next() => {
                    if let Err(reason) = on_frame(frame, &mut liveness) {
                        break SessionEnd::Failed(reason);
                    }
                }

                () = tokio::time::sleep_until(liveness.deadline()) => {
                    match liveness.poll(Instant::now()) {
                        LivenessCheck::SendPing => {
                            if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                                break SessionEnd::Failed(e.to_string());
                            }
                            liveness.ping_sent(Instant::now());
                        }
                        LivenessCheck::Expired => break SessionEnd::Failed("pong overdue".to_string()),
                        LivenessCheck::Idle => {}
                    }
                }
            }
        };

        debug!(sent, "Session ended");
        end
    }
}

async fn send_event(sink: &mut SplitSink<Socket, Message>, event: &Event) -> Result<(), String> {
    let json = match event.to_json() {
        Ok(json) => json,
        Err(e) => {
            error!(event_id = %event.event_id().as_str(), error = %e, "Failed to encode event");
            return Ok(());
        }
    };

    sink.send(Message::Text(json)).await.map_err(|e| {
        warn!(event_id = %event.event_id().as_str(), "Dropping event that failed to send");
        e.to_string()
    })
}

/// Handle one inbound frame. Echoed events are discarded.
///
/// Any frame from the broker counts as an answer to the outstanding ping:
/// while the broker works through a backlog from this client it may not
/// read the ping for a while, but it keeps echoing events.
fn on_frame(
    frame: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
    liveness: &mut Liveness,
) -> Result<(), String> {
    match frame {
        Some(Ok(Message::Close(frame))) => Err(format!("closed by broker: {frame:?}")),
        Some(Ok(_)) => {
            liveness.pong_received();
            Ok(())
        }
        Some(Err(e)) => Err(e.to_string()),
        None => Err("connection closed".to_string()),
    }
}

async fn close(sink: &mut SplitSink<Socket, Message>) {
    if let Err(e) = sink.close().await {
        debug!(error = %e, "Error closing connection");
    }
}
