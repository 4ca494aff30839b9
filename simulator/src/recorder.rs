//! Event recorder.
//!
//! Listens on the broker like any other peer and keeps every event it
//! receives in a JSON array file. The file is rewritten after each event so
//! it is always a complete array.

use cartstream_core::event::Event;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Errors from the recorder.
#[derive(Error, Debug)]
pub enum RecorderError {
    /// The events file could not be read or written.
    #[error("events file {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The events could not be encoded.
    #[error("failed to encode events: {0}")]
    Encode(#[from] serde_json::Error),

    /// The broker could not be reached.
    #[error("failed to connect to {url}: {reason}")]
    Connect {
        /// Broker URL
        url: String,
        /// Connection error
        reason: String,
    },
}

/// Append-only store of received events backed by a JSON file.
#[derive(Debug)]
pub struct Recorder {
    path: PathBuf,
    events: Vec<Event>,
}

impl Recorder {
    /// Open the store at `path`, loading any events already in it.
    ///
    /// A missing file starts an empty store. So does a file that is not a
    /// JSON array of events; it is overwritten on the first write.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::Io`] if an existing file cannot be read.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, RecorderError> {
        let path = path.into();

        let events = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Vec<Event>>(&bytes).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Events file unreadable, starting empty");
                Vec::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(RecorderError::Io { path, source }),
        };

        info!(path = %path.display(), loaded = events.len(), "Recorder opened");
        Ok(Self { path, events })
    }

    /// Append `event` and rewrite the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written. The event stays in
    /// memory and is written with the next successful call.
    pub async fn record(&mut self, event: Event) -> Result<(), RecorderError> {
        self.events.push(event);
        let json = serde_json::to_vec_pretty(&self.events)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|source| RecorderError::Io {
                path: self.path.clone(),
                source,
            })
    }

    /// Events recorded so far, oldest first.
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Record every event broadcast by the broker at `url` until the connection
/// closes.
///
/// Frames that are not valid events are logged and skipped.
///
/// # Errors
///
/// Returns [`RecorderError::Connect`] if the broker cannot be reached and
/// [`RecorderError::Io`] if the file cannot be written.
pub async fn record_stream(url: &str, recorder: &mut Recorder) -> Result<(), RecorderError> {
    let (socket, _response) = connect_async(url)
        .await
        .map_err(|e| RecorderError::Connect {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    info!(url, "Recorder connected");

    let (_sink, mut stream) = socket.split();

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Skipping non-UTF-8 frame");
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "Connection error");
                break;
            }
        };

        match Event::from_json(&text) {
            Ok(event) => {
                debug!(event_id = %event.event_id().as_str(), "Recording event");
                recorder.record(event).await?;
            }
            Err(e) => warn!(error = %e, "Skipping invalid event"),
        }
    }

    info!(recorded = recorder.len(), "Connection closed, recorder stopping");
    Ok(())
}
