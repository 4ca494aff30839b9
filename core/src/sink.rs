//! Persistence sink abstraction consumed by the broker.
//!
//! A sink appends one durable record per event. It reports success or failure
//! per call; callers do not retry.
//!
//! # Implementations
//!
//! - `PostgresEventSink` (production): one row in the `events` table per call
//! - `InMemoryEventSink` (testing), which can also be switched to fail every call
//!
//! # Dyn Compatibility
//!
//! This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
//! so the broker can hold it as `Arc<dyn EventSink>`.

use crate::event::Event;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur while persisting an event.
#[derive(Error, Debug, Clone)]
pub enum SinkError {
    /// The store could not be reached.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The store rejected the write.
    #[error("Write rejected: {0}")]
    WriteRejected(String),

    /// Anything else.
    #[error("Sink error: {0}")]
    Other(String),
}

/// Boxed future returned by [`EventSink::append`].
pub type AppendFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>>;

/// Append-only durable store for events.
pub trait EventSink: Send + Sync {
    /// Append one event as one record keyed by its event ID.
    ///
    /// No referential integrity is assumed: the customer and product need not
    /// exist anywhere else in the store.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the store is unreachable or rejects the write.
    fn append<'a>(&'a self, event: &'a Event) -> AppendFuture<'a>;
}
