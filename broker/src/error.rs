//! Startup errors for the broker binary.
//!
//! Once the broker is serving, nothing is fatal: malformed frames close one
//! connection, sink failures are logged, and delivery failures are isolated
//! per peer. Only these conditions stop it.

use crate::metrics::MetricsError;
use cartstream_core::sink::SinkError;
use thiserror::Error;

/// Conditions the broker cannot start under.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// The database URL is unusable or the database is unreachable.
    #[error("database unavailable: {0}")]
    Database(#[from] SinkError),

    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested
        addr: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The metrics exporter could not start.
    #[error(transparent)]
    Metrics(#[from] MetricsError),

    /// The server stopped with an I/O error.
    #[error("server error: {0}")]
    Serve(std::io::Error),
}
