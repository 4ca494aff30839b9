//! # Cartstream Broker
//!
//! WebSocket broker for the cart event stream. Every connected peer may send
//! events; each one is persisted through an
//! [`EventSink`](cartstream_core::sink::EventSink) and then broadcast to
//! every connected peer, the sender included.
//!
//! ## Modules
//!
//! - [`membership`]: actor owning the broadcast set
//! - [`connection`]: per-connection reader loop and writer task
//! - [`routes`]: axum router (`/` and `/ws`)
//! - [`config`]: environment-driven configuration
//! - [`metrics`]: Prometheus metrics
//!
//! ## Example
//!
//! ```ignore
//! use cartstream_broker::{AppState, ConnectionSettings, Membership, serve};
//! use std::sync::Arc;
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8765").await?;
//! let state = AppState::new(Membership::spawn(), Arc::new(sink), ConnectionSettings::default());
//! serve(listener, state, shutdown_signal()).await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod membership;
pub mod metrics;
pub mod routes;
pub mod state;

pub use config::Config;
pub use connection::ConnectionState;
pub use error::BrokerError;
pub use membership::{BroadcastReport, Membership, MembershipError, PeerId};
pub use routes::build_router;
pub use state::{AppState, ConnectionSettings};

use std::future::Future;
use tokio::net::TcpListener;

/// Serve the broker on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns [`BrokerError::Serve`] if the server fails.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), BrokerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(BrokerError::Serve)
}
