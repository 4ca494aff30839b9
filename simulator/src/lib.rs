//! # Cartstream Simulator
//!
//! Simulated shoppers for the cart event stream. The `simulator` binary
//! fetches the product catalog, loads the customer list from `PostgreSQL`,
//! and streams generated events to the broker: a year of backfill as fast as
//! the connection allows, then one batch per live tick.
//!
//! The `recorder` binary is a passive peer that writes every broadcast event
//! to a JSON file.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐  mpsc<Event>  ┌─────────────────┐  WebSocket  ┌────────┐
//! │ EventGenerator   │──────────────>│ TransportClient │────────────>│ Broker │
//! │ (runtime::drive) │  backpressure │ (reconnecting)  │<── echoes ──│        │
//! └──────────────────┘               └─────────────────┘             └────────┘
//! ```
//!
//! ## Modules
//!
//! - [`catalog`]: HTTP catalog fetch
//! - [`config`]: environment-driven configuration
//! - [`transport`]: reconnecting WebSocket client
//! - [`recorder`]: JSON file recorder

pub mod catalog;
pub mod config;
pub mod recorder;
pub mod transport;

pub use catalog::{CatalogFetchError, fetch_catalog};
pub use config::{Config, RecorderConfig};
pub use recorder::{Recorder, RecorderError, record_stream};
pub use transport::{TransportClient, TransportError};
