//! `PostgreSQL` persistence for the cart event stream.
//!
//! This crate provides:
//!
//! - [`PostgresEventSink`]: the [`EventSink`](cartstream_core::sink::EventSink)
//!   the broker writes every received event to
//! - [`PostgresCustomerDirectory`]: the customer reference list the simulator
//!   generates events for
//!
//! The schema is provisioned elsewhere. The sink expects:
//!
//! ```sql
//! CREATE TABLE events (
//!     event_id      TEXT PRIMARY KEY,
//!     customer_id   TEXT NOT NULL,
//!     product_id    BIGINT,
//!     product_title TEXT,
//!     product_price DOUBLE PRECISION,
//!     product_image TEXT,
//!     action        TEXT NOT NULL,
//!     description   TEXT NOT NULL,
//!     timestamp     TIMESTAMPTZ NOT NULL
//! );
//! ```
//!
//! # Example
//!
//! ```ignore
//! use cartstream_postgres::PostgresEventSink;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let sink = PostgresEventSink::new("postgres://localhost/customer_events")?;
//!     sink.check_connection().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod customers;
pub mod sink;

pub use customers::{DirectoryError, PostgresCustomerDirectory};
pub use sink::PostgresEventSink;
