//! Event sink backed by the `events` table.
//!
//! Every append opens its own connection, inserts one row and closes the
//! connection again. There is no pool and no transaction spanning events, so
//! a failed write never affects the next one.

use cartstream_core::event::Event;
use cartstream_core::sink::{AppendFuture, EventSink, SinkError};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use std::time::Duration;

/// Default bound on opening a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Writes events to `PostgreSQL`, one connection per event.
#[derive(Debug, Clone)]
pub struct PostgresEventSink {
    options: PgConnectOptions,
    connect_timeout: Duration,
}

impl PostgresEventSink {
    /// Create a sink for the database at `database_url`.
    ///
    /// No connection is opened here; see [`check_connection`](Self::check_connection).
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::ConnectionFailed`] if the URL cannot be parsed.
    pub fn new(database_url: &str) -> Result<Self, SinkError> {
        let options = database_url
            .parse::<PgConnectOptions>()
            .map_err(|e| SinkError::ConnectionFailed(format!("invalid database URL: {e}")))?;

        Ok(Self {
            options,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    /// Bound the time spent opening each connection.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    async fn connect(&self) -> Result<PgConnection, SinkError> {
        tokio::time::timeout(self.connect_timeout, PgConnection::connect_with(&self.options))
            .await
            .map_err(|_| {
                SinkError::ConnectionFailed(format!(
                    "timed out after {}ms",
                    self.connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| SinkError::ConnectionFailed(e.to_string()))
    }

    /// Open a connection and run a trivial query.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::ConnectionFailed`] if the database is unreachable.
    pub async fn check_connection(&self) -> Result<(), SinkError> {
        let mut conn = self.connect().await?;

        sqlx::query("SELECT 1")
            .execute(&mut conn)
            .await
            .map_err(|e| SinkError::ConnectionFailed(e.to_string()))?;

        if let Err(e) = conn.close().await {
            tracing::debug!(error = %e, "Error closing probe connection");
        }
        Ok(())
    }

    async fn insert(&self, event: &Event) -> Result<(), SinkError> {
        let product = event.product();
        let product_id = product
            .and_then(|p| p.id)
            .map(|id| {
                i64::try_from(id.get()).map_err(|_| {
                    SinkError::WriteRejected(format!("product id {id} does not fit BIGINT"))
                })
            })
            .transpose()?;

        let mut conn = self.connect().await?;

        let result = sqlx::query(
            r"
            INSERT INTO events (
                event_id, customer_id, product_id, product_title,
                product_price, product_image, action, description, timestamp
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(event.event_id().as_str())
        .bind(event.customer_id().as_str())
        .bind(product_id)
        .bind(product.map(|p| p.title.as_str()))
        .bind(product.map(|p| p.price))
        .bind(product.map(|p| p.image.as_str()))
        .bind(event.action().as_str())
        .bind(event.description())
        .bind(event.timestamp())
        .execute(&mut conn)
        .await;

        if let Err(e) = conn.close().await {
            tracing::debug!(error = %e, "Error closing sink connection");
        }

        result.map_err(|e| SinkError::WriteRejected(e.to_string()))?;

        tracing::debug!(
            event_id = %event.event_id().as_str(),
            action = %event.action(),
            "Event persisted"
        );
        metrics::counter!("cartstream_postgres_rows_written_total").increment(1);

        Ok(())
    }
}

impl EventSink for PostgresEventSink {
    fn append<'a>(&'a self, event: &'a Event) -> AppendFuture<'a> {
        Box::pin(self.insert(event))
    }
}
