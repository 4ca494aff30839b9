//! Customer reference list.
//!
//! Loaded once when the simulator starts; the set of customers never changes
//! during a run.

use cartstream_core::customer::CustomerId;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use thiserror::Error;

/// Errors loading the customer list.
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// The URL could not be parsed.
    #[error("invalid database URL: {0}")]
    InvalidUrl(String),

    /// The database could not be reached or the query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The table has no rows.
    #[error("customers table is empty")]
    Empty,
}

/// Reads customer IDs from the `customers` table.
#[derive(Debug, Clone)]
pub struct PostgresCustomerDirectory {
    options: PgConnectOptions,
}

impl PostgresCustomerDirectory {
    /// Directory for the database at `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::InvalidUrl`] if the URL cannot be parsed.
    pub fn new(database_url: &str) -> Result<Self, DirectoryError> {
        let options = database_url
            .parse::<PgConnectOptions>()
            .map_err(|e| DirectoryError::InvalidUrl(e.to_string()))?;
        Ok(Self { options })
    }

    /// Every customer ID, in table order.
    ///
    /// IDs of any column type are read through a text cast.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Database`] on connection or query failure and
    /// [`DirectoryError::Empty`] if there are no customers.
    pub async fn load(&self) -> Result<Vec<CustomerId>, DirectoryError> {
        let mut conn = PgConnection::connect_with(&self.options).await?;

        let rows: Vec<(String,)> = sqlx::query_as("SELECT customer_id::text FROM customers")
            .fetch_all(&mut conn)
            .await?;

        conn.close().await?;

        if rows.is_empty() {
            return Err(DirectoryError::Empty);
        }

        tracing::info!(customers = rows.len(), "Loaded customer list");
        Ok(rows.into_iter().map(|(id,)| CustomerId::new(id)).collect())
    }
}
