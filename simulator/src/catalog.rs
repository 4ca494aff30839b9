//! Catalog fetch.
//!
//! The product listing is read once over HTTP at startup. The source returns
//! a JSON array of `{id, title, price, description, image, ...}` objects;
//! fields beyond those five are ignored.

use cartstream_core::catalog::{Catalog, CatalogError, Product};
use thiserror::Error;

/// Default catalog source.
pub const DEFAULT_CATALOG_URL: &str = "https://fakestoreapi.com/products";

/// Errors fetching the catalog.
#[derive(Error, Debug)]
pub enum CatalogFetchError {
    /// The request failed, returned a non-success status, or the body was
    /// not a product array.
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The listing was fetched but is unusable.
    #[error("catalog listing rejected: {0}")]
    Invalid(#[from] CatalogError),
}

/// Fetch and validate the product listing at `url`.
///
/// # Errors
///
/// Returns [`CatalogFetchError::Http`] for transport, status or decoding
/// failures and [`CatalogFetchError::Invalid`] for an empty listing or
/// duplicate IDs.
pub async fn fetch_catalog(client: &reqwest::Client, url: &str) -> Result<Catalog, CatalogFetchError> {
    tracing::info!(url, "Fetching product catalog");

    let products: Vec<Product> = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let catalog = Catalog::new(products)?;
    tracing::info!(products = catalog.len(), "Catalog loaded");
    Ok(catalog)
}
