//! Catalog snapshot - the immutable list of sellable products.
//!
//! The catalog is fetched once at simulator startup and never re-fetched
//! mid-run. Products are shared by reference (`Arc`) with every event that
//! mentions them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Identifier of a product in the external catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(u64);

impl ProductId {
    /// Create a new product ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw numeric ID.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A sellable item, exactly as listed by the catalog source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Catalog identifier
    pub id: ProductId,
    /// Display title
    pub title: String,
    /// Unit price
    pub price: f64,
    /// Long-form description
    pub description: String,
    /// Image URL
    pub image: String,
}

impl Product {
    /// Creates a new product.
    #[must_use]
    pub fn new(
        id: ProductId,
        title: impl Into<String>,
        price: f64,
        description: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            price,
            description: description.into(),
            image: image.into(),
        }
    }
}

/// Errors building a catalog.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The catalog source returned no products.
    #[error("catalog is empty")]
    Empty,

    /// Two listings share an ID.
    #[error("duplicate product id {0}")]
    DuplicateId(ProductId),
}

/// Non-empty, immutable product listing.
#[derive(Debug, Clone)]
pub struct Catalog {
    products: Vec<Arc<Product>>,
}

impl Catalog {
    /// Build a catalog from the listing.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Empty`] for an empty listing and
    /// [`CatalogError::DuplicateId`] when two products share an ID.
    pub fn new(products: Vec<Product>) -> Result<Self, CatalogError> {
        if products.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = std::collections::HashSet::with_capacity(products.len());
        for product in &products {
            if !seen.insert(product.id) {
                return Err(CatalogError::DuplicateId(product.id));
            }
        }

        Ok(Self {
            products: products.into_iter().map(Arc::new).collect(),
        })
    }

    /// Number of products. Always at least one.
    #[must_use]
    pub fn len(&self) -> usize {
        self.products.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Product at `index`, wrapping around the listing.
    ///
    /// Total because a catalog is never empty.
    #[must_use]
    pub fn pick(&self, index: usize) -> &Product {
        &self.products[index % self.products.len()]
    }

    /// Look a product up by ID.
    #[must_use]
    pub fn get(&self, id: ProductId) -> Option<&Arc<Product>> {
        self.products.iter().find(|p| p.id == id)
    }

    /// Iterate products in listing order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Product>> {
        self.products.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn product(id: u64) -> Product {
        Product::new(ProductId::new(id), format!("Item {id}"), 1.5, "desc", "img")
    }

    #[test]
    fn rejects_empty_listing() {
        assert_eq!(Catalog::new(vec![]).unwrap_err(), CatalogError::Empty);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = Catalog::new(vec![product(1), product(1)]).unwrap_err();
        assert_eq!(err, CatalogError::DuplicateId(ProductId::new(1)));
    }

    #[test]
    fn pick_wraps_around() {
        let catalog = Catalog::new(vec![product(1), product(2)]).expect("catalog");
        assert_eq!(catalog.pick(1).id, ProductId::new(2));
        assert_eq!(catalog.pick(2).id, ProductId::new(1));
    }

    #[test]
    fn lookup_by_id() {
        let catalog = Catalog::new(vec![product(1), product(2)]).expect("catalog");
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get(ProductId::new(2)).unwrap().title, "Item 2");
        assert!(catalog.get(ProductId::new(3)).is_none());
    }

    #[test]
    fn parses_catalog_listing() {
        let json = r#"{"id":1,"title":"Backpack","price":109.95,"description":"d","image":"https://x/1.jpg","category":"bags"}"#;
        let product: Product = serde_json::from_str(json).expect("parse");
        assert_eq!(product.id, ProductId::new(1));
        assert!((product.price - 109.95).abs() < f64::EPSILON);
    }
}
