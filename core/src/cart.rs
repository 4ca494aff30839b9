//! Cart - a per-customer multiset of product quantities.
//!
//! Every stored quantity is at least one. Removing the last unit of a product
//! removes its entry, so an empty cart has no entries at all.

use crate::catalog::ProductId;
use std::collections::BTreeMap;

/// Mapping from product to a positive quantity.
///
/// Entries are kept in ascending product-ID order so that choosing "the n-th
/// product in the cart" is reproducible for a given random sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cart {
    items: BTreeMap<ProductId, u32>,
}

impl Cart {
    /// An empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }

    /// `true` when the cart holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of distinct products in the cart.
    #[must_use]
    pub fn distinct(&self) -> usize {
        self.items.len()
    }

    /// Quantity held for a product, zero when absent.
    #[must_use]
    pub fn quantity(&self, product: ProductId) -> u32 {
        self.items.get(&product).copied().unwrap_or(0)
    }

    /// Total units across all products.
    #[must_use]
    pub fn total_units(&self) -> u64 {
        self.items.values().map(|q| u64::from(*q)).sum()
    }

    /// Products currently in the cart, ascending by ID.
    pub fn products(&self) -> impl Iterator<Item = ProductId> + '_ {
        self.items.keys().copied()
    }

    /// The n-th product in ascending ID order.
    #[must_use]
    pub fn nth_product(&self, n: usize) -> Option<ProductId> {
        self.items.keys().nth(n).copied()
    }

    /// Add one unit of a product.
    pub fn add(&mut self, product: ProductId) {
        *self.items.entry(product).or_insert(0) += 1;
    }

    /// Remove one unit of a product.
    ///
    /// Returns `false` (and leaves the cart unchanged) when the product is
    /// not in the cart.
    pub fn remove_one(&mut self, product: ProductId) -> bool {
        match self.items.get_mut(&product) {
            Some(quantity) if *quantity > 1 => {
                *quantity -= 1;
                true
            }
            Some(_) => {
                self.items.remove(&product);
                true
            }
            None => false,
        }
    }

    /// Empty the cart in one step.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}
