//! Cart state machine - chooses each customer's next action.
//!
//! A cart is either Empty or Non-Empty; the state is derived from its
//! contents and never stored separately. One transition is evaluated per
//! generated event:
//!
//! | Cart      | Draw `r`            | Intent             | Fallback            |
//! |-----------|---------------------|--------------------|---------------------|
//! | Empty     | any                 | `add_to_cart`      | -                   |
//! | Non-Empty | `r < 0.45`          | `add_to_cart`      | -                   |
//! | Non-Empty | `0.45 <= r < 0.70`  | `remove_from_cart` | `add_to_cart`       |
//! | Non-Empty | `r >= 0.70`         | `purchase_cart`    | `add_to_cart`       |
//!
//! The fallbacks fire only when the cart turns out to be empty at the moment
//! the intent is applied, so every emitted event is a real state change.

use crate::cart::Cart;
use crate::catalog::{Catalog, ProductId};
use crate::customer::CustomerId;
use crate::environment::RandomSource;
use crate::event::Event;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// Draws below this add a product to a non-empty cart.
pub const ADD_THRESHOLD: f64 = 0.45;

/// Draws below this (and at or above [`ADD_THRESHOLD`]) remove a product.
/// Draws at or above it attempt a purchase.
pub const REMOVE_THRESHOLD: f64 = 0.70;

/// Errors raised by a transition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    /// The customer is outside the fixed customer universe.
    #[error("unknown customer {0}")]
    UnknownCustomer(CustomerId),

    /// A cart holds a product the catalog does not list.
    #[error("product {0} is in a cart but not in the catalog")]
    ProductNotInCatalog(ProductId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    Add,
    Remove,
    Purchase,
}

impl Intent {
    fn choose(cart_empty: bool, r: f64) -> Self {
        if cart_empty || r < ADD_THRESHOLD {
            Self::Add
        } else if r < REMOVE_THRESHOLD {
            Self::Remove
        } else {
            Self::Purchase
        }
    }
}

#[derive(Debug, Clone, Default)]
struct CustomerCart {
    cart: Cart,
    last_activity: Option<DateTime<Utc>>,
}

/// Carts of a fixed customer universe, and the transition policy over them.
#[derive(Debug, Clone)]
pub struct Carts {
    customers: Vec<CustomerId>,
    carts: HashMap<CustomerId, CustomerCart>,
}

impl Carts {
    /// One empty cart per customer. Duplicate IDs collapse to one customer.
    pub fn new(customers: impl IntoIterator<Item = CustomerId>) -> Self {
        let mut ordered = Vec::new();
        let mut carts = HashMap::new();
        for customer in customers {
            if carts.insert(customer.clone(), CustomerCart::default()).is_none() {
                ordered.push(customer);
            }
        }

        Self {
            customers: ordered,
            carts,
        }
    }

    /// The customer universe, in enrollment order.
    #[must_use]
    pub fn customers(&self) -> &[CustomerId] {
        &self.customers
    }

    /// A customer's cart.
    #[must_use]
    pub fn cart(&self, customer: &CustomerId) -> Option<&Cart> {
        self.carts.get(customer).map(|c| &c.cart)
    }

    /// When the customer last added or removed something. Cleared by a purchase.
    #[must_use]
    pub fn last_activity(&self, customer: &CustomerId) -> Option<DateTime<Utc>> {
        self.carts.get(customer).and_then(|c| c.last_activity)
    }

    /// Run one transition for `customer` and return the event it produced.
    ///
    /// The cart mutation, the last-activity update and the event construction
    /// happen together; nothing is observable in between.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::UnknownCustomer`] for a customer outside the
    /// universe, and [`CartError::ProductNotInCatalog`] if a cart refers to a
    /// product `catalog` does not list.
    pub fn transition<R>(
        &mut self,
        customer: &CustomerId,
        catalog: &Catalog,
        at: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<Event, CartError>
    where
        R: RandomSource + ?Sized,
    {
        let entry = self
            .carts
            .get_mut(customer)
            .ok_or_else(|| CartError::UnknownCustomer(customer.clone()))?;

        let r = rng.unit();
        match Intent::choose(entry.cart.is_empty(), r) {
            Intent::Add => Ok(add_random(entry, customer, catalog, at, rng)),
            Intent::Remove => {
                if entry.cart.is_empty() {
                    return Ok(add_random(entry, customer, catalog, at, rng));
                }
                let n = rng.index(entry.cart.distinct());
                let Some(product_id) = entry.cart.nth_product(n) else {
                    return Ok(add_random(entry, customer, catalog, at, rng));
                };
                let product = catalog
                    .get(product_id)
                    .ok_or(CartError::ProductNotInCatalog(product_id))?;

                entry.cart.remove_one(product_id);
                entry.last_activity = Some(at);
                Ok(Event::removed(customer.clone(), product, at))
            }
            Intent::Purchase => {
                if entry.cart.is_empty() {
                    return Ok(add_random(entry, customer, catalog, at, rng));
                }
                entry.cart.clear();
                entry.last_activity = None;
                Ok(Event::purchased(customer.clone(), at))
            }
        }
    }
}

fn add_random<R>(
    entry: &mut CustomerCart,
    customer: &CustomerId,
    catalog: &Catalog,
    at: DateTime<Utc>,
    rng: &mut R,
) -> Event
where
    R: RandomSource + ?Sized,
{
    let product = catalog.pick(rng.index(catalog.len()));
    entry.cart.add(product.id);
    entry.last_activity = Some(at);
    Event::added(customer.clone(), product, at)
}
