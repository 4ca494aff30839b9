//! Events - immutable records of one customer action.
//!
//! An event is the unit of transport and persistence. The action is a closed
//! enum, and the product reference lives inside the add/remove variants, so a
//! purchase can never carry a product and an add/remove can never lack one.
//!
//! Events serialize to and from the flat wire record described in
//! [`crate::wire`].

use crate::catalog::{Product, ProductId};
use crate::customer::CustomerId;
use crate::wire::{WireError, WireEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Fixed description carried by every `purchase_cart` event.
pub const PURCHASE_DESCRIPTION: &str = "Purchased the cart.";

/// Globally unique, opaque event identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an identifier received from elsewhere.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three customer actions, as named on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// One unit of a product was added.
    AddToCart,
    /// One unit of a product was removed.
    RemoveFromCart,
    /// The whole cart was purchased and cleared.
    PurchaseCart,
}

impl Action {
    /// Wire / column name of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AddToCart => "add_to_cart",
            Self::RemoveFromCart => "remove_from_cart",
            Self::PurchaseCart => "purchase_cart",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The product fields an add/remove event carries.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRef {
    /// Catalog ID. Optional because peers may omit it on the wire.
    pub id: Option<ProductId>,
    /// Product title
    pub title: String,
    /// Unit price
    pub price: f64,
    /// Image URL
    pub image: String,
}

impl From<&Product> for ProductRef {
    fn from(product: &Product) -> Self {
        Self {
            id: Some(product.id),
            title: product.title.clone(),
            price: product.price,
            image: product.image.clone(),
        }
    }
}

/// What happened, with the product where one is involved.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// `add_to_cart`
    AddToCart(ProductRef),
    /// `remove_from_cart`
    RemoveFromCart(ProductRef),
    /// `purchase_cart`
    PurchaseCart,
}

impl EventKind {
    /// The action tag of this kind.
    #[must_use]
    pub const fn action(&self) -> Action {
        match self {
            Self::AddToCart(_) => Action::AddToCart,
            Self::RemoveFromCart(_) => Action::RemoveFromCart,
            Self::PurchaseCart => Action::PurchaseCart,
        }
    }

    /// The product involved, absent for purchases.
    #[must_use]
    pub const fn product(&self) -> Option<&ProductRef> {
        match self {
            Self::AddToCart(product) | Self::RemoveFromCart(product) => Some(product),
            Self::PurchaseCart => None,
        }
    }
}

/// Immutable record of one customer action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireEvent", try_from = "WireEvent")]
pub struct Event {
    event_id: EventId,
    customer_id: CustomerId,
    kind: EventKind,
    description: String,
    timestamp: DateTime<Utc>,
}

impl Event {
    /// Assemble an event from its parts.
    ///
    /// Used when decoding; generated events use [`Event::added`],
    /// [`Event::removed`] and [`Event::purchased`].
    #[must_use]
    pub const fn from_parts(
        event_id: EventId,
        customer_id: CustomerId,
        kind: EventKind,
        description: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id,
            customer_id,
            kind,
            description,
            timestamp,
        }
    }

    /// A fresh `add_to_cart` event.
    #[must_use]
    pub fn added(customer_id: CustomerId, product: &Product, timestamp: DateTime<Utc>) -> Self {
        Self::from_parts(
            EventId::generate(),
            customer_id,
            EventKind::AddToCart(product.into()),
            format!("Added {} to cart.", product.title),
            timestamp,
        )
    }

    /// A fresh `remove_from_cart` event.
    #[must_use]
    pub fn removed(customer_id: CustomerId, product: &Product, timestamp: DateTime<Utc>) -> Self {
        Self::from_parts(
            EventId::generate(),
            customer_id,
            EventKind::RemoveFromCart(product.into()),
            format!("Removed {} from cart.", product.title),
            timestamp,
        )
    }

    /// A fresh `purchase_cart` event.
    #[must_use]
    pub fn purchased(customer_id: CustomerId, timestamp: DateTime<Utc>) -> Self {
        Self::from_parts(
            EventId::generate(),
            customer_id,
            EventKind::PurchaseCart,
            PURCHASE_DESCRIPTION.to_string(),
            timestamp,
        )
    }

    /// Event identifier.
    #[must_use]
    pub const fn event_id(&self) -> &EventId {
        &self.event_id
    }

    /// Customer who acted.
    #[must_use]
    pub const fn customer_id(&self) -> &CustomerId {
        &self.customer_id
    }

    /// What happened.
    #[must_use]
    pub const fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Action tag.
    #[must_use]
    pub const fn action(&self) -> Action {
        self.kind.action()
    }

    /// Product involved, absent for purchases.
    #[must_use]
    pub const fn product(&self) -> Option<&ProductRef> {
        self.kind.product()
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// When the action happened (virtual time for generated events).
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Encode as a wire JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Encode`] if serialization fails.
    pub fn to_json(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Encode)
    }

    /// Decode a wire JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Decode`] for anything that is not a well-formed
    /// event record.
    pub fn from_json(text: &str) -> Result<Self, WireError> {
        serde_json::from_str(text).map_err(WireError::Decode)
    }

    /// Decode a wire JSON payload given as bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Decode`] for anything that is not a well-formed
    /// event record.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(bytes).map_err(WireError::Decode)
    }
}
