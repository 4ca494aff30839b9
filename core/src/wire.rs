//! Wire format - the flat JSON record exchanged over the broker connection.
//!
//! ```json
//! {
//!   "event_id": "5b0c0b1e-...",
//!   "customer_id": "42",
//!   "action": "add_to_cart",
//!   "timestamp": "2024-03-01T12:00:00+00:00",
//!   "description": "Added Backpack to cart.",
//!   "product_id": 7,
//!   "title": "Backpack",
//!   "product_price": 19.99,
//!   "product_image": "https://img/7.jpg"
//! }
//! ```
//!
//! The product fields are present for `add_to_cart` / `remove_from_cart` and
//! absent for `purchase_cart`. `product_id` is optional even on add/remove.
//! Timestamps are emitted as RFC 3339; ISO-8601 text without an offset is
//! accepted and read as UTC.

use crate::catalog::ProductId;
use crate::customer::CustomerId;
use crate::event::{Action, Event, EventId, EventKind, ProductRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors converting between events and their wire form.
#[derive(Error, Debug)]
pub enum WireError {
    /// Payload is not a well-formed event record.
    #[error("Failed to decode event: {0}")]
    Decode(#[source] serde_json::Error),

    /// Event could not be serialized.
    #[error("Failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),

    /// An add/remove record lacks one of its product fields.
    #[error("{action} event is missing `{field}`")]
    MissingProductField {
        /// The action of the offending record
        action: Action,
        /// Name of the missing field
        field: &'static str,
    },

    /// A required text field is empty.
    #[error("`{0}` must not be empty")]
    EmptyField(&'static str),
}

/// The flat wire record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    /// Globally unique event ID
    pub event_id: String,
    /// Customer who acted
    pub customer_id: String,
    /// Action tag
    pub action: Action,
    /// When the action happened
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,
    /// Human-readable description
    pub description: String,
    /// Catalog ID of the product
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ProductId>,
    /// Product title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Product unit price
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_price: Option<f64>,
    /// Product image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_image: Option<String>,
}

impl From<Event> for WireEvent {
    fn from(event: Event) -> Self {
        let action = event.action();
        let product = event.product().cloned();
        Self {
            event_id: event.event_id().as_str().to_string(),
            customer_id: event.customer_id().as_str().to_string(),
            action,
            timestamp: event.timestamp(),
            description: event.description().to_string(),
            product_id: product.as_ref().and_then(|p| p.id),
            title: product.as_ref().map(|p| p.title.clone()),
            product_price: product.as_ref().map(|p| p.price),
            product_image: product.map(|p| p.image),
        }
    }
}

impl TryFrom<WireEvent> for Event {
    type Error = WireError;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        if wire.event_id.is_empty() {
            return Err(WireError::EmptyField("event_id"));
        }
        if wire.customer_id.is_empty() {
            return Err(WireError::EmptyField("customer_id"));
        }

        let kind = match wire.action {
            Action::AddToCart => EventKind::AddToCart(product_ref(&wire)?),
            Action::RemoveFromCart => EventKind::RemoveFromCart(product_ref(&wire)?),
            Action::PurchaseCart => EventKind::PurchaseCart,
        };

        Ok(Self::from_parts(
            EventId::new(wire.event_id),
            CustomerId::new(wire.customer_id),
            kind,
            wire.description,
            wire.timestamp,
        ))
    }
}

fn product_ref(wire: &WireEvent) -> Result<ProductRef, WireError> {
    let missing = |field| WireError::MissingProductField {
        action: wire.action,
        field,
    };

    Ok(ProductRef {
        id: wire.product_id,
        title: wire.title.clone().ok_or_else(|| missing("title"))?,
        price: wire.product_price.ok_or_else(|| missing("product_price"))?,
        image: wire.product_image.clone().ok_or_else(|| missing("product_image"))?,
    })
}

/// ISO-8601 timestamps: RFC 3339 out, RFC 3339 or offset-less in.
mod iso8601 {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        if let Ok(parsed) = DateTime::parse_from_rfc3339(&text) {
            return Ok(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| D::Error::custom(format!("invalid ISO-8601 timestamp `{text}`: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::catalog::Product;
    use crate::event::PURCHASE_DESCRIPTION;
    use chrono::TimeZone;
    use serde_json::{Value, json};

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn add_event_wire_shape() {
        let product = Product::new(ProductId::new(7), "Backpack", 19.99, "d", "https://img/7.jpg");
        let event = Event::added(CustomerId::new("c1"), &product, at());
        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();

        assert_eq!(value["customer_id"], "c1");
        assert_eq!(value["action"], "add_to_cart");
        assert_eq!(value["timestamp"], "2024-03-01T12:00:00+00:00");
        assert_eq!(value["title"], "Backpack");
        assert_eq!(value["product_price"], 19.99);
        assert_eq!(value["product_image"], "https://img/7.jpg");
        assert_eq!(value["product_id"], 7);
    }

    #[test]
    fn purchase_event_omits_product_fields() {
        let event = Event::purchased(CustomerId::new("c1"), at());
        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(value["description"], PURCHASE_DESCRIPTION);
        for field in ["product_id", "title", "product_price", "product_image"] {
            assert!(!object.contains_key(field), "{field} should be absent");
        }
    }

    #[test]
    fn decodes_record_without_product_id() {
        let text = json!({
            "event_id": "e-1",
            "customer_id": "17",
            "action": "remove_from_cart",
            "timestamp": "2024-01-05T08:30:00+00:00",
            "description": "Removed Mug from cart.",
            "title": "Mug",
            "product_price": 4.5,
            "product_image": "https://img/m.jpg"
        })
        .to_string();

        let event = Event::from_json(&text).unwrap();
        assert_eq!(event.action(), Action::RemoveFromCart);
        let product = event.product().unwrap();
        assert_eq!(product.id, None);
        assert_eq!(product.title, "Mug");
    }

    #[test]
    fn accepts_timestamp_without_offset() {
        let text = json!({
            "event_id": "e-2",
            "customer_id": "17",
            "action": "purchase_cart",
            "timestamp": "2024-01-05T08:30:00.250",
            "description": "Purchased the cart."
        })
        .to_string();

        let event = Event::from_json(&text).unwrap();
        assert_eq!(
            event.timestamp(),
            Utc.with_ymd_and_hms(2024, 1, 5, 8, 30, 0).unwrap() + chrono::Duration::milliseconds(250)
        );
    }

    #[test]
    fn purchase_ignores_stray_product_fields() {
        let text = json!({
            "event_id": "e-3",
            "customer_id": "17",
            "action": "purchase_cart",
            "timestamp": "2024-01-05T08:30:00Z",
            "description": "Purchased the cart.",
            "title": "Mug"
        })
        .to_string();

        let event = Event::from_json(&text).unwrap();
        assert!(event.product().is_none());
    }

    #[test]
    fn rejects_unknown_action() {
        let text = json!({
            "event_id": "e-4",
            "customer_id": "17",
            "action": "checkout",
            "timestamp": "2024-01-05T08:30:00Z",
            "description": "?"
        })
        .to_string();

        assert!(matches!(Event::from_json(&text), Err(WireError::Decode(_))));
    }

    #[test]
    fn rejects_add_without_title() {
        let text = json!({
            "event_id": "e-5",
            "customer_id": "17",
            "action": "add_to_cart",
            "timestamp": "2024-01-05T08:30:00Z",
            "description": "Added ? to cart.",
            "product_price": 1.0,
            "product_image": "x"
        })
        .to_string();

        let err = Event::from_json(&text).unwrap_err();
        assert!(err.to_string().contains("title"), "{err}");
    }

    #[test]
    fn rejects_non_json() {
        assert!(Event::from_json("not json").is_err());
        assert!(Event::from_json_bytes(&[0xff, 0x00]).is_err());
    }

    #[test]
    fn decode_preserves_identity() {
        let product = Product::new(ProductId::new(3), "Lamp", 30.0, "d", "i");
        let event = Event::removed(CustomerId::new("c9"), &product, at());
        let decoded = Event::from_json(&event.to_json().unwrap()).unwrap();
        assert_eq!(decoded, event);
    }
}
