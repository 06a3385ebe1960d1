//! Domain events and their wire envelope.
//!
//! Events are facts about things that already happened. They leave the service
//! through the [`EventBus`](crate::event_bus::EventBus) as JSON so that consumers
//! written in any language can read them.
//!
//! # Example
//!
//! ```
//! use storefront_core::event::{Event, SerializedEvent};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! struct PriceChanged { product_id: String, price: i64 }
//!
//! impl Event for PriceChanged {
//!     fn event_type(&self) -> &'static str {
//!         "PriceChanged.v1"
//!     }
//! }
//!
//! let event = PriceChanged { product_id: "p-1".into(), price: 990 };
//! let serialized = SerializedEvent::from_event(&event, None).unwrap();
//! assert_eq!(serialized.event_type, "PriceChanged.v1");
//! ```

use crate::ids::{OrderId, ProductId, UserId};
use crate::order::Order;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Error types for event operations.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),
}

/// An event that can be published to the event bus.
///
/// `event_type()` returns a stable identifier with a version suffix
/// (`"OrderCreated.v1"`) so consumers can route and evolve schemas.
pub trait Event: Send + Sync + 'static {
    /// Returns the event type identifier for this event.
    fn event_type(&self) -> &'static str;

    /// Serialize this event to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    fn to_bytes(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize,
    {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Deserialize an event from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if the bytes do not describe this event.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        serde_json::from_slice(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// A serialized event ready for publishing.
#[derive(Clone, Debug)]
pub struct SerializedEvent {
    /// The event type identifier (e.g., "OrderCreated.v1").
    pub event_type: String,

    /// The JSON-serialized event data.
    pub data: Vec<u8>,

    /// Optional metadata, published as message headers.
    ///
    /// Common fields: `correlation_id`, `user_id`.
    pub metadata: Option<serde_json::Value>,
}

impl SerializedEvent {
    /// Create a new serialized event.
    #[must_use]
    pub const fn new(
        event_type: String,
        data: Vec<u8>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_type,
            data,
            metadata,
        }
    }

    /// Create a serialized event from an [`Event`].
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    pub fn from_event<E: Event + Serialize>(
        event: &E,
        metadata: Option<serde_json::Value>,
    ) -> Result<Self, EventError> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            data: event.to_bytes()?,
            metadata,
        })
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SerializedEvent {{ type: {}, size: {} bytes }}",
            self.event_type,
            self.data.len()
        )
    }
}

/// Emitted once an order has been committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    /// The new order.
    pub order_id: OrderId,
    /// Purchasing user.
    pub user_id: UserId,
    /// Order total in minor currency units.
    pub total_amount: i64,
    /// Checkout time.
    pub order_date: DateTime<Utc>,
    /// Purchased products, in order-line order.
    pub product_ids: Vec<ProductId>,
    /// Units purchased per product.
    pub quantities: BTreeMap<ProductId, i32>,
}

impl OrderCreated {
    /// Describe a committed order.
    #[must_use]
    pub fn from_order(order: &Order) -> Self {
        let mut quantities = BTreeMap::new();
        for item in &order.items {
            *quantities.entry(item.product_id).or_insert(0) += item.quantity;
        }
        Self {
            order_id: order.id,
            user_id: order.user_id,
            total_amount: order.total_amount,
            order_date: order.order_date,
            product_ids: order.items.iter().map(|item| item.product_id).collect(),
            quantities,
        }
    }
}

impl Event for OrderCreated {
    fn event_type(&self) -> &'static str {
        "OrderCreated.v1"
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ids::OrderItemId;
    use crate::order::OrderItem;

    #[test]
    fn order_created_lists_products_and_quantities() {
        let product = ProductId::new();
        let mut order = Order::pending(OrderId::new(), UserId::new(), Utc::now());
        order.items.push(OrderItem {
            id: OrderItemId::new(),
            order_id: order.id,
            product_id: product,
            quantity: 7,
            price: 500,
        });
        order.total_amount = 3500;

        let event = OrderCreated::from_order(&order);
        assert_eq!(event.product_ids, vec![product]);
        assert_eq!(event.quantities.get(&product), Some(&7));
        assert_eq!(event.total_amount, 3500);
    }

    #[test]
    fn order_created_wire_format_uses_snake_case_fields() {
        let order = Order::pending(OrderId::new(), UserId::new(), Utc::now());
        let serialized = SerializedEvent::from_event(&OrderCreated::from_order(&order), None)
            .expect("serialization should succeed");
        let json: serde_json::Value =
            serde_json::from_slice(&serialized.data).expect("payload is JSON");

        assert_eq!(serialized.event_type, "OrderCreated.v1");
        assert_eq!(json["order_id"], serde_json::json!(order.id.to_string()));
        assert!(json.get("quantities").is_some());
        assert!(json.get("product_ids").is_some());
    }

    #[test]
    fn serialized_event_display() {
        let serialized =
            SerializedEvent::new("OrderCreated.v1".to_string(), vec![1, 2, 3, 4, 5], None);

        let display = format!("{serialized}");
        assert!(display.contains("OrderCreated.v1"));
        assert!(display.contains("5 bytes"));
    }
}
