//! Order types.

use crate::ids::{OrderId, OrderItemId, ProductId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order lifecycle state.
///
/// Only `Pending` is produced by checkout; later transitions belong to
/// fulfilment systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Created, awaiting payment/fulfilment.
    Pending,
}

impl OrderStatus {
    /// Column value used by the relational store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order identity.
    pub id: OrderId,
    /// Purchasing user.
    pub user_id: UserId,
    /// Sum of `quantity * price` over all items.
    pub total_amount: i64,
    /// Lifecycle state.
    pub status: OrderStatus,
    /// When checkout happened.
    pub order_date: DateTime<Utc>,
    /// Order lines.
    pub items: Vec<OrderItem>,
}

impl Order {
    /// A fresh pending order with no lines and a zero total.
    #[must_use]
    pub const fn pending(id: OrderId, user_id: UserId, order_date: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            total_amount: 0,
            status: OrderStatus::Pending,
            order_date,
            items: Vec::new(),
        }
    }
}

/// One line of an order. `price` is copied at checkout time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Line identity.
    pub id: OrderItemId,
    /// Owning order.
    pub order_id: OrderId,
    /// Purchased product.
    pub product_id: ProductId,
    /// Units purchased.
    pub quantity: i32,
    /// Unit price at the time of purchase.
    pub price: i64,
}
