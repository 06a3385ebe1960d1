//! Cart types.
//!
//! A cart line is identified solely by the `(user_id, product_id)` pair. It has
//! no identity of its own; the fast store keys it by user hash and product field.

use crate::ids::{ProductId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single line in a user's in-progress cart.
///
/// `quantity` is always at least 1: any mutation that would leave it at zero or
/// below removes the line instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartEntry {
    /// Cart owner.
    pub user_id: UserId,
    /// Referenced product (weak reference, validated at use time).
    pub product_id: ProductId,
    /// Units in the cart.
    pub quantity: i32,
    /// Free-text note attached by the shopper.
    pub description: String,
    /// Whether the line is selected.
    pub checked: bool,
    /// When the line was first added.
    pub created_at: DateTime<Utc>,
    /// When the line was last modified.
    pub updated_at: DateTime<Utc>,
}

/// A cart line joined with live product and seller data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    /// Product identifier.
    pub product_id: ProductId,
    /// Product display name.
    pub product_name: String,
    /// Current unit price.
    pub price: i64,
    /// Current stock.
    pub stock: i32,
    /// Owning seller.
    pub seller_id: UserId,
    /// Seller display name from the account service.
    pub seller_name: String,
    /// Units in the cart.
    pub quantity: i32,
    /// Shopper note.
    pub description: String,
    /// Selection flag.
    pub checked: bool,
}

/// Point-in-time view of a cart, recomputed on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializedCart {
    /// Cart owner.
    pub user_id: UserId,
    /// Enriched lines, oldest first.
    pub items: Vec<CartItem>,
    /// Number of lines in `items` (not the sum of quantities).
    pub total_items: usize,
}

impl MaterializedCart {
    /// A cart with no lines.
    #[must_use]
    pub const fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            items: Vec::new(),
            total_items: 0,
        }
    }

    /// Build a cart from enriched lines.
    #[must_use]
    pub fn new(user_id: UserId, items: Vec<CartItem>) -> Self {
        let total_items = items.len();
        Self {
            user_id,
            items,
            total_items,
        }
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_items_counts_lines_not_units() {
        let user = UserId::new();
        let line = |quantity| CartItem {
            product_id: ProductId::new(),
            product_name: "Tea".into(),
            price: 300,
            stock: 50,
            seller_id: UserId::new(),
            seller_name: "Leaf & Co".into(),
            quantity,
            description: String::new(),
            checked: false,
        };
        let cart = MaterializedCart::new(user, vec![line(4), line(9)]);
        assert_eq!(cart.total_items, 2);
        assert!(!cart.is_empty());
        assert!(MaterializedCart::empty(user).is_empty());
    }
}
