//! Product catalog types.

use crate::error::{Result, StorefrontError};
use crate::ids::{ProductId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimum product name length (characters).
pub const NAME_MIN_LEN: usize = 3;
/// Maximum product name length (characters).
pub const NAME_MAX_LEN: usize = 100;

/// A product as stored in the relational store and mirrored in the cache.
///
/// `price` is in minor currency units. `stock` never goes negative: every
/// decrement path is a conditional update in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product identity.
    pub id: ProductId,
    /// Owning seller.
    pub seller_id: UserId,
    /// Display name.
    pub name: String,
    /// Unit price in minor currency units.
    pub price: i64,
    /// Units on hand.
    pub stock: i32,
    /// Discount in percent (0..=100).
    pub discount: i32,
    /// Category.
    #[serde(rename = "type")]
    pub product_type: String,
    /// Free-text description.
    pub description: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Product {
    /// Build a new product from a validated draft.
    #[must_use]
    pub fn from_draft(
        id: ProductId,
        seller_id: UserId,
        draft: ProductDraft,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            seller_id,
            name: draft.name,
            price: draft.price,
            stock: draft.stock,
            discount: draft.discount,
            product_type: draft.product_type,
            description: draft.description,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Overwrite the mutable attributes with those of `draft`.
    pub fn apply(&mut self, draft: ProductDraft, now: DateTime<Utc>) {
        self.name = draft.name;
        self.price = draft.price;
        self.stock = draft.stock;
        self.discount = draft.discount;
        self.product_type = draft.product_type;
        self.description = draft.description;
        self.updated_at = now;
    }

    /// Whether the product has been soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the given user may modify this product.
    #[must_use]
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.seller_id == user
    }
}

/// Seller-supplied product attributes for create and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDraft {
    /// Display name.
    pub name: String,
    /// Unit price in minor currency units.
    pub price: i64,
    /// Units on hand.
    pub stock: i32,
    /// Discount in percent.
    #[serde(default)]
    pub discount: i32,
    /// Category.
    #[serde(rename = "type")]
    pub product_type: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
}

impl ProductDraft {
    /// Validate the draft.
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let name_len = self.name.trim().chars().count();
        if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&name_len) {
            return Err(StorefrontError::Validation(format!(
                "name must be between {NAME_MIN_LEN} and {NAME_MAX_LEN} characters"
            )));
        }
        if self.price <= 0 {
            return Err(StorefrontError::Validation("price must be greater than zero".into()));
        }
        if self.stock < 0 {
            return Err(StorefrontError::Validation("stock cannot be negative".into()));
        }
        if !(0..=100).contains(&self.discount) {
            return Err(StorefrontError::Validation("discount must be between 0 and 100".into()));
        }
        if self.product_type.is_empty() {
            return Err(StorefrontError::Validation("type is required".into()));
        }
        if !self.product_type.chars().all(char::is_alphabetic) {
            return Err(StorefrontError::Validation("type must contain letters only".into()));
        }
        Ok(())
    }
}

/// One line of a batch stock adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    /// Product to adjust.
    pub product_id: ProductId,
    /// Units to add or remove (always positive).
    pub quantity: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> ProductDraft {
        ProductDraft {
            name: "Espresso Cup".into(),
            price: 1250,
            stock: 10,
            discount: 0,
            product_type: "Kitchen".into(),
            description: "Porcelain".into(),
        }
    }

    #[test]
    fn valid_draft_passes() {
        assert!(draft().validate().is_ok());
    }

    #[test]
    fn rejects_short_name() {
        let d = ProductDraft { name: "ab".into(), ..draft() };
        assert!(matches!(d.validate(), Err(StorefrontError::Validation(_))));
    }

    #[test]
    fn rejects_non_positive_price() {
        let d = ProductDraft { price: 0, ..draft() };
        assert!(d.validate().is_err());
    }

    #[test]
    fn rejects_negative_stock_and_bad_discount() {
        assert!(ProductDraft { stock: -1, ..draft() }.validate().is_err());
        assert!(ProductDraft { discount: 101, ..draft() }.validate().is_err());
    }

    #[test]
    fn type_must_be_alphabetic() {
        assert!(ProductDraft { product_type: "Kitchen2".into(), ..draft() }.validate().is_err());
        assert!(ProductDraft { product_type: String::new(), ..draft() }.validate().is_err());
    }

    #[test]
    fn apply_keeps_identity_and_creation_time() {
        let created = Utc::now();
        let mut product = Product::from_draft(ProductId::new(), UserId::new(), draft(), created);
        let id = product.id;
        let later = created + chrono::Duration::minutes(5);
        product.apply(ProductDraft { price: 999, ..draft() }, later);
        assert_eq!(product.id, id);
        assert_eq!(product.created_at, created);
        assert_eq!(product.updated_at, later);
        assert_eq!(product.price, 999);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn non_positive_price_never_validates(price in i64::MIN..=0) {
                let candidate = ProductDraft { price, ..draft() };
                prop_assert!(candidate.validate().is_err());
            }

            #[test]
            fn discount_in_range_validates(discount in 0_i32..=100) {
                let candidate = ProductDraft { discount, ..draft() };
                prop_assert!(candidate.validate().is_ok());
            }
        }
    }
}
