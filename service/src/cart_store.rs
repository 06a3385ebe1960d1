//! Per-user cart state in the fast store.
//!
//! Each cart is one hash at `cart:{user_id}`; fields are product ids and values
//! are JSON-encoded lines. The hash is the source of truth for what a user is
//! shopping right now. Every successful mutation refreshes the hash expiry and
//! queues a mirror write; the mirror is never read on the request path.

use crate::backup::{BackupJob, BackupQueue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use storefront_core::cart::CartEntry;
use storefront_core::error::{Result, StorefrontError};
use storefront_core::ids::{ProductId, UserId};
use storefront_core::providers::{CartBackend, CartMirror};
use tracing::Span;

/// `cart:{user_id}`
#[must_use]
pub fn cart_key(user_id: UserId) -> String {
    format!("cart:{user_id}")
}

/// Compare-and-set attempts before a contended line update gives up.
const MAX_SWAP_ATTEMPTS: u32 = 64;

/// The line after setting its quantity; `None` when the quantity removes it.
fn with_quantity(
    existing: Option<CartEntry>,
    user_id: UserId,
    product_id: ProductId,
    quantity: i32,
    description: Option<&str>,
    now: DateTime<Utc>,
) -> Option<CartEntry> {
    if quantity <= 0 {
        return None;
    }
    let entry = match existing {
        Some(mut entry) => {
            entry.quantity = quantity;
            if let Some(description) = description {
                entry.description = description.to_string();
            }
            entry.updated_at = now;
            entry
        },
        None => CartEntry {
            user_id,
            product_id,
            quantity,
            description: description.unwrap_or_default().to_string(),
            checked: false,
            created_at: now,
            updated_at: now,
        },
    };
    Some(entry)
}

/// Encoded form of a line inside the cart hash.
#[derive(Debug, Serialize, Deserialize)]
struct StoredLine {
    quantity: i32,
    #[serde(default)]
    description: String,
    #[serde(default)]
    checked: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StoredLine {
    fn from_entry(entry: &CartEntry) -> Self {
        Self {
            quantity: entry.quantity,
            description: entry.description.clone(),
            checked: entry.checked,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        }
    }

    fn into_entry(self, user_id: UserId, product_id: ProductId) -> CartEntry {
        CartEntry {
            user_id,
            product_id,
            quantity: self.quantity,
            description: self.description,
            checked: self.checked,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Cart hashes plus the mirror queue.
#[derive(Clone)]
pub struct CartStore<B> {
    backend: B,
    backups: BackupQueue,
    ttl: Duration,
    span: Span,
}

impl<B: CartBackend> CartStore<B> {
    /// Create a store whose carts expire `ttl` after their last mutation.
    #[must_use]
    pub const fn new(backend: B, backups: BackupQueue, ttl: Duration, span: Span) -> Self {
        Self {
            backend,
            backups,
            ttl,
            span,
        }
    }

    /// Add `delta` to the line's quantity, creating the line if needed.
    ///
    /// A resulting quantity of zero or less removes the line and returns
    /// `None`. `description: None` keeps the stored description. Concurrent
    /// adds to the same line all land; none overwrites another.
    ///
    /// # Errors
    ///
    /// Returns `Cache` if the fast store fails, `Validation` on quantity
    /// overflow and `Conflict` if the line stays contended.
    pub async fn add_or_accumulate(
        &self,
        user_id: UserId,
        product_id: ProductId,
        delta: i32,
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<CartEntry>> {
        self.update_line(user_id, product_id, |existing| {
            let current = existing.as_ref().map_or(0, |e| e.quantity);
            let quantity = current
                .checked_add(delta)
                .ok_or_else(|| StorefrontError::Validation("quantity out of range".to_string()))?;
            Ok(with_quantity(existing, user_id, product_id, quantity, description, now))
        })
        .await
    }

    /// Replace the line's quantity. Zero or less removes the line.
    ///
    /// # Errors
    ///
    /// Returns `Cache` if the fast store fails and `Conflict` if the line
    /// stays contended.
    pub async fn set_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<CartEntry>> {
        if quantity <= 0 {
            self.remove(user_id, product_id).await?;
            return Ok(None);
        }
        self.update_line(user_id, product_id, |existing| {
            Ok(with_quantity(existing, user_id, product_id, quantity, description, now))
        })
        .await
    }

    /// Remove one line. A missing line is not an error.
    ///
    /// # Errors
    ///
    /// Returns `Cache` if the fast store fails.
    pub async fn remove(&self, user_id: UserId, product_id: ProductId) -> Result<()> {
        self.backend
            .remove_field(&cart_key(user_id), &product_id.to_string(), self.ttl)
            .await?;
        self.record_write(user_id, product_id, None);
        Ok(())
    }

    /// Read one line.
    ///
    /// An undecodable line reads as absent.
    ///
    /// # Errors
    ///
    /// Returns `Cache` if the fast store fails.
    pub async fn get(&self, user_id: UserId, product_id: ProductId) -> Result<Option<CartEntry>> {
        let raw = self
            .backend
            .field(&cart_key(user_id), &product_id.to_string())
            .await?;
        Ok(raw.and_then(|json| self.decode(user_id, product_id, &json)))
    }

    /// Read every line of a cart, keyed by product.
    ///
    /// Lines that fail to decode are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns `Cache` if the fast store fails.
    pub async fn get_all(&self, user_id: UserId) -> Result<BTreeMap<ProductId, CartEntry>> {
        let fields = self.backend.fields(&cart_key(user_id)).await?;
        let mut entries = BTreeMap::new();
        for (field, json) in fields {
            let Ok(product_id) = field.parse::<ProductId>() else {
                tracing::warn!(
                    parent: &self.span,
                    user_id = %user_id,
                    field,
                    "Skipping cart field with invalid product id"
                );
                continue;
            };
            if let Some(entry) = self.decode(user_id, product_id, &json) {
                entries.insert(product_id, entry);
            }
        }
        Ok(entries)
    }

    /// Set the selection flag of an existing line.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the line does not exist and `Cache` if the fast
    /// store fails.
    pub async fn set_checked(
        &self,
        user_id: UserId,
        product_id: ProductId,
        checked: bool,
        now: DateTime<Utc>,
    ) -> Result<CartEntry> {
        let updated = self
            .update_line(user_id, product_id, |existing| {
                let mut entry = existing.ok_or_else(|| StorefrontError::NotFound {
                    entity: "cart item",
                    id: product_id.to_string(),
                })?;
                entry.checked = checked;
                entry.updated_at = now;
                Ok(Some(entry))
            })
            .await?;
        updated.ok_or_else(|| StorefrontError::Internal("checked line vanished".to_string()))
    }

    /// Rebuild a cart from the relational mirror after fast-store data loss.
    ///
    /// Writes every mirrored line in one pipeline and returns how many were
    /// restored. Administrative only; the request path never reads the mirror.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the mirror cannot be read and `Cache` if the fast
    /// store fails.
    pub async fn restore_from_mirror<M: CartMirror>(
        &self,
        mirror: &M,
        user_id: UserId,
    ) -> Result<usize> {
        let entries = mirror.load(user_id).await?;
        let mut fields = Vec::with_capacity(entries.len());
        for entry in entries.iter().filter(|e| e.quantity > 0) {
            let json = serde_json::to_string(&StoredLine::from_entry(entry))?;
            fields.push((entry.product_id.to_string(), json));
        }
        if fields.is_empty() {
            return Ok(0);
        }
        self.backend
            .put_fields(&cart_key(user_id), &fields, self.ttl)
            .await?;
        tracing::info!(
            parent: &self.span,
            user_id = %user_id,
            restored = fields.len(),
            "Cart restored from mirror"
        );
        Ok(fields.len())
    }

    /// Read-modify-write one line with a compare-and-set, retrying when another
    /// writer changed the line in between. `apply` returning `None` removes it.
    async fn update_line<F>(
        &self,
        user_id: UserId,
        product_id: ProductId,
        mut apply: F,
    ) -> Result<Option<CartEntry>>
    where
        F: FnMut(Option<CartEntry>) -> Result<Option<CartEntry>> + Send,
    {
        let key = cart_key(user_id);
        let field = product_id.to_string();
        for attempt in 1..=MAX_SWAP_ATTEMPTS {
            let raw = self.backend.field(&key, &field).await?;
            let existing = raw
                .as_deref()
                .and_then(|json| self.decode(user_id, product_id, json));
            let next = apply(existing)?;
            let encoded = next
                .as_ref()
                .map(|entry| serde_json::to_string(&StoredLine::from_entry(entry)))
                .transpose()?;

            let swapped = self
                .backend
                .swap_field(&key, &field, raw.as_deref(), encoded.as_deref(), self.ttl)
                .await?;
            if swapped {
                self.record_write(user_id, product_id, next.as_ref());
                return Ok(next);
            }
            tracing::debug!(
                parent: &self.span,
                user_id = %user_id,
                product_id = %product_id,
                attempt,
                "Cart line changed underneath, retrying"
            );
        }
        Err(StorefrontError::Conflict(format!(
            "cart line {product_id} changed {MAX_SWAP_ATTEMPTS} times during update"
        )))
    }

    fn record_write(&self, user_id: UserId, product_id: ProductId, entry: Option<&CartEntry>) {
        match entry {
            Some(entry) => {
                self.backups.submit(BackupJob::Upsert(entry.clone()));
                tracing::debug!(
                    parent: &self.span,
                    user_id = %user_id,
                    product_id = %product_id,
                    quantity = entry.quantity,
                    "Cart line stored"
                );
            },
            None => {
                self.backups.submit(BackupJob::Delete {
                    user_id,
                    product_id,
                });
                tracing::debug!(
                    parent: &self.span,
                    user_id = %user_id,
                    product_id = %product_id,
                    "Cart line removed"
                );
            },
        }
    }

    fn decode(&self, user_id: UserId, product_id: ProductId, json: &str) -> Option<CartEntry> {
        match serde_json::from_str::<StoredLine>(json) {
            Ok(line) => Some(line.into_entry(user_id, product_id)),
            Err(e) => {
                tracing::warn!(
                    parent: &self.span,
                    user_id = %user_id,
                    product_id = %product_id,
                    error = %e,
                    "Skipping undecodable cart line"
                );
                None
            },
        }
    }
}
