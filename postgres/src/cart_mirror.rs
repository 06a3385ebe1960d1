//! Relational cart mirror.
//!
//! Written only by the background backup workers and read only when restoring
//! a cart after fast-store data loss.

use crate::PostgresStore;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use storefront_core::cart::CartEntry;
use storefront_core::error::{Result, StorefrontError};
use storefront_core::ids::{ProductId, UserId};
use storefront_core::providers::CartMirror;
use uuid::Uuid;

#[derive(Debug, FromRow)]
struct CartRow {
    user_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    description: String,
    checked: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CartRow> for CartEntry {
    fn from(row: CartRow) -> Self {
        Self {
            user_id: UserId(row.user_id),
            product_id: ProductId(row.product_id),
            quantity: row.quantity,
            description: row.description,
            checked: row.checked,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl CartMirror for PostgresStore {
    async fn upsert(&self, entry: &CartEntry) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO cart
                (user_id, product_id, quantity, description, checked, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, product_id) DO UPDATE
            SET quantity = EXCLUDED.quantity,
                description = EXCLUDED.description,
                checked = EXCLUDED.checked,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(entry.user_id.0)
        .bind(entry.product_id.0)
        .bind(entry.quantity)
        .bind(&entry.description)
        .bind(entry.checked)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorefrontError::Database(format!("Failed to back up cart item: {e}")))?;
        Ok(())
    }

    async fn delete(&self, user_id: UserId, product_id: ProductId) -> Result<()> {
        sqlx::query("DELETE FROM cart WHERE user_id = $1 AND product_id = $2")
            .bind(user_id.0)
            .bind(product_id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StorefrontError::Database(format!("Failed to delete cart backup: {e}")))?;
        Ok(())
    }

    async fn load(&self, user_id: UserId) -> Result<Vec<CartEntry>> {
        let rows: Vec<CartRow> = sqlx::query_as(
            r"
            SELECT user_id, product_id, quantity, description, checked, created_at, updated_at
            FROM cart
            WHERE user_id = $1
            ORDER BY created_at
            ",
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorefrontError::Database(format!("Failed to load cart backup: {e}")))?;

        Ok(rows.into_iter().map(CartEntry::from).collect())
    }
}
