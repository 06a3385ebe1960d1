//! Checkout and stock-adjustment transactions.

use crate::PostgresStore;
use crate::products::ProductRow;
use sqlx::{Postgres, Transaction};
use storefront_core::error::{Result, StorefrontError};
use storefront_core::ids::ProductId;
use storefront_core::order::{Order, OrderItem};
use storefront_core::product::Product;
use storefront_core::providers::{StoreTransaction, TransactionalStore};

/// An open `PostgreSQL` transaction.
///
/// Dropping it without calling [`commit`](StoreTransaction::commit) rolls back.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl TransactionalStore for PostgresStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorefrontError::Database(format!("Failed to begin transaction: {e}")))?;
        Ok(PostgresTransaction { tx })
    }
}

impl StoreTransaction for PostgresTransaction {
    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO orders (id, user_id, total_amount, status, order_date)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(order.id.0)
        .bind(order.user_id.0)
        .bind(order.total_amount)
        .bind(order.status.as_str())
        .bind(order.order_date)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| StorefrontError::Database(format!("Failed to create order: {e}")))?;
        Ok(())
    }

    async fn insert_order_item(&mut self, item: &OrderItem) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO order_items (id, order_id, product_id, quantity, price)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(item.id.0)
        .bind(item.order_id.0)
        .bind(item.product_id.0)
        .bind(item.quantity)
        .bind(item.price)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| StorefrontError::Database(format!("Failed to create order item: {e}")))?;
        Ok(())
    }

    async fn decrement_stock(&mut self, product_id: ProductId, quantity: i32) -> Result<Product> {
        // Conditional decrement: the row lock serializes concurrent checkouts and
        // the WHERE clause refuses to go below zero.
        let row: Option<ProductRow> = sqlx::query_as(
            r"
            UPDATE products
            SET stock = stock - $2, updated_at = now()
            WHERE id = $1 AND stock >= $2 AND deleted_at IS NULL
            RETURNING id, seller_id, name, price, stock, discount, product_type,
                      description, created_at, updated_at, deleted_at
            ",
        )
        .bind(product_id.0)
        .bind(quantity)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| StorefrontError::Database(format!("Failed to decrease stock: {e}")))?;

        if let Some(row) = row {
            return Ok(row.into());
        }

        let current: Option<(String, i32)> = sqlx::query_as(
            "SELECT name, stock FROM products WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(product_id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| StorefrontError::Database(format!("Failed to read stock: {e}")))?;

        match current {
            Some((name, available)) => {
                metrics::counter!("storefront_stock_conflicts_total").increment(1);
                tracing::warn!(
                    product_id = %product_id,
                    requested = quantity,
                    available,
                    "Stock decrement refused"
                );
                Err(StorefrontError::InsufficientStock {
                    product_id: product_id.to_string(),
                    name,
                    requested: quantity,
                    available,
                })
            },
            None => Err(StorefrontError::product_not_found(product_id)),
        }
    }

    async fn increment_stock(&mut self, product_id: ProductId, quantity: i32) -> Result<Product> {
        let row: Option<ProductRow> = sqlx::query_as(
            r"
            UPDATE products
            SET stock = stock + $2, updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING id, seller_id, name, price, stock, discount, product_type,
                      description, created_at, updated_at, deleted_at
            ",
        )
        .bind(product_id.0)
        .bind(quantity)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| StorefrontError::Database(format!("Failed to increase stock: {e}")))?;

        row.map(Product::from)
            .ok_or_else(|| StorefrontError::product_not_found(product_id))
    }

    async fn set_order_total(&mut self, order: &Order) -> Result<()> {
        sqlx::query("UPDATE orders SET total_amount = $2 WHERE id = $1")
            .bind(order.id.0)
            .bind(order.total_amount)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| StorefrontError::Database(format!("Failed to update order total: {e}")))?;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| StorefrontError::Database(format!("Failed to commit transaction: {e}")))
    }

    async fn rollback(self) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| StorefrontError::Database(format!("Failed to roll back transaction: {e}")))
    }
}
