//! Product rows.

use crate::PostgresStore;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use storefront_core::error::{Result, StorefrontError};
use storefront_core::ids::{ProductId, UserId};
use storefront_core::product::Product;
use storefront_core::providers::ProductRepository;
use uuid::Uuid;

/// Canonical row shape returned by every product query.
#[derive(Debug, FromRow)]
pub(crate) struct ProductRow {
    id: Uuid,
    seller_id: Uuid,
    name: String,
    price: i64,
    stock: i32,
    discount: i32,
    product_type: String,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: ProductId(row.id),
            seller_id: UserId(row.seller_id),
            name: row.name,
            price: row.price,
            stock: row.stock,
            discount: row.discount,
            product_type: row.product_type,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

fn into_products(rows: Vec<ProductRow>) -> Vec<Product> {
    rows.into_iter().map(Product::from).collect()
}

/// Escape `LIKE` wildcards so user input matches literally.
fn like_pattern(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len() + 2);
    escaped.push('%');
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

impl ProductRepository for PostgresStore {
    async fn insert(&self, product: &Product) -> Result<Product> {
        let row: ProductRow = sqlx::query_as(
            r"
            INSERT INTO products (
                id, seller_id, name, price, stock, discount, product_type,
                description, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, seller_id, name, price, stock, discount, product_type,
                      description, created_at, updated_at, deleted_at
            ",
        )
        .bind(product.id.0)
        .bind(product.seller_id.0)
        .bind(&product.name)
        .bind(product.price)
        .bind(product.stock)
        .bind(product.discount)
        .bind(&product.product_type)
        .bind(&product.description)
        .bind(product.created_at)
        .bind(product.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorefrontError::Database(format!("Failed to insert product: {e}")))?;

        Ok(row.into())
    }

    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>> {
        let row: Option<ProductRow> = sqlx::query_as(
            r"
            SELECT id, seller_id, name, price, stock, discount, product_type,
                   description, created_at, updated_at, deleted_at
            FROM products
            WHERE id = $1 AND deleted_at IS NULL
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorefrontError::Database(format!("Failed to get product: {e}")))?;

        Ok(row.map(Product::from))
    }

    async fn find_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = ids.iter().map(|id| id.0).collect();

        let rows: Vec<ProductRow> = sqlx::query_as(
            r"
            SELECT id, seller_id, name, price, stock, discount, product_type,
                   description, created_at, updated_at, deleted_at
            FROM products
            WHERE id = ANY($1) AND deleted_at IS NULL
            ",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorefrontError::Database(format!("Failed to get products by ids: {e}")))?;

        Ok(into_products(rows))
    }

    async fn list_all(&self) -> Result<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            r"
            SELECT id, seller_id, name, price, stock, discount, product_type,
                   description, created_at, updated_at, deleted_at
            FROM products
            WHERE deleted_at IS NULL
            ORDER BY created_at DESC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorefrontError::Database(format!("Failed to list products: {e}")))?;

        Ok(into_products(rows))
    }

    async fn list_by_seller(&self, seller_id: UserId) -> Result<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            r"
            SELECT id, seller_id, name, price, stock, discount, product_type,
                   description, created_at, updated_at, deleted_at
            FROM products
            WHERE seller_id = $1 AND deleted_at IS NULL
            ORDER BY created_at DESC
            ",
        )
        .bind(seller_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            StorefrontError::Database(format!("Failed to list products by seller: {e}"))
        })?;

        Ok(into_products(rows))
    }

    async fn search_by_name(&self, name: &str) -> Result<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            r"
            SELECT id, seller_id, name, price, stock, discount, product_type,
                   description, created_at, updated_at, deleted_at
            FROM products
            WHERE name ILIKE $1 AND deleted_at IS NULL
            ORDER BY name
            ",
        )
        .bind(like_pattern(name))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorefrontError::Database(format!("Failed to search products: {e}")))?;

        Ok(into_products(rows))
    }

    async fn list_by_type(&self, product_type: &str) -> Result<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            r"
            SELECT id, seller_id, name, price, stock, discount, product_type,
                   description, created_at, updated_at, deleted_at
            FROM products
            WHERE product_type = $1 AND deleted_at IS NULL
            ORDER BY created_at DESC
            ",
        )
        .bind(product_type)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorefrontError::Database(format!("Failed to list products by type: {e}")))?;

        Ok(into_products(rows))
    }

    async fn update(&self, product: &Product) -> Result<Product> {
        let row: Option<ProductRow> = sqlx::query_as(
            r"
            UPDATE products
            SET name = $2, price = $3, stock = $4, discount = $5,
                product_type = $6, description = $7, updated_at = $8
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING id, seller_id, name, price, stock, discount, product_type,
                      description, created_at, updated_at, deleted_at
            ",
        )
        .bind(product.id.0)
        .bind(&product.name)
        .bind(product.price)
        .bind(product.stock)
        .bind(product.discount)
        .bind(&product.product_type)
        .bind(&product.description)
        .bind(product.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorefrontError::Database(format!("Failed to update product: {e}")))?;

        row.map(Product::from)
            .ok_or_else(|| StorefrontError::product_not_found(product.id))
    }

    async fn soft_delete(&self, id: ProductId, at: DateTime<Utc>) -> Result<Product> {
        let row: Option<ProductRow> = sqlx::query_as(
            r"
            UPDATE products
            SET deleted_at = $2, updated_at = $2
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING id, seller_id, name, price, stock, discount, product_type,
                      description, created_at, updated_at, deleted_at
            ",
        )
        .bind(id.0)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorefrontError::Database(format!("Failed to delete product: {e}")))?;

        row.map(Product::from)
            .ok_or_else(|| StorefrontError::product_not_found(id))
    }
}
