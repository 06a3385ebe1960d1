//! Product write paths and stock RPCs.
//!
//! Every write invalidates the cached copies of the product before it returns.
//! The wider list keys (seller, type, name searches) are dropped afterwards on a
//! detached task.

use crate::product_cache::ProductCache;
use std::sync::Arc;
use storefront_core::environment::Environment;
use storefront_core::error::{Result, StorefrontError};
use storefront_core::ids::{ProductId, UserId};
use storefront_core::product::{Product, ProductDraft, StockAdjustment};
use storefront_core::providers::{
    Principal, ProductRepository, StoreTransaction, TransactionalStore,
};
use tracing::Span;

/// Direction of a batch stock change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StockChange {
    Decrease,
    Increase,
}

/// Product catalog service.
pub struct Catalog<E: Environment> {
    env: Arc<E>,
    products: ProductCache<E::Store, E::Cache>,
    span: Span,
}

impl<E: Environment> Clone for Catalog<E> {
    fn clone(&self) -> Self {
        Self {
            env: Arc::clone(&self.env),
            products: self.products.clone(),
            span: self.span.clone(),
        }
    }
}

impl<E: Environment> Catalog<E> {
    /// Create a catalog over the shared product cache.
    #[must_use]
    pub const fn new(env: Arc<E>, products: ProductCache<E::Store, E::Cache>, span: Span) -> Self {
        Self {
            env,
            products,
            span,
        }
    }

    /// Create a product owned by `seller`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an invalid draft and `Database` if the insert fails.
    pub async fn create(&self, seller: &Principal, draft: ProductDraft) -> Result<Product> {
        draft.validate()?;
        let product =
            Product::from_draft(ProductId::new(), seller.user_id, draft, self.env.clock().now());
        let created = self.env.store().insert(&product).await?;

        self.products.invalidate(created.id).await;
        self.products.spawn_widen(std::slice::from_ref(&created));
        tracing::info!(
            parent: &self.span,
            product_id = %created.id,
            seller_id = %seller.user_id,
            "Product created"
        );
        Ok(created)
    }

    /// Replace a product's attributes.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the product does not exist
    /// - `Forbidden` if `actor` neither owns the product nor is an admin
    /// - `Validation` for an invalid draft
    /// - `Database` if the store fails
    pub async fn update(
        &self,
        actor: &Principal,
        id: ProductId,
        draft: ProductDraft,
    ) -> Result<Product> {
        let mut product = self.owned_product(actor, id).await?;
        draft.validate()?;
        let previous = product.clone();
        product.apply(draft, self.env.clock().now());
        let updated = self.env.store().update(&product).await?;

        self.products.invalidate(id).await;
        self.products.spawn_widen(&[previous, updated.clone()]);
        tracing::info!(
            parent: &self.span,
            product_id = %id,
            actor = %actor.user_id,
            "Product updated"
        );
        Ok(updated)
    }

    /// Soft-delete a product.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Forbidden` or `Database` as for [`update`](Self::update).
    pub async fn delete(&self, actor: &Principal, id: ProductId) -> Result<Product> {
        self.owned_product(actor, id).await?;
        let deleted = self.env.store().soft_delete(id, self.env.clock().now()).await?;

        self.products.invalidate(id).await;
        self.products.spawn_widen(std::slice::from_ref(&deleted));
        tracing::info!(
            parent: &self.span,
            product_id = %id,
            actor = %actor.user_id,
            "Product deleted"
        );
        Ok(deleted)
    }

    /// Decrease stock for a batch of products in one transaction.
    ///
    /// # Errors
    ///
    /// - `Validation` if a quantity is not positive
    /// - `InsufficientStock` naming the first product that would go negative
    /// - `NotFound` for an unknown product
    /// - `Database` if the store fails
    ///
    /// On any error no stock was changed.
    pub async fn decrease_stock(&self, items: &[StockAdjustment]) -> Result<Vec<Product>> {
        self.adjust_stock(items, StockChange::Decrease).await
    }

    /// Increase stock for a batch of products in one transaction.
    ///
    /// # Errors
    ///
    /// As for [`decrease_stock`](Self::decrease_stock), without `InsufficientStock`.
    pub async fn increase_stock(&self, items: &[StockAdjustment]) -> Result<Vec<Product>> {
        self.adjust_stock(items, StockChange::Increase).await
    }

    /// Read one product through the cache.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `Database`.
    pub async fn get(&self, id: ProductId) -> Result<Product> {
        self.products.get(id).await
    }

    /// Read many products through the cache.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the store fails.
    pub async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        self.products.get_many(ids).await
    }

    /// List every product.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the store fails.
    pub async fn list_all(&self) -> Result<Vec<Product>> {
        self.products.get_all().await
    }

    /// List a seller's products.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the store fails.
    pub async fn list_by_seller(&self, seller: UserId) -> Result<Vec<Product>> {
        self.products.get_by_seller(seller).await
    }

    /// Search products by name.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a blank query and `Database` if the store fails.
    pub async fn search_by_name(&self, name: &str) -> Result<Vec<Product>> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StorefrontError::Validation("search term is required".to_string()));
        }
        self.products.get_by_name(name).await
    }

    /// List products of one category.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a blank type and `Database` if the store fails.
    pub async fn list_by_type(&self, product_type: &str) -> Result<Vec<Product>> {
        let product_type = product_type.trim();
        if product_type.is_empty() {
            return Err(StorefrontError::Validation("product type is required".to_string()));
        }
        self.products.get_by_type(product_type).await
    }

    async fn owned_product(&self, actor: &Principal, id: ProductId) -> Result<Product> {
        let product = self
            .env
            .store()
            .find_by_id(id)
            .await?
            .ok_or_else(|| StorefrontError::product_not_found(id))?;
        if !actor.is_admin() && !product.is_owned_by(actor.user_id) {
            tracing::warn!(
                parent: &self.span,
                product_id = %id,
                actor = %actor.user_id,
                "Rejected write to foreign product"
            );
            return Err(StorefrontError::Forbidden(
                "product does not belong to seller".to_string(),
            ));
        }
        Ok(product)
    }

    async fn adjust_stock(
        &self,
        items: &[StockAdjustment],
        change: StockChange,
    ) -> Result<Vec<Product>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(bad) = items.iter().find(|item| item.quantity <= 0) {
            return Err(StorefrontError::Validation(format!(
                "quantity for product {} must be positive",
                bad.product_id
            )));
        }

        let mut tx = self.env.store().begin().await?;
        let mut updated = Vec::with_capacity(items.len());
        for item in items {
            let result = match change {
                StockChange::Decrease => tx.decrement_stock(item.product_id, item.quantity).await,
                StockChange::Increase => tx.increment_stock(item.product_id, item.quantity).await,
            };
            match result {
                Ok(product) => updated.push(product),
                Err(e) => {
                    if let Err(rollback) = tx.rollback().await {
                        tracing::warn!(parent: &self.span, error = %rollback, "Rollback failed");
                    }
                    return Err(e);
                },
            }
        }
        tx.commit().await?;

        let ids: Vec<ProductId> = updated.iter().map(|p| p.id).collect();
        self.products.invalidate_many(&ids).await;
        self.products.spawn_widen(&updated);
        tracing::info!(parent: &self.span, ?change, products = updated.len(), "Stock adjusted");
        Ok(updated)
    }
}
