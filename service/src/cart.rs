//! Request-facing cart operations.
//!
//! Validates quantities against live stock (read through the product cache),
//! mutates the cart store and answers with the materialized cart.

use crate::assembly::{CartAssembly, enrich};
use crate::cart_store::CartStore;
use crate::product_cache::ProductCache;
use std::sync::Arc;
use storefront_core::cart::{CartItem, MaterializedCart};
use storefront_core::environment::Environment;
use storefront_core::error::{Result, StorefrontError};
use storefront_core::ids::{ProductId, UserId};
use storefront_core::product::Product;
use storefront_core::providers::AccountDirectory;
use tracing::Span;

/// Cart service.
pub struct CartService<E: Environment> {
    env: Arc<E>,
    products: ProductCache<E::Store, E::Cache>,
    carts: CartStore<E::Cart>,
    assembly: CartAssembly<E>,
    span: Span,
}

impl<E: Environment> Clone for CartService<E> {
    fn clone(&self) -> Self {
        Self {
            env: Arc::clone(&self.env),
            products: self.products.clone(),
            carts: self.carts.clone(),
            assembly: self.assembly.clone(),
            span: self.span.clone(),
        }
    }
}

fn ensure_in_stock(product: &Product, requested: i32) -> Result<()> {
    if requested > product.stock {
        return Err(StorefrontError::InsufficientStock {
            product_id: product.id.to_string(),
            name: product.name.clone(),
            requested,
            available: product.stock,
        });
    }
    Ok(())
}

impl<E: Environment> CartService<E> {
    /// Create a cart service.
    #[must_use]
    pub const fn new(
        env: Arc<E>,
        products: ProductCache<E::Store, E::Cache>,
        carts: CartStore<E::Cart>,
        assembly: CartAssembly<E>,
        span: Span,
    ) -> Self {
        Self {
            env,
            products,
            carts,
            assembly,
            span,
        }
    }

    /// Add `quantity` units (negative to take some out).
    ///
    /// `description: None` keeps the line's current description.
    ///
    /// # Errors
    ///
    /// - `Validation` if `quantity` is zero
    /// - `NotFound` if the product does not exist
    /// - `InsufficientStock` if the line would exceed the product's stock
    /// - infrastructure errors from the stores
    pub async fn add(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
        description: Option<&str>,
    ) -> Result<MaterializedCart> {
        if quantity == 0 {
            return Err(StorefrontError::Validation("quantity must not be zero".to_string()));
        }
        let product = self.products.get(product_id).await?;
        if quantity > 0 {
            let current = self
                .carts
                .get(user_id, product_id)
                .await?
                .map_or(0, |line| line.quantity);
            ensure_in_stock(&product, current.saturating_add(quantity))?;
        }

        self.carts
            .add_or_accumulate(user_id, product_id, quantity, description, self.env.clock().now())
            .await?;
        tracing::info!(
            parent: &self.span,
            user_id = %user_id,
            product_id = %product_id,
            quantity,
            "Added to cart"
        );
        self.assembly.materialize(user_id).await
    }

    /// Set a line's quantity; zero or less removes it.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the product does not exist
    /// - `InsufficientStock` if `quantity` exceeds the product's stock
    /// - infrastructure errors from the stores
    pub async fn update_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
        description: Option<&str>,
    ) -> Result<MaterializedCart> {
        if quantity <= 0 {
            return self.remove(user_id, product_id).await;
        }
        let product = self.products.get(product_id).await?;
        ensure_in_stock(&product, quantity)?;

        self.carts
            .set_quantity(user_id, product_id, quantity, description, self.env.clock().now())
            .await?;
        tracing::info!(
            parent: &self.span,
            user_id = %user_id,
            product_id = %product_id,
            quantity,
            "Cart quantity set"
        );
        self.assembly.materialize(user_id).await
    }

    /// Remove a line. Removing a missing line succeeds.
    ///
    /// # Errors
    ///
    /// Returns infrastructure errors from the stores.
    pub async fn remove(&self, user_id: UserId, product_id: ProductId) -> Result<MaterializedCart> {
        self.carts.remove(user_id, product_id).await?;
        self.assembly.materialize(user_id).await
    }

    /// Materialize the user's cart.
    ///
    /// # Errors
    ///
    /// Returns infrastructure errors from the stores or the account service.
    pub async fn get_cart(&self, user_id: UserId) -> Result<MaterializedCart> {
        self.assembly.materialize(user_id).await
    }

    /// Read one enriched line.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the line, its product or its seller does not exist
    /// - infrastructure errors from the stores or the account service
    pub async fn get_item(&self, user_id: UserId, product_id: ProductId) -> Result<CartItem> {
        let entry = self
            .carts
            .get(user_id, product_id)
            .await?
            .ok_or_else(|| StorefrontError::NotFound {
                entity: "cart item",
                id: product_id.to_string(),
            })?;
        let product = self.products.get(product_id).await?;
        let seller = self
            .env
            .accounts()
            .sellers(&[product.seller_id])
            .await?
            .into_iter()
            .find(|s| s.id == product.seller_id)
            .ok_or_else(|| StorefrontError::NotFound {
                entity: "seller",
                id: product.seller_id.to_string(),
            })?;
        Ok(enrich(entry, &product, seller.name))
    }

    /// Select or deselect a line.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the line does not exist, or infrastructure errors.
    pub async fn set_checked(
        &self,
        user_id: UserId,
        product_id: ProductId,
        checked: bool,
    ) -> Result<MaterializedCart> {
        self.carts
            .set_checked(user_id, product_id, checked, self.env.clock().now())
            .await?;
        self.assembly.materialize(user_id).await
    }

    /// Rebuild the user's cart from the relational mirror.
    ///
    /// # Errors
    ///
    /// Returns `Database` or `Cache` on failure.
    pub async fn restore(&self, user_id: UserId) -> Result<usize> {
        self.carts.restore_from_mirror(self.env.mirror(), user_id).await
    }
}
