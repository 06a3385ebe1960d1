//! Cart assembly: raw cart lines joined with products and sellers.
//!
//! ```text
//!  cart:{user} ──► product ids ──► ProductCache::get_many ──► seller ids
//!                                                               │
//!  MaterializedCart ◄── join per line ◄── AccountDirectory::sellers (one call)
//! ```
//!
//! Lines whose product or seller cannot be resolved are dropped with a
//! warning; the rest of the cart is still returned.

use crate::cart_store::CartStore;
use crate::product_cache::ProductCache;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use storefront_core::cart::{CartEntry, CartItem, MaterializedCart};
use storefront_core::environment::Environment;
use storefront_core::error::Result;
use storefront_core::ids::{ProductId, UserId};
use storefront_core::product::Product;
use storefront_core::providers::AccountDirectory;
use tracing::Span;

/// Builds [`MaterializedCart`]s.
pub struct CartAssembly<E: Environment> {
    env: Arc<E>,
    products: ProductCache<E::Store, E::Cache>,
    carts: CartStore<E::Cart>,
    span: Span,
}

impl<E: Environment> Clone for CartAssembly<E> {
    fn clone(&self) -> Self {
        Self {
            env: Arc::clone(&self.env),
            products: self.products.clone(),
            carts: self.carts.clone(),
            span: self.span.clone(),
        }
    }
}

impl<E: Environment> CartAssembly<E> {
    /// Create an assembler.
    #[must_use]
    pub const fn new(
        env: Arc<E>,
        products: ProductCache<E::Store, E::Cache>,
        carts: CartStore<E::Cart>,
        span: Span,
    ) -> Self {
        Self {
            env,
            products,
            carts,
            span,
        }
    }

    /// Materialize a user's cart.
    ///
    /// Items are ordered by when they were first added. `total_items` is the
    /// number of items, not the sum of quantities.
    ///
    /// # Errors
    ///
    /// Returns `Cache` if the cart cannot be read, `Database` if the product
    /// store fails and `Account` if the account service fails.
    pub async fn materialize(&self, user_id: UserId) -> Result<MaterializedCart> {
        let lines = self.carts.get_all(user_id).await?;
        if lines.is_empty() {
            return Ok(MaterializedCart::empty(user_id));
        }

        let mut entries: Vec<CartEntry> = lines.into_values().collect();
        entries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });

        let product_ids: Vec<ProductId> = entries.iter().map(|e| e.product_id).collect();
        let products: HashMap<ProductId, Product> = self
            .products
            .get_many(&product_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut seen = HashSet::new();
        let seller_ids: Vec<UserId> = entries
            .iter()
            .filter_map(|e| products.get(&e.product_id))
            .map(|p| p.seller_id)
            .filter(|id| seen.insert(*id))
            .collect();
        let sellers: HashMap<UserId, String> = if seller_ids.is_empty() {
            HashMap::new()
        } else {
            self.env
                .accounts()
                .sellers(&seller_ids)
                .await?
                .into_iter()
                .map(|s| (s.id, s.name))
                .collect()
        };

        let mut items = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(product) = products.get(&entry.product_id) else {
                tracing::warn!(
                    parent: &self.span,
                    user_id = %user_id,
                    product_id = %entry.product_id,
                    "Dropping cart line: product not found"
                );
                continue;
            };
            let Some(seller_name) = sellers.get(&product.seller_id) else {
                tracing::warn!(
                    parent: &self.span,
                    user_id = %user_id,
                    product_id = %entry.product_id,
                    seller_id = %product.seller_id,
                    "Dropping cart line: seller not found"
                );
                continue;
            };
            items.push(enrich(entry, product, seller_name.clone()));
        }

        Ok(MaterializedCart::new(user_id, items))
    }
}

/// Join one cart line with its product and seller name.
pub(crate) fn enrich(entry: CartEntry, product: &Product, seller_name: String) -> CartItem {
    CartItem {
        product_id: entry.product_id,
        product_name: product.name.clone(),
        price: product.price,
        stock: product.stock,
        seller_id: product.seller_id,
        seller_name,
        quantity: entry.quantity,
        description: entry.description,
        checked: entry.checked,
    }
}
