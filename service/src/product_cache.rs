//! Read-through product cache.
//!
//! Reads go to the fast store first and fall back to the relational store on a
//! miss, writing the result back with a TTL. Writers must call
//! [`ProductCache::invalidate`] before their change is reported to the caller:
//! cart and checkout read stock and price through this cache.
//!
//! Key namespace:
//!
//! | key                          | value                      |
//! |------------------------------|----------------------------|
//! | `product:{id}`               | one product                |
//! | `all_products`               | every product              |
//! | `products_by_seller:{id}`    | a seller's products        |
//! | `products_by_name:{name}`    | name search results        |
//! | `products_by_type:{type}`    | products of a category     |
//!
//! A cache failure never fails a read; store failures always do.

use crate::config::CacheConfig;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;
use storefront_core::error::{Result, StorefrontError};
use storefront_core::ids::{ProductId, UserId};
use storefront_core::product::Product;
use storefront_core::providers::{CacheBackend, ProductRepository};
use tracing::Span;

/// Key holding the full product list.
pub const ALL_PRODUCTS: &str = "all_products";

/// `product:{id}`
#[must_use]
pub fn product_key(id: ProductId) -> String {
    format!("product:{id}")
}

/// `products_by_seller:{id}`
#[must_use]
pub fn seller_key(seller: UserId) -> String {
    format!("products_by_seller:{seller}")
}

/// `products_by_name:{name}`
#[must_use]
pub fn name_key(name: &str) -> String {
    format!("products_by_name:{name}")
}

/// `products_by_type:{type}`
#[must_use]
pub fn type_key(product_type: &str) -> String {
    format!("products_by_type:{product_type}")
}

fn record_hit(namespace: &'static str) {
    metrics::counter!("storefront_cache_hits_total", "namespace" => namespace).increment(1);
}

fn record_miss(namespace: &'static str) {
    metrics::counter!("storefront_cache_misses_total", "namespace" => namespace).increment(1);
}

/// When list results are written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Populate {
    Inline,
    Detached,
}

/// Read-through cache over a [`ProductRepository`].
#[derive(Clone)]
pub struct ProductCache<S, C> {
    store: S,
    cache: C,
    config: CacheConfig,
    span: Span,
}

impl<S, C> ProductCache<S, C>
where
    S: ProductRepository + Clone + 'static,
    C: CacheBackend + Clone + 'static,
{
    /// Create a cache over `store`, logging under `span`.
    #[must_use]
    pub const fn new(store: S, cache: C, config: CacheConfig, span: Span) -> Self {
        Self {
            store,
            cache,
            config,
            span,
        }
    }

    /// The underlying relational store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Read one product.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the product does not exist (or was deleted) and
    /// `Database` if the store fails.
    pub async fn get(&self, id: ProductId) -> Result<Product> {
        let key = product_key(id);
        if let Some(product) = self.read_cached::<Product>(&key, "product").await {
            return Ok(product);
        }

        let product = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| StorefrontError::product_not_found(id))?;

        self.write_back(&key, &product, self.config.item_ttl).await;
        Ok(product)
    }

    /// Read many products with one cache round trip and at most one store query.
    ///
    /// The result follows the order of `ids`, without duplicates; unknown ids
    /// are omitted.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the store fails.
    pub async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let mut seen = HashSet::with_capacity(ids.len());
        let unique: Vec<ProductId> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        if unique.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = unique.iter().map(|id| product_key(*id)).collect();
        let cached = match self.cache.get_many(&keys).await {
            Ok(values) if values.len() == keys.len() => values,
            Ok(values) => {
                tracing::warn!(
                    parent: &self.span,
                    requested = keys.len(),
                    returned = values.len(),
                    "Cache batch read returned the wrong number of values"
                );
                vec![None; keys.len()]
            },
            Err(e) => {
                tracing::warn!(
                    parent: &self.span,
                    error = %e,
                    "Cache batch read failed, using store"
                );
                vec![None; keys.len()]
            },
        };

        let mut found: HashMap<ProductId, Product> = HashMap::with_capacity(unique.len());
        let mut missed = Vec::new();
        for (id, raw) in unique.iter().zip(cached) {
            match raw.and_then(|json| self.decode::<Product>(&product_key(*id), &json)) {
                Some(product) => {
                    record_hit("product");
                    found.insert(*id, product);
                },
                None => {
                    record_miss("product");
                    missed.push(*id);
                },
            }
        }

        if !missed.is_empty() {
            let fetched = self.store.find_by_ids(&missed).await?;
            let mut entries = Vec::with_capacity(fetched.len());
            for product in fetched {
                match serde_json::to_string(&product) {
                    Ok(json) => entries.push((product_key(product.id), json)),
                    Err(e) => {
                        tracing::warn!(
                            parent: &self.span,
                            product_id = %product.id,
                            error = %e,
                            "Failed to encode product"
                        );
                    },
                }
                found.insert(product.id, product);
            }
            if !entries.is_empty() {
                if let Err(e) = self.cache.set_many(&entries, self.config.batch_ttl).await {
                    tracing::warn!(
                        parent: &self.span,
                        error = %e,
                        count = entries.len(),
                        "Cache batch write-back failed"
                    );
                }
            }
        }

        Ok(unique.iter().filter_map(|id| found.remove(id)).collect())
    }

    /// Read every product.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the store fails.
    pub async fn get_all(&self) -> Result<Vec<Product>> {
        self.read_list(ALL_PRODUCTS.to_string(), "all", Populate::Inline, self.store.list_all())
            .await
    }

    /// Read a seller's products.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the store fails.
    pub async fn get_by_seller(&self, seller: UserId) -> Result<Vec<Product>> {
        self.read_list(
            seller_key(seller),
            "seller",
            Populate::Inline,
            self.store.list_by_seller(seller),
        )
        .await
    }

    /// Search products by name.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the store fails.
    pub async fn get_by_name(&self, name: &str) -> Result<Vec<Product>> {
        self.read_list(
            name_key(name),
            "name",
            Populate::Detached,
            self.store.search_by_name(name),
        )
        .await
    }

    /// Read products of one category.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the store fails.
    pub async fn get_by_type(&self, product_type: &str) -> Result<Vec<Product>> {
        self.read_list(
            type_key(product_type),
            "type",
            Populate::Detached,
            self.store.list_by_type(product_type),
        )
        .await
    }

    /// Drop `product:{id}` and `all_products`.
    ///
    /// A failure is logged: the entries still expire with their TTL.
    pub async fn invalidate(&self, id: ProductId) {
        self.invalidate_many(&[id]).await;
    }

    /// Drop `product:{id}` for every id, and `all_products`, in one round trip.
    pub async fn invalidate_many(&self, ids: &[ProductId]) {
        let mut keys: Vec<String> = ids.iter().map(|id| product_key(*id)).collect();
        keys.push(ALL_PRODUCTS.to_string());
        self.invalidate_keys(keys).await;
    }

    /// Drop arbitrary keys, logging a failure.
    pub async fn invalidate_keys(&self, keys: Vec<String>) {
        if let Err(e) = self.cache.delete(&keys).await {
            tracing::error!(parent: &self.span, error = %e, ?keys, "Cache invalidation failed");
        }
    }

    /// Drop every product key, list key and `all_products` using cursor scans.
    ///
    /// Returns the number of deleted keys.
    ///
    /// # Errors
    ///
    /// Returns `Cache` if the fast store fails; an administrative reset must
    /// not report success it did not achieve.
    pub async fn invalidate_all(&self) -> Result<usize> {
        let mut deleted = self.cache.delete_matching("product:*").await?;
        deleted += self.cache.delete_matching("products_by_*").await?;
        self.cache.delete(&[ALL_PRODUCTS.to_string()]).await?;
        tracing::info!(parent: &self.span, deleted, "Product cache reset");
        Ok(deleted)
    }

    /// Drop the list keys a change to `products` may have made stale, on a
    /// detached task bounded by the widen timeout.
    ///
    /// Callers invalidate the item keys synchronously first; this pass only
    /// widens the set.
    pub fn spawn_widen(&self, products: &[Product]) {
        let mut keys: Vec<String> = Vec::new();
        for product in products {
            for key in [seller_key(product.seller_id), type_key(&product.product_type)] {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        if keys.is_empty() {
            return;
        }

        let cache = self.cache.clone();
        let span = self.span.clone();
        let timeout = self.config.widen_timeout;
        tokio::spawn(async move {
            let widen = async {
                cache.delete(&keys).await?;
                cache.delete_matching("products_by_name:*").await
            };
            match tokio::time::timeout(timeout, widen).await {
                Ok(Ok(names)) => {
                    tracing::debug!(
                        parent: &span,
                        keys = keys.len() + names,
                        "Widened invalidation"
                    );
                },
                Ok(Err(e)) => tracing::warn!(
                    parent: &span,
                    error = %e,
                    "Widened invalidation failed"
                ),
                Err(_) => tracing::warn!(parent: &span, ?timeout, "Widened invalidation timed out"),
            }
        });
    }

    async fn read_list<F>(
        &self,
        key: String,
        namespace: &'static str,
        populate: Populate,
        fetch: F,
    ) -> Result<Vec<Product>>
    where
        F: Future<Output = Result<Vec<Product>>>,
    {
        if let Some(products) = self.read_cached::<Vec<Product>>(&key, namespace).await {
            return Ok(products);
        }

        let products = fetch.await?;
        // Empty results are not cached so a new product shows up immediately.
        if products.is_empty() {
            return Ok(products);
        }

        match populate {
            Populate::Inline => self.write_back(&key, &products, self.config.list_ttl).await,
            Populate::Detached => self.spawn_write_back(key, &products, self.config.list_ttl),
        }
        Ok(products)
    }

    async fn read_cached<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
        namespace: &'static str,
    ) -> Option<T> {
        let value = match self.cache.get(key).await {
            Ok(Some(json)) => self.decode(key, &json),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(
                    parent: &self.span,
                    key,
                    error = %e,
                    "Cache read failed, using store"
                );
                None
            },
        };
        if value.is_some() {
            record_hit(namespace);
        } else {
            record_miss(namespace);
        }
        value
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, key: &str, json: &str) -> Option<T> {
        match serde_json::from_str(json) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(
                    parent: &self.span,
                    key,
                    error = %e,
                    "Discarding undecodable cache entry"
                );
                None
            },
        }
    }

    async fn write_back<T: serde::Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(parent: &self.span, key, error = %e, "Failed to encode cache entry");
                return;
            },
        };
        if let Err(e) = self.cache.set(key, &json, ttl).await {
            tracing::warn!(parent: &self.span, key, error = %e, "Cache write-back failed");
        }
    }

    fn spawn_write_back<T: serde::Serialize + ?Sized>(
        &self,
        key: String,
        value: &T,
        ttl: Duration,
    ) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(parent: &self.span, key, error = %e, "Failed to encode cache entry");
                return;
            },
        };
        let cache = self.cache.clone();
        let span = self.span.clone();
        let timeout = self.config.background_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, cache.set(&key, &json, ttl)).await {
                Ok(Ok(())) => {},
                Ok(Err(e)) => tracing::warn!(
                    parent: &span,
                    key,
                    error = %e,
                    "Cache population failed"
                ),
                Err(_) => tracing::warn!(parent: &span, key, "Cache population timed out"),
            }
        });
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use storefront_testing::{InMemoryCache, InMemoryCatalog, TestEnvironment};

    fn cache_over(env: &TestEnvironment) -> ProductCache<InMemoryCatalog, InMemoryCache> {
        ProductCache::new(
            env.catalog().clone(),
            env.cache_store().clone(),
            CacheConfig::default(),
            Span::none(),
        )
    }

    #[tokio::test]
    async fn get_populates_then_hits() {
        let env = TestEnvironment::new();
        let product = env.seed_product(1_000, 10);
        let cache = cache_over(&env);

        let first = cache.get(product.id).await.expect("first read");
        let second = cache.get(product.id).await.expect("second read");

        assert_eq!(first, product);
        assert_eq!(second, product);
        assert_eq!(env.catalog().product_reads(), 1);
        assert_eq!(
            env.cache_store().ttl(&product_key(product.id)),
            Some(Duration::from_secs(300))
        );
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let env = TestEnvironment::new();
        let product = env.seed_product(1_000, 10);
        let cache = cache_over(&env);
        env.cache_store()
            .set(&product_key(product.id), "{not json", Duration::from_secs(60))
            .await
            .expect("seed garbage");

        let read = cache.get(product.id).await.expect("read");

        assert_eq!(read, product);
        assert_eq!(env.catalog().product_reads(), 1);
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let env = TestEnvironment::new();
        let cache = cache_over(&env);

        let err = cache.get(ProductId::new()).await.expect_err("missing");
        assert!(matches!(err, StorefrontError::NotFound { entity: "product", .. }));
    }

    #[tokio::test]
    async fn get_many_keeps_request_order_and_batches_misses() {
        let env = TestEnvironment::new();
        let a = env.seed_product(100, 1);
        let b = env.seed_product(200, 2);
        let c = env.seed_product(300, 3);
        let cache = cache_over(&env);
        cache.get(b.id).await.expect("warm b");

        let products = cache
            .get_many(&[c.id, b.id, ProductId::new(), a.id, c.id])
            .await
            .expect("batch");

        let ids: Vec<ProductId> = products.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![c.id, b.id, a.id]);
        assert_eq!(env.catalog().batch_reads(), 1);
        assert_eq!(
            env.cache_store().ttl(&product_key(a.id)),
            Some(Duration::from_secs(600))
        );
    }

    #[tokio::test]
    async fn empty_lists_are_not_cached() {
        let env = TestEnvironment::new();
        let cache = cache_over(&env);

        assert!(cache.get_all().await.expect("list").is_empty());
        assert!(!env.cache_store().contains(ALL_PRODUCTS));
    }
}
