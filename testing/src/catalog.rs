//! In-memory relational store: products, orders and the cart mirror.

use crate::poisoned;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use storefront_core::cart::CartEntry;
use storefront_core::error::{Result, StorefrontError};
use storefront_core::ids::{OrderId, ProductId, UserId};
use storefront_core::order::{Order, OrderItem};
use storefront_core::product::Product;
use storefront_core::providers::{
    CartMirror, ProductRepository, StoreTransaction, TransactionalStore,
};

#[derive(Debug, Default)]
struct State {
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
    mirror: HashMap<(UserId, ProductId), CartEntry>,
}

#[derive(Debug, Default)]
struct Inner {
    state: RwLock<State>,
    reads: AtomicUsize,
    batch_reads: AtomicUsize,
    unavailable: AtomicBool,
    fail_next_commit: AtomicBool,
    commit_delay_ms: AtomicU64,
    mirror_unavailable: AtomicBool,
    mirror_writes: AtomicUsize,
}

/// In-memory product store with transactional checkout support.
///
/// Transactions stage their writes and apply them under one write lock on
/// commit. A stock decrement that no longer fits at commit time fails the
/// whole commit, which mirrors two `PostgreSQL` transactions serializing on
/// the same row.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    inner: Arc<Inner>,
}

impl InMemoryCatalog {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a product directly, bypassing the repository API.
    pub fn seed(&self, product: Product) {
        let mut state = self.inner.state.write().unwrap();
        state.products.insert(product.id, product);
    }

    /// Current committed stock of a product, deleted or not.
    #[must_use]
    pub fn stock(&self, id: ProductId) -> Option<i32> {
        let state = self.inner.state.read().unwrap();
        state.products.get(&id).map(|p| p.stock)
    }

    /// Committed product row, deleted or not.
    #[must_use]
    pub fn product(&self, id: ProductId) -> Option<Product> {
        let state = self.inner.state.read().unwrap();
        state.products.get(&id).cloned()
    }

    /// Every committed order.
    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        let state = self.inner.state.read().unwrap();
        state.orders.values().cloned().collect()
    }

    /// Mirrored cart row, if any.
    #[must_use]
    pub fn mirrored(&self, user_id: UserId, product_id: ProductId) -> Option<CartEntry> {
        let state = self.inner.state.read().unwrap();
        state.mirror.get(&(user_id, product_id)).cloned()
    }

    /// Insert a mirror row directly.
    pub fn seed_mirror(&self, entry: CartEntry) {
        let mut state = self.inner.state.write().unwrap();
        state.mirror.insert((entry.user_id, entry.product_id), entry);
    }

    /// Number of product read queries served (single and batch).
    #[must_use]
    pub fn product_reads(&self) -> usize {
        self.inner.reads.load(Ordering::SeqCst)
    }

    /// Number of `find_by_ids` queries served.
    #[must_use]
    pub fn batch_reads(&self) -> usize {
        self.inner.batch_reads.load(Ordering::SeqCst)
    }

    /// Number of successful mirror upserts and deletes.
    #[must_use]
    pub fn mirror_writes(&self) -> usize {
        self.inner.mirror_writes.load(Ordering::SeqCst)
    }

    /// Make every product read and `begin` fail with `Database`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make the next commit fail with `Database` after all statements succeeded.
    pub fn fail_next_commit(&self) {
        self.inner.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Make every commit wait `delay` before applying, like a slow `COMMIT`
    /// round trip.
    pub fn set_commit_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.inner.commit_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Make mirror writes fail with `Database`.
    pub fn set_mirror_unavailable(&self, unavailable: bool) {
        self.inner.mirror_unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(StorefrontError::Database("store unavailable".to_string()));
        }
        Ok(())
    }

    fn check_mirror(&self) -> Result<()> {
        if self.inner.mirror_unavailable.load(Ordering::SeqCst) {
            return Err(StorefrontError::Database("mirror unavailable".to_string()));
        }
        Ok(())
    }

    fn read_where(&self, keep: impl Fn(&Product) -> bool) -> Result<Vec<Product>> {
        self.check_available()?;
        self.inner.reads.fetch_add(1, Ordering::SeqCst);
        let state = self.inner.state.read().map_err(poisoned)?;
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|p| !p.is_deleted() && keep(p))
            .cloned()
            .collect();
        products.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(products)
    }
}

impl ProductRepository for InMemoryCatalog {
    async fn insert(&self, product: &Product) -> Result<Product> {
        self.check_available()?;
        let mut state = self.inner.state.write().map_err(poisoned)?;
        if state.products.contains_key(&product.id) {
            return Err(StorefrontError::Conflict(format!(
                "product {} already exists",
                product.id
            )));
        }
        state.products.insert(product.id, product.clone());
        Ok(product.clone())
    }

    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>> {
        self.check_available()?;
        self.inner.reads.fetch_add(1, Ordering::SeqCst);
        let state = self.inner.state.read().map_err(poisoned)?;
        Ok(state.products.get(&id).filter(|p| !p.is_deleted()).cloned())
    }

    async fn find_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        self.inner.batch_reads.fetch_add(1, Ordering::SeqCst);
        self.read_where(|p| ids.contains(&p.id))
    }

    async fn list_all(&self) -> Result<Vec<Product>> {
        self.read_where(|_| true)
    }

    async fn list_by_seller(&self, seller_id: UserId) -> Result<Vec<Product>> {
        self.read_where(|p| p.seller_id == seller_id)
    }

    async fn search_by_name(&self, name: &str) -> Result<Vec<Product>> {
        let needle = name.to_lowercase();
        self.read_where(|p| p.name.to_lowercase().contains(&needle))
    }

    async fn list_by_type(&self, product_type: &str) -> Result<Vec<Product>> {
        self.read_where(|p| p.product_type == product_type)
    }

    async fn update(&self, product: &Product) -> Result<Product> {
        self.check_available()?;
        let mut state = self.inner.state.write().map_err(poisoned)?;
        match state.products.get_mut(&product.id) {
            Some(existing) if !existing.is_deleted() => {
                *existing = product.clone();
                Ok(product.clone())
            },
            _ => Err(StorefrontError::product_not_found(product.id)),
        }
    }

    async fn soft_delete(&self, id: ProductId, at: DateTime<Utc>) -> Result<Product> {
        self.check_available()?;
        let mut state = self.inner.state.write().map_err(poisoned)?;
        match state.products.get_mut(&id) {
            Some(existing) if !existing.is_deleted() => {
                existing.deleted_at = Some(at);
                existing.updated_at = at;
                Ok(existing.clone())
            },
            _ => Err(StorefrontError::product_not_found(id)),
        }
    }
}

#[derive(Debug)]
enum Staged {
    Order(Order),
    Item(OrderItem),
    Stock(ProductId, i32),
    Total(OrderId, i64),
}

/// Staged transaction against an [`InMemoryCatalog`].
///
/// Dropping it discards every staged write.
#[derive(Debug)]
pub struct InMemoryTransaction {
    catalog: InMemoryCatalog,
    staged: Vec<Staged>,
}

impl InMemoryTransaction {
    fn staged_delta(&self, id: ProductId) -> i32 {
        self.staged
            .iter()
            .filter_map(|op| match op {
                Staged::Stock(pid, delta) if *pid == id => Some(*delta),
                _ => None,
            })
            .sum()
    }

    fn visible(&self, id: ProductId) -> Result<Product> {
        let state = self.catalog.inner.state.read().map_err(poisoned)?;
        let mut product = state
            .products
            .get(&id)
            .filter(|p| !p.is_deleted())
            .cloned()
            .ok_or_else(|| StorefrontError::product_not_found(id))?;
        product.stock += self.staged_delta(id);
        Ok(product)
    }
}

impl TransactionalStore for InMemoryCatalog {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        self.check_available()?;
        Ok(InMemoryTransaction {
            catalog: self.clone(),
            staged: Vec::new(),
        })
    }
}

impl StoreTransaction for InMemoryTransaction {
    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        self.staged.push(Staged::Order(order.clone()));
        Ok(())
    }

    async fn insert_order_item(&mut self, item: &OrderItem) -> Result<()> {
        self.staged.push(Staged::Item(item.clone()));
        Ok(())
    }

    async fn decrement_stock(&mut self, product_id: ProductId, quantity: i32) -> Result<Product> {
        let mut product = self.visible(product_id)?;
        if product.stock < quantity {
            return Err(StorefrontError::InsufficientStock {
                product_id: product_id.to_string(),
                name: product.name,
                requested: quantity,
                available: product.stock,
            });
        }
        self.staged.push(Staged::Stock(product_id, -quantity));
        product.stock -= quantity;
        Ok(product)
    }

    async fn increment_stock(&mut self, product_id: ProductId, quantity: i32) -> Result<Product> {
        let mut product = self.visible(product_id)?;
        self.staged.push(Staged::Stock(product_id, quantity));
        product.stock += quantity;
        Ok(product)
    }

    async fn set_order_total(&mut self, order: &Order) -> Result<()> {
        self.staged.push(Staged::Total(order.id, order.total_amount));
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let inner = &self.catalog.inner;
        let delay = inner.commit_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if inner.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StorefrontError::Database("commit failed".to_string()));
        }

        let mut state = inner.state.write().map_err(poisoned)?;

        // Validate every stock delta against committed state before applying anything.
        let mut deltas: HashMap<ProductId, i32> = HashMap::new();
        for op in &self.staged {
            if let Staged::Stock(id, delta) = op {
                *deltas.entry(*id).or_insert(0) += delta;
            }
        }
        for (id, delta) in &deltas {
            let product = state
                .products
                .get(id)
                .filter(|p| !p.is_deleted())
                .ok_or_else(|| StorefrontError::product_not_found(id))?;
            if product.stock + delta < 0 {
                return Err(StorefrontError::InsufficientStock {
                    product_id: id.to_string(),
                    name: product.name.clone(),
                    requested: -delta,
                    available: product.stock,
                });
            }
        }

        for op in self.staged {
            match op {
                Staged::Order(order) => {
                    state.orders.insert(order.id, order);
                },
                Staged::Item(item) => {
                    if let Some(order) = state.orders.get_mut(&item.order_id) {
                        order.items.push(item);
                    }
                },
                Staged::Stock(id, delta) => {
                    if let Some(product) = state.products.get_mut(&id) {
                        product.stock += delta;
                    }
                },
                Staged::Total(id, total) => {
                    if let Some(order) = state.orders.get_mut(&id) {
                        order.total_amount = total;
                    }
                },
            }
        }
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

impl CartMirror for InMemoryCatalog {
    async fn upsert(&self, entry: &CartEntry) -> Result<()> {
        self.check_mirror()?;
        let mut state = self.inner.state.write().map_err(poisoned)?;
        state
            .mirror
            .insert((entry.user_id, entry.product_id), entry.clone());
        self.inner.mirror_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, user_id: UserId, product_id: ProductId) -> Result<()> {
        self.check_mirror()?;
        let mut state = self.inner.state.write().map_err(poisoned)?;
        state.mirror.remove(&(user_id, product_id));
        self.inner.mirror_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self, user_id: UserId) -> Result<Vec<CartEntry>> {
        self.check_mirror()?;
        let state = self.inner.state.read().map_err(poisoned)?;
        let mut entries: Vec<CartEntry> = state
            .mirror
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use storefront_core::product::ProductDraft;

    fn product(stock: i32) -> Product {
        Product::from_draft(
            ProductId::new(),
            UserId::new(),
            ProductDraft {
                name: "Widget".to_string(),
                price: 100,
                stock,
                discount: 0,
                product_type: "gadget".to_string(),
                description: String::new(),
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let catalog = InMemoryCatalog::new();
        let p = product(5);
        catalog.seed(p.clone());

        let mut tx = catalog.begin().await.expect("begin");
        tx.decrement_stock(p.id, 3).await.expect("decrement");
        drop(tx);

        assert_eq!(catalog.stock(p.id), Some(5));
    }

    #[tokio::test]
    async fn second_commit_over_same_stock_fails() {
        let catalog = InMemoryCatalog::new();
        let p = product(5);
        catalog.seed(p.clone());

        let mut first = catalog.begin().await.expect("begin");
        let mut second = catalog.begin().await.expect("begin");
        first.decrement_stock(p.id, 3).await.expect("decrement");
        second.decrement_stock(p.id, 3).await.expect("decrement");

        first.commit().await.expect("commit");
        let err = second.commit().await.expect_err("must conflict");
        assert!(matches!(err, StorefrontError::InsufficientStock { .. }));
        assert_eq!(catalog.stock(p.id), Some(2));
    }

    #[tokio::test]
    async fn staged_decrements_count_against_stock() {
        let catalog = InMemoryCatalog::new();
        let p = product(4);
        catalog.seed(p.clone());

        let mut tx = catalog.begin().await.expect("begin");
        tx.decrement_stock(p.id, 3).await.expect("decrement");
        let err = tx.decrement_stock(p.id, 2).await.expect_err("over stock");
        assert!(matches!(err, StorefrontError::InsufficientStock { available: 1, .. }));
    }
}
