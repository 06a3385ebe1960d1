//! Relational product store traits.

use crate::error::Result;
use crate::ids::{ProductId, UserId};
use crate::order::{Order, OrderItem};
use crate::product::Product;
use chrono::{DateTime, Utc};

/// Product rows in the relational store.
///
/// Soft-deleted products are invisible to every read.
pub trait ProductRepository: Send + Sync {
    /// Insert a new product.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the insert fails.
    fn insert(
        &self,
        product: &Product,
    ) -> impl std::future::Future<Output = Result<Product>> + Send;

    /// Find a product by id.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the query fails.
    fn find_by_id(
        &self,
        id: ProductId,
    ) -> impl std::future::Future<Output = Result<Option<Product>>> + Send;

    /// Find all products with the given ids in a single query.
    ///
    /// Unknown ids are omitted; result order is unspecified.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the query fails.
    fn find_by_ids(
        &self,
        ids: &[ProductId],
    ) -> impl std::future::Future<Output = Result<Vec<Product>>> + Send;

    /// List every product.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the query fails.
    fn list_all(&self) -> impl std::future::Future<Output = Result<Vec<Product>>> + Send;

    /// List products owned by a seller.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the query fails.
    fn list_by_seller(
        &self,
        seller_id: UserId,
    ) -> impl std::future::Future<Output = Result<Vec<Product>>> + Send;

    /// Case-insensitive substring search on the product name.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the query fails.
    fn search_by_name(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Product>>> + Send;

    /// List products of a category.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the query fails.
    fn list_by_type(
        &self,
        product_type: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Product>>> + Send;

    /// Persist the mutable attributes of an existing product.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the product does not exist, `Database` on failure.
    fn update(
        &self,
        product: &Product,
    ) -> impl std::future::Future<Output = Result<Product>> + Send;

    /// Mark a product as deleted.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the product does not exist, `Database` on failure.
    fn soft_delete(
        &self,
        id: ProductId,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Product>> + Send;
}

/// A store that can open relational transactions.
pub trait TransactionalStore: Send + Sync {
    /// Transaction handle.
    type Tx: StoreTransaction;

    /// Begin a transaction.
    ///
    /// # Errors
    ///
    /// Returns `Database` if no connection could be acquired.
    fn begin(&self) -> impl std::future::Future<Output = Result<Self::Tx>> + Send;
}

/// An open relational transaction.
///
/// Nothing written through the handle is visible to others until
/// [`commit`](StoreTransaction::commit). Dropping the handle without committing
/// rolls everything back.
pub trait StoreTransaction: Send {
    /// Insert the order header.
    ///
    /// # Errors
    ///
    /// Returns `Database` on failure.
    fn insert_order(
        &mut self,
        order: &Order,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Insert one order line.
    ///
    /// # Errors
    ///
    /// Returns `Database` on failure.
    fn insert_order_item(
        &mut self,
        item: &OrderItem,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Atomically decrement stock, failing instead of going negative.
    ///
    /// This is a single conditional update, never a read-then-write, so
    /// concurrent decrements of the same product serialize on the row lock.
    ///
    /// # Errors
    ///
    /// - `InsufficientStock` naming the product if stock is lower than `quantity`
    /// - `NotFound` if the product does not exist
    /// - `Database` on failure
    fn decrement_stock(
        &mut self,
        product_id: ProductId,
        quantity: i32,
    ) -> impl std::future::Future<Output = Result<Product>> + Send;

    /// Atomically increment stock.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the product does not exist, `Database` on failure.
    fn increment_stock(
        &mut self,
        product_id: ProductId,
        quantity: i32,
    ) -> impl std::future::Future<Output = Result<Product>> + Send;

    /// Set the order total after all lines are written.
    ///
    /// # Errors
    ///
    /// Returns `Database` on failure.
    fn set_order_total(
        &mut self,
        order: &Order,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Commit the transaction.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the commit failed; nothing was persisted.
    fn commit(self) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Roll back explicitly.
    ///
    /// # Errors
    ///
    /// Returns `Database` if the rollback could not be sent.
    fn rollback(self) -> impl std::future::Future<Output = Result<()>> + Send;
}
