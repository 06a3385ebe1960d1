//! Checkout: cart to order in one relational transaction.
//!
//! ```text
//! Start → CartLoaded → TxOpen → OrderCreated
//!       → { ItemWritten, StockDecremented }* → TotalComputed → Committed
//!       → CartCleared → EventPublished → Done
//! ```
//!
//! Everything before `Committed` runs under the checkout deadline and inside
//! the transaction; any failure there (or the deadline elapsing) drops the
//! transaction and leaves no trace. The commit itself runs outside the
//! deadline, so a commit that reaches the store is always reported as one.
//! After the commit the order is durable and the ordered products leave the
//! cache; clearing cart lines and publishing the event can fail without
//! undoing it.

use crate::assembly::CartAssembly;
use crate::cart_store::CartStore;
use crate::config::CheckoutConfig;
use crate::product_cache::ProductCache;
use crate::retry::{RetryPolicy, retry_with_backoff};
use std::sync::Arc;
use storefront_core::cart::MaterializedCart;
use storefront_core::environment::Environment;
use storefront_core::error::{Result, StorefrontError};
use storefront_core::event::{OrderCreated, SerializedEvent};
use storefront_core::ids::{OrderId, OrderItemId, ProductId, UserId};
use storefront_core::order::{Order, OrderItem};
use storefront_core::product::Product;
use storefront_core::providers::{StoreTransaction, TransactionalStore};
use tracing::Span;

/// Metadata field the event sink uses as the message key.
const PARTITION_KEY: &str = "partition_key";

fn record_outcome(outcome: &'static str) {
    metrics::counter!("storefront_checkouts_total", "outcome" => outcome).increment(1);
}

/// An order written inside an open transaction, waiting for its commit.
struct Prepared<Tx> {
    tx: Tx,
    order: Order,
    cart: MaterializedCart,
    /// Rows as left by the stock decrements.
    products: Vec<Product>,
}

/// Checkout engine.
pub struct CheckoutEngine<E: Environment> {
    env: Arc<E>,
    assembly: CartAssembly<E>,
    products: ProductCache<E::Store, E::Cache>,
    carts: CartStore<E::Cart>,
    config: CheckoutConfig,
    publish_policy: RetryPolicy,
    topic: String,
    span: Span,
}

impl<E: Environment> CheckoutEngine<E> {
    /// Create a checkout engine publishing to `topic`.
    #[must_use]
    pub fn new(
        env: Arc<E>,
        assembly: CartAssembly<E>,
        products: ProductCache<E::Store, E::Cache>,
        carts: CartStore<E::Cart>,
        config: CheckoutConfig,
        topic: impl Into<String>,
        span: Span,
    ) -> Self {
        let publish_policy = RetryPolicy::attempts(config.publish_attempts, config.publish_backoff);
        Self {
            env,
            assembly,
            products,
            carts,
            config,
            publish_policy,
            topic: topic.into(),
            span,
        }
    }

    /// Turn the user's cart into an order.
    ///
    /// Returns the committed order with its items.
    ///
    /// # Errors
    ///
    /// - `CartEmpty` if there is nothing to order
    /// - `InsufficientStock` naming the first product that ran out
    /// - `Timeout` if the deadline elapsed before the commit
    /// - `NotificationFailed` if the order was committed but the event could
    ///   not be published; the error carries the order
    /// - infrastructure errors, after which nothing was persisted
    pub async fn checkout(&self, user_id: UserId) -> Result<Order> {
        let (order, cart, ordered) = match self.place_order(user_id).await {
            Ok(placed) => placed,
            Err(e) => {
                record_outcome(e.kind());
                tracing::warn!(
                    parent: &self.span,
                    user_id = %user_id,
                    error = %e,
                    "Checkout failed"
                );
                return Err(e);
            },
        };

        let ids: Vec<ProductId> = ordered.iter().map(|p| p.id).collect();
        self.products.invalidate_many(&ids).await;
        self.products.spawn_widen(&ordered);

        self.clear_ordered_lines(&order, &cart).await;

        if let Err(reason) = self.publish(&order).await {
            record_outcome("notification_failed");
            tracing::error!(
                parent: &self.span,
                order_id = %order.id,
                user_id = %user_id,
                error = %reason,
                "Order created but event publishing failed"
            );
            return Err(StorefrontError::NotificationFailed {
                order: Box::new(order),
                reason,
            });
        }

        record_outcome("success");
        tracing::info!(
            parent: &self.span,
            order_id = %order.id,
            user_id = %user_id,
            total_amount = order.total_amount,
            items = order.items.len(),
            "Order created"
        );
        Ok(order)
    }

    async fn place_order(
        &self,
        user_id: UserId,
    ) -> Result<(Order, MaterializedCart, Vec<Product>)> {
        let deadline = self.config.deadline;
        let prepared = match tokio::time::timeout(deadline, self.prepare_order(user_id)).await {
            Ok(prepared) => prepared?,
            // The dropped transaction rolls back.
            Err(_) => {
                return Err(StorefrontError::Timeout(format!(
                    "checkout exceeded {}ms",
                    deadline.as_millis()
                )));
            },
        };

        prepared.tx.commit().await?;
        Ok((prepared.order, prepared.cart, prepared.products))
    }

    async fn prepare_order(
        &self,
        user_id: UserId,
    ) -> Result<Prepared<<E::Store as TransactionalStore>::Tx>> {
        let cart = self.assembly.materialize(user_id).await?;
        if cart.is_empty() {
            return Err(StorefrontError::CartEmpty);
        }

        let mut tx = self.env.store().begin().await?;
        match self.write_order(&mut tx, user_id, &cart).await {
            Ok((order, products)) => Ok(Prepared {
                tx,
                order,
                cart,
                products,
            }),
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(
                        parent: &self.span,
                        error = %rollback,
                        "Checkout rollback failed"
                    );
                }
                Err(e)
            },
        }
    }

    async fn write_order(
        &self,
        tx: &mut <E::Store as TransactionalStore>::Tx,
        user_id: UserId,
        cart: &MaterializedCart,
    ) -> Result<(Order, Vec<Product>)> {
        let mut order = Order::pending(OrderId::new(), user_id, self.env.clock().now());
        tx.insert_order(&order).await?;

        let mut total: i64 = 0;
        let mut products = Vec::with_capacity(cart.items.len());
        for line in &cart.items {
            // The decrement returns the row as of this transaction, so the
            // order line carries the price at checkout time.
            let product = tx.decrement_stock(line.product_id, line.quantity).await?;
            let item = OrderItem {
                id: OrderItemId::new(),
                order_id: order.id,
                product_id: line.product_id,
                quantity: line.quantity,
                price: product.price,
            };
            tx.insert_order_item(&item).await?;

            total = product
                .price
                .checked_mul(i64::from(line.quantity))
                .and_then(|line_total| total.checked_add(line_total))
                .ok_or_else(|| {
                    StorefrontError::Validation("order total out of range".to_string())
                })?;
            order.items.push(item);
            products.push(product);
        }

        order.total_amount = total;
        tx.set_order_total(&order).await?;
        Ok((order, products))
    }

    async fn clear_ordered_lines(&self, order: &Order, cart: &MaterializedCart) {
        for item in &order.items {
            if let Err(e) = self.carts.remove(order.user_id, item.product_id).await {
                tracing::warn!(
                    parent: &self.span,
                    order_id = %order.id,
                    product_id = %item.product_id,
                    error = %e,
                    "Failed to clear ordered cart line"
                );
            }
        }
        tracing::debug!(
            parent: &self.span,
            order_id = %order.id,
            lines = cart.total_items,
            "Cart cleared"
        );
    }

    async fn publish(&self, order: &Order) -> std::result::Result<(), String> {
        let metadata = serde_json::json!({
            PARTITION_KEY: order.user_id.to_string(),
            "correlation_id": order.id.to_string(),
        });
        let event = SerializedEvent::from_event(&OrderCreated::from_order(order), Some(metadata))
            .map_err(|e| e.to_string())?;

        let bus = self.env.event_bus();
        retry_with_backoff(&self.publish_policy, || bus.publish(&self.topic, &event))
            .await
            .map_err(|e| e.to_string())
    }
}
