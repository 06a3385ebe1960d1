//! # Storefront Core
//!
//! Domain types, error taxonomy and collaborator traits for the storefront
//! catalog/cart backend.
//!
//! This crate contains no I/O. Adapters live in sibling crates:
//!
//! - `storefront-postgres`: products, orders, checkout transaction, cart mirror
//! - `storefront-redis`: product cache backend and cart hashes
//! - `storefront-redpanda`: order event publishing
//! - `storefront-testing`: in-memory implementations of every trait
//!
//! Business logic (product cache, cart store, cart assembly, checkout) lives in
//! `storefront-service` and is generic over [`environment::Environment`].

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod cart;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod ids;
pub mod order;
pub mod product;
pub mod providers;

pub use error::{Result, StorefrontError};
pub use ids::{OrderId, OrderItemId, ProductId, UserId};

/// Environment module - injected dependencies.
///
/// All external dependencies are abstracted behind traits and injected via an
/// [`Environment`](environment::Environment) implementation: Postgres/Redis in
/// production, in-memory stores in tests.
pub mod environment {
    use crate::event_bus::EventBus;
    use crate::providers::{
        AccountDirectory, CacheBackend, CartBackend, CartMirror, ProductRepository,
        TransactionalStore,
    };
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Everything the storefront services talk to.
    ///
    /// Services hold an `Arc<E>`. Collaborators are cheap handles that are
    /// cloned into detached tasks (cache population, mirror writes).
    pub trait Environment: Send + Sync + 'static {
        /// Relational product store, also used for checkout transactions.
        type Store: ProductRepository + TransactionalStore + Clone + 'static;
        /// Fast-store key/value backend for the product cache.
        type Cache: CacheBackend + Clone + 'static;
        /// Fast-store hash backend for carts.
        type Cart: CartBackend + Clone + 'static;
        /// Relational cart mirror.
        type Mirror: CartMirror + Clone + 'static;
        /// Remote account service.
        type Accounts: AccountDirectory + Clone + 'static;

        /// Relational product store.
        fn store(&self) -> &Self::Store;

        /// Product cache backend.
        fn cache(&self) -> &Self::Cache;

        /// Cart hash backend.
        fn cart(&self) -> &Self::Cart;

        /// Relational cart mirror.
        fn mirror(&self) -> &Self::Mirror;

        /// Account service.
        fn accounts(&self) -> &Self::Accounts;

        /// Outbound event bus.
        fn event_bus(&self) -> &dyn EventBus;

        /// Clock for timestamps.
        ///
        /// Production uses `SystemClock`, tests use `FixedClock`.
        fn clock(&self) -> &dyn Clock;
    }
}
