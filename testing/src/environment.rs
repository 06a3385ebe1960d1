//! Fully in-memory [`Environment`].

use crate::mocks::{FixedClock, test_clock};
use crate::{
    InMemoryCache, InMemoryCartBackend, InMemoryCatalog, InMemoryEventBus, MockAccountDirectory,
};
use storefront_core::environment::{Clock, Environment};
use storefront_core::event_bus::EventBus;
use storefront_core::ids::{ProductId, UserId};
use storefront_core::product::{Product, ProductDraft};

/// In-memory environment for service tests.
///
/// Fakes are cheaply cloneable handles, so a test can keep its own copies
/// (via the accessors) after moving the environment into an `Arc`.
#[derive(Debug)]
pub struct TestEnvironment {
    catalog: InMemoryCatalog,
    cache: InMemoryCache,
    cart: InMemoryCartBackend,
    accounts: MockAccountDirectory,
    events: InMemoryEventBus,
    clock: FixedClock,
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnvironment {
    /// Empty stores, clock fixed at 2025-01-01.
    #[must_use]
    pub fn new() -> Self {
        Self {
            catalog: InMemoryCatalog::new(),
            cache: InMemoryCache::new(),
            cart: InMemoryCartBackend::new(),
            accounts: MockAccountDirectory::new(),
            events: InMemoryEventBus::new(),
            clock: test_clock(),
        }
    }

    /// Relational store handle (products, orders, mirror).
    #[must_use]
    pub fn catalog(&self) -> &InMemoryCatalog {
        &self.catalog
    }

    /// Product cache handle.
    #[must_use]
    pub fn cache_store(&self) -> &InMemoryCache {
        &self.cache
    }

    /// Cart hash handle.
    #[must_use]
    pub fn cart_store(&self) -> &InMemoryCartBackend {
        &self.cart
    }

    /// Account service handle.
    #[must_use]
    pub fn account_directory(&self) -> &MockAccountDirectory {
        &self.accounts
    }

    /// Event bus handle.
    #[must_use]
    pub fn events(&self) -> &InMemoryEventBus {
        &self.events
    }

    /// The fixed clock.
    #[must_use]
    pub fn fixed_clock(&self) -> &FixedClock {
        &self.clock
    }

    /// Seed a product owned by a fresh seller named "Acme".
    #[must_use]
    pub fn seed_product(&self, price: i64, stock: i32) -> Product {
        let seller = UserId::new();
        self.accounts.add_seller(seller, "Acme");
        self.seed_product_for(seller, "Widget", price, stock)
    }

    /// Seed a product with an explicit seller and name.
    #[must_use]
    pub fn seed_product_for(&self, seller: UserId, name: &str, price: i64, stock: i32) -> Product {
        let product = Product::from_draft(
            ProductId::new(),
            seller,
            ProductDraft {
                name: name.to_string(),
                price,
                stock,
                discount: 0,
                product_type: "gadget".to_string(),
                description: format!("{name} description"),
            },
            self.clock.now(),
        );
        self.catalog.seed(product.clone());
        product
    }
}

impl Environment for TestEnvironment {
    type Store = InMemoryCatalog;
    type Cache = InMemoryCache;
    type Cart = InMemoryCartBackend;
    type Mirror = InMemoryCatalog;
    type Accounts = MockAccountDirectory;

    fn store(&self) -> &InMemoryCatalog {
        &self.catalog
    }

    fn cache(&self) -> &InMemoryCache {
        &self.cache
    }

    fn cart(&self) -> &InMemoryCartBackend {
        &self.cart
    }

    fn mirror(&self) -> &InMemoryCatalog {
        &self.catalog
    }

    fn accounts(&self) -> &MockAccountDirectory {
        &self.accounts
    }

    fn event_bus(&self) -> &dyn EventBus {
        &self.events
    }

    fn clock(&self) -> &dyn Clock {
        &self.clock
    }
}
