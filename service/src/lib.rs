//! # Storefront Service
//!
//! Catalog, cart and checkout services for the storefront backend, generic over
//! [`Environment`](storefront_core::environment::Environment).
//!
//! ```text
//!             ┌────────────┐    ┌─────────────┐    ┌────────────────┐
//! request ──► │ CartService│───►│ CartAssembly│───►│ ProductCache    │──► Postgres
//!             └─────┬──────┘    └──────┬──────┘    └────────────────┘
//!                   │                  │           ┌────────────────┐
//!                   ▼                  └──────────►│ AccountDirectory│
//!             ┌────────────┐                       └────────────────┘
//!             │ CartStore  │──► Redis hash ──► BackupQueue ──► cart mirror
//!             └────────────┘
//!
//! CheckoutEngine: CartAssembly → Postgres transaction → CartStore → EventBus
//! ```
//!
//! Components receive a [`tracing::Span`] at construction and log under it.
//! Binaries install the subscriber (see [`init_tracing`]).

pub mod accounts;
pub mod assembly;
pub mod backup;
pub mod bootstrap;
pub mod cart;
pub mod cart_store;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod product_cache;
pub mod retry;

pub use accounts::{HttpAccountDirectory, authenticate};
pub use assembly::CartAssembly;
pub use backup::{BackupJob, BackupQueue, BackupWorkers};
pub use cart::CartService;
pub use cart_store::CartStore;
pub use catalog::Catalog;
pub use checkout::CheckoutEngine;
pub use config::Config;
pub use product_cache::ProductCache;

use std::sync::Arc;
use storefront_core::environment::Environment;
use tracing::Span;

/// Every storefront service, wired over one environment.
pub struct Storefront<E: Environment> {
    /// Product reads and writes
    pub catalog: Catalog<E>,
    /// Cart operations
    pub carts: CartService<E>,
    /// Checkout
    pub checkout: CheckoutEngine<E>,
    backups: BackupWorkers,
}

impl<E: Environment> Storefront<E> {
    /// Build the services and start the cart backup workers.
    ///
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn new(env: Arc<E>, config: &Config, span: Span) -> Self {
        let products = ProductCache::new(
            env.store().clone(),
            env.cache().clone(),
            config.cache.clone(),
            span.clone(),
        );
        let (backups, queue) =
            BackupWorkers::start(env.mirror().clone(), &config.cart, span.clone());
        let cart_store = CartStore::new(env.cart().clone(), queue, config.cart.ttl, span.clone());
        let assembly = CartAssembly::new(
            Arc::clone(&env),
            products.clone(),
            cart_store.clone(),
            span.clone(),
        );

        Self {
            catalog: Catalog::new(Arc::clone(&env), products.clone(), span.clone()),
            carts: CartService::new(
                Arc::clone(&env),
                products.clone(),
                cart_store.clone(),
                assembly.clone(),
                span.clone(),
            ),
            checkout: CheckoutEngine::new(
                env,
                assembly,
                products,
                cart_store,
                config.checkout.clone(),
                config.redpanda.topic.clone(),
                span,
            ),
            backups,
        }
    }

    /// Drain pending cart backups and stop the workers.
    pub async fn shutdown(self) {
        self.backups.shutdown().await;
    }
}

/// Install the global `tracing` subscriber for a binary.
///
/// Honors `RUST_LOG`; defaults to `info,storefront=debug,sqlx=warn`.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,storefront=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
