//! `PostgreSQL` storage for the storefront backend.
//!
//! [`PostgresStore`] implements three collaborator traits from `storefront-core`
//! over one connection pool:
//!
//! - [`ProductRepository`](storefront_core::providers::ProductRepository): product CRUD
//! - [`TransactionalStore`](storefront_core::providers::TransactionalStore): the checkout
//!   and batch stock transactions, with conditional stock decrements
//! - [`CartMirror`](storefront_core::providers::CartMirror): the best-effort cart backup table
//!
//! Queries are built at runtime with `sqlx::query`, so the crate compiles without
//! a live `DATABASE_URL`.
//!
//! # Example
//!
//! ```no_run
//! use storefront_postgres::PostgresStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresStore::connect("postgres://localhost/storefront", 10).await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cart_mirror;
mod products;
mod transaction;

pub use transaction::PostgresTransaction;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use storefront_core::error::{Result, StorefrontError};

/// `PostgreSQL`-backed product store, transaction source and cart mirror.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database with a bounded pool.
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::Database`] if the pool cannot be created.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        Self::connect_with(database_url, max_connections, 1, Duration::from_secs(30)).await
    }

    /// Connect with explicit pool sizing.
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::Database`] if the pool cannot be created.
    pub async fn connect_with(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| StorefrontError::Database(format!("Failed to connect: {e}")))?;

        tracing::info!(max_connections, "PostgreSQL pool ready");
        Ok(Self { pool })
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::Database`] if migrations fail.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorefrontError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}
