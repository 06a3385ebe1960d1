//! Redis adapters for the storefront backend.
//!
//! - [`RedisCacheBackend`]: string keys with TTL for the product cache
//!   (`product:{id}`, `all_products`, `products_by_*:{..}`)
//! - [`RedisCartBackend`]: one hash per user cart (`cart:{user_id}`)
//!
//! Both share a [`RedisConnection`], a cloneable `ConnectionManager` wrapper that
//! puts every round trip under a deadline so a slow Redis cannot stall a request.
//!
//! # Example
//!
//! ```no_run
//! use storefront_redis::{RedisCacheBackend, RedisCartBackend, RedisConnection};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let conn =
//!     RedisConnection::connect("redis://127.0.0.1:6379", Duration::from_millis(500)).await?;
//! let cache = RedisCacheBackend::new(conn.clone());
//! let carts = RedisCartBackend::new(conn);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod cart;

pub use cache::RedisCacheBackend;
pub use cart::RedisCartBackend;

use redis::aio::ConnectionManager;
use redis::{Client, RedisResult};
use std::future::Future;
use std::time::Duration;
use storefront_core::error::{Result, StorefrontError};

/// Cloneable Redis connection with a per-operation deadline.
#[derive(Clone)]
pub struct RedisConnection {
    /// Connection manager for connection pooling and reconnects.
    conn_manager: ConnectionManager,
    /// Deadline applied to each round trip.
    op_timeout: Duration,
}

impl RedisConnection {
    /// Connect to Redis.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    /// * `op_timeout` - deadline for each command or pipeline
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::Cache`] if the connection cannot be established.
    pub async fn connect(redis_url: &str, op_timeout: Duration) -> Result<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            StorefrontError::Cache(format!("Failed to create Redis client: {e}"))
        })?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            StorefrontError::Cache(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::info!(op_timeout_ms = op_timeout.as_millis(), "Redis connection ready");
        Ok(Self {
            conn_manager,
            op_timeout,
        })
    }

    /// A connection handle for one operation.
    fn handle(&self) -> ConnectionManager {
        self.conn_manager.clone()
    }

    /// Run one Redis round trip under the configured deadline.
    async fn run<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = RedisResult<T>> + Send,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StorefrontError::Cache(format!("Redis {operation} failed: {e}"))),
            Err(_) => Err(StorefrontError::Timeout(format!(
                "Redis {operation} exceeded {}ms",
                self.op_timeout.as_millis()
            ))),
        }
    }
}

/// Expiry in whole seconds, never zero (Redis rejects `EX 0`).
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
