//! Production wiring: Postgres, Redis, the account service and an event sink.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = Config::from_env();
//! let resources = Resources::connect(&config).await?;
//! let env = resources.into_environment(connect_event_bus(&config.redpanda)?);
//! let storefront = Storefront::new(Arc::new(env), &config, tracing::info_span!("storefront"));
//! ```

use crate::accounts::HttpAccountDirectory;
use crate::config::Config;
use std::sync::Arc;
use storefront_core::environment::{Clock, Environment, SystemClock};
use storefront_core::error::Result;
use storefront_core::event_bus::EventBus;
use storefront_postgres::PostgresStore;
use storefront_redis::{RedisCacheBackend, RedisCartBackend, RedisConnection};
use tracing::info;

/// Connected infrastructure, before an event sink is attached.
///
/// Enough for administrative tasks (migrations, cache reset, cart restore).
#[derive(Clone)]
pub struct Resources {
    /// Relational store (products, orders, cart mirror)
    pub store: PostgresStore,
    /// Product cache backend
    pub cache: RedisCacheBackend,
    /// Cart hash backend
    pub carts: RedisCartBackend,
    /// Account service client
    pub accounts: HttpAccountDirectory,
}

impl Resources {
    /// Connect every store named in `config`.
    ///
    /// # Errors
    ///
    /// Returns `Database`, `Cache` or `Account` if a connection cannot be made.
    pub async fn connect(config: &Config) -> Result<Self> {
        info!(url = %redact(&config.postgres.url), "Connecting to PostgreSQL...");
        let store = PostgresStore::connect_with(
            &config.postgres.url,
            config.postgres.max_connections,
            config.postgres.min_connections,
            config.postgres.connect_timeout,
        )
        .await?;

        info!(url = %redact(&config.redis.url), "Connecting to Redis...");
        let redis = RedisConnection::connect(&config.redis.url, config.redis.op_timeout).await?;

        let accounts =
            HttpAccountDirectory::new(&config.accounts.base_url, config.accounts.timeout)?;
        info!("Infrastructure connected");

        Ok(Self {
            store,
            cache: RedisCacheBackend::new(redis.clone()),
            carts: RedisCartBackend::new(redis),
            accounts,
        })
    }

    /// Attach an event sink.
    #[must_use]
    pub fn into_environment(self, event_bus: Arc<dyn EventBus>) -> LiveEnvironment {
        LiveEnvironment {
            resources: self,
            event_bus,
            clock: SystemClock,
        }
    }
}

/// Connect the Redpanda event sink.
///
/// # Errors
///
/// Returns `EventBus` if the producer cannot be created.
#[cfg(feature = "redpanda")]
pub fn connect_event_bus(config: &crate::config::RedpandaConfig) -> Result<Arc<dyn EventBus>> {
    info!(brokers = %config.brokers, "Connecting to Redpanda event bus...");
    let bus = storefront_redpanda::RedpandaEventBus::builder()
        .brokers(&config.brokers)
        .producer_acks(&config.acks)
        .timeout(config.timeout)
        .build()?;
    Ok(Arc::new(bus))
}

/// Production [`Environment`].
pub struct LiveEnvironment {
    resources: Resources,
    event_bus: Arc<dyn EventBus>,
    clock: SystemClock,
}

impl Environment for LiveEnvironment {
    type Store = PostgresStore;
    type Cache = RedisCacheBackend;
    type Cart = RedisCartBackend;
    type Mirror = PostgresStore;
    type Accounts = HttpAccountDirectory;

    fn store(&self) -> &PostgresStore {
        &self.resources.store
    }

    fn cache(&self) -> &RedisCacheBackend {
        &self.resources.cache
    }

    fn cart(&self) -> &RedisCartBackend {
        &self.resources.carts
    }

    fn mirror(&self) -> &PostgresStore {
        &self.resources.store
    }

    fn accounts(&self) -> &HttpAccountDirectory {
        &self.resources.accounts
    }

    fn event_bus(&self) -> &dyn EventBus {
        self.event_bus.as_ref()
    }

    fn clock(&self) -> &dyn Clock {
        &self.clock
    }
}

/// Strip the password from a connection URL for logging.
fn redact(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    match rest.rsplit_once('@') {
        Some((credentials, host)) => {
            let user = credentials.split(':').next().unwrap_or_default();
            format!("{scheme}://{user}:***@{host}")
        },
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_passwords() {
        assert_eq!(
            redact("postgres://app:secret@db:5432/storefront"),
            "postgres://app:***@db:5432/storefront"
        );
        assert_eq!(redact("redis://localhost:6379"), "redis://localhost:6379");
    }
}
