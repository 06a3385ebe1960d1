//! # Storefront Testing
//!
//! In-memory implementations of every collaborator trait in `storefront-core`,
//! plus a ready-made [`TestEnvironment`] wiring them together.
//!
//! Each fake counts the calls made against it and can be told to fail, so
//! tests can assert both behavior ("second read did not touch the store") and
//! degradation ("cache down still serves products").
//!
//! ## Example
//!
//! ```ignore
//! use storefront_testing::TestEnvironment;
//!
//! #[tokio::test]
//! async fn cache_serves_second_read() {
//!     let env = TestEnvironment::new();
//!     let product = env.seed_product(500, 10);
//!     // ... build a ProductCache over Arc::new(env) and read twice ...
//!     assert_eq!(env.catalog().product_reads(), 1);
//! }
//! ```

#![allow(clippy::unwrap_used)] // Test fakes: a poisoned lock is a test bug

mod accounts;
mod cache;
mod cart;
mod catalog;
mod environment;
mod event_bus;

pub use accounts::MockAccountDirectory;
pub use cache::InMemoryCache;
pub use cart::InMemoryCartBackend;
pub use catalog::{InMemoryCatalog, InMemoryTransaction};
pub use environment::TestEnvironment;
pub use event_bus::InMemoryEventBus;

use chrono::{DateTime, Utc};
use storefront_core::environment::Clock;

/// Mock implementations of Environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::RwLock;

    /// Fixed clock for deterministic tests
    ///
    /// Returns the same time until explicitly advanced.
    ///
    /// # Example
    ///
    /// ```
    /// use storefront_testing::mocks::FixedClock;
    /// use storefront_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2);
    /// ```
    #[derive(Debug)]
    pub struct FixedClock {
        time: RwLock<DateTime<Utc>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: RwLock::new(time),
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.write().unwrap();
            *time += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap()
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Property-based testing strategies for domain types.
pub mod properties {
    use proptest::prelude::*;
    use storefront_core::product::ProductDraft;

    /// Drafts that pass validation.
    pub fn valid_product_draft() -> impl Strategy<Value = ProductDraft> {
        (
            "[A-Za-z][A-Za-z ]{2,40}",
            1_i64..1_000_000,
            0_i32..10_000,
            0_i32..=100,
            "[A-Za-z]{1,12}",
            ".{0,80}",
        )
            .prop_map(|(name, price, stock, discount, product_type, description)| ProductDraft {
                name,
                price,
                stock,
                discount,
                product_type,
                description,
            })
    }

    /// Signed cart deltas, including removals.
    pub fn cart_delta() -> impl Strategy<Value = i32> {
        prop_oneof![-20_i32..=-1, 1_i32..=20]
    }
}

/// Install a `tracing` subscriber for test output (`RUST_LOG` aware).
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};

/// Lock poisoning surfaced as an internal error.
pub(crate) fn poisoned<T>(_: T) -> storefront_core::StorefrontError {
    storefront_core::StorefrontError::Internal("lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn test_fixed_clock_advances() {
        let clock = test_clock();
        let before = clock.now();
        clock.advance(chrono::Duration::seconds(30));
        assert_eq!(clock.now() - before, chrono::Duration::seconds(30));
    }
}
