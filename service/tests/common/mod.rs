//! Shared harness for service integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use storefront_core::ids::UserId;
use storefront_core::providers::Principal;
use storefront_service::{Config, Storefront};
use storefront_testing::TestEnvironment;

/// Services wired over an in-memory environment, plus the environment for
/// inspection and failure injection.
pub struct Harness {
    pub env: Arc<TestEnvironment>,
    pub storefront: Storefront<TestEnvironment>,
}

/// Defaults with short retry backoff so publish failures settle quickly.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.checkout.publish_backoff = Duration::from_millis(1);
    config.cart.backup_workers = 2;
    config
}

pub fn harness() -> Harness {
    harness_with(TestEnvironment::new(), &test_config())
}

pub fn harness_with(env: TestEnvironment, config: &Config) -> Harness {
    storefront_testing::init_test_tracing();
    let env = Arc::new(env);
    let storefront = Storefront::new(Arc::clone(&env), config, tracing::info_span!("test"));
    Harness { env, storefront }
}

pub fn seller(user_id: UserId) -> Principal {
    Principal {
        user_id,
        username: "seller".to_string(),
        role: "seller".to_string(),
    }
}

pub fn admin() -> Principal {
    Principal {
        user_id: UserId::new(),
        username: "root".to_string(),
        role: "admin".to_string(),
    }
}
