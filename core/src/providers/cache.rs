//! Fast-store key/value trait used by the product cache.

use crate::error::Result;
use std::time::Duration;

/// String key/value operations against the fast store.
///
/// Values are opaque strings (JSON in practice). Every method is a single
/// network round trip.
pub trait CacheBackend: Send + Sync {
    /// Read one key.
    ///
    /// # Errors
    ///
    /// Returns `Cache` if the store is unreachable.
    fn get(&self, key: &str) -> impl std::future::Future<Output = Result<Option<String>>> + Send;

    /// Read many keys in one round trip. The result is positional.
    ///
    /// # Errors
    ///
    /// Returns `Cache` if the store is unreachable.
    fn get_many(
        &self,
        keys: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<Option<String>>>> + Send;

    /// Write one key with a time-to-live.
    ///
    /// # Errors
    ///
    /// Returns `Cache` if the store is unreachable.
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Write many keys with the same time-to-live in one pipeline.
    ///
    /// # Errors
    ///
    /// Returns `Cache` if the store is unreachable.
    fn set_many(
        &self,
        entries: &[(String, String)],
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Delete keys. Missing keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns `Cache` if the store is unreachable.
    fn delete(&self, keys: &[String]) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Delete every key matching a glob pattern using a cursor-based scan.
    ///
    /// Returns the number of deleted keys.
    ///
    /// # Errors
    ///
    /// Returns `Cache` if the store is unreachable.
    fn delete_matching(
        &self,
        pattern: &str,
    ) -> impl std::future::Future<Output = Result<usize>> + Send;
}
