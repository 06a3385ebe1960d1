//! Cart persistence traits.

use crate::cart::CartEntry;
use crate::error::Result;
use crate::ids::{ProductId, UserId};
use std::time::Duration;

/// Hash-per-key operations against the fast store.
///
/// A user's cart is one hash; each field is a product id and each value is an
/// encoded cart line. Every mutating call refreshes the expiry of the whole hash.
pub trait CartBackend: Send + Sync {
    /// Read one field.
    ///
    /// # Errors
    ///
    /// Returns `Cache` if the store is unreachable.
    fn field(
        &self,
        key: &str,
        field: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>>> + Send;

    /// Read every field of the hash.
    ///
    /// # Errors
    ///
    /// Returns `Cache` if the store is unreachable.
    fn fields(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Vec<(String, String)>>> + Send;

    /// Set one field and refresh the hash expiry atomically.
    ///
    /// # Errors
    ///
    /// Returns `Cache` if the store is unreachable.
    fn put_field(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Set many fields and refresh the hash expiry atomically.
    ///
    /// # Errors
    ///
    /// Returns `Cache` if the store is unreachable.
    fn put_fields(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Remove one field (absence is not an error) and refresh the hash expiry.
    ///
    /// # Errors
    ///
    /// Returns `Cache` if the store is unreachable.
    fn remove_field(
        &self,
        key: &str,
        field: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Replace one field only if it still holds `expected`, refreshing the hash
    /// expiry in the same atomic step.
    ///
    /// `expected: None` requires the field to be absent and `value: None`
    /// removes it. Returns `false` and writes nothing when the stored value
    /// differs from `expected`.
    ///
    /// # Errors
    ///
    /// Returns `Cache` if the store is unreachable.
    fn swap_field(
        &self,
        key: &str,
        field: &str,
        expected: Option<&str>,
        value: Option<&str>,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;
}

/// Best-effort relational copy of cart lines.
///
/// Written in the background after fast-store mutations; read only to restore
/// a cart after fast-store data loss.
pub trait CartMirror: Send + Sync {
    /// Insert or replace the row for `(entry.user_id, entry.product_id)`.
    ///
    /// # Errors
    ///
    /// Returns `Database` on failure.
    fn upsert(&self, entry: &CartEntry) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Delete the row for a line. Absence is not an error.
    ///
    /// # Errors
    ///
    /// Returns `Database` on failure.
    fn delete(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Load every mirrored line of a user.
    ///
    /// # Errors
    ///
    /// Returns `Database` on failure.
    fn load(
        &self,
        user_id: UserId,
    ) -> impl std::future::Future<Output = Result<Vec<CartEntry>>> + Send;
}
