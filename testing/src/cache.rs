//! In-memory product cache backend.

use crate::poisoned;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use storefront_core::error::{Result, StorefrontError};
use storefront_core::providers::CacheBackend;

#[derive(Debug, Default)]
struct Inner {
    entries: RwLock<HashMap<String, (String, Duration)>>,
    gets: AtomicUsize,
    sets: AtomicUsize,
    unavailable: AtomicBool,
    fail_writes: AtomicBool,
}

/// In-memory [`CacheBackend`].
///
/// TTLs are recorded, not enforced; call [`expire`](Self::expire) to simulate
/// an entry timing out.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    inner: Arc<Inner>,
}

impl InMemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.inner.entries.read().unwrap().contains_key(key)
    }

    /// Raw value of a key.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.inner
            .entries
            .read()
            .unwrap()
            .get(key)
            .map(|(value, _)| value.clone())
    }

    /// TTL a key was written with.
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.inner.entries.read().unwrap().get(key).map(|(_, ttl)| *ttl)
    }

    /// All keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.entries.read().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Drop a key as if its TTL elapsed.
    pub fn expire(&self, key: &str) {
        self.inner.entries.write().unwrap().remove(key);
    }

    /// Number of read calls (`get` and `get_many`).
    #[must_use]
    pub fn gets(&self) -> usize {
        self.inner.gets.load(Ordering::SeqCst)
    }

    /// Number of write calls (`set` and `set_many`).
    #[must_use]
    pub fn sets(&self) -> usize {
        self.inner.sets.load(Ordering::SeqCst)
    }

    /// Make every call fail with `Cache`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make writes and deletes fail with `Cache` while reads keep working.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self, write: bool) -> Result<()> {
        if self.inner.unavailable.load(Ordering::SeqCst)
            || (write && self.inner.fail_writes.load(Ordering::SeqCst))
        {
            return Err(StorefrontError::Cache("cache unavailable".to_string()));
        }
        Ok(())
    }
}

/// Redis-style glob match supporting `*` and `?`.
fn glob_match(pattern: &str, key: &str) -> bool {
    fn matches(p: &[char], k: &[char]) -> bool {
        match p.split_first() {
            None => k.is_empty(),
            Some(('*', rest)) => (0..=k.len()).any(|i| matches(rest, &k[i..])),
            Some(('?', rest)) => !k.is_empty() && matches(rest, &k[1..]),
            Some((c, rest)) => k.first() == Some(c) && matches(rest, &k[1..]),
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let k: Vec<char> = key.chars().collect();
    matches(&p, &k)
}

impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check(false)?;
        self.inner.gets.fetch_add(1, Ordering::SeqCst);
        let entries = self.inner.entries.read().map_err(poisoned)?;
        Ok(entries.get(key).map(|(value, _)| value.clone()))
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        self.check(false)?;
        self.inner.gets.fetch_add(1, Ordering::SeqCst);
        let entries = self.inner.entries.read().map_err(poisoned)?;
        Ok(keys
            .iter()
            .map(|key| entries.get(key).map(|(value, _)| value.clone()))
            .collect())
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.check(true)?;
        self.inner.sets.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.inner.entries.write().map_err(poisoned)?;
        entries.insert(key.to_string(), (value.to_string(), ttl));
        Ok(())
    }

    async fn set_many(&self, items: &[(String, String)], ttl: Duration) -> Result<()> {
        self.check(true)?;
        self.inner.sets.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.inner.entries.write().map_err(poisoned)?;
        for (key, value) in items {
            entries.insert(key.clone(), (value.clone(), ttl));
        }
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        self.check(true)?;
        let mut entries = self.inner.entries.write().map_err(poisoned)?;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<usize> {
        self.check(true)?;
        let mut entries = self.inner.entries.write().map_err(poisoned)?;
        let before = entries.len();
        entries.retain(|key, _| !glob_match(pattern, key));
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_prefix_patterns() {
        assert!(glob_match("product:*", "product:abc"));
        assert!(glob_match("product:*", "product:"));
        assert!(!glob_match("product:*", "products:all"));
        assert!(glob_match("a?c", "abc"));
    }
}
