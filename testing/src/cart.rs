//! In-memory cart hashes.

use crate::poisoned;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use storefront_core::error::{Result, StorefrontError};
use storefront_core::providers::CartBackend;

#[derive(Debug, Default)]
struct Inner {
    hashes: RwLock<HashMap<String, BTreeMap<String, String>>>,
    ttls: RwLock<HashMap<String, Duration>>,
    failing_removals: Mutex<HashSet<String>>,
    unavailable: AtomicBool,
}

/// In-memory [`CartBackend`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartBackend {
    inner: Arc<Inner>,
}

impl InMemoryCartBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value of one hash field.
    #[must_use]
    pub fn raw(&self, key: &str, field: &str) -> Option<String> {
        self.inner
            .hashes
            .read()
            .unwrap()
            .get(key)
            .and_then(|hash| hash.get(field).cloned())
    }

    /// Number of fields in a hash.
    #[must_use]
    pub fn field_count(&self, key: &str) -> usize {
        self.inner.hashes.read().unwrap().get(key).map_or(0, BTreeMap::len)
    }

    /// Expiry last set on a hash.
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.inner.ttls.read().unwrap().get(key).copied()
    }

    /// Drop a whole hash as if the fast store lost it.
    pub fn wipe(&self, key: &str) {
        self.inner.hashes.write().unwrap().remove(key);
        self.inner.ttls.write().unwrap().remove(key);
    }

    /// Make removal of one field fail with `Cache`.
    pub fn fail_removal_of(&self, field: impl Into<String>) {
        self.inner.failing_removals.lock().unwrap().insert(field.into());
    }

    /// Make every call fail with `Cache`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(StorefrontError::Cache("cart store unavailable".to_string()));
        }
        Ok(())
    }

    fn touch(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut ttls = self.inner.ttls.write().map_err(poisoned)?;
        ttls.insert(key.to_string(), ttl);
        Ok(())
    }
}

impl CartBackend for InMemoryCartBackend {
    async fn field(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.check()?;
        let hashes = self.inner.hashes.read().map_err(poisoned)?;
        Ok(hashes.get(key).and_then(|hash| hash.get(field).cloned()))
    }

    async fn fields(&self, key: &str) -> Result<Vec<(String, String)>> {
        self.check()?;
        let hashes = self.inner.hashes.read().map_err(poisoned)?;
        Ok(hashes
            .get(key)
            .map(|hash| hash.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn put_field(&self, key: &str, field: &str, value: &str, ttl: Duration) -> Result<()> {
        self.check()?;
        {
            let mut hashes = self.inner.hashes.write().map_err(poisoned)?;
            hashes
                .entry(key.to_string())
                .or_default()
                .insert(field.to_string(), value.to_string());
        }
        self.touch(key, ttl)
    }

    async fn put_fields(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Duration,
    ) -> Result<()> {
        self.check()?;
        {
            let mut hashes = self.inner.hashes.write().map_err(poisoned)?;
            let hash = hashes.entry(key.to_string()).or_default();
            for (field, value) in fields {
                hash.insert(field.clone(), value.clone());
            }
        }
        self.touch(key, ttl)
    }

    async fn remove_field(&self, key: &str, field: &str, ttl: Duration) -> Result<()> {
        self.check()?;
        if self.inner.failing_removals.lock().map_err(poisoned)?.contains(field) {
            return Err(StorefrontError::Cache(format!("HDEL {key} {field} failed")));
        }
        {
            let mut hashes = self.inner.hashes.write().map_err(poisoned)?;
            if let Some(hash) = hashes.get_mut(key) {
                hash.remove(field);
                if hash.is_empty() {
                    hashes.remove(key);
                }
            }
        }
        self.touch(key, ttl)
    }

    async fn swap_field(
        &self,
        key: &str,
        field: &str,
        expected: Option<&str>,
        value: Option<&str>,
        ttl: Duration,
    ) -> Result<bool> {
        self.check()?;
        let mut hashes = self.inner.hashes.write().map_err(poisoned)?;
        let current = hashes.get(key).and_then(|hash| hash.get(field));
        if current.map(String::as_str) != expected {
            return Ok(false);
        }
        match value {
            Some(value) => {
                hashes
                    .entry(key.to_string())
                    .or_default()
                    .insert(field.to_string(), value.to_string());
            },
            None => {
                if let Some(hash) = hashes.get_mut(key) {
                    hash.remove(field);
                    if hash.is_empty() {
                        hashes.remove(key);
                    }
                }
            },
        }
        drop(hashes);
        self.touch(key, ttl)?;
        Ok(true)
    }
}
