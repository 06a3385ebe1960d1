//! Scripted account service.

use crate::poisoned;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use storefront_core::error::{Result, StorefrontError};
use storefront_core::ids::UserId;
use storefront_core::providers::{AccountDirectory, Principal, SellerProfile, TokenValidation};

#[derive(Debug, Default)]
struct Inner {
    sellers: RwLock<HashMap<UserId, String>>,
    tokens: RwLock<HashMap<String, Principal>>,
    seller_calls: AtomicUsize,
    unavailable: AtomicBool,
}

/// [`AccountDirectory`] answering from registered sellers and tokens.
#[derive(Debug, Clone, Default)]
pub struct MockAccountDirectory {
    inner: Arc<Inner>,
}

impl MockAccountDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a seller display name.
    pub fn add_seller(&self, id: UserId, name: impl Into<String>) {
        self.inner.sellers.write().unwrap().insert(id, name.into());
    }

    /// Register a valid bearer token.
    pub fn add_token(&self, token: impl Into<String>, principal: Principal) {
        self.inner.tokens.write().unwrap().insert(token.into(), principal);
    }

    /// Number of `sellers` calls made.
    #[must_use]
    pub fn seller_calls(&self) -> usize {
        self.inner.seller_calls.load(Ordering::SeqCst)
    }

    /// Make every call fail with `Account`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(StorefrontError::Account("account service unavailable".to_string()));
        }
        Ok(())
    }
}

impl AccountDirectory for MockAccountDirectory {
    async fn validate_token(&self, credential: &str) -> Result<TokenValidation> {
        self.check()?;
        let tokens = self.inner.tokens.read().map_err(poisoned)?;
        Ok(match tokens.get(credential) {
            Some(principal) => TokenValidation::Valid(principal.clone()),
            None => TokenValidation::Rejected {
                reason: "unknown token".to_string(),
            },
        })
    }

    async fn sellers(&self, ids: &[UserId]) -> Result<Vec<SellerProfile>> {
        self.inner.seller_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let sellers = self.inner.sellers.read().map_err(poisoned)?;
        Ok(ids
            .iter()
            .filter_map(|id| {
                sellers.get(id).map(|name| SellerProfile {
                    id: *id,
                    name: name.clone(),
                })
            })
            .collect())
    }
}
