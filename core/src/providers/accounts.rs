//! Account service trait.

use crate::error::Result;
use crate::ids::UserId;
use serde::{Deserialize, Serialize};

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// User identity.
    pub user_id: UserId,
    /// Login name.
    pub username: String,
    /// Role name (`"admin"`, `"seller"`, `"customer"`, ...).
    pub role: String,
}

impl Principal {
    /// Role that may modify any seller's products.
    pub const ADMIN_ROLE: &'static str = "admin";

    /// Whether the principal has the admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Self::ADMIN_ROLE
    }
}

/// Outcome of validating a bearer credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenValidation {
    /// The credential is valid.
    Valid(Principal),
    /// The credential was rejected.
    Rejected {
        /// Reason given by the account service.
        reason: String,
    },
}

/// Seller display data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerProfile {
    /// Seller identity.
    pub id: UserId,
    /// Display name.
    pub name: String,
}

/// Remote account/auth service.
pub trait AccountDirectory: Send + Sync {
    /// Resolve a bearer credential.
    ///
    /// # Errors
    ///
    /// Returns `Account` if the service could not be reached. A rejected
    /// credential is `Ok(TokenValidation::Rejected { .. })`.
    fn validate_token(
        &self,
        credential: &str,
    ) -> impl std::future::Future<Output = Result<TokenValidation>> + Send;

    /// Resolve display names for many sellers in one call.
    ///
    /// Unknown ids are omitted.
    ///
    /// # Errors
    ///
    /// Returns `Account` if the service could not be reached.
    fn sellers(
        &self,
        ids: &[UserId],
    ) -> impl std::future::Future<Output = Result<Vec<SellerProfile>>> + Send;
}
