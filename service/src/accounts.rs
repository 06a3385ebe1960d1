//! HTTP client for the remote account service.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use storefront_core::error::{Result, StorefrontError};
use storefront_core::ids::UserId;
use storefront_core::providers::{AccountDirectory, Principal, SellerProfile, TokenValidation};

#[derive(Serialize)]
struct ValidateTokenRequest<'a> {
    token: &'a str,
}

#[derive(Deserialize)]
struct ValidateTokenResponse {
    valid: bool,
    #[serde(default)]
    user_id: Option<UserId>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
struct UsersRequest<'a> {
    ids: &'a [UserId],
}

#[derive(Deserialize)]
struct UsersResponse {
    #[serde(default)]
    users: Vec<UserRecord>,
}

#[derive(Deserialize)]
struct UserRecord {
    id: UserId,
    username: String,
}

/// [`AccountDirectory`] over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpAccountDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAccountDirectory {
    /// Create a client for `base_url` with a per-call timeout.
    ///
    /// # Errors
    ///
    /// Returns `Account` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorefrontError::Account(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post<Req: Serialize + ?Sized, Resp: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StorefrontError::Timeout(format!("account service {path}"))
                } else {
                    StorefrontError::Account(format!("Request to {path} failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorefrontError::Account(format!(
                "{path} returned {}: {body}",
                status.as_u16()
            )));
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| StorefrontError::Account(format!("Invalid response from {path}: {e}")))
    }
}

impl AccountDirectory for HttpAccountDirectory {
    async fn validate_token(&self, credential: &str) -> Result<TokenValidation> {
        let response: ValidateTokenResponse = self
            .post("/v1/tokens/validate", &ValidateTokenRequest { token: credential })
            .await?;

        if !response.valid {
            return Ok(TokenValidation::Rejected {
                reason: response.error.unwrap_or_else(|| "invalid token".to_string()),
            });
        }
        let user_id = response.user_id.ok_or_else(|| {
            StorefrontError::Account("valid token response without user_id".to_string())
        })?;
        Ok(TokenValidation::Valid(Principal {
            user_id,
            username: response.username.unwrap_or_default(),
            role: response.role.unwrap_or_default(),
        }))
    }

    async fn sellers(&self, ids: &[UserId]) -> Result<Vec<SellerProfile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let response: UsersResponse = self.post("/v1/users/batch", &UsersRequest { ids }).await?;
        Ok(response
            .users
            .into_iter()
            .map(|user| SellerProfile {
                id: user.id,
                name: user.username,
            })
            .collect())
    }
}

/// Resolve a bearer credential to the calling principal.
///
/// Accepts the raw token or an `Authorization` header value (`Bearer <token>`).
///
/// # Errors
///
/// - `Unauthorized` if the credential is missing or rejected
/// - `Account` if the account service could not be reached
pub async fn authenticate<A: AccountDirectory>(
    accounts: &A,
    credential: &str,
) -> Result<Principal> {
    let token = credential
        .strip_prefix("Bearer ")
        .unwrap_or(credential)
        .trim();
    if token.is_empty() {
        return Err(StorefrontError::Unauthorized("missing credential".to_string()));
    }
    match accounts.validate_token(token).await? {
        TokenValidation::Valid(principal) => Ok(principal),
        TokenValidation::Rejected { reason } => {
            tracing::debug!(reason, "Credential rejected");
            Err(StorefrontError::Unauthorized(reason))
        },
    }
}
