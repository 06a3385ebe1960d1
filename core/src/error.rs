//! Error types for the storefront backend.
//!
//! Every fallible operation in the workspace returns [`Result<T>`]. Variants are
//! grouped by how a caller should react to them:
//!
//! - **Client errors** are never retried and map to 4xx-style responses.
//! - **Infrastructure errors** carry a context string, are logged where they occur,
//!   and are safe for the client to retry.
//! - [`StorefrontError::NotificationFailed`] is the one partial-success case: the order
//!   is durable, only the downstream notification was lost.

use crate::order::Order;
use thiserror::Error;

/// Result type for storefront operations.
pub type Result<T> = std::result::Result<T, StorefrontError>;

/// Storefront error types.
#[derive(Error, Debug)]
pub enum StorefrontError {
    // ═══════════════════════════════════════════════════════════════════════
    // Client Errors
    // ═══════════════════════════════════════════════════════════════════════
    /// Malformed or missing input.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The requested entity does not exist (or was soft-deleted).
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind ("product", "cart item", ...).
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// Not enough stock to satisfy a cart update or checkout line.
    #[error(
        "Insufficient stock for product '{name}' ({product_id}): \
         requested {requested}, available {available}"
    )]
    InsufficientStock {
        /// Product identifier.
        product_id: String,
        /// Product display name.
        name: String,
        /// Requested quantity.
        requested: i32,
        /// Quantity available at the time of the check.
        available: i32,
    },

    /// Checkout was attempted against an empty cart.
    #[error("Cart is empty")]
    CartEmpty,

    /// The caller may not act on this resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The bearer credential was rejected by the account service.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A business rule conflicts with the current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    // ═══════════════════════════════════════════════════════════════════════
    // Infrastructure Errors
    // ═══════════════════════════════════════════════════════════════════════
    /// Relational store failure.
    #[error("Database error: {0}")]
    Database(String),

    /// Fast store failure.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Account service failure.
    #[error("Account service error: {0}")]
    Account(String),

    /// Event bus failure.
    #[error("Event bus error: {0}")]
    EventBus(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A deadline elapsed before the operation completed.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),

    // ═══════════════════════════════════════════════════════════════════════
    // Partial Success
    // ═══════════════════════════════════════════════════════════════════════
    /// The order was committed but the order-created event could not be published.
    #[error("Order {} was created but notification failed: {reason}", .order.id)]
    NotificationFailed {
        /// The committed order.
        order: Box<Order>,
        /// Why publishing failed.
        reason: String,
    },
}

impl StorefrontError {
    /// Shorthand for a product that does not exist.
    #[must_use]
    pub fn product_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "product",
            id: id.to_string(),
        }
    }

    /// Whether this error was caused by the caller's input or the current
    /// business state (never retried automatically).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::NotFound { .. }
                | Self::InsufficientStock { .. }
                | Self::CartEmpty
                | Self::Forbidden(_)
                | Self::Unauthorized(_)
                | Self::Conflict(_)
        )
    }

    /// Whether the client may retry the same request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database(_)
                | Self::Cache(_)
                | Self::Account(_)
                | Self::EventBus(_)
                | Self::Timeout(_)
        )
    }

    /// Stable label used in logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound { .. } => "not_found",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::CartEmpty => "cart_empty",
            Self::Forbidden(_) => "forbidden",
            Self::Unauthorized(_) => "unauthorized",
            Self::Conflict(_) => "conflict",
            Self::Database(_) => "database",
            Self::Cache(_) => "cache",
            Self::Account(_) => "account",
            Self::EventBus(_) => "event_bus",
            Self::Serialization(_) => "serialization",
            Self::Timeout(_) => "timeout",
            Self::Internal(_) => "internal",
            Self::NotificationFailed { .. } => "notification_failed",
        }
    }
}

impl From<serde_json::Error> for StorefrontError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
