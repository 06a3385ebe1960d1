//! Event bus abstraction for outbound domain events.
//!
//! The storefront only produces events; consumers (fulfilment, notifications,
//! analytics) live in other services. Publishing happens after the relational
//! commit, so the database stays the source of truth:
//!
//! ```text
//! ┌─────────────────┐
//! │ 1. Commit order │◄─── Source of truth
//! │   to Postgres   │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ 2. Publish to   │◄─── Notification, may fail independently
//! │    Event Bus    │
//! └─────────────────┘
//! ```
//!
//! Topics follow the pattern `{aggregate}-events`, e.g. `order-events`.

use crate::event::SerializedEvent;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an event to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Topic not found or invalid
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),
}

impl From<EventBusError> for crate::error::StorefrontError {
    fn from(err: EventBusError) -> Self {
        Self::EventBus(err.to_string())
    }
}

/// Trait for event bus implementations.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so it can be used as a trait object (`&dyn EventBus`, `Arc<dyn EventBus>`).
pub trait EventBus: Send + Sync {
    /// Publish an event to a topic.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the broker did not accept the event.
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;
}
