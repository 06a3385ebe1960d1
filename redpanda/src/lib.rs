//! Redpanda event sink for the storefront backend.
//!
//! Implements the [`EventBus`] trait from `storefront-core` on top of an rdkafka
//! `FutureProducer`. The storefront only publishes (order events are consumed
//! by other services), so there is no consumer side here.
//!
//! # Message layout
//!
//! - **payload**: the event's JSON body, unchanged
//! - **key**: the `partition_key` metadata field when present (order events use
//!   the user id so one user's orders stay in order), otherwise the event type
//! - **headers**: `event_type`, plus every string field of the metadata object
//!
//! # Example
//!
//! ```no_run
//! use storefront_redpanda::RedpandaEventBus;
//! use storefront_core::event_bus::EventBus;
//! use storefront_core::event::SerializedEvent;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedpandaEventBus::new("localhost:9092")?;
//!
//! let event = SerializedEvent::new("OrderCreated.v1".to_string(), b"{}".to_vec(), None);
//! event_bus.publish("order-events", &event).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use storefront_core::event::SerializedEvent;
use storefront_core::event_bus::{EventBus, EventBusError};

/// Metadata field used as the Kafka message key.
pub const PARTITION_KEY: &str = "partition_key";

/// Redpanda event bus implementation.
///
/// # Example
///
/// ```no_run
/// use storefront_redpanda::RedpandaEventBus;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let event_bus = RedpandaEventBus::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .producer_acks("all")
///     .compression("lz4")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventBus {
    /// Kafka producer for publishing events
    producer: FutureProducer,
    /// Broker addresses
    brokers: String,
    /// Producer timeout
    timeout: Duration,
}

impl RedpandaEventBus {
    /// Create a new Redpanda event bus with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }
}

/// Builder for configuring a [`RedpandaEventBus`].
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
}

impl RedpandaEventBusBuilder {
    /// Set the broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode: "0", "1" or "all".
    ///
    /// Default: "all"
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec: "none", "gzip", "snappy", "lz4", "zstd".
    ///
    /// Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if brokers are not set or the
    /// producer configuration is invalid.
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self.brokers.ok_or_else(|| EventBusError::ConnectionFailed(
            "Brokers not configured".to_string(),
        ))?;
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));
        let acks = self.producer_acks.as_deref().unwrap_or("all");
        let compression = self.compression.as_deref().unwrap_or("none");

        let mut producer_config = ClientConfig::new();
        producer_config
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", acks)
            .set("compression.type", compression);

        let producer: FutureProducer = producer_config.create().map_err(|e| {
            EventBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
        })?;

        tracing::info!(
            brokers = %brokers,
            acks,
            compression,
            "RedpandaEventBus created successfully"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout,
        })
    }
}

/// Message key for an event.
fn message_key(event: &SerializedEvent) -> String {
    event
        .metadata
        .as_ref()
        .and_then(|m| m.get(PARTITION_KEY))
        .and_then(serde_json::Value::as_str)
        .map_or_else(|| event.event_type.clone(), str::to_string)
}

/// Headers for an event: its type plus every string metadata field.
fn message_headers(event: &SerializedEvent) -> OwnedHeaders {
    let mut headers = OwnedHeaders::new().insert(Header {
        key: "event_type",
        value: Some(event.event_type.as_str()),
    });
    if let Some(serde_json::Value::Object(fields)) = &event.metadata {
        for (key, value) in fields {
            if let Some(value) = value.as_str() {
                headers = headers.insert(Header {
                    key: key.as_str(),
                    value: Some(value),
                });
            }
        }
    }
    headers
}

impl EventBus for RedpandaEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        // Clone data before moving into async block
        let topic = topic.to_string();
        let event = event.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            if topic.is_empty() {
                return Err(EventBusError::InvalidTopic(topic));
            }

            let key = message_key(&event);
            let record = FutureRecord::to(&topic)
                .payload(&event.data)
                .key(&key)
                .headers(message_headers(&event));

            match self.producer.send(record, Timeout::After(timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        partition = partition,
                        offset = offset,
                        event_type = %event.event_type,
                        "Event published successfully"
                    );
                    Ok(())
                },
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %topic,
                        error = %kafka_error,
                        "Failed to publish event"
                    );
                    Err(EventBusError::PublishFailed {
                        topic,
                        reason: kafka_error.to_string(),
                    })
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redpanda_event_bus_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaEventBus>();
        assert_sync::<RedpandaEventBus>();
    }

    #[test]
    fn builder_requires_brokers() {
        let result = RedpandaEventBus::builder().build();
        assert!(matches!(result, Err(EventBusError::ConnectionFailed(_))));
    }

    #[test]
    fn key_prefers_partition_key_metadata() {
        let with_key = SerializedEvent::new(
            "OrderCreated.v1".to_string(),
            Vec::new(),
            Some(serde_json::json!({ PARTITION_KEY: "user-42" })),
        );
        let without_key = SerializedEvent::new("OrderCreated.v1".to_string(), Vec::new(), None);

        assert_eq!(message_key(&with_key), "user-42");
        assert_eq!(message_key(&without_key), "OrderCreated.v1");
    }
}
