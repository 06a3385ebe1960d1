//! Integration tests for [`RedpandaEventBus`] with a real Kafka-compatible broker.
//!
//! These tests are marked as `#[ignore]` by default because they require Docker
//! and take a while to spin up the broker.
//!
//! To run explicitly:
//! ```bash
//! cargo test -p storefront-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use futures::StreamExt;
use rdkafka::Message;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use std::time::Duration;
use storefront_core::event::SerializedEvent;
use storefront_core::event_bus::EventBus;
use storefront_redpanda::{PARTITION_KEY, RedpandaEventBus};
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};

/// Publish until the broker accepts, so the topic exists before consuming.
async fn wait_for_broker(bus: &RedpandaEventBus) {
    let warmup = SerializedEvent::new("warmup".to_string(), b"{}".to_vec(), None);
    for _ in 0..60 {
        if bus.publish("warmup-topic", &warmup).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    panic!("broker never became ready");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_publish_keeps_json_payload_and_key() {
    let container = Kafka::default()
        .start()
        .await
        .expect("Failed to start Kafka container");
    let port = container
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get Kafka port");
    let brokers = format!("127.0.0.1:{port}");

    let bus = RedpandaEventBus::builder()
        .brokers(&brokers)
        .producer_acks("all")
        .build()
        .expect("Failed to build event bus");
    wait_for_broker(&bus).await;

    let payload = br#"{"order_id":"o-1","total_amount":3500}"#.to_vec();
    let event = SerializedEvent::new(
        "OrderCreated.v1".to_string(),
        payload.clone(),
        Some(serde_json::json!({ PARTITION_KEY: "user-1" })),
    );
    bus.publish("order-events", &event)
        .await
        .expect("publish should succeed");

    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &brokers)
        .set("group.id", "storefront-it")
        .set("auto.offset.reset", "earliest")
        .create()
        .expect("Failed to create consumer");
    consumer
        .subscribe(&["order-events"])
        .expect("Failed to subscribe");

    let message = tokio::time::timeout(Duration::from_secs(30), consumer.stream().next())
        .await
        .expect("timed out waiting for message")
        .expect("stream ended")
        .expect("consumer error");

    assert_eq!(message.payload(), Some(payload.as_slice()));
    assert_eq!(message.key(), Some("user-1".as_bytes()));
}
