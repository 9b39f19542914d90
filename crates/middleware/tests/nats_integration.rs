//! Integration tests for NATS transport
//!
//! Run with: cargo test -p persister-middleware --test nats_integration -- --ignored
//! Requires: docker run -p 4222:4222 nats:latest

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use persister_middleware::{NatsTransport, Transport};

#[tokio::test]
#[ignore]
async fn test_nats_publish_subscribe_roundtrip() {
    let transport = NatsTransport::connect("nats://localhost:4222")
        .await
        .expect("Failed to connect to NATS");

    let mut sub = transport
        .subscribe("persister.test.roundtrip")
        .await
        .expect("Failed to subscribe");

    transport
        .publish("persister.test.roundtrip", Bytes::from("test message"))
        .await
        .expect("Failed to publish");

    let msg = sub.next().await.expect("Failed to receive");
    assert_eq!(msg.payload, Bytes::from("test message"));
}

#[tokio::test]
#[ignore]
async fn test_nats_queue_group_shares_deliveries() {
    let transport = NatsTransport::connect("nats://localhost:4222")
        .await
        .expect("Failed to connect to NATS");

    let mut a = transport
        .queue_subscribe("persister.test.queue", "persister-test")
        .await
        .expect("Failed to subscribe");
    let mut b = transport
        .queue_subscribe("persister.test.queue", "persister-test")
        .await
        .expect("Failed to subscribe");
    transport.flush().await.expect("Failed to flush");

    for i in 0..20 {
        transport
            .publish("persister.test.queue", Bytes::from(i.to_string()))
            .await
            .expect("Failed to publish");
    }
    transport.flush().await.expect("Failed to flush");

    let mut received = 0;
    for sub in [&mut a, &mut b] {
        while let Ok(Ok(_)) = tokio::time::timeout(Duration::from_millis(200), sub.next()).await {
            received += 1;
        }
    }
    assert_eq!(received, 20);
}

#[tokio::test]
#[ignore]
async fn test_nats_headers_roundtrip() {
    let transport = NatsTransport::connect("nats://localhost:4222")
        .await
        .expect("Failed to connect to NATS");

    let mut sub = transport
        .subscribe("persister.test.headers")
        .await
        .expect("Failed to subscribe");

    let mut headers = HashMap::new();
    headers.insert("Persister-Failure".to_string(), "decode".to_string());
    transport
        .publish_with_headers("persister.test.headers", Bytes::from("x"), headers)
        .await
        .expect("Failed to publish");

    let msg = sub.next().await.expect("Failed to receive");
    assert_eq!(msg.headers.get("Persister-Failure").map(String::as_str), Some("decode"));
}
