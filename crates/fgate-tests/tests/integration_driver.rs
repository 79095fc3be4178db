// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Driver Integration Tests
//!
//! Drives a [`Driver`] purely through its bus handlers, with a recording
//! adapter underneath.
//!
//! - `test_subscribe_*`: reference counting and physical subscriptions
//! - `test_reconnect_*`: connection loss and resubscription
//! - `test_request_*`: request/reply handlers

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use fgate_core::topic::{parse_topic, SystemType, Topic};
use fgate_core::{
    Driver, DriverConfig, DriverState, PublishData, PublishRequest, SubscribeRequest, TopicValue,
    UnsubscribeRequest,
};
use fgate_tests::prelude::*;

// =============================================================================
// Helper Functions
// =============================================================================

async fn started(harness: &TestHarness, adapter: &Arc<MockAdapter>) -> Driver {
    let driver = harness.driver("Line1", adapter.clone());
    driver.start();
    harness.wait_for_service("Opc/Line1").await;
    driver
}

fn subscribe_body(client: &str, topic: &Topic) -> serde_json::Value {
    serde_json::to_value(SubscribeRequest::new(client, topic.clone())).unwrap()
}

fn unsubscribe_body(client: &str, topic: &Topic) -> serde_json::Value {
    serde_json::to_value(UnsubscribeRequest::single(client, topic.clone())).unwrap()
}

// =============================================================================
// Subscriptions
// =============================================================================

#[tokio::test]
async fn test_subscribe_two_clients_share_one_item() {
    let harness = TestHarness::new();
    let adapter = Arc::new(MockAdapter::new(SystemType::Opc));
    let driver = started(&harness, &adapter).await;
    let topic = TopicFixtures::motor_speed();
    let mut values = harness.bus.subscribe(&topic.topic_name);

    assert!(harness.request("Opc/Line1/Subscribe", subscribe_body("c1", &topic)).await.ok);
    assert!(harness.request("Opc/Line1/Subscribe", subscribe_body("c2", &topic)).await.ok);
    assert_eq!(adapter.subscribe_calls().len(), 1);
    assert_eq!(driver.registry().client_count(&topic), 2);
    assert_eq!(driver.registry().monitored_items(&topic).len(), 1);

    assert_eq!(adapter.emit(&topic, TopicValue::plain(1450.5f64)), Some(1));
    let point = recv_point(&mut values).await;
    assert_eq!(point.topic.topic_name, "Opc/Line1/Node/2/Motor.Speed");
    assert_eq!(point.topic.topic_node, "ns=2;s=Motor.Speed");
    assert_eq!(point.value.value_as_double(), Some(1450.5));

    // The first client leaving keeps the physical subscription.
    assert!(harness.request("Opc/Line1/Unsubscribe", unsubscribe_body("c1", &topic)).await.ok);
    assert!(adapter.unsubscribe_calls().is_empty());
    assert_eq!(driver.registry().client_count(&topic), 1);

    assert!(harness.request("Opc/Line1/Unsubscribe", unsubscribe_body("c2", &topic)).await.ok);
    let calls = adapter.unsubscribe_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, vec![topic.clone()]);
    assert_eq!(calls[0].1.len(), 1);
    assert_eq!(driver.registry().subscribed_topic_count(), 0);

    driver.shutdown().await;
}

#[tokio::test]
async fn test_subscribe_same_client_twice_is_idempotent() {
    let harness = TestHarness::new();
    let adapter = Arc::new(MockAdapter::new(SystemType::Opc));
    let driver = started(&harness, &adapter).await;
    let topic = TopicFixtures::motor_speed();

    assert!(harness.request("Opc/Line1/Subscribe", subscribe_body("c1", &topic)).await.ok);
    assert!(harness.request("Opc/Line1/Subscribe", subscribe_body("c1", &topic)).await.ok);
    assert_eq!(adapter.subscribe_calls().len(), 1);
    assert_eq!(driver.registry().client_count(&topic), 1);

    // Unsubscribing a client that never subscribed changes nothing.
    assert!(harness.request("Opc/Line1/Unsubscribe", unsubscribe_body("c9", &topic)).await.ok);
    assert_eq!(driver.registry().client_count(&topic), 1);

    driver.shutdown().await;
}

#[tokio::test]
async fn test_subscribe_failure_rolls_back_client() {
    let harness = TestHarness::new();
    let adapter = Arc::new(MockAdapter::new(SystemType::Opc));
    let driver = started(&harness, &adapter).await;
    let topic = TopicFixtures::motor_speed();

    adapter.set_fail_subscribe(true);
    let reply = harness.request("Opc/Line1/Subscribe", subscribe_body("c1", &topic)).await;
    assert!(!reply.ok);
    assert!(reply.error.is_some());
    assert_eq!(driver.registry().client_count(&topic), 0);

    // A later attempt goes to the adapter again.
    adapter.set_fail_subscribe(false);
    assert!(harness.request("Opc/Line1/Subscribe", subscribe_body("c1", &topic)).await.ok);
    assert_eq!(adapter.subscribe_calls().len(), 2);
    assert_eq!(driver.registry().client_count(&topic), 1);

    driver.shutdown().await;
}

#[tokio::test]
async fn test_subscribe_joining_client_waits_for_first_attempt() {
    let harness = TestHarness::new();
    let adapter = Arc::new(MockAdapter::new(SystemType::Opc));
    let driver = started(&harness, &adapter).await;
    let topic = TopicFixtures::motor_speed();

    adapter.set_subscribe_delay(Duration::from_millis(50));
    adapter.fail_next_subscribes(1);
    let (first, second) = tokio::join!(
        harness.request("Opc/Line1/Subscribe", subscribe_body("c1", &topic)),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            harness.request("Opc/Line1/Subscribe", subscribe_body("c2", &topic)).await
        }
    );

    // c2 arrived while c1's attempt was in flight and retried on its own.
    assert!(!first.ok);
    assert!(second.ok);
    assert_eq!(adapter.subscribe_calls().len(), 2);
    assert_eq!(driver.registry().client_count(&topic), 1);
    assert_eq!(driver.registry().monitored_items(&topic).len(), 1);
    assert!(driver.registry().is_active(&topic));

    driver.shutdown().await;
}

#[tokio::test]
async fn test_subscribe_concurrent_failures_leave_no_clients() {
    let harness = TestHarness::new();
    let adapter = Arc::new(MockAdapter::new(SystemType::Opc));
    let driver = started(&harness, &adapter).await;
    let topic = TopicFixtures::motor_speed();

    adapter.set_subscribe_delay(Duration::from_millis(30));
    adapter.set_fail_subscribe(true);
    let (first, second) = tokio::join!(
        harness.request("Opc/Line1/Subscribe", subscribe_body("c1", &topic)),
        harness.request("Opc/Line1/Subscribe", subscribe_body("c2", &topic)),
    );

    assert!(!first.ok && !second.ok);
    assert_eq!(driver.registry().client_count(&topic), 0);
    assert!(driver.registry().client_topics().is_empty());

    driver.shutdown().await;
}

#[tokio::test]
async fn test_subscribe_without_items_is_failure() {
    let harness = TestHarness::new();
    let adapter = Arc::new(MockAdapter::new(SystemType::Opc));
    let driver = started(&harness, &adapter).await;
    let topic = TopicFixtures::line_temperature();

    adapter.set_return_no_items(true);
    let reply = harness.request("Opc/Line1/Subscribe", subscribe_body("c1", &topic)).await;
    assert!(!reply.ok);
    assert_eq!(driver.registry().client_count(&topic), 0);

    driver.shutdown().await;
}

#[tokio::test]
async fn test_subscribe_invalid_topic_never_reaches_adapter() {
    let harness = TestHarness::new();
    let adapter = Arc::new(MockAdapter::new(SystemType::Opc));
    let driver = started(&harness, &adapter).await;

    let reply = harness
        .request("Opc/Line1/Subscribe", subscribe_body("c1", &parse_topic("Opc/Line1/Bogus/x")))
        .await;
    assert!(!reply.ok);
    assert!(adapter.subscribe_calls().is_empty());

    let reply = harness
        .request("Opc/Line1/Subscribe", json!({"ClientId": "c1"}))
        .await;
    assert!(!reply.ok);

    driver.shutdown().await;
}

#[tokio::test]
async fn test_subscribe_on_startup() {
    let harness = TestHarness::new();
    let adapter = Arc::new(MockAdapter::new(SystemType::Opc));
    let config = DriverConfig::new("Line1")
        .with_reconnect_delay(TEST_RECONNECT_DELAY)
        .with_startup_topics(vec!["Node/2/Motor.Speed".to_string(), "Nonsense".to_string()]);
    let driver = harness.driver_with(config, adapter.clone());
    driver.start();
    harness.wait_for_service("Opc/Line1").await;

    assert_eq!(driver.registry().client_count(&TopicFixtures::motor_speed()), 1);
    assert_eq!(adapter.subscribe_calls().len(), 1);

    driver.shutdown().await;
}

// =============================================================================
// Connection Handling
// =============================================================================

#[tokio::test]
async fn test_reconnect_retries_failed_connects() {
    let harness = TestHarness::new();
    let adapter = Arc::new(MockAdapter::new(SystemType::Opc));
    adapter.fail_next_connects(2);

    let driver = harness.driver("Line1", adapter.clone());
    driver.start();
    within("connected", driver.wait_for(DriverState::Connected)).await;
    assert_eq!(adapter.connect_count(), 3);
    harness.wait_for_service("Opc/Line1").await;

    driver.shutdown().await;
}

#[tokio::test]
async fn test_reconnect_resubscribes_all_topics() {
    let harness = TestHarness::new();
    let adapter = Arc::new(MockAdapter::new(SystemType::Opc));
    let driver = started(&harness, &adapter).await;
    let speed = TopicFixtures::motor_speed();
    let temperature = TopicFixtures::line_temperature();

    assert!(harness.request("Opc/Line1/Subscribe", subscribe_body("c1", &speed)).await.ok);
    assert!(harness.request("Opc/Line1/Subscribe", subscribe_body("c2", &temperature)).await.ok);
    let old_items = driver.registry().monitored_items(&speed);

    adapter.drop_connection("cable pulled");
    assert_eventually("resubscribe", || adapter.subscribe_calls().len() == 3).await;
    harness.wait_for_service("Opc/Line1").await;

    let batch = &adapter.subscribe_calls()[2];
    assert_eq!(batch.len(), 2);
    assert!(batch.contains(&speed) && batch.contains(&temperature));
    assert_eq!(adapter.disconnect_count(), 1);

    // Clients survive, items are replaced.
    assert_eq!(driver.registry().client_count(&speed), 1);
    let new_items = driver.registry().monitored_items(&speed);
    assert_eq!(new_items.len(), 1);
    assert_ne!(new_items, old_items);

    driver.shutdown().await;
}

#[tokio::test]
async fn test_reconnect_keeps_topics_without_items_pending() {
    let harness = TestHarness::new();
    let adapter = Arc::new(MockAdapter::new(SystemType::Opc));
    let driver = started(&harness, &adapter).await;
    let speed = TopicFixtures::motor_speed();
    let temperature = TopicFixtures::line_temperature();

    assert!(harness.request("Opc/Line1/Subscribe", subscribe_body("c1", &speed)).await.ok);
    assert!(harness.request("Opc/Line1/Subscribe", subscribe_body("c2", &temperature)).await.ok);

    adapter.withhold_items(&temperature);
    adapter.drop_connection("cable pulled");
    let registry = driver.registry();
    assert_eventually("temperature pending", || {
        registry.pending_topics() == vec![temperature.clone()]
    })
    .await;
    assert!(registry.is_active(&speed));
    assert_eq!(registry.client_count(&temperature), 1);
    assert!(registry.monitored_items(&temperature).is_empty());

    // The next reconnect asks for the pending topic again.
    adapter.release_items();
    adapter.drop_connection("cable pulled again");
    assert_eventually("temperature restored", || registry.is_active(&temperature)).await;
    let batch = adapter.subscribe_calls().last().cloned().unwrap();
    assert!(batch.contains(&temperature) && batch.contains(&speed));
    assert_eq!(registry.monitored_items(&temperature).len(), 1);
    assert!(registry.pending_topics().is_empty());

    driver.shutdown().await;
}

#[tokio::test]
async fn test_reconnect_unsubscribe_during_resubscribe_releases_item() {
    let harness = TestHarness::new();
    let adapter = Arc::new(MockAdapter::new(SystemType::Opc));
    let driver = started(&harness, &adapter).await;
    let speed = TopicFixtures::motor_speed();
    let temperature = TopicFixtures::line_temperature();

    assert!(harness.request("Opc/Line1/Subscribe", subscribe_body("c1", &speed)).await.ok);
    assert!(harness.request("Opc/Line1/Subscribe", subscribe_body("c2", &temperature)).await.ok);

    adapter.set_subscribe_delay(Duration::from_millis(100));
    adapter.drop_connection("cable pulled");
    assert_eventually("resubscribe in flight", || adapter.subscribe_calls().len() == 3).await;

    let reply = harness
        .request("Opc/Line1/Unsubscribe", unsubscribe_body("c2", &temperature))
        .await;
    assert!(reply.ok);

    // The item created by the resubscribe was handed back, not leaked.
    let registry = driver.registry();
    assert_eq!(registry.client_count(&temperature), 0);
    assert!(registry.monitored_items(&temperature).is_empty());
    assert!(!registry.is_active(&temperature));
    let calls = adapter.unsubscribe_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, vec![temperature.clone()]);
    assert_eq!(calls[0].1.len(), 1);
    assert!(registry.is_active(&speed));

    driver.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_releases_everything() {
    let harness = TestHarness::new();
    let adapter = Arc::new(MockAdapter::new(SystemType::Opc));
    let driver = started(&harness, &adapter).await;
    assert!(harness.bus.has_handler("Opc/Line1/Subscribe"));

    driver.shutdown().await;

    assert_eq!(driver.state(), DriverState::Disconnected);
    assert!(!harness.bus.has_handler("Opc/Line1/Subscribe"));
    assert!(harness.directory.services().is_empty());
    assert!(!adapter.is_connected());
}

// =============================================================================
// Requests
// =============================================================================

#[tokio::test]
async fn test_request_publish_reaches_adapter() {
    let harness = TestHarness::new();
    let adapter = Arc::new(MockAdapter::new(SystemType::Opc));
    let driver = started(&harness, &adapter).await;
    let topic = TopicFixtures::motor_speed();

    let body = serde_json::to_value(PublishRequest::bytes(topic.clone(), b"1500".to_vec())).unwrap();
    assert!(harness.request("Opc/Line1/Publish", body).await.ok);

    let published = adapter.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, topic);
    assert_eq!(published[0].1, PublishData::Bytes(b"1500".to_vec()));

    let reply = harness
        .request("Opc/Line1/Publish", json!({"Topic": topic.to_json()}))
        .await;
    assert!(!reply.ok);

    driver.shutdown().await;
}

#[tokio::test]
async fn test_request_unsupported_operation() {
    let harness = TestHarness::new();
    let adapter = Arc::new(MockAdapter::new(SystemType::Opc));
    let driver = started(&harness, &adapter).await;

    let reply = harness.request("Opc/Line1/Browse", json!({})).await;
    assert!(!reply.ok);
    assert!(reply.error.unwrap_or_default().contains("Browse"));

    driver.shutdown().await;
}

#[tokio::test]
async fn test_request_to_unknown_driver_fails() {
    let harness = TestHarness::new();
    let result = harness
        .bus
        .request_reply("Opc/Nowhere/Subscribe", json!({}))
        .await;
    assert!(result.is_err());
}
