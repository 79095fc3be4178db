// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Topic Integration Tests
//!
//! How a topic address decides the bus address and wire format of the
//! values a driver delivers.

use std::sync::Arc;
use std::time::Duration;

use fgate_core::topic::{parse_topic, DataFormat, SystemType};
use fgate_core::{BusPayload, TopicValue};
use fgate_tests::prelude::*;

#[tokio::test]
async fn test_topic_format_selects_payload_encoding() {
    let harness = TestHarness::new();
    let adapter = Arc::new(MockAdapter::new(SystemType::Opc));
    let driver = harness.driver("Line1", adapter.clone());
    driver.start();
    harness.wait_for_service("Opc/Line1").await;

    let json_topic = TopicFixtures::motor_speed();
    let raw_topic = TopicFixtures::motor_speed_raw();
    let pretty_topic = parse_topic("Opc/Line1/Node:Pretty/2/Motor.Speed");
    let mut json_rx = harness.bus.subscribe(&json_topic.topic_name);
    let mut raw_rx = harness.bus.subscribe(&raw_topic.topic_name);
    let mut pretty_rx = harness.bus.subscribe(&pretty_topic.topic_name);

    for topic in [&json_topic, &raw_topic, &pretty_topic] {
        adapter.emit(topic, TopicValue::plain(42i64));
    }

    let point = recv_point(&mut json_rx).await;
    assert_eq!(point.topic.data_format, DataFormat::Json);
    assert_eq!(point.value.value_as_double(), Some(42.0));

    assert_eq!(recv_bytes(&mut raw_rx).await, b"42".to_vec());

    match within("pretty value", pretty_rx.recv()).await.unwrap() {
        BusPayload::Pretty(text) => {
            assert!(text.contains('\n'));
            let point = BusPayload::Pretty(text).decode().unwrap();
            assert_eq!(point.topic.data_format, DataFormat::Pretty);
        }
        other => panic!("expected pretty payload, got {:?}", other),
    }

    // Each format is its own bus address.
    assert_silent(&mut json_rx, Duration::from_millis(20)).await;
    driver.shutdown().await;
}

#[tokio::test]
async fn test_topic_formats_are_separate_subscriptions() {
    let harness = TestHarness::new();
    let adapter = Arc::new(MockAdapter::new(SystemType::Opc));
    let driver = harness.driver("Line1", adapter.clone());
    driver.start();
    harness.wait_for_service("Opc/Line1").await;

    for topic in [TopicFixtures::motor_speed(), TopicFixtures::motor_speed_raw()] {
        let body = serde_json::to_value(fgate_core::SubscribeRequest::new("c1", topic)).unwrap();
        assert!(harness.request("Opc/Line1/Subscribe", body).await.ok);
    }
    assert_eq!(driver.registry().subscribed_topic_count(), 2);
    assert_eq!(adapter.subscribe_calls().len(), 2);

    driver.shutdown().await;
}

#[test]
fn test_topic_data_point_line_round_trip() {
    let point = DataPointBuilder::new("Mqtt/home/Path/PV/Inverter/GridFrequency")
        .value(49.98f64)
        .status("Good")
        .build();
    let line = point.to_json().to_string();
    assert!(!line.contains('\n'));

    let decoded = fgate_core::DataPoint::from_json(&serde_json::from_str(&line).unwrap()).unwrap();
    assert_eq!(decoded.topic, TopicFixtures::grid_frequency());
    assert_eq!(decoded.value.value_as_double(), Some(49.98));
    assert_eq!(decoded.value.status_code, "Good");
    assert_eq!(decoded.value.source_time_ms(), point.value.source_time_ms());
}
