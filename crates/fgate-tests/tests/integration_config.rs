// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Configuration Integration Tests
//!
//! Configuration files on disk, loaded and then run as a whole gateway:
//!
//! - `test_config_*`: loading, path resolution and validation
//! - `test_gateway_*`: a loaded configuration running end to end

use std::time::Duration;

use fgate_bin::commands::collect_warnings;
use fgate_bin::GatewayRuntime;
use fgate_buffer::{QueueKind, SinkConfig};
use fgate_config::{load_config, ConfigError, ConfigLoader, LogFormat, LogLevel};
use fgate_core::{DataPoint, PublishRequest, TopicValue};
use fgate_tests::prelude::*;

// =============================================================================
// Loading
// =============================================================================

#[test]
fn test_config_yaml_resolves_relative_paths() {
    let harness_dir = temp_test_dir("fgate-config-");
    let path = harness_dir.path().join("fgate.yaml");
    std::fs::write(&path, ConfigFixtures::loopback_yaml()).unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.gateway.id, "test-gateway");
    assert_eq!(config.bus.capacity, 256);
    assert_eq!(config.bus.request_timeout, Duration::from_secs(2));
    assert_eq!(config.logging.level, LogLevel::Debug);
    assert_eq!(config.logging.format, LogFormat::Json);

    let driver = &config.drivers[0];
    assert_eq!(driver.adapter, "loopback");
    assert_eq!(driver.reconnect_delay, Duration::from_millis(100));
    assert_eq!(driver.options["system_type"], "Opc");

    let logger = &config.loggers[0];
    assert_eq!(logger.queue.kind, QueueKind::Disk);
    assert_eq!(
        logger.queue.path.as_deref(),
        Some(harness_dir.path().join("data/archive.buf").as_path())
    );
    assert_eq!(
        logger.sink,
        SinkConfig::JsonLines {
            path: harness_dir.path().join("data/archive.jsonl")
        }
    );
    assert!(collect_warnings(&config).is_empty());
}

#[test]
fn test_config_toml_startup_items() {
    let dir = temp_test_dir("fgate-config-");
    let path = dir.path().join("fgate.toml");
    std::fs::write(&path, ConfigFixtures::loopback_toml()).unwrap();

    let config = load_config(&path).unwrap();
    let driver_config = config.drivers[0].driver_config();
    assert_eq!(driver_config.id, "Line1");
    assert_eq!(driver_config.subscribe_on_startup, vec!["Node/2/Motor.Speed".to_string()]);
    assert_eq!(config.loggers[0].queue.kind, QueueKind::Memory);
    assert_eq!(config.loggers[0].queue.queue_size, 1000);
}

#[test]
fn test_config_env_override_applies_to_file() {
    let dir = temp_test_dir("fgate-config-");
    let path = dir.path().join("fgate.yaml");
    std::fs::write(&path, ConfigFixtures::loopback_yaml()).unwrap();

    std::env::set_var("FGATE_IT1_GATEWAY_ID", "from-env");
    std::env::set_var("FGATE_IT1_DRIVERS_0_ENABLED", "false");
    let config = ConfigLoader::new()
        .with_env_prefix("FGATE_IT1")
        .load(&path)
        .unwrap();
    std::env::remove_var("FGATE_IT1_GATEWAY_ID");
    std::env::remove_var("FGATE_IT1_DRIVERS_0_ENABLED");

    assert_eq!(config.gateway.id, "from-env");
    assert_eq!(config.enabled_drivers().count(), 0);
}

// =============================================================================
// Validation
// =============================================================================

fn load_yaml(content: &str) -> Result<fgate_config::GatewayConfig, ConfigError> {
    let dir = temp_test_dir("fgate-config-");
    let path = dir.path().join("fgate.yaml");
    std::fs::write(&path, content).unwrap();
    load_config(&path)
}

#[test]
fn test_config_rejects_duplicate_driver_ids() {
    let err = load_yaml(
        r#"
drivers:
  - { id: Line1, adapter: loopback }
  - { id: Line1, adapter: loopback }
"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateId { .. }), "{:?}", err);
}

#[test]
fn test_config_rejects_bad_logger_topic() {
    let err = load_yaml(
        r#"
loggers:
  - id: archive
    topics: [ "Opc/Line1/Nowhere/x" ]
"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidTopic { .. }), "{:?}", err);
}

#[test]
fn test_config_disk_queue_needs_path() {
    let err = load_yaml(
        r#"
loggers:
  - id: archive
    topics: [ "Opc/Line1/Node/2/Speed" ]
    queue: { type: disk, queue_size: 4096 }
"#,
    )
    .unwrap_err();
    assert!(err.is_validation_error(), "{:?}", err);
}

#[test]
fn test_config_unknown_field_is_parse_error() {
    let err = load_yaml("gateway: { id: x }\nsecurity: {}\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "{:?}", err);
}

// =============================================================================
// Whole Gateway
// =============================================================================

#[tokio::test]
async fn test_gateway_loopback_to_json_lines() {
    init_test_logging();
    let dir = temp_test_dir("fgate-gateway-");
    let path = dir.path().join("fgate.yaml");
    std::fs::write(&path, ConfigFixtures::loopback_yaml()).unwrap();
    let output = dir.path().join("data/archive.jsonl");

    let runtime = GatewayRuntime::new(load_config(&path).unwrap());
    let components = runtime.start().unwrap();
    let topic = TopicFixtures::motor_speed();

    let driver = components.driver("Line1").unwrap();
    assert_eventually("logger subscribed", || driver.registry().client_count(&topic) == 1).await;

    for speed in [1450.5f64, 1460.0] {
        let request = PublishRequest::value(topic.clone(), TopicValue::plain(speed));
        let reply = components
            .bus
            .request_reply("Opc/Line1/Publish", serde_json::to_value(request).unwrap())
            .await
            .unwrap();
        assert!(reply.ok, "{:?}", reply.error);
    }

    let read_lines = || {
        std::fs::read_to_string(&output)
            .map(|text| text.lines().map(str::to_string).collect::<Vec<_>>())
            .unwrap_or_default()
    };
    assert_eventually("lines written", || read_lines().len() == 2).await;

    let points: Vec<DataPoint> = read_lines()
        .iter()
        .map(|line| DataPoint::from_json(&serde_json::from_str(line).unwrap()).unwrap())
        .collect();
    assert_eq!(points[0].topic.topic_name, "Opc/Line1/Node/2/Motor.Speed");
    assert_eq!(points[0].value.value_as_double(), Some(1450.5));
    assert_eq!(points[1].value.value_as_double(), Some(1460.0));

    components.stop().await;
    assert!(dir.path().join("data/archive.buf").exists());
}

#[tokio::test]
async fn test_gateway_disabled_driver_not_started() {
    init_test_logging();
    let dir = temp_test_dir("fgate-gateway-");
    let path = dir.path().join("fgate.yaml");
    let content = ConfigFixtures::loopback_yaml().replace(
        "adapter: loopback",
        "adapter: loopback\n    enabled: false",
    );
    std::fs::write(&path, content).unwrap();

    let runtime = GatewayRuntime::new(load_config(&path).unwrap());
    let components = runtime.start().unwrap();
    assert!(components.drivers.is_empty());
    assert_eq!(components.loggers.len(), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(components.directory.services().is_empty());
    components.stop().await;
}
