// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Canned topics, points and configuration files.

use chrono::{TimeZone, Utc};

use fgate_core::topic::{parse_topic, Topic};
use fgate_core::types::{DataPoint, TopicValue};

// =============================================================================
// Topics
// =============================================================================

/// Topics for each supported grammar.
pub struct TopicFixtures;

impl TopicFixtures {
    /// `Opc/Line1/Node/2/Motor.Speed`
    pub fn motor_speed() -> Topic {
        parse_topic("Opc/Line1/Node/2/Motor.Speed")
    }

    /// `Opc/Line1/Node:Value/2/Motor.Speed`
    pub fn motor_speed_raw() -> Topic {
        parse_topic("Opc/Line1/Node:Value/2/Motor.Speed")
    }

    /// `Opc/Line1/Path/Objects/Line/Temperature`
    pub fn line_temperature() -> Topic {
        parse_topic("Opc/Line1/Path/Objects/Line/Temperature")
    }

    /// `Plc/S7/Node/DB1.DBW10`
    pub fn plc_word() -> Topic {
        parse_topic("Plc/S7/Node/DB1.DBW10")
    }

    /// `Mqtt/home/Path/PV/Inverter/GridFrequency`
    pub fn grid_frequency() -> Topic {
        parse_topic("Mqtt/home/Path/PV/Inverter/GridFrequency")
    }
}

// =============================================================================
// Data Points
// =============================================================================

/// Data points with predictable values.
pub struct PointFixtures;

impl PointFixtures {
    /// A counter sample whose value is `i`.
    pub fn counter(i: i64) -> DataPoint {
        DataPoint::new(parse_topic("Opc/Line1/Node/2/Counter"), TopicValue::plain(i))
    }

    /// Counter samples `0..count`.
    pub fn counters(count: i64) -> Vec<DataPoint> {
        (0..count).map(Self::counter).collect()
    }

    /// A sample whose source time lies in the first second of the epoch.
    pub fn epoch_zero(i: i64) -> DataPoint {
        let mut point = Self::counter(i);
        point.value = point
            .value
            .with_source_time(Utc.timestamp_opt(0, 0).single().expect("epoch"), 0);
        point
    }

    /// Integer value of a counter sample.
    pub fn counter_value(point: &DataPoint) -> i64 {
        point.value.value_as_double().unwrap_or(-1.0) as i64
    }
}

// =============================================================================
// Configuration Files
// =============================================================================

/// Configuration file contents.
pub struct ConfigFixtures;

impl ConfigFixtures {
    /// A loopback driver feeding a JSON Lines logger through a disk queue.
    ///
    /// Relative paths resolve against the file's directory.
    pub fn loopback_yaml() -> &'static str {
        r#"
gateway:
  id: test-gateway
bus:
  capacity: 256
  request_timeout: 2s
drivers:
  - id: Line1
    adapter: loopback
    reconnect_delay: 100ms
    options:
      system_type: Opc
loggers:
  - id: archive
    topics:
      - Opc/Line1/Node/2/Motor.Speed
    queue:
      type: disk
      queue_size: 65536
      block_size: 100
      path: data/archive.buf
    sink:
      type: json_lines
      path: data/archive.jsonl
    retry_delay: 100ms
logging:
  level: debug
  format: json
"#
    }

    /// The same gateway in TOML.
    pub fn loopback_toml() -> &'static str {
        r#"
[gateway]
id = "test-gateway"

[[drivers]]
id = "Line1"
adapter = "loopback"
subscribe_on_startup = ["Node/2/Motor.Speed"]

[[loggers]]
id = "archive"
topics = ["Opc/Line1/Node/2/Motor.Speed"]

[loggers.queue]
type = "memory"
queue_size = 1000
"#
    }
}
