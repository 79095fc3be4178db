// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Binary record format for queued data points.
//!
//! Records are `bincode` encodings of [`StoredPoint`], a flat mirror of
//! [`DataPoint`]. Structured JSON payloads are stored as JSON text because
//! `bincode` cannot decode self-describing values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fgate_core::error::{QueueError, QueueResult};
use fgate_core::topic::{BrowsePath, DataFormat, SystemType, Topic, TopicType};
use fgate_core::types::{DataPoint, Payload, TopicValue, Variant};

#[derive(Debug, Serialize, Deserialize)]
struct StoredTopic {
    topic_name: String,
    system_type: SystemType,
    topic_type: TopicType,
    system_name: String,
    topic_node: String,
    topic_path: String,
    data_format: DataFormat,
    browse_path: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
enum StoredPayload {
    Empty,
    Plain(Variant),
    Json(String),
    Native { type_name: String, value: Variant },
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredTime {
    secs: i64,
    nanos: u32,
    picos: u16,
}

/// On-disk form of a data point.
#[derive(Debug, Serialize, Deserialize)]
struct StoredPoint {
    topic: StoredTopic,
    payload: StoredPayload,
    status_code: String,
    source_time: StoredTime,
    server_time: StoredTime,
}

fn store_time(time: &DateTime<Utc>, picos: u16) -> StoredTime {
    StoredTime {
        secs: time.timestamp(),
        nanos: time.timestamp_subsec_nanos(),
        picos,
    }
}

fn load_time(time: &StoredTime) -> QueueResult<DateTime<Utc>> {
    DateTime::from_timestamp(time.secs, time.nanos)
        .ok_or_else(|| QueueError::codec(format!("timestamp out of range: {}s", time.secs)))
}

/// Encodes a data point into a queue record.
pub fn encode(point: &DataPoint) -> QueueResult<Vec<u8>> {
    let topic = &point.topic;
    let value = &point.value;
    let payload = match &value.payload {
        Payload::Empty => StoredPayload::Empty,
        Payload::Plain(v) => StoredPayload::Plain(v.clone()),
        Payload::Json(json) => StoredPayload::Json(json.to_string()),
        Payload::Native { type_name, value } => StoredPayload::Native {
            type_name: type_name.clone(),
            value: value.clone(),
        },
    };
    let stored = StoredPoint {
        topic: StoredTopic {
            topic_name: topic.topic_name.clone(),
            system_type: topic.system_type,
            topic_type: topic.topic_type,
            system_name: topic.system_name.clone(),
            topic_node: topic.topic_node.clone(),
            topic_path: topic.topic_path.clone(),
            data_format: topic.data_format,
            browse_path: topic.browse_path.items().to_vec(),
        },
        payload,
        status_code: value.status_code.clone(),
        source_time: store_time(&value.source_time, value.source_picoseconds),
        server_time: store_time(&value.server_time, value.server_picoseconds),
    };
    bincode::serialize(&stored).map_err(|e| QueueError::codec(e.to_string()))
}

/// Decodes a queue record.
pub fn decode(bytes: &[u8]) -> QueueResult<DataPoint> {
    let stored: StoredPoint =
        bincode::deserialize(bytes).map_err(|e| QueueError::codec(e.to_string()))?;

    let payload = match stored.payload {
        StoredPayload::Empty => Payload::Empty,
        StoredPayload::Plain(v) => Payload::Plain(v),
        StoredPayload::Json(text) => Payload::Json(
            serde_json::from_str(&text).map_err(|e| QueueError::codec(e.to_string()))?,
        ),
        StoredPayload::Native { type_name, value } => Payload::Native { type_name, value },
    };

    let t = stored.topic;
    let topic = Topic {
        topic_name: t.topic_name,
        system_type: t.system_type,
        topic_type: t.topic_type,
        system_name: t.system_name,
        topic_node: t.topic_node,
        topic_path: t.topic_path,
        data_format: t.data_format,
        browse_path: BrowsePath::new(t.browse_path),
    };
    let value = TopicValue {
        payload,
        status_code: stored.status_code,
        source_time: load_time(&stored.source_time)?,
        source_picoseconds: stored.source_time.picos,
        server_time: load_time(&stored.server_time)?,
        server_picoseconds: stored.server_time.picos,
    };
    Ok(DataPoint::new(topic, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fgate_core::topic::parse_topic;
    use serde_json::json;

    #[test]
    fn test_structured_payload_survives() {
        let time = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let topic = parse_topic("Mqtt/home/Path:Pretty/sensors/#")
            .with_browse_path(BrowsePath::parse("sensors/kitchen"));
        let value = TopicValue::json(json!({"t": 21.5, "tags": ["a", "b"], "ok": null}))
            .with_status("Uncertain")
            .with_source_time(time, 7)
            .with_server_time(time, 999);
        let point = DataPoint::new(topic, value);

        let decoded = decode(&encode(&point).unwrap()).unwrap();
        assert_eq!(decoded, point);
    }

    #[test]
    fn test_native_and_array_payloads() {
        let point = DataPoint::new(
            parse_topic("Plc/S7/Node/DB1.W1"),
            TopicValue::native("DINT", -42i64),
        );
        assert_eq!(decode(&encode(&point).unwrap()).unwrap(), point);

        let array = Variant::Array(vec![Variant::from(1.5f64), Variant::from("x"), Variant::Null]);
        let point = DataPoint::new(parse_topic("Opc/A/Node/2/Arr"), TopicValue::plain(array));
        assert_eq!(decode(&encode(&point).unwrap()).unwrap(), point);
    }

    #[test]
    fn test_garbage_is_codec_error() {
        assert!(matches!(decode(&[0xff, 0x01]), Err(QueueError::Codec { .. })));
    }
}
