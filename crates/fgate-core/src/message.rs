// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Message types carried by the message bus.
//!
//! Request/reply bodies are JSON objects with capitalized keys
//! (`ClientId`, `Topic`, `Ok`, ...). Value deliveries are [`BusPayload`]s
//! whose encoding follows the subscriber's requested [`DataFormat`].
//!
//! # Example
//!
//! ```
//! use fgate_core::message::{BusReply, SubscribeRequest};
//! use fgate_core::topic::parse_topic;
//!
//! let request = SubscribeRequest::new("logger-1", parse_topic("Plc/S7/Node/DB1.W1"));
//! let body = serde_json::to_value(&request).unwrap();
//! assert_eq!(body["ClientId"], "logger-1");
//!
//! let reply = BusReply::failure("not connected");
//! assert!(!reply.ok);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::BusError;
use crate::topic::{DataFormat, Topic};
use crate::types::{DataPoint, TopicValue};

// =============================================================================
// Value Delivery
// =============================================================================

/// A value published on a topic address.
#[derive(Debug, Clone, PartialEq)]
pub enum BusPayload {
    /// Raw value bytes.
    Bytes(Vec<u8>),
    /// JSON `{Topic, Value}` envelope.
    Json(JsonValue),
    /// Pretty-printed JSON envelope.
    Pretty(String),
}

impl BusPayload {
    /// Encodes a data point in the format its topic asks for.
    pub fn encode(point: &DataPoint) -> Self {
        match point.topic.data_format {
            DataFormat::Value => BusPayload::Bytes(point.value.value_as_string().into_bytes()),
            DataFormat::Json => BusPayload::Json(point.to_json()),
            DataFormat::Pretty => BusPayload::Pretty(
                serde_json::to_string_pretty(&point.to_json()).unwrap_or_default(),
            ),
        }
    }

    /// Decodes a JSON or pretty envelope back into a data point.
    ///
    /// Raw byte payloads carry no topic and yield `None`.
    pub fn decode(&self) -> Option<DataPoint> {
        match self {
            BusPayload::Json(json) => DataPoint::from_json(json),
            BusPayload::Pretty(text) => {
                let json: JsonValue = serde_json::from_str(text).ok()?;
                DataPoint::from_json(&json)
            }
            BusPayload::Bytes(_) => None,
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

/// `<SystemType>/<id>/Subscribe` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Requesting client.
    #[serde(rename = "ClientId")]
    pub client_id: String,
    /// Topic to subscribe.
    #[serde(rename = "Topic")]
    pub topic: Topic,
}

impl SubscribeRequest {
    /// Creates a subscribe request.
    pub fn new(client_id: impl Into<String>, topic: Topic) -> Self {
        Self {
            client_id: client_id.into(),
            topic,
        }
    }
}

/// `<SystemType>/<id>/Unsubscribe` request with one topic or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsubscribeRequest {
    /// Requesting client.
    #[serde(rename = "ClientId")]
    pub client_id: String,
    /// Single topic form.
    #[serde(rename = "Topic", default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<Topic>,
    /// List form.
    #[serde(rename = "Topics", default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<Topic>,
}

impl UnsubscribeRequest {
    /// Creates a request for one topic.
    pub fn single(client_id: impl Into<String>, topic: Topic) -> Self {
        Self {
            client_id: client_id.into(),
            topic: Some(topic),
            topics: Vec::new(),
        }
    }

    /// Creates a request for several topics.
    pub fn many(client_id: impl Into<String>, topics: Vec<Topic>) -> Self {
        Self {
            client_id: client_id.into(),
            topic: None,
            topics,
        }
    }

    /// All topics named by the request; `Topic` takes precedence over `Topics`.
    pub fn all_topics(&self) -> Vec<Topic> {
        match &self.topic {
            Some(topic) => vec![topic.clone()],
            None => self.topics.clone(),
        }
    }
}

/// `<SystemType>/<id>/Publish` request.
///
/// Carries either a decoded value (`Value`) or raw bytes (`Data`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRequest {
    /// Target topic.
    #[serde(rename = "Topic")]
    pub topic: Topic,
    /// Value envelope.
    #[serde(rename = "Value", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<TopicValue>,
    /// Raw bytes.
    #[serde(rename = "Data", default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
}

impl PublishRequest {
    /// Creates a request publishing a value.
    pub fn value(topic: Topic, value: TopicValue) -> Self {
        Self {
            topic,
            value: Some(value),
            data: None,
        }
    }

    /// Creates a request publishing raw bytes.
    pub fn bytes(topic: Topic, data: Vec<u8>) -> Self {
        Self {
            topic,
            value: None,
            data: Some(data),
        }
    }
}

// =============================================================================
// Reply
// =============================================================================

/// Reply to every request: `{Ok, Error?, Result?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusReply {
    /// Whether the request succeeded.
    #[serde(rename = "Ok")]
    pub ok: bool,
    /// Failure description.
    #[serde(rename = "Error", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Handler-specific result.
    #[serde(rename = "Result", default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
}

impl BusReply {
    /// Successful reply without a result.
    pub fn success() -> Self {
        Self {
            ok: true,
            error: None,
            result: None,
        }
    }

    /// Successful reply with a result.
    pub fn with_result(result: JsonValue) -> Self {
        Self {
            ok: true,
            error: None,
            result: Some(result),
        }
    }

    /// Failed reply.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            result: None,
        }
    }

    /// Encodes the reply as a JSON body.
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({"Ok": self.ok}))
    }

    /// Decodes a reply body.
    pub fn from_json(body: JsonValue) -> Result<Self, BusError> {
        Ok(serde_json::from_value(body)?)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::parse_topic;
    use serde_json::json;

    #[test]
    fn test_unsubscribe_single_or_list() {
        let a = parse_topic("Plc/S7/Node/A");
        let b = parse_topic("Plc/S7/Node/B");

        let body = serde_json::to_value(UnsubscribeRequest::single("c1", a.clone())).unwrap();
        assert!(body.get("Topics").is_none());
        let request: UnsubscribeRequest = serde_json::from_value(body).unwrap();
        assert_eq!(request.all_topics(), vec![a.clone()]);

        let body = json!({"ClientId": "c1", "Topics": [a.to_json(), b.to_json()]});
        let request: UnsubscribeRequest = serde_json::from_value(body).unwrap();
        assert_eq!(request.all_topics(), vec![a, b]);
    }

    #[test]
    fn test_reply_encoding() {
        assert_eq!(BusReply::success().to_json(), json!({"Ok": true}));
        assert_eq!(
            BusReply::failure("boom").to_json(),
            json!({"Ok": false, "Error": "boom"})
        );
        let reply = BusReply::from_json(json!({"Ok": true, "Result": {"n": 1}})).unwrap();
        assert_eq!(reply.result, Some(json!({"n": 1})));
        assert!(BusReply::from_json(json!({"nope": 1})).is_err());
    }

    #[test]
    fn test_payload_follows_data_format() {
        let value = TopicValue::plain(42i64);
        let json_point = DataPoint::new(parse_topic("Plc/S7/Node/A"), value.clone());
        let raw_point = DataPoint::new(parse_topic("Plc/S7/Node:Value/A"), value.clone());
        let pretty_point = DataPoint::new(parse_topic("Plc/S7/Node:Pretty/A"), value);

        assert!(matches!(BusPayload::encode(&json_point), BusPayload::Json(_)));
        assert_eq!(BusPayload::encode(&raw_point), BusPayload::Bytes(b"42".to_vec()));

        let pretty = BusPayload::encode(&pretty_point);
        assert!(matches!(&pretty, BusPayload::Pretty(s) if s.contains('\n')));
        assert_eq!(pretty.decode(), Some(pretty_point));
        assert_eq!(BusPayload::encode(&json_point).decode(), Some(json_point));
    }

    #[test]
    fn test_publish_request() {
        let request = PublishRequest::bytes(parse_topic("Mqtt/home/Path/a/b"), vec![1, 2]);
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["Data"], json!([1, 2]));
        let back: PublishRequest = serde_json::from_value(body).unwrap();
        assert_eq!(back, request);
    }
}
