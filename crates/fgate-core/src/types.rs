// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Value envelope and data point types.
//!
//! Every sample flowing through the gateway is a [`TopicValue`]: a tagged
//! [`Payload`] plus status and timestamps. Protocol drivers choose the
//! payload variant that fits their source (plain scalars, structured JSON
//! documents or natively typed values); consumers only use the shared
//! accessors and never match on the concrete variant.
//!
//! # Examples
//!
//! ```
//! use fgate_core::types::{TopicValue, Variant};
//!
//! let value = TopicValue::plain(Variant::Float(21.5));
//! assert!(value.has_value());
//! assert_eq!(value.value_as_double(), Some(21.5));
//! assert_eq!(value.data_type_name(), "Double");
//! ```

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value as JsonValue};

use crate::topic::{decode_from_json, Topic};

/// Status code reported when a driver does not provide one.
pub const STATUS_GOOD: &str = "Good";

// =============================================================================
// Variant
// =============================================================================

/// A scalar or array value read from a field device.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Variant {
    /// No value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Floating point.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Point in time.
    Timestamp(DateTime<Utc>),
    /// Ordered list of values.
    Array(Vec<Variant>),
}

impl Variant {
    /// Returns the data type name reported in JSON envelopes.
    pub fn type_name(&self) -> &'static str {
        match self {
            Variant::Null => "Null",
            Variant::Bool(_) => "Boolean",
            Variant::Int(_) => "Int64",
            Variant::UInt(_) => "UInt64",
            Variant::Float(_) => "Double",
            Variant::Text(_) => "String",
            Variant::Bytes(_) => "ByteString",
            Variant::Timestamp(_) => "DateTime",
            Variant::Array(_) => "Array",
        }
    }

    /// Returns `true` for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Variant::Null)
    }

    /// Numeric view of the value; text is parsed when it looks like a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Variant::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Variant::Int(v) => Some(*v as f64),
            Variant::UInt(v) => Some(*v as f64),
            Variant::Float(v) => Some(*v),
            Variant::Text(v) => v.trim().parse().ok(),
            _ => None,
        }
    }

    /// Converts the value to JSON.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Variant::Null => JsonValue::Null,
            Variant::Bool(v) => JsonValue::Bool(*v),
            Variant::Int(v) => json!(*v),
            Variant::UInt(v) => json!(*v),
            Variant::Float(v) => json!(*v),
            Variant::Text(v) => JsonValue::String(v.clone()),
            Variant::Bytes(v) => json!(v),
            Variant::Timestamp(v) => JsonValue::String(format_time(v)),
            Variant::Array(items) => JsonValue::Array(items.iter().map(Variant::to_json).collect()),
        }
    }

    /// Best-effort conversion from untyped JSON.
    ///
    /// Returns `None` for JSON objects, which have no scalar representation.
    pub fn from_json(value: &JsonValue) -> Option<Variant> {
        Some(match value {
            JsonValue::Null => Variant::Null,
            JsonValue::Bool(v) => Variant::Bool(*v),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Variant::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Variant::UInt(u)
                } else {
                    Variant::Float(n.as_f64()?)
                }
            }
            JsonValue::String(s) => Variant::Text(s.clone()),
            JsonValue::Array(items) => Variant::Array(
                items.iter().map(Variant::from_json).collect::<Option<Vec<_>>>()?,
            ),
            JsonValue::Object(_) => return None,
        })
    }

    /// Conversion from JSON guided by a type name produced by [`Variant::type_name`].
    pub fn from_typed_json(type_name: &str, value: &JsonValue) -> Option<Variant> {
        match (type_name, value) {
            ("Double", JsonValue::Number(n)) => n.as_f64().map(Variant::Float),
            ("UInt64", JsonValue::Number(n)) => n.as_u64().map(Variant::UInt),
            ("Int64", JsonValue::Number(n)) => n.as_i64().map(Variant::Int),
            ("ByteString", JsonValue::Array(items)) => items
                .iter()
                .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()
                .map(Variant::Bytes),
            ("DateTime", JsonValue::String(s)) => parse_time(s).map(Variant::Timestamp),
            _ => Variant::from_json(value),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Null => Ok(()),
            Variant::Bool(v) => write!(f, "{}", v),
            Variant::Int(v) => write!(f, "{}", v),
            Variant::UInt(v) => write!(f, "{}", v),
            Variant::Float(v) => write!(f, "{}", v),
            Variant::Text(v) => f.write_str(v),
            Variant::Timestamp(v) => f.write_str(&format_time(v)),
            Variant::Bytes(_) | Variant::Array(_) => write!(f, "{}", self.to_json()),
        }
    }
}

macro_rules! impl_from_for_variant {
    ($variant:ident, $type:ty) => {
        impl From<$type> for Variant {
            fn from(v: $type) -> Self {
                Variant::$variant(v.into())
            }
        }
    };
}

impl_from_for_variant!(Bool, bool);
impl_from_for_variant!(Int, i32);
impl_from_for_variant!(Int, i64);
impl_from_for_variant!(UInt, u32);
impl_from_for_variant!(UInt, u64);
impl_from_for_variant!(Float, f32);
impl_from_for_variant!(Float, f64);
impl_from_for_variant!(Text, String);
impl_from_for_variant!(Text, &str);
impl_from_for_variant!(Bytes, Vec<u8>);
impl_from_for_variant!(Timestamp, DateTime<Utc>);

// =============================================================================
// Payload
// =============================================================================

/// The protocol-tagged content of a [`TopicValue`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    /// No value was delivered (e.g. a bad-status notification).
    #[default]
    Empty,
    /// A plain scalar or array.
    Plain(Variant),
    /// A structured document, e.g. an MQTT JSON message or a DDS sample.
    Json(JsonValue),
    /// A value carrying the source protocol's own type name.
    Native {
        /// Protocol type name, e.g. `Float` or `DINT`.
        type_name: String,
        /// The value.
        value: Variant,
    },
}

impl Payload {
    /// Short tag used by envelopes and storage.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Empty => "empty",
            Payload::Plain(_) => "plain",
            Payload::Json(_) => "json",
            Payload::Native { .. } => "native",
        }
    }
}

// =============================================================================
// TopicValue
// =============================================================================

/// One sample of a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicValue {
    /// The sampled content.
    pub payload: Payload,
    /// Protocol status code as text.
    pub status_code: String,
    /// When the source produced the value.
    pub source_time: DateTime<Utc>,
    /// Sub-nanosecond fraction of `source_time` (0-999).
    pub source_picoseconds: u16,
    /// When the server or driver observed the value.
    pub server_time: DateTime<Utc>,
    /// Sub-nanosecond fraction of `server_time` (0-999).
    pub server_picoseconds: u16,
}

impl TopicValue {
    /// Creates a value stamped with the current time and a good status.
    pub fn new(payload: Payload) -> Self {
        let now = Utc::now();
        Self {
            payload,
            status_code: STATUS_GOOD.to_string(),
            source_time: now,
            source_picoseconds: 0,
            server_time: now,
            server_picoseconds: 0,
        }
    }

    /// Creates a plain value.
    pub fn plain(value: impl Into<Variant>) -> Self {
        Self::new(Payload::Plain(value.into()))
    }

    /// Creates a structured value.
    pub fn json(value: JsonValue) -> Self {
        Self::new(Payload::Json(value))
    }

    /// Creates a natively typed value.
    pub fn native(type_name: impl Into<String>, value: impl Into<Variant>) -> Self {
        Self::new(Payload::Native {
            type_name: type_name.into(),
            value: value.into(),
        })
    }

    /// Creates a value without content.
    pub fn empty() -> Self {
        Self::new(Payload::Empty)
    }

    /// Sets the status code.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status_code = status.into();
        self
    }

    /// Sets the source timestamp.
    pub fn with_source_time(mut self, time: DateTime<Utc>, picoseconds: u16) -> Self {
        self.source_time = time;
        self.source_picoseconds = picoseconds;
        self
    }

    /// Sets the server timestamp.
    pub fn with_server_time(mut self, time: DateTime<Utc>, picoseconds: u16) -> Self {
        self.server_time = time;
        self.server_picoseconds = picoseconds;
        self
    }

    /// Returns `true` if the sample carries a non-null value.
    pub fn has_value(&self) -> bool {
        match &self.payload {
            Payload::Empty => false,
            Payload::Plain(v) | Payload::Native { value: v, .. } => !v.is_null(),
            Payload::Json(v) => !v.is_null(),
        }
    }

    /// Text form of the value; empty when there is none.
    pub fn value_as_string(&self) -> String {
        match &self.payload {
            Payload::Empty => String::new(),
            Payload::Plain(v) | Payload::Native { value: v, .. } => v.to_string(),
            Payload::Json(JsonValue::String(s)) => s.clone(),
            Payload::Json(JsonValue::Null) => String::new(),
            Payload::Json(v) => v.to_string(),
        }
    }

    /// Numeric form of the value, if it has one.
    pub fn value_as_double(&self) -> Option<f64> {
        match &self.payload {
            Payload::Empty => None,
            Payload::Plain(v) | Payload::Native { value: v, .. } => v.as_f64(),
            Payload::Json(JsonValue::Number(n)) => n.as_f64(),
            Payload::Json(_) => None,
        }
    }

    /// The value as a JSON document.
    pub fn value_as_object(&self) -> JsonValue {
        match &self.payload {
            Payload::Empty => JsonValue::Null,
            Payload::Plain(v) | Payload::Native { value: v, .. } => v.to_json(),
            Payload::Json(v) => v.clone(),
        }
    }

    /// The status code as text.
    pub fn status_as_string(&self) -> &str {
        &self.status_code
    }

    /// Returns `true` if the status code is good.
    pub fn is_status_good(&self) -> bool {
        self.status_code == STATUS_GOOD
    }

    /// Name of the value's data type.
    pub fn data_type_name(&self) -> String {
        match &self.payload {
            Payload::Empty => String::new(),
            Payload::Plain(v) => v.type_name().to_string(),
            Payload::Native { type_name, .. } => type_name.clone(),
            Payload::Json(v) => json_type_name(v).to_string(),
        }
    }

    /// Returns `true` if the value is a nested document.
    pub fn has_struct(&self) -> bool {
        matches!(&self.payload, Payload::Json(JsonValue::Object(_) | JsonValue::Array(_)))
    }

    /// Flattens nested objects and arrays into one level.
    ///
    /// Keys are joined with `_`, array elements are keyed by index. A scalar
    /// value is returned under the key `value`; an absent value yields an
    /// empty map.
    ///
    /// ```
    /// use fgate_core::types::TopicValue;
    /// use serde_json::json;
    ///
    /// let value = TopicValue::json(json!({"a": {"b": 1}, "c": [true, "x"]}));
    /// let flat = value.as_flat_map();
    /// assert_eq!(flat["a_b"], json!(1));
    /// assert_eq!(flat["c_0"], json!(true));
    /// assert_eq!(flat["c_1"], json!("x"));
    /// ```
    pub fn as_flat_map(&self) -> BTreeMap<String, JsonValue> {
        let mut result = BTreeMap::new();
        match self.value_as_object() {
            JsonValue::Null => {}
            JsonValue::Object(map) => flatten_object("", &map, &mut result),
            JsonValue::Array(items) => flatten_array("", &items, &mut result),
            scalar => {
                result.insert("value".to_string(), scalar);
            }
        }
        result
    }

    /// Source time in epoch milliseconds.
    pub fn source_time_ms(&self) -> i64 {
        self.source_time.timestamp_millis()
    }

    /// Server time in epoch milliseconds.
    pub fn server_time_ms(&self) -> i64 {
        self.server_time.timestamp_millis()
    }

    /// Encodes the value as a JSON envelope.
    pub fn to_json(&self) -> JsonValue {
        json!({
            "value": self.value_as_object(),
            "dataType": self.data_type_name(),
            "kind": self.payload.kind(),
            "statusCode": self.status_code,
            "sourceTime": format_time(&self.source_time),
            "serverTime": format_time(&self.server_time),
            "sourceTimeMs": self.source_time_ms(),
            "serverTimeMs": self.server_time_ms(),
            "sourcePicoseconds": self.source_picoseconds,
            "serverPicoseconds": self.server_picoseconds,
        })
    }

    /// Decodes a JSON envelope.
    ///
    /// Timestamps prefer the RFC 3339 fields and fall back to the
    /// millisecond fields, then to the current time. Envelopes without a
    /// `kind` are treated as plain values.
    pub fn from_json(json: &JsonValue) -> Self {
        let value = json.get("value").cloned().unwrap_or(JsonValue::Null);
        let data_type = json.get("dataType").and_then(JsonValue::as_str).unwrap_or_default();
        let kind = json.get("kind").and_then(JsonValue::as_str).unwrap_or("plain");

        let payload = match kind {
            _ if value.is_null() => Payload::Empty,
            "empty" => Payload::Empty,
            "json" => Payload::Json(value),
            "native" => match Variant::from_json(&value) {
                Some(v) => Payload::Native {
                    type_name: data_type.to_string(),
                    value: v,
                },
                None => Payload::Json(value),
            },
            _ => match Variant::from_typed_json(data_type, &value) {
                Some(v) => Payload::Plain(v),
                None => Payload::Json(value),
            },
        };

        let picos = |key: &str| {
            json.get(key)
                .and_then(JsonValue::as_u64)
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or(0)
        };

        Self {
            payload,
            status_code: json
                .get("statusCode")
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string(),
            source_time: envelope_time(json, "sourceTime"),
            source_picoseconds: picos("sourcePicoseconds"),
            server_time: envelope_time(json, "serverTime"),
            server_picoseconds: picos("serverPicoseconds"),
        }
    }
}

impl fmt::Display for TopicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl Serialize for TopicValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TopicValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        Ok(TopicValue::from_json(&value))
    }
}

fn flatten_value(key: String, value: &JsonValue, out: &mut BTreeMap<String, JsonValue>) {
    match value {
        JsonValue::Object(map) => flatten_object(&format!("{}_", key), map, out),
        JsonValue::Array(items) => flatten_array(&format!("{}_", key), items, out),
        other => {
            out.insert(key, other.clone());
        }
    }
}

fn flatten_object(prefix: &str, map: &Map<String, JsonValue>, out: &mut BTreeMap<String, JsonValue>) {
    for (k, v) in map {
        flatten_value(format!("{}{}", prefix, k), v, out);
    }
}

fn flatten_array(prefix: &str, items: &[JsonValue], out: &mut BTreeMap<String, JsonValue>) {
    for (i, v) in items.iter().enumerate() {
        flatten_value(format!("{}{}", prefix, i), v, out);
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "Null",
        JsonValue::Bool(_) => "Boolean",
        JsonValue::Number(_) => "Number",
        JsonValue::String(_) => "String",
        JsonValue::Array(_) => "JsonArray",
        JsonValue::Object(_) => "JsonObject",
    }
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc))
}

fn envelope_time(json: &JsonValue, key: &str) -> DateTime<Utc> {
    json.get(key)
        .and_then(JsonValue::as_str)
        .and_then(parse_time)
        .or_else(|| {
            json.get(format!("{}Ms", key).as_str())
                .and_then(JsonValue::as_i64)
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        })
        .unwrap_or_else(Utc::now)
}

// =============================================================================
// DataPoint
// =============================================================================

/// A topic and one of its values; the unit carried by the bus and queues.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    /// Where the value came from.
    pub topic: Topic,
    /// The sample.
    pub value: TopicValue,
}

impl DataPoint {
    /// Creates a data point.
    pub fn new(topic: Topic, value: TopicValue) -> Self {
        Self { topic, value }
    }

    /// Encodes the `{"Topic": ..., "Value": ...}` envelope.
    pub fn to_json(&self) -> JsonValue {
        json!({
            "Topic": self.topic.to_json(),
            "Value": self.value.to_json(),
        })
    }

    /// Decodes the `{"Topic": ..., "Value": ...}` envelope.
    ///
    /// Returns `None` if either key is missing.
    pub fn from_json(json: &JsonValue) -> Option<Self> {
        let topic = decode_from_json(json.get("Topic")?);
        let value = TopicValue::from_json(json.get("Value")?);
        Some(Self { topic, value })
    }
}

impl fmt::Display for DataPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.topic, self.value.value_as_string())
    }
}

// =============================================================================
// Tests
// =============================================================================
