// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Protocol-agnostic topic addressing.
//!
//! A [`Topic`] is the canonical key for one data point on any supported
//! system. Topics are created from wire address strings with
//! [`parse_topic`] or from JSON envelopes with [`decode_from_json`], and
//! never change afterwards.
//!
//! # Address Grammar
//!
//! Prefixes and keywords are case-insensitive, `fmt` is one of `:Json`,
//! `:Pretty` or `:Value` and defaults to `Json`.
//!
//! | Pattern                                   | Result                             |
//! |-------------------------------------------|------------------------------------|
//! | `Opc/<sys>/Node[fmt]/<ns>/<id>`            | Node, `topic_node = ns=<ns>;s=<id>` |
//! | `Opc/<sys>/Node[fmt]/<node>`               | Node, `topic_node = <node>`         |
//! | `Opc/<sys>/Path[fmt]/<dir>/<leaf>`         | Path, `topic_path = <dir>/<leaf>`   |
//! | `Plc/<sys>/Node[fmt]/<node>`               | Node                               |
//! | `Mqtt/<sys>/Path[fmt]/<path>`              | Path                               |
//! | `$SYS/<path>`                             | Sys Path, empty system name         |
//! | anything else                             | Unknown                            |
//!
//! # Examples
//!
//! ```
//! use fgate_core::topic::{parse_topic, SystemType, TopicType};
//!
//! let topic = parse_topic("Opc/Line1/Node/2/Motor.Speed");
//! assert_eq!(topic.system_type, SystemType::Opc);
//! assert_eq!(topic.topic_type, TopicType::Node);
//! assert_eq!(topic.topic_node, "ns=2;s=Motor.Speed");
//! assert!(topic.is_valid());
//!
//! assert!(!parse_topic("not/a/topic").is_valid());
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value as JsonValue};
use std::fmt;

// =============================================================================
// Enums
// =============================================================================

/// The kind of system a topic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SystemType {
    /// Unparseable or unsupported address.
    #[default]
    Unknown,
    /// Gateway-internal system topics (`$SYS/...`).
    Sys,
    /// OPC UA servers.
    Opc,
    /// PLC fieldbus drivers.
    Plc,
    /// MQTT brokers.
    Mqtt,
    /// Real-time publish/subscribe middleware.
    Dds,
}

impl SystemType {
    /// All system types, in declaration order.
    pub const ALL: [SystemType; 6] = [
        SystemType::Unknown,
        SystemType::Sys,
        SystemType::Opc,
        SystemType::Plc,
        SystemType::Mqtt,
        SystemType::Dds,
    ];

    /// Returns the canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemType::Unknown => "Unknown",
            SystemType::Sys => "Sys",
            SystemType::Opc => "Opc",
            SystemType::Plc => "Plc",
            SystemType::Mqtt => "Mqtt",
            SystemType::Dds => "Dds",
        }
    }

    /// Looks up a system type by name, ignoring case.
    ///
    /// Unrecognized names map to `Unknown`.
    pub fn from_name(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(name))
            .unwrap_or_default()
    }
}

impl fmt::Display for SystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a topic addresses a single node or a browse path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TopicType {
    /// Unparseable address.
    #[default]
    Unknown,
    /// Protocol-native node identifier.
    Node,
    /// Hierarchical browse path, possibly with wildcards.
    Path,
}

impl TopicType {
    /// Returns the canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicType::Unknown => "Unknown",
            TopicType::Node => "Node",
            TopicType::Path => "Path",
        }
    }

    /// Looks up a topic type by name, ignoring case.
    pub fn from_name(name: &str) -> Self {
        [TopicType::Node, TopicType::Path]
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(name))
            .unwrap_or_default()
    }
}

impl fmt::Display for TopicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire encoding a subscriber asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataFormat {
    /// JSON envelope `{Topic, Value}`.
    #[default]
    Json,
    /// Raw value bytes.
    Value,
    /// Pretty-printed JSON envelope.
    Pretty,
}

impl DataFormat {
    /// Returns the canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Json => "Json",
            DataFormat::Value => "Value",
            DataFormat::Pretty => "Pretty",
        }
    }

    /// Looks up a data format by name, ignoring case. Defaults to `Json`.
    pub fn from_name(name: &str) -> Self {
        [DataFormat::Json, DataFormat::Value, DataFormat::Pretty]
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(name))
            .unwrap_or_default()
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// BrowsePath
// =============================================================================

/// A resolved, human-readable path of browse names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BrowsePath(Vec<String>);

impl BrowsePath {
    /// Creates a browse path from its segments.
    pub fn new(items: Vec<String>) -> Self {
        Self(items)
    }

    /// Splits a `/`-separated path, honoring `\/` escapes.
    pub fn parse(path: &str) -> Self {
        Self(split_address(path))
    }

    /// Returns the segments.
    pub fn items(&self) -> &[String] {
        &self.0
    }

    /// Returns the last segment, or an empty string.
    pub fn last(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or("")
    }

    /// Returns `true` if the path has no segments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Joins the segments with a custom separator.
    pub fn join(&self, separator: &str) -> String {
        self.0.join(separator)
    }
}

impl fmt::Display for BrowsePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

// =============================================================================
// Topic
// =============================================================================

/// Canonical address of one data point.
///
/// Equality and hashing are structural over every field, so two topics
/// parsed from the same address compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Topic {
    /// Original address string; also the bus routing key for values.
    pub topic_name: String,
    /// System kind.
    pub system_type: SystemType,
    /// Node or path addressing.
    pub topic_type: TopicType,
    /// Logical system instance id (e.g. the driver id).
    pub system_name: String,
    /// Protocol-native node identifier, may be empty.
    pub topic_node: String,
    /// Browse path, possibly with wildcards, may be empty.
    pub topic_path: String,
    /// Requested wire encoding.
    pub data_format: DataFormat,
    /// Resolved browse path, empty unless a driver resolved one.
    pub browse_path: BrowsePath,
}

impl Topic {
    /// Returns `true` if the topic can be subscribed and routed.
    pub fn is_valid(&self) -> bool {
        self.system_type != SystemType::Unknown && self.topic_type != TopicType::Unknown
    }

    /// Returns a copy with a different data format.
    pub fn with_format(mut self, format: DataFormat) -> Self {
        self.data_format = format;
        self
    }

    /// Returns a copy with a resolved browse path.
    pub fn with_browse_path(mut self, browse_path: BrowsePath) -> Self {
        self.browse_path = browse_path;
        self
    }

    /// Returns a copy addressing a resolved node.
    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.topic_node = node.into();
        self
    }

    /// Returns `true` if a browse path has been resolved.
    pub fn has_browse_path(&self) -> bool {
        !self.browse_path.is_empty()
    }

    /// Splits the topic name on unescaped `/`.
    pub fn address_items(&self) -> Vec<String> {
        split_address(&self.topic_name)
    }

    /// Returns the browse path for path topics or the node for node topics.
    ///
    /// Path topics without a resolved browse path fall back to `topic_path`.
    pub fn browse_path_or_node(&self) -> BrowsePath {
        match self.topic_type {
            TopicType::Path if self.has_browse_path() => self.browse_path.clone(),
            TopicType::Path => BrowsePath::parse(&self.topic_path),
            TopicType::Node => BrowsePath::new(vec![self.topic_node.clone()]),
            TopicType::Unknown => BrowsePath::default(),
        }
    }

    /// Fully qualified name: `<SystemType>/<SystemName>/<TopicType>/<path-or-node>`.
    pub fn fqn(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.system_type,
            self.system_name,
            self.topic_type,
            self.browse_path_or_node()
        )
    }

    /// Short name used by metric-style sinks.
    pub fn metric_name(&self) -> String {
        match self.topic_type {
            TopicType::Path => self.browse_path_or_node().last().to_string(),
            TopicType::Node => self.topic_node.clone(),
            TopicType::Unknown => String::new(),
        }
    }

    /// Minimal `<system>/<path>` form for display.
    pub fn display_name(&self) -> String {
        match self.system_type {
            SystemType::Sys => self.topic_path.clone(),
            SystemType::Unknown => self.topic_name.clone(),
            _ => format!("{}/{}", self.system_name, self.browse_path_or_node()),
        }
    }

    /// Encodes this topic as JSON.
    pub fn to_json(&self) -> JsonValue {
        encode_to_json(self)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.topic_name)
    }
}

impl Serialize for Topic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        encode_to_json(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        Ok(decode_from_json(&value))
    }
}

// =============================================================================
// Address Splitting
// =============================================================================

/// Splits an address on `/` characters that are not preceded by `\`,
/// then unescapes `\/` to `/` in each segment.
///
/// ```
/// use fgate_core::topic::split_address;
///
/// assert_eq!(split_address(r"a/b\/c/d"), vec!["a", "b/c", "d"]);
/// ```
pub fn split_address(address: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut start = 0;
    let mut prev = None;
    for (i, c) in address.char_indices() {
        if c == '/' && prev != Some('\\') {
            items.push(&address[start..i]);
            start = i + 1;
        }
        prev = Some(c);
    }
    items.push(&address[start..]);
    items.into_iter().map(|s| s.replace("\\/", "/")).collect()
}

// =============================================================================
// Parsing
// =============================================================================

/// Parses a wire address into a topic.
///
/// Never fails: input that matches no grammar yields a topic with
/// `SystemType::Unknown` whose `topic_path` is the original address.
pub fn parse_topic(address: &str) -> Topic {
    parse_opc(address)
        .or_else(|| parse_simple(address, "Plc", "Node", SystemType::Plc, TopicType::Node))
        .or_else(|| parse_simple(address, "Mqtt", "Path", SystemType::Mqtt, TopicType::Path))
        .or_else(|| parse_sys(address))
        .unwrap_or_else(|| Topic {
            topic_name: address.to_string(),
            topic_path: address.to_string(),
            ..Topic::default()
        })
}

/// The `<Prefix>/<system>/<Keyword>[fmt]/` header shared by all system grammars.
struct Header<'a> {
    system_name: &'a str,
    format: DataFormat,
    rest: &'a str,
}

fn parse_opc(address: &str) -> Option<Topic> {
    if let Some(h) = parse_header(address, "Opc", "Node") {
        let topic_node = match split_namespace(h.rest) {
            Some((ns, id)) => format!("ns={};s={}", ns, id),
            None => h.rest.to_string(),
        };
        return Some(build(address, SystemType::Opc, TopicType::Node, &h, topic_node, String::new()));
    }
    let h = parse_header(address, "Opc", "Path")?;
    if !h.rest.contains('/') {
        return None;
    }
    Some(build(address, SystemType::Opc, TopicType::Path, &h, String::new(), h.rest.to_string()))
}

fn parse_simple(
    address: &str,
    prefix: &str,
    keyword: &str,
    system_type: SystemType,
    topic_type: TopicType,
) -> Option<Topic> {
    let h = parse_header(address, prefix, keyword)?;
    let (node, path) = match topic_type {
        TopicType::Node => (h.rest.to_string(), String::new()),
        _ => (String::new(), h.rest.to_string()),
    };
    Some(build(address, system_type, topic_type, &h, node, path))
}

fn parse_sys(address: &str) -> Option<Topic> {
    strip_prefix_ignore_case(address, "$SYS/")?;
    Some(Topic {
        topic_name: address.to_string(),
        system_type: SystemType::Sys,
        topic_type: TopicType::Path,
        topic_path: address.to_string(),
        ..Topic::default()
    })
}

fn build(
    address: &str,
    system_type: SystemType,
    topic_type: TopicType,
    header: &Header<'_>,
    topic_node: String,
    topic_path: String,
) -> Topic {
    Topic {
        topic_name: address.to_string(),
        system_type,
        topic_type,
        system_name: header.system_name.to_string(),
        topic_node,
        topic_path,
        data_format: header.format,
        browse_path: BrowsePath::default(),
    }
}

fn parse_header<'a>(address: &'a str, prefix: &str, keyword: &str) -> Option<Header<'a>> {
    let rest = strip_prefix_ignore_case(address, prefix)?.strip_prefix('/')?;

    let end = rest.find(|c: char| !is_word_char(c)).unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    let (system_name, rest) = rest.split_at(end);

    let rest = rest.strip_prefix('/')?;
    let rest = strip_prefix_ignore_case(rest, keyword)?;
    let (format, rest) = split_format(rest)?;
    let rest = rest.strip_prefix('/')?;

    Some(Header {
        system_name,
        format,
        rest,
    })
}

fn split_format(s: &str) -> Option<(DataFormat, &str)> {
    for format in [DataFormat::Json, DataFormat::Pretty, DataFormat::Value] {
        if let Some(rest) = s.strip_prefix(':').and_then(|r| strip_prefix_ignore_case(r, format.as_str())) {
            if rest.starts_with('/') {
                return Some((format, rest));
            }
        }
    }
    if s.starts_with('/') {
        Some((DataFormat::Json, s))
    } else {
        None
    }
}

/// Splits `<digits>/<id>` into the namespace index and identifier.
fn split_namespace(s: &str) -> Option<(&str, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    let (ns, rest) = s.split_at(end);
    Some((ns, rest.strip_prefix('/')?))
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

// =============================================================================
// JSON Encoding
// =============================================================================

const TOPIC_NAME: &str = "topicName";
const TOPIC_TYPE: &str = "topicType";
const SYSTEM_TYPE: &str = "systemType";
const SYSTEM_NAME: &str = "systemName";
const TOPIC_PATH: &str = "topicPath";
const TOPIC_NODE: &str = "topicNode";
const DATA_FORMAT: &str = "dataFormat";
const BROWSE_PATH: &str = "browsePath";

/// Encodes a topic as a JSON object with one key per field.
pub fn encode_to_json(topic: &Topic) -> JsonValue {
    json!({
        TOPIC_NAME: topic.topic_name,
        TOPIC_TYPE: topic.topic_type.as_str(),
        SYSTEM_TYPE: topic.system_type.as_str(),
        SYSTEM_NAME: topic.system_name,
        TOPIC_PATH: topic.topic_path,
        TOPIC_NODE: topic.topic_node,
        DATA_FORMAT: topic.data_format.as_str(),
        BROWSE_PATH: topic.browse_path.items(),
    })
}

/// Decodes a topic from JSON.
///
/// Missing or mistyped keys fall back to defaults: empty strings,
/// `Unknown` enums, `Json` format and an empty browse path. Non-object
/// input decodes to an invalid topic.
pub fn decode_from_json(json: &JsonValue) -> Topic {
    let text = |key: &str| {
        json.get(key)
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let browse_path = json
        .get(BROWSE_PATH)
        .and_then(JsonValue::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| match item {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    Topic {
        topic_name: text(TOPIC_NAME),
        system_type: SystemType::from_name(&text(SYSTEM_TYPE)),
        topic_type: TopicType::from_name(&text(TOPIC_TYPE)),
        system_name: text(SYSTEM_NAME),
        topic_node: text(TOPIC_NODE),
        topic_path: text(TOPIC_PATH),
        data_format: DataFormat::from_name(&text(DATA_FORMAT)),
        browse_path: BrowsePath::new(browse_path),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opc_node_with_namespace() {
        let t = parse_topic("Opc/Line1/Node/2/Motor.Speed");
        assert_eq!(t.system_type, SystemType::Opc);
        assert_eq!(t.topic_type, TopicType::Node);
        assert_eq!(t.system_name, "Line1");
        assert_eq!(t.topic_node, "ns=2;s=Motor.Speed");
        assert_eq!(t.data_format, DataFormat::Json);
        assert_eq!(t.topic_name, "Opc/Line1/Node/2/Motor.Speed");
    }

    #[test]
    fn test_opc_node_multi_digit_namespace() {
        let t = parse_topic("opc/demo/node/12/a/b");
        assert_eq!(t.topic_node, "ns=12;s=a/b");
    }

    #[test]
    fn test_opc_node_plain() {
        let t = parse_topic(r#"Opc/s7/Node/ns=3;s="DB1"."State""#);
        assert_eq!(t.topic_type, TopicType::Node);
        assert_eq!(t.topic_node, r#"ns=3;s="DB1"."State""#);
    }

    #[test]
    fn test_opc_node_empty_rest() {
        let t = parse_topic("Opc/s7/Node/");
        assert!(t.is_valid());
        assert_eq!(t.topic_node, "");
    }

    #[test]
    fn test_opc_path() {
        let t = parse_topic("Opc/demo1/Path:Value/Objects/Dynamic/#");
        assert_eq!(t.topic_type, TopicType::Path);
        assert_eq!(t.topic_path, "Objects/Dynamic/#");
        assert_eq!(t.data_format, DataFormat::Value);
        assert_eq!(t.topic_node, "");
    }

    #[test]
    fn test_opc_path_needs_two_segments() {
        let t = parse_topic("Opc/demo1/Path/Objects");
        assert_eq!(t.system_type, SystemType::Unknown);
    }

    #[test]
    fn test_format_case_insensitive() {
        assert_eq!(parse_topic("Plc/S7/Node:PRETTY/DB1.W1").data_format, DataFormat::Pretty);
        assert_eq!(parse_topic("Plc/S7/Node:json/DB1.W1").data_format, DataFormat::Json);
        assert_eq!(parse_topic("Plc/S7/Node:Value/DB1.W1").data_format, DataFormat::Value);
    }

    #[test]
    fn test_unknown_format_rejected() {
        assert!(!parse_topic("Plc/S7/Node:Xml/DB1.W1").is_valid());
        assert!(!parse_topic("Plc/S7/NodeX/DB1.W1").is_valid());
    }

    #[test]
    fn test_plc_node() {
        let t = parse_topic("plc/S7_1/node/DB1.DBW10");
        assert_eq!(t.system_type, SystemType::Plc);
        assert_eq!(t.topic_type, TopicType::Node);
        assert_eq!(t.system_name, "S7_1");
        assert_eq!(t.topic_node, "DB1.DBW10");
    }

    #[test]
    fn test_mqtt_path() {
        let t = parse_topic("Mqtt/home/Path/Original/PV/Inverter/GridFrequency");
        assert_eq!(t.system_type, SystemType::Mqtt);
        assert_eq!(t.topic_type, TopicType::Path);
        assert_eq!(t.topic_path, "Original/PV/Inverter/GridFrequency");
        assert_eq!(t.metric_name(), "GridFrequency");
    }

    #[test]
    fn test_sys_topic() {
        let t = parse_topic("$SYS/Loggers/Influx");
        assert_eq!(t.system_type, SystemType::Sys);
        assert_eq!(t.topic_type, TopicType::Path);
        assert_eq!(t.system_name, "");
        assert_eq!(t.topic_path, "$SYS/Loggers/Influx");
    }

    #[test]
    fn test_fallback_is_unknown() {
        for input in ["", "/", "$SYS", "$sys", "Opc", "Opc/", "Opc//Node/x", "Opc/a b/Node/x", "x/Opc/a/Node/1"] {
            let t = parse_topic(input);
            assert_eq!(t.system_type, SystemType::Unknown, "input {:?}", input);
            assert_eq!(t.topic_type, TopicType::Unknown);
            assert_eq!(t.topic_path, input);
            assert!(!t.is_valid());
        }
    }

    #[test]
    fn test_system_prefix_must_lead() {
        assert_eq!(parse_topic("x/Opc/a/Node/1").system_type, SystemType::Unknown);
    }

    #[test]
    fn test_non_ascii_input_does_not_panic() {
        let t = parse_topic("Öpc/ü/Node/1/ä");
        assert!(!t.is_valid());
        let t = parse_topic("Mqtt/x/Path/Temperatur/°C");
        assert_eq!(t.topic_path, "Temperatur/°C");
    }

    #[test]
    fn test_split_address_escaped_slash() {
        assert_eq!(split_address("a/b"), vec!["a", "b"]);
        assert_eq!(split_address(r"a\/b/c"), vec!["a/b", "c"]);
        assert_eq!(split_address(""), vec![""]);
        assert_eq!(split_address("a/"), vec!["a", ""]);
    }

    #[test]
    fn test_fqn_and_display_name() {
        let t = parse_topic("Opc/Line1/Node/2/Motor.Speed");
        assert_eq!(t.fqn(), "Opc/Line1/Node/ns=2;s=Motor.Speed");
        assert_eq!(t.metric_name(), "ns=2;s=Motor.Speed");

        let t = parse_topic("Mqtt/home/Path/a/b").with_browse_path(BrowsePath::parse("a/resolved"));
        assert_eq!(t.fqn(), "Mqtt/home/Path/a/resolved");
        assert_eq!(t.display_name(), "home/a/resolved");
    }

    #[test]
    fn test_json_round_trip() {
        for address in [
            "Opc/Line1/Node/2/Motor.Speed",
            "Opc/demo/Path:Pretty/Objects/Dynamic/#",
            "Plc/S7/Node:Value/DB1.W1",
            "Mqtt/home/Path/a/b",
            "$SYS/Loggers",
        ] {
            let t = parse_topic(address);
            assert_eq!(decode_from_json(&encode_to_json(&t)), t);
        }
        let resolved = parse_topic("Opc/demo/Path/Objects/#")
            .with_browse_path(BrowsePath::parse("Objects/Dynamic"));
        assert_eq!(decode_from_json(&resolved.to_json()), resolved);
    }

    #[test]
    fn test_decode_missing_fields() {
        let t = decode_from_json(&json!({"topicName": "Opc/a/Node/x", "systemType": "Opc"}));
        assert_eq!(t.system_type, SystemType::Opc);
        assert_eq!(t.topic_type, TopicType::Unknown);
        assert_eq!(t.system_name, "");
        assert_eq!(t.data_format, DataFormat::Json);
        assert!(t.browse_path.is_empty());
        assert!(!t.is_valid());

        let t = decode_from_json(&json!({"systemType": "Bogus", "topicType": 7}));
        assert_eq!(t.system_type, SystemType::Unknown);

        assert_eq!(decode_from_json(&json!("not an object")), Topic::default());
    }

    #[test]
    fn test_serde_uses_json_form() {
        let t = parse_topic("Plc/S7/Node/DB1.W1");
        let s = serde_json::to_string(&t).unwrap();
        assert!(s.contains("\"systemType\":\"Plc\""));
        let back: Topic = serde_json::from_str(&s).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_topic_as_map_key() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(parse_topic("Plc/S7/Node/DB1.W1"));
        set.insert(parse_topic("Plc/S7/Node/DB1.W1"));
        assert_eq!(set.len(), 1);
    }
}
