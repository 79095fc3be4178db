// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Loopback adapter.
//!
//! Writes are echoed back as values to every subscriber of the written item,
//! which lets a configuration exercise drivers, loggers and sinks without
//! field hardware.
//!
//! ```yaml
//! drivers:
//!   - id: Line1
//!     adapter: loopback
//!     options: { system_type: Opc }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};

use fgate_core::driver::{AdapterFactory, DriverContext, ProtocolAdapter, PublishData};
use fgate_core::error::{DriverError, DriverResult};
use fgate_core::registry::MonitoredItem;
use fgate_core::topic::{parse_topic, SystemType, Topic};
use fgate_core::types::TopicValue;

/// Adapter name in configuration files.
pub const LOOPBACK_ADAPTER: &str = "loopback";

/// Creates [`LoopbackAdapter`]s.
///
/// `options.system_type` selects the protocol family the driver poses as
/// (`Opc` if absent).
#[derive(Debug, Default)]
pub struct LoopbackFactory;

impl AdapterFactory for LoopbackFactory {
    fn name(&self) -> &str {
        LOOPBACK_ADAPTER
    }

    fn system_type(&self) -> SystemType {
        SystemType::Opc
    }

    fn create(&self, driver_id: &str, options: &JsonValue) -> DriverResult<Arc<dyn ProtocolAdapter>> {
        let system_type = match options.get("system_type").and_then(JsonValue::as_str) {
            None => SystemType::Opc,
            Some(name) => match SystemType::from_name(name) {
                SystemType::Unknown => {
                    return Err(DriverError::invalid_request(format!(
                        "driver '{}': unknown system_type '{}'",
                        driver_id, name
                    )))
                }
                system_type => system_type,
            },
        };
        Ok(Arc::new(LoopbackAdapter::new(system_type)))
    }
}

/// Echoes writes back to subscribers.
pub struct LoopbackAdapter {
    system_type: SystemType,
    ctx: Mutex<Option<DriverContext>>,
    subscribed: Mutex<Vec<Topic>>,
    last_values: Mutex<HashMap<String, TopicValue>>,
    next_handle: AtomicU64,
}

impl LoopbackAdapter {
    /// Creates a disconnected adapter.
    pub fn new(system_type: SystemType) -> Self {
        Self {
            system_type,
            ctx: Mutex::new(None),
            subscribed: Mutex::new(Vec::new()),
            last_values: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Topics with a live physical subscription.
    pub fn subscribed_topics(&self) -> Vec<Topic> {
        self.subscribed.lock().clone()
    }
}

/// Key of the addressed item, independent of the requested data format.
fn item_key(topic: &Topic) -> String {
    format!(
        "{}/{}/{}/{}",
        topic.system_name,
        topic.topic_type.as_str(),
        topic.topic_node,
        topic.topic_path
    )
}

#[async_trait]
impl ProtocolAdapter for LoopbackAdapter {
    fn system_type(&self) -> SystemType {
        self.system_type
    }

    async fn connect(&self, ctx: DriverContext) -> DriverResult<()> {
        tracing::debug!(driver = ctx.driver_id(), "Loopback connected");
        *self.ctx.lock() = Some(ctx);
        Ok(())
    }

    async fn disconnect(&self) -> DriverResult<()> {
        self.ctx.lock().take();
        Ok(())
    }

    async fn shutdown(&self) {
        self.subscribed.lock().clear();
        self.last_values.lock().clear();
    }

    async fn subscribe_topics(&self, topics: &[Topic]) -> DriverResult<Vec<(Topic, MonitoredItem)>> {
        let mut subscribed = self.subscribed.lock();
        let items = topics
            .iter()
            .map(|topic| {
                if !subscribed.contains(topic) {
                    subscribed.push(topic.clone());
                }
                let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
                (topic.clone(), MonitoredItem::native(handle))
            })
            .collect();
        Ok(items)
    }

    async fn unsubscribe_items(&self, topics: &[Topic], _items: &[MonitoredItem]) -> DriverResult<()> {
        self.subscribed.lock().retain(|t| !topics.contains(t));
        Ok(())
    }

    async fn publish_topic(&self, topic: &Topic, data: PublishData) -> DriverResult<()> {
        let ctx = self
            .ctx
            .lock()
            .clone()
            .ok_or_else(|| DriverError::publish_failed(&topic.topic_name, "not connected"))?;

        let value = match data {
            PublishData::Value(value) => value,
            PublishData::Bytes(bytes) => TopicValue::plain(String::from_utf8_lossy(&bytes).into_owned()),
        }
        .with_source_time(Utc::now(), 0)
        .with_server_time(Utc::now(), 0);

        let key = item_key(topic);
        self.last_values.lock().insert(key.clone(), value.clone());

        let targets: Vec<Topic> = self
            .subscribed
            .lock()
            .iter()
            .filter(|t| item_key(t) == key)
            .cloned()
            .collect();
        for target in &targets {
            ctx.publish_value(target, value.clone());
        }
        tracing::trace!(topic = %topic.topic_name, receivers = targets.len(), "Loopback echo");
        Ok(())
    }

    async fn server_info(&self, _request: JsonValue) -> DriverResult<JsonValue> {
        Ok(json!({
            "Adapter": LOOPBACK_ADAPTER,
            "SystemType": self.system_type.as_str(),
            "Connected": self.ctx.lock().is_some(),
            "Subscriptions": self.subscribed.lock().len(),
        }))
    }

    async fn read(&self, request: JsonValue) -> DriverResult<JsonValue> {
        let address = request
            .get("Topic")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| DriverError::invalid_request("Read needs a Topic address"))?;
        let topic = parse_topic(address);
        if !topic.is_valid() {
            return Err(DriverError::invalid_topic(address));
        }
        let value = self.last_values.lock().get(&item_key(&topic)).cloned();
        Ok(value.map(|v| v.to_json()).unwrap_or(JsonValue::Null))
    }
}

impl std::fmt::Debug for LoopbackAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackAdapter")
            .field("system_type", &self.system_type)
            .field("subscriptions", &self.subscribed.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_system_type_option() {
        let factory = LoopbackFactory;
        let adapter = factory.create("S7", &json!({"system_type": "Plc"})).unwrap();
        assert_eq!(adapter.system_type(), SystemType::Plc);

        let adapter = factory.create("Line1", &JsonValue::Null).unwrap();
        assert_eq!(adapter.system_type(), SystemType::Opc);

        assert!(factory.create("X", &json!({"system_type": "Bogus"})).is_err());
    }

    #[tokio::test]
    async fn test_subscribe_returns_one_item_per_topic() {
        let adapter = LoopbackAdapter::new(SystemType::Opc);
        let topics = vec![
            parse_topic("Opc/Line1/Node/ns=2;s=A"),
            parse_topic("Opc/Line1/Node/ns=2;s=B"),
        ];
        let items = adapter.subscribe_topics(&topics).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_ne!(items[0].1, items[1].1);

        adapter.unsubscribe_items(&topics[..1], &[items[0].1.clone()]).await.unwrap();
        assert_eq!(adapter.subscribed_topics(), vec![topics[1].clone()]);
    }

    #[tokio::test]
    async fn test_publish_requires_connection() {
        let adapter = LoopbackAdapter::new(SystemType::Opc);
        let topic = parse_topic("Opc/Line1/Node/ns=2;s=A");
        assert!(adapter
            .publish_topic(&topic, PublishData::Value(TopicValue::plain(1i64)))
            .await
            .is_err());
    }
}
