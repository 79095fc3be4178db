// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Reference-counted subscription bookkeeping.
//!
//! Each driver owns one [`Registry`]. It separates logical interest (which
//! clients want a topic) from physical subscriptions (which monitored items
//! the protocol adapter created for it), so the adapter is asked to
//! subscribe exactly once per topic no matter how many clients share it.
//!
//! # Examples
//!
//! ```
//! use fgate_core::registry::{MonitoredItem, Registry};
//! use fgate_core::topic::parse_topic;
//!
//! let registry = Registry::new();
//! let topic = parse_topic("Plc/S7/Node/DB1.W1");
//!
//! assert_eq!(registry.add_client("c1", &topic), (1, true));
//! assert_eq!(registry.add_client("c2", &topic), (2, true));
//! registry.add_monitored_item(MonitoredItem::native(7), &topic);
//!
//! assert_eq!(registry.del_client("c1", &topic), (1, true));
//! assert_eq!(registry.del_client("c2", &topic), (0, true));
//! assert_eq!(registry.del_topic(&topic), vec![MonitoredItem::native(7)]);
//! ```

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::Mutex;

use crate::topic::Topic;

// =============================================================================
// MonitoredItem
// =============================================================================

/// A protocol adapter's handle for one live physical subscription.
///
/// The registry never interprets these; it only hands them back to the
/// adapter when the last client leaves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MonitoredItem {
    /// Sampled by the adapter's own polling loop.
    Polled {
        /// Adapter-local item id.
        item_id: String,
        /// Sampling interval.
        interval: Duration,
    },
    /// Delivered by server-side change notifications.
    Event {
        /// Protocol subscription the item belongs to.
        subscription_id: u32,
        /// Server-assigned monitored item id.
        item_id: u32,
    },
    /// Opaque handle owned by a protocol SDK.
    Native {
        /// Handle value.
        handle: u64,
    },
}

impl MonitoredItem {
    /// Creates a polled item.
    pub fn polled(item_id: impl Into<String>, interval: Duration) -> Self {
        Self::Polled {
            item_id: item_id.into(),
            interval,
        }
    }

    /// Creates an event item.
    pub fn event(subscription_id: u32, item_id: u32) -> Self {
        Self::Event {
            subscription_id,
            item_id,
        }
    }

    /// Creates a native handle item.
    pub fn native(handle: u64) -> Self {
        Self::Native { handle }
    }
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Debug, Default)]
struct RegistryState {
    topics: HashSet<Topic>,
    wanted: HashMap<String, Topic>,
    topic_clients: HashMap<String, HashSet<String>>,
    topic_monitored_items: HashMap<String, Vec<MonitoredItem>>,
}

/// Per-driver subscription ledger.
///
/// All operations take one internal lock, so the registry can be shared by
/// concurrently running bus handlers.
#[derive(Debug, Default)]
pub struct Registry {
    state: Mutex<RegistryState>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `client_id` for `topic`.
    ///
    /// Returns the resulting number of clients and whether the client was
    /// newly added.
    pub fn add_client(&self, client_id: &str, topic: &Topic) -> (usize, bool) {
        let mut state = self.state.lock();
        let clients = state
            .topic_clients
            .entry(topic.topic_name.clone())
            .or_default();
        let added = clients.insert(client_id.to_string());
        let count = clients.len();
        state
            .wanted
            .entry(topic.topic_name.clone())
            .or_insert_with(|| topic.clone());
        (count, added)
    }

    /// Removes `client_id` from `topic`.
    ///
    /// Returns the remaining number of clients and whether the client was
    /// present. The topic's entry is dropped once no client is left.
    pub fn del_client(&self, client_id: &str, topic: &Topic) -> (usize, bool) {
        let mut state = self.state.lock();
        let Some(clients) = state.topic_clients.get_mut(&topic.topic_name) else {
            return (0, false);
        };
        let removed = clients.remove(client_id);
        let count = clients.len();
        if count == 0 {
            state.topic_clients.remove(&topic.topic_name);
            state.wanted.remove(&topic.topic_name);
        }
        (count, removed)
    }

    /// Number of clients currently registered for `topic`.
    pub fn client_count(&self, topic: &Topic) -> usize {
        self.state
            .lock()
            .topic_clients
            .get(&topic.topic_name)
            .map_or(0, HashSet::len)
    }

    /// Records that `item` delivers values for `topic` and marks the topic active.
    pub fn add_monitored_item(&self, item: MonitoredItem, topic: &Topic) {
        let mut state = self.state.lock();
        state
            .topic_monitored_items
            .entry(topic.topic_name.clone())
            .or_default()
            .push(item);
        state.topics.insert(topic.clone());
    }

    /// Deactivates `topic` and returns its monitored items.
    pub fn del_topic(&self, topic: &Topic) -> Vec<MonitoredItem> {
        let mut state = self.state.lock();
        state.topics.remove(topic);
        state
            .topic_monitored_items
            .remove(&topic.topic_name)
            .unwrap_or_default()
    }

    /// Snapshot of the active topics.
    pub fn get_topics(&self) -> Vec<Topic> {
        self.state.lock().topics.iter().cloned().collect()
    }

    /// Whether `topic` has a physical subscription.
    pub fn is_active(&self, topic: &Topic) -> bool {
        self.state.lock().topics.contains(topic)
    }

    /// Snapshot of every topic with at least one client, active or not.
    pub fn client_topics(&self) -> Vec<Topic> {
        self.state.lock().wanted.values().cloned().collect()
    }

    /// Topics with clients but no physical subscription.
    pub fn pending_topics(&self) -> Vec<Topic> {
        let state = self.state.lock();
        state
            .wanted
            .values()
            .filter(|topic| !state.topics.contains(*topic))
            .cloned()
            .collect()
    }

    /// Snapshot of the monitored items of `topic`.
    pub fn monitored_items(&self, topic: &Topic) -> Vec<MonitoredItem> {
        self.state
            .lock()
            .topic_monitored_items
            .get(&topic.topic_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of topics with at least one client.
    pub fn subscribed_topic_count(&self) -> usize {
        self.state.lock().topic_clients.len()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::parse_topic;
    use std::sync::Arc;

    #[test]
    fn test_add_client_counts() {
        let registry = Registry::new();
        let topic = parse_topic("Opc/A/Node/1/x");

        assert_eq!(registry.add_client("c1", &topic), (1, true));
        assert_eq!(registry.add_client("c1", &topic), (1, false));
        assert_eq!(registry.add_client("c2", &topic), (2, true));
        assert_eq!(registry.client_count(&topic), 2);
    }

    #[test]
    fn test_del_client_removes_empty_entry() {
        let registry = Registry::new();
        let topic = parse_topic("Opc/A/Node/1/x");

        assert_eq!(registry.del_client("c1", &topic), (0, false));
        registry.add_client("c1", &topic);
        assert_eq!(registry.del_client("c2", &topic), (1, false));
        assert_eq!(registry.del_client("c1", &topic), (0, true));
        assert_eq!(registry.subscribed_topic_count(), 0);
        assert_eq!(registry.del_client("c1", &topic), (0, false));
    }

    #[test]
    fn test_monitored_items_lifecycle() {
        let registry = Registry::new();
        let topic = parse_topic("Mqtt/home/Path/a/#");
        let other = parse_topic("Mqtt/home/Path/b/#");

        registry.add_monitored_item(MonitoredItem::polled("a", Duration::from_secs(1)), &topic);
        registry.add_monitored_item(MonitoredItem::event(1, 2), &topic);
        registry.add_monitored_item(MonitoredItem::native(3), &other);
        assert_eq!(registry.get_topics().len(), 2);
        assert_eq!(registry.monitored_items(&topic).len(), 2);

        let items = registry.del_topic(&topic);
        assert_eq!(
            items,
            vec![MonitoredItem::polled("a", Duration::from_secs(1)), MonitoredItem::event(1, 2)]
        );
        assert_eq!(registry.get_topics(), vec![other]);
        assert!(registry.del_topic(&topic).is_empty());
    }

    #[test]
    fn test_pending_topics_keep_clients() {
        let registry = Registry::new();
        let active = parse_topic("Opc/A/Node/1/x");
        let pending = parse_topic("Opc/A/Node/1/y");

        registry.add_client("c1", &active);
        registry.add_client("c1", &pending);
        registry.add_monitored_item(MonitoredItem::native(1), &active);

        assert!(registry.is_active(&active));
        assert!(!registry.is_active(&pending));
        assert_eq!(registry.pending_topics(), vec![pending.clone()]);
        assert_eq!(registry.client_topics().len(), 2);

        registry.del_client("c1", &pending);
        assert!(registry.pending_topics().is_empty());
        assert_eq!(registry.client_topics(), vec![active]);
    }

    #[test]
    fn test_concurrent_clients() {
        let registry = Arc::new(Registry::new());
        let topic = parse_topic("Plc/S7/Node/DB1");

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                let topic = topic.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        registry.add_client(&format!("{}-{}", t, i), &topic);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.client_count(&topic), 800);
    }
}
