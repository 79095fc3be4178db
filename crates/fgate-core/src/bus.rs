// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-process message bus.
//!
//! The bus offers two interaction styles addressed by plain strings:
//!
//! - **Request/reply**: one handler per address (e.g. `Opc/demo/Subscribe`)
//!   receives JSON bodies and answers each with a JSON reply. Every request
//!   runs in its own task, so a slow or panicking handler never blocks the
//!   dispatch loop; a panic is answered with `{"Ok": false}`.
//! - **Publish/subscribe**: values are fanned out to every subscriber of a
//!   topic address via `tokio::sync::broadcast`.
//!
//! # Architecture
//!
//! ```text
//!  request(addr, body) ──► mpsc ──► dispatch loop ──► spawn(handler(body))
//!          ▲                                              │
//!          └──────────────── oneshot reply ◄──────────────┘
//!
//!  publish(topic, payload) ──► broadcast ──► subscriber 1..N
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use fgate_core::bus::MessageBus;
//! use serde_json::json;
//!
//! let bus = MessageBus::new(1024);
//! let _registration = bus.register_handler("Echo", |body| async move { body })?;
//! let reply = bus.request("Echo", json!({"a": 1})).await?;
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{BusError, BusResult};
use crate::message::{BusPayload, BusReply};

/// Default time a requester waits for a reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Bus Statistics
// =============================================================================

/// Statistics for a message bus.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BusStats {
    /// Requests sent.
    pub requests: u64,
    /// Requests whose handler panicked or failed to reply.
    pub failed_requests: u64,
    /// Values published.
    pub messages_published: u64,
    /// Values dropped because a subscriber lagged.
    pub messages_dropped: u64,
}

#[derive(Debug, Default)]
struct AtomicBusStats {
    requests: AtomicU64,
    failed_requests: AtomicU64,
    messages_published: AtomicU64,
    messages_dropped: AtomicU64,
}

// =============================================================================
// MessageBus
// =============================================================================

struct Request {
    body: JsonValue,
    reply_tx: oneshot::Sender<JsonValue>,
}

struct BusInner {
    handlers: DashMap<String, mpsc::Sender<Request>>,
    topics: DashMap<String, broadcast::Sender<BusPayload>>,
    capacity: usize,
    request_timeout: Duration,
    stats: AtomicBusStats,
}

impl BusInner {
    /// Drops the channel of `topic` once nobody listens.
    fn prune(&self, topic: &str) {
        self.topics.remove_if(topic, |_, sender| sender.receiver_count() == 0);
    }
}

/// Cloneable handle to the in-process message bus.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    /// Creates a bus whose channels buffer up to `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self::with_timeout(capacity, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a bus with a custom request timeout.
    pub fn with_timeout(capacity: usize, request_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(BusInner {
                handlers: DashMap::new(),
                topics: DashMap::new(),
                capacity: capacity.max(1),
                request_timeout,
                stats: AtomicBusStats::default(),
            }),
        }
    }

    // =========================================================================
    // Request / Reply
    // =========================================================================

    /// Registers `handler` for requests sent to `address`.
    ///
    /// The handler runs in a fresh task per request. The registration is
    /// removed when the returned [`HandlerRegistration`] is dropped or
    /// unregistered.
    pub fn register_handler<F, Fut>(&self, address: impl Into<String>, handler: F) -> BusResult<HandlerRegistration>
    where
        F: Fn(JsonValue) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JsonValue> + Send + 'static,
    {
        let address = address.into();
        let (tx, mut rx) = mpsc::channel::<Request>(self.inner.capacity);

        match self.inner.handlers.entry(address.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(BusError::AlreadyRegistered { address });
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(tx);
            }
        }

        let handler = Arc::new(handler);
        let inner = self.inner.clone();
        let loop_address = address.clone();
        let task = tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let handler = handler.clone();
                let inner = inner.clone();
                let address = loop_address.clone();
                tokio::spawn(async move {
                    let work = tokio::spawn(handler(request.body));
                    let reply = match work.await {
                        Ok(reply) => reply,
                        Err(e) => {
                            inner.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
                            tracing::error!(%address, error = %e, "Request handler failed");
                            BusReply::failure(format!("handler failed: {}", e)).to_json()
                        }
                    };
                    let _ = request.reply_tx.send(reply);
                });
            }
        });

        tracing::debug!(%address, "Registered bus handler");
        Ok(HandlerRegistration {
            address,
            bus: self.clone(),
            task: Some(task),
        })
    }

    /// Sends `body` to the handler at `address` and waits for its reply.
    pub async fn request(&self, address: &str, body: JsonValue) -> BusResult<JsonValue> {
        self.request_with_timeout(address, body, self.inner.request_timeout).await
    }

    /// Like [`MessageBus::request`] with an explicit timeout.
    pub async fn request_with_timeout(
        &self,
        address: &str,
        body: JsonValue,
        timeout: Duration,
    ) -> BusResult<JsonValue> {
        let sender = self
            .inner
            .handlers
            .get(address)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BusError::no_handler(address))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner.stats.requests.fetch_add(1, Ordering::Relaxed);
        sender
            .send(Request { body, reply_tx })
            .await
            .map_err(|_| BusError::Closed)?;

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(BusError::ReplyClosed),
            Err(_) => Err(BusError::Timeout { duration: timeout }),
        }
    }

    /// Sends a request and decodes the standard `{Ok, Error, Result}` reply.
    pub async fn request_reply(&self, address: &str, body: JsonValue) -> BusResult<BusReply> {
        BusReply::from_json(self.request(address, body).await?)
    }

    /// Returns `true` if a handler is registered at `address`.
    pub fn has_handler(&self, address: &str) -> bool {
        self.inner.handlers.contains_key(address)
    }

    // =========================================================================
    // Publish / Subscribe
    // =========================================================================

    /// Publishes `payload` to every subscriber of `topic`.
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, topic: &str, payload: BusPayload) -> usize {
        self.inner.stats.messages_published.fetch_add(1, Ordering::Relaxed);
        let delivered = match self.inner.topics.get(topic) {
            Some(sender) => sender.send(payload).ok(),
            None => return 0,
        };
        delivered.unwrap_or_else(|| {
            self.inner.prune(topic);
            0
        })
    }

    /// Subscribes to values published on `topic`.
    pub fn subscribe(&self, topic: &str) -> TopicSubscriber {
        let receiver = self
            .inner
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .subscribe();
        TopicSubscriber {
            topic: topic.to_string(),
            receiver,
            inner: self.inner.clone(),
        }
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .topics
            .get(topic)
            .map_or(0, |sender| sender.receiver_count())
    }

    /// Returns current statistics.
    pub fn stats(&self) -> BusStats {
        let s = &self.inner.stats;
        BusStats {
            requests: s.requests.load(Ordering::Relaxed),
            failed_requests: s.failed_requests.load(Ordering::Relaxed),
            messages_published: s.messages_published.load(Ordering::Relaxed),
            messages_dropped: s.messages_dropped.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("capacity", &self.inner.capacity)
            .field("handlers", &self.inner.handlers.len())
            .field("topics", &self.inner.topics.len())
            .finish()
    }
}

// =============================================================================
// HandlerRegistration
// =============================================================================

/// Keeps a request handler registered; dropping it unregisters.
pub struct HandlerRegistration {
    address: String,
    bus: MessageBus,
    task: Option<JoinHandle<()>>,
}

impl HandlerRegistration {
    /// The address this handler serves.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Removes the handler from the bus.
    pub fn unregister(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(task) = self.task.take() {
            self.bus.inner.handlers.remove(&self.address);
            task.abort();
            tracing::debug!(address = %self.address, "Unregistered bus handler");
        }
    }
}

impl Drop for HandlerRegistration {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("address", &self.address)
            .finish()
    }
}

// =============================================================================
// TopicSubscriber
// =============================================================================

/// Receives values published on one topic address.
pub struct TopicSubscriber {
    topic: String,
    receiver: broadcast::Receiver<BusPayload>,
    inner: Arc<BusInner>,
}

impl TopicSubscriber {
    /// The subscribed topic address.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Receives the next payload, skipping over lag.
    pub async fn recv(&mut self) -> BusResult<BusPayload> {
        loop {
            match self.receiver.recv().await {
                Ok(payload) => return Ok(payload),
                Err(broadcast::error::RecvError::Closed) => return Err(BusError::Closed),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    self.inner.stats.messages_dropped.fetch_add(count, Ordering::Relaxed);
                    tracing::warn!(topic = %self.topic, count, "Subscriber lagged, values dropped");
                }
            }
        }
    }

    /// Receives a payload if one is ready.
    pub fn try_recv(&mut self) -> BusResult<Option<BusPayload>> {
        match self.receiver.try_recv() {
            Ok(payload) => Ok(Some(payload)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(BusError::Closed),
            Err(broadcast::error::TryRecvError::Lagged(count)) => {
                self.inner.stats.messages_dropped.fetch_add(count, Ordering::Relaxed);
                Ok(None)
            }
        }
    }
}

impl Drop for TopicSubscriber {
    fn drop(&mut self) {
        // Release our receiver first so the count below excludes it.
        drop(std::mem::replace(&mut self.receiver, broadcast::channel(1).1));
        self.inner.prune(&self.topic);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_request_reply() {
        let bus = MessageBus::new(16);
        let _reg = bus
            .register_handler("Echo", |body| async move { json!({"Ok": true, "Result": body}) })
            .unwrap();

        let reply = bus.request_reply("Echo", json!({"x": 1})).await.unwrap();
        assert!(reply.ok);
        assert_eq!(reply.result, Some(json!({"x": 1})));
        assert_eq!(bus.stats().requests, 1);
    }

    #[tokio::test]
    async fn test_request_without_handler() {
        let bus = MessageBus::new(16);
        let err = bus.request("Nobody", json!({})).await.unwrap_err();
        assert!(matches!(err, BusError::NoHandler { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let bus = MessageBus::new(16);
        let _reg = bus.register_handler("A", |b| async move { b }).unwrap();
        assert!(matches!(
            bus.register_handler("A", |b| async move { b }),
            Err(BusError::AlreadyRegistered { .. })
        ));
    }

    #[tokio::test]
    async fn test_unregister_on_drop() {
        let bus = MessageBus::new(16);
        let reg = bus.register_handler("A", |b| async move { b }).unwrap();
        assert!(bus.has_handler("A"));
        drop(reg);
        assert!(!bus.has_handler("A"));
        let reg = bus.register_handler("A", |b| async move { b }).unwrap();
        assert_eq!(reg.address(), "A");
        reg.unregister();
        assert!(!bus.has_handler("A"));
    }

    #[tokio::test]
    async fn test_panicking_handler_replies_failure() {
        let bus = MessageBus::new(16);
        let _reg = bus
            .register_handler("Boom", |body: JsonValue| async move {
                if body["panic"].as_bool().unwrap_or(false) {
                    panic!("handler exploded");
                }
                BusReply::success().to_json()
            })
            .unwrap();

        let reply = bus.request_reply("Boom", json!({"panic": true})).await.unwrap();
        assert!(!reply.ok);
        assert!(reply.error.is_some());

        // The dispatch loop survives the panic.
        let reply = bus.request_reply("Boom", json!({"panic": false})).await.unwrap();
        assert!(reply.ok);
        assert_eq!(bus.stats().failed_requests, 1);
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let bus = MessageBus::with_timeout(16, Duration::from_millis(20));
        let _reg = bus
            .register_handler("Slow", |b| async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                b
            })
            .unwrap();
        let err = bus.request("Slow", json!({})).await.unwrap_err();
        assert!(matches!(err, BusError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_publish_fan_out() {
        let bus = MessageBus::new(16);
        assert_eq!(bus.publish("t", BusPayload::Bytes(vec![1])), 0);

        let mut s1 = bus.subscribe("t");
        let mut s2 = bus.subscribe("t");
        let mut other = bus.subscribe("u");
        assert_eq!(bus.subscriber_count("t"), 2);

        assert_eq!(bus.publish("t", BusPayload::Bytes(vec![7])), 2);
        assert_eq!(s1.recv().await.unwrap(), BusPayload::Bytes(vec![7]));
        assert_eq!(s2.recv().await.unwrap(), BusPayload::Bytes(vec![7]));
        assert_eq!(other.try_recv().unwrap(), None);
        assert_eq!(s1.topic(), "t");
    }

    #[tokio::test]
    async fn test_idle_topics_are_released() {
        let bus = MessageBus::new(16);
        let s1 = bus.subscribe("t");
        let s2 = bus.subscribe("t");
        let churn: Vec<_> = (0..100).map(|i| bus.subscribe(&format!("tmp/{}", i))).collect();
        assert_eq!(bus.inner.topics.len(), 101);

        drop(churn);
        assert_eq!(bus.inner.topics.len(), 1);

        drop(s1);
        assert_eq!(bus.subscriber_count("t"), 1);
        drop(s2);
        assert!(bus.inner.topics.is_empty());

        // A channel left behind without receivers goes on the next publish.
        let (sender, receiver) = broadcast::channel(1);
        drop(receiver);
        bus.inner.topics.insert("stale".to_string(), sender);
        assert_eq!(bus.publish("stale", BusPayload::Bytes(vec![1])), 0);
        assert!(bus.inner.topics.is_empty());
    }
}
