// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! A protocol adapter and a logger sink that record every interaction and
//! fail on demand.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use fgate_buffer::LoggerSink;
use fgate_core::driver::{DriverContext, ProtocolAdapter, PublishData};
use fgate_core::error::{DriverError, DriverResult, SinkError, SinkResult};
use fgate_core::registry::MonitoredItem;
use fgate_core::topic::{SystemType, Topic};
use fgate_core::types::{DataPoint, TopicValue};

// =============================================================================
// MockAdapter
// =============================================================================

/// Protocol adapter that records calls and emits values on request.
#[derive(Debug)]
pub struct MockAdapter {
    system_type: SystemType,
    ctx: Mutex<Option<DriverContext>>,
    subscribe_calls: Mutex<Vec<Vec<Topic>>>,
    unsubscribe_calls: Mutex<Vec<(Vec<Topic>, Vec<MonitoredItem>)>>,
    published: Mutex<Vec<(Topic, PublishData)>>,
    connect_count: AtomicUsize,
    disconnect_count: AtomicUsize,
    fail_connects: AtomicUsize,
    fail_subscribe: AtomicBool,
    fail_subscribes: AtomicUsize,
    subscribe_delay: Mutex<Duration>,
    withheld: Mutex<Vec<String>>,
    return_no_items: AtomicBool,
    next_handle: AtomicU64,
}

impl MockAdapter {
    /// Creates an adapter that succeeds at everything.
    pub fn new(system_type: SystemType) -> Self {
        Self {
            system_type,
            ctx: Mutex::new(None),
            subscribe_calls: Mutex::new(Vec::new()),
            unsubscribe_calls: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            connect_count: AtomicUsize::new(0),
            disconnect_count: AtomicUsize::new(0),
            fail_connects: AtomicUsize::new(0),
            fail_subscribe: AtomicBool::new(false),
            fail_subscribes: AtomicUsize::new(0),
            subscribe_delay: Mutex::new(Duration::ZERO),
            withheld: Mutex::new(Vec::new()),
            return_no_items: AtomicBool::new(false),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Fails the next `n` connect attempts.
    pub fn fail_next_connects(&self, n: usize) {
        self.fail_connects.store(n, Ordering::SeqCst);
    }

    /// Makes `subscribe_topics` fail.
    pub fn set_fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Fails the next `n` calls to `subscribe_topics`.
    pub fn fail_next_subscribes(&self, n: usize) {
        self.fail_subscribes.store(n, Ordering::SeqCst);
    }

    /// Delays every `subscribe_topics` call before it answers.
    pub fn set_subscribe_delay(&self, delay: Duration) {
        *self.subscribe_delay.lock() = delay;
    }

    /// Creates no item for `topic` until [`MockAdapter::release_items`].
    pub fn withhold_items(&self, topic: &Topic) {
        self.withheld.lock().push(topic.topic_name.clone());
    }

    /// Creates items for every topic again.
    pub fn release_items(&self) {
        self.withheld.lock().clear();
    }

    /// Makes `subscribe_topics` succeed without creating items.
    pub fn set_return_no_items(&self, empty: bool) {
        self.return_no_items.store(empty, Ordering::SeqCst);
    }

    /// Delivers `value` on `topic` through the driver context.
    ///
    /// Returns the number of bus receivers, or `None` while disconnected.
    pub fn emit(&self, topic: &Topic, value: TopicValue) -> Option<usize> {
        self.ctx.lock().as_ref().map(|ctx| ctx.publish_value(topic, value))
    }

    /// Reports a dropped session to the driver.
    pub fn drop_connection(&self, reason: &str) {
        if let Some(ctx) = self.ctx.lock().as_ref() {
            ctx.connection_lost(reason);
        }
    }

    /// Whether a session is open.
    pub fn is_connected(&self) -> bool {
        self.ctx.lock().is_some()
    }

    /// Topic lists passed to `subscribe_topics`, in call order.
    pub fn subscribe_calls(&self) -> Vec<Vec<Topic>> {
        self.subscribe_calls.lock().clone()
    }

    /// Arguments passed to `unsubscribe_items`, in call order.
    pub fn unsubscribe_calls(&self) -> Vec<(Vec<Topic>, Vec<MonitoredItem>)> {
        self.unsubscribe_calls.lock().clone()
    }

    /// Writes received through `publish_topic`.
    pub fn published(&self) -> Vec<(Topic, PublishData)> {
        self.published.lock().clone()
    }

    /// Successful and failed connect attempts.
    pub fn connect_count(&self) -> usize {
        self.connect_count.load(Ordering::SeqCst)
    }

    /// Disconnect calls.
    pub fn disconnect_count(&self) -> usize {
        self.disconnect_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProtocolAdapter for MockAdapter {
    fn system_type(&self) -> SystemType {
        self.system_type
    }

    async fn connect(&self, ctx: DriverContext) -> DriverResult<()> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_connects.store(remaining - 1, Ordering::SeqCst);
            return Err(DriverError::connection_failed("mock refused"));
        }
        *self.ctx.lock() = Some(ctx);
        Ok(())
    }

    async fn disconnect(&self) -> DriverResult<()> {
        self.disconnect_count.fetch_add(1, Ordering::SeqCst);
        self.ctx.lock().take();
        Ok(())
    }

    async fn subscribe_topics(&self, topics: &[Topic]) -> DriverResult<Vec<(Topic, MonitoredItem)>> {
        self.subscribe_calls.lock().push(topics.to_vec());
        let delay = *self.subscribe_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let fail_once = self
            .fail_subscribes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail_once || self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(DriverError::subscription_failed(
                topics.first().map(|t| t.topic_name.as_str()).unwrap_or_default(),
                "mock rejected",
            ));
        }
        if self.return_no_items.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        let withheld = self.withheld.lock().clone();
        Ok(topics
            .iter()
            .filter(|t| !withheld.contains(&t.topic_name))
            .map(|t| {
                let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
                (t.clone(), MonitoredItem::native(handle))
            })
            .collect())
    }

    async fn unsubscribe_items(&self, topics: &[Topic], items: &[MonitoredItem]) -> DriverResult<()> {
        self.unsubscribe_calls
            .lock()
            .push((topics.to_vec(), items.to_vec()));
        Ok(())
    }

    async fn publish_topic(&self, topic: &Topic, data: PublishData) -> DriverResult<()> {
        self.published.lock().push((topic.clone(), data));
        Ok(())
    }
}

// =============================================================================
// MockSink
// =============================================================================

/// Logger sink that records batches and fails on demand.
#[derive(Debug, Default)]
pub struct MockSink {
    batches: Mutex<Vec<Vec<DataPoint>>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
    fail_writes: AtomicUsize,
    fail_opens: AtomicUsize,
}

impl MockSink {
    /// Creates a sink that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `n` batch writes.
    pub fn fail_next_writes(&self, n: usize) {
        self.fail_writes.store(n, Ordering::SeqCst);
    }

    /// Fails the next `n` opens.
    pub fn fail_next_opens(&self, n: usize) {
        self.fail_opens.store(n, Ordering::SeqCst);
    }

    /// Batches written successfully, in order.
    pub fn batches(&self) -> Vec<Vec<DataPoint>> {
        self.batches.lock().clone()
    }

    /// All points written successfully, in order.
    pub fn points(&self) -> Vec<DataPoint> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    /// Successful opens.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Close calls.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl LoggerSink for MockSink {
    fn name(&self) -> &str {
        "mock"
    }

    async fn open(&self) -> SinkResult<()> {
        if Self::take_failure(&self.fail_opens) {
            return Err(SinkError::unavailable("mock", "open refused"));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> SinkResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn write_batch(&self, points: &[DataPoint]) -> SinkResult<()> {
        if Self::take_failure(&self.fail_writes) {
            return Err(SinkError::write_failed("mock", "write refused"));
        }
        self.batches.lock().push(points.to_vec());
        Ok(())
    }
}
