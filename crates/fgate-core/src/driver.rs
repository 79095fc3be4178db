// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Protocol driver state machine.
//!
//! A [`Driver`] wraps one [`ProtocolAdapter`] and owns everything that is
//! common to all protocols: the connection lifecycle, the subscription
//! [`Registry`], the bus request handlers and the service advertisement.
//! Adapters only speak their protocol.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected ──start──► Connecting ──ok──► Connected ──shutdown──► Disconnecting ──► Disconnected
//!                            ▲   │                │
//!                            │   └─err: wait──────┤
//!                            └────── lost ────────┘
//! ```
//!
//! Connection failures and lost connections are retried forever with a
//! fixed delay until [`Driver::shutdown`] is called.
//!
//! # Bus surface
//!
//! After the first successful connect the driver serves
//! `<SystemType>/<id>/{ServerInfo,Subscribe,Unsubscribe,Publish,Read,Write,Browse,Schema}`.
//! Every handler answers with a [`BusReply`]; adapter errors become
//! `{"Ok": false, "Error": ...}` replies.
//!
//! # Example
//!
//! ```rust,ignore
//! use fgate_core::driver::{Driver, DriverConfig};
//!
//! let driver = Driver::new(DriverConfig::new("line1"), adapter, bus, directory);
//! driver.start();
//! driver.wait_for(DriverState::Connected).await;
//! driver.shutdown().await;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::bus::{HandlerRegistration, MessageBus};
use crate::error::{DriverError, DriverResult};
use crate::message::{BusPayload, BusReply, PublishRequest, SubscribeRequest, UnsubscribeRequest};
use crate::registry::{MonitoredItem, Registry};
use crate::service::{ServiceDirectory, ServiceRecord};
use crate::topic::{parse_topic, SystemType, Topic};
use crate::types::{DataPoint, TopicValue};

/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Request handlers every driver serves, relative to its endpoint.
pub const HANDLER_NAMES: [&str; 8] = [
    "ServerInfo",
    "Subscribe",
    "Unsubscribe",
    "Publish",
    "Read",
    "Write",
    "Browse",
    "Schema",
];

// =============================================================================
// ProtocolAdapter Trait
// =============================================================================

/// Data handed to [`ProtocolAdapter::publish_topic`].
#[derive(Debug, Clone, PartialEq)]
pub enum PublishData {
    /// A decoded value.
    Value(TopicValue),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

/// Capability interface implemented once per protocol.
///
/// Adapters are shared between the supervisor and concurrently running
/// bus handlers, so every method takes `&self`.
///
/// # Subscriptions
///
/// [`subscribe_topics`](ProtocolAdapter::subscribe_topics) returns the
/// monitored items it created, at least one per topic; the driver records
/// them and hands them back to
/// [`unsubscribe_items`](ProtocolAdapter::unsubscribe_items) once the last
/// client of a topic leaves. Values are delivered through
/// [`DriverContext::publish_value`].
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    /// Protocol family served by this adapter.
    fn system_type(&self) -> SystemType;

    /// Establishes the protocol session.
    ///
    /// `ctx` stays valid for the lifetime of the session; the adapter uses
    /// it to deliver values and to report a lost connection.
    async fn connect(&self, ctx: DriverContext) -> DriverResult<()>;

    /// Closes the protocol session.
    async fn disconnect(&self) -> DriverResult<()>;

    /// Releases everything the adapter holds. Called once, after the final disconnect.
    async fn shutdown(&self) {}

    /// Creates physical subscriptions for `topics`.
    async fn subscribe_topics(&self, topics: &[Topic]) -> DriverResult<Vec<(Topic, MonitoredItem)>>;

    /// Removes the physical subscriptions behind `items`.
    async fn unsubscribe_items(&self, topics: &[Topic], items: &[MonitoredItem]) -> DriverResult<()>;

    /// Writes `data` to `topic`.
    async fn publish_topic(&self, topic: &Topic, data: PublishData) -> DriverResult<()>;

    /// `ServerInfo` request.
    async fn server_info(&self, _request: JsonValue) -> DriverResult<JsonValue> {
        Err(DriverError::not_supported("ServerInfo"))
    }

    /// `Read` request.
    async fn read(&self, _request: JsonValue) -> DriverResult<JsonValue> {
        Err(DriverError::not_supported("Read"))
    }

    /// `Write` request.
    async fn write(&self, _request: JsonValue) -> DriverResult<JsonValue> {
        Err(DriverError::not_supported("Write"))
    }

    /// `Browse` request.
    async fn browse(&self, _request: JsonValue) -> DriverResult<JsonValue> {
        Err(DriverError::not_supported("Browse"))
    }

    /// `Schema` request.
    async fn schema(&self, _request: JsonValue) -> DriverResult<JsonValue> {
        Err(DriverError::not_supported("Schema"))
    }
}

// =============================================================================
// DriverContext
// =============================================================================

/// Session handle given to an adapter on connect.
#[derive(Clone)]
pub struct DriverContext {
    driver_id: String,
    system_type: SystemType,
    bus: MessageBus,
    lost_tx: mpsc::UnboundedSender<String>,
}

impl DriverContext {
    /// Id of the owning driver.
    pub fn driver_id(&self) -> &str {
        &self.driver_id
    }

    /// Protocol family of the owning driver.
    pub fn system_type(&self) -> SystemType {
        self.system_type
    }

    /// Publishes a value on the topic's bus address in the topic's data format.
    ///
    /// Returns the number of bus subscribers that received it.
    pub fn publish_value(&self, topic: &Topic, value: TopicValue) -> usize {
        let payload = BusPayload::encode(&DataPoint::new(topic.clone(), value));
        self.bus.publish(&topic.topic_name, payload)
    }

    /// Reports that the protocol session dropped; the driver reconnects.
    pub fn connection_lost(&self, reason: impl Into<String>) {
        let _ = self.lost_tx.send(reason.into());
    }
}

impl fmt::Debug for DriverContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverContext")
            .field("driver_id", &self.driver_id)
            .field("system_type", &self.system_type)
            .finish()
    }
}

// =============================================================================
// DriverState / DriverConfig
// =============================================================================

/// Connection state of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverState {
    /// Not running or stopped.
    Disconnected,
    /// Connect in progress or waiting to retry.
    Connecting,
    /// Session established.
    Connected,
    /// Shutting down.
    Disconnecting,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DriverState::Disconnected => "Disconnected",
            DriverState::Connecting => "Connecting",
            DriverState::Connected => "Connected",
            DriverState::Disconnecting => "Disconnecting",
        };
        f.write_str(s)
    }
}

/// Driver settings independent of the protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    /// Driver id; the second segment of its bus endpoint.
    pub id: String,
    /// Items subscribed right after the first connect, relative to the
    /// endpoint (e.g. `Node/2/Motor.Speed`).
    pub subscribe_on_startup: Vec<String>,
    /// Delay between reconnect attempts.
    pub reconnect_delay: Duration,
}

impl DriverConfig {
    /// Creates a config with defaults.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subscribe_on_startup: Vec::new(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    /// Sets the startup subscriptions.
    pub fn with_startup_topics(mut self, items: Vec<String>) -> Self {
        self.subscribe_on_startup = items;
        self
    }

    /// Sets the reconnect delay.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

// =============================================================================
// Driver
// =============================================================================

struct DriverShared {
    config: DriverConfig,
    system_type: SystemType,
    endpoint: String,
    adapter: Arc<dyn ProtocolAdapter>,
    registry: Registry,
    // Held across adapter calls so registry counts and physical
    // subscriptions change together.
    subscriptions: tokio::sync::Mutex<()>,
    bus: MessageBus,
    directory: Arc<dyn ServiceDirectory>,
    state_tx: watch::Sender<DriverState>,
    shutdown_tx: watch::Sender<bool>,
    lost_tx: mpsc::UnboundedSender<String>,
    handlers: Mutex<Vec<HandlerRegistration>>,
}

/// One running protocol connection.
///
/// Subscriptions are reference counted per topic. The first client of a
/// topic creates the physical subscription, later clients share it, and
/// the last one to leave releases it. Subscribe, unsubscribe and
/// resubscribe run one at a time, so a client that joins while the first
/// subscribe is in flight sees its outcome. A failed subscribe removes only
/// the requesting client. Topics that still have clients but no monitored
/// items are pending: the next subscriber or the next reconnect retries
/// them.
pub struct Driver {
    shared: Arc<DriverShared>,
    lost_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Driver {
    /// Creates a stopped driver.
    pub fn new(
        config: DriverConfig,
        adapter: Arc<dyn ProtocolAdapter>,
        bus: MessageBus,
        directory: Arc<dyn ServiceDirectory>,
    ) -> Self {
        let system_type = adapter.system_type();
        let endpoint = format!("{}/{}", system_type, config.id);
        let (state_tx, _) = watch::channel(DriverState::Disconnected);
        let (shutdown_tx, _) = watch::channel(false);
        let (lost_tx, lost_rx) = mpsc::unbounded_channel();

        Self {
            shared: Arc::new(DriverShared {
                config,
                system_type,
                endpoint,
                adapter,
                registry: Registry::new(),
                subscriptions: tokio::sync::Mutex::new(()),
                bus,
                directory,
                state_tx,
                shutdown_tx,
                lost_tx,
                handlers: Mutex::new(Vec::new()),
            }),
            lost_rx: Mutex::new(Some(lost_rx)),
            task: Mutex::new(None),
        }
    }

    /// Driver id.
    pub fn id(&self) -> &str {
        &self.shared.config.id
    }

    /// Protocol family.
    pub fn system_type(&self) -> SystemType {
        self.shared.system_type
    }

    /// Bus address prefix, `<SystemType>/<id>`.
    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    /// Current state.
    pub fn state(&self) -> DriverState {
        *self.shared.state_tx.borrow()
    }

    /// Observes state changes.
    pub fn watch_state(&self) -> watch::Receiver<DriverState> {
        self.shared.state_tx.subscribe()
    }

    /// Waits until the driver reaches `state`.
    pub async fn wait_for(&self, state: DriverState) {
        let mut rx = self.watch_state();
        let _ = rx.wait_for(|s| *s == state).await;
    }

    /// The driver's subscription registry.
    pub fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    /// Starts the connection supervisor. Calling it twice has no effect.
    pub fn start(&self) {
        let Some(lost_rx) = self.lost_rx.lock().take() else {
            tracing::debug!(driver = %self.shared.endpoint, "Driver already started");
            return;
        };
        let shared = self.shared.clone();
        let span = tracing::info_span!("driver", id = %shared.endpoint);
        let task = tokio::spawn(supervise(shared, lost_rx).instrument(span));
        *self.task.lock() = Some(task);
    }

    /// Stops the supervisor, unregisters handlers and disconnects.
    pub async fn shutdown(&self) {
        self.shared.shutdown_tx.send_replace(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(driver = %self.shared.endpoint, error = %e, "Driver supervisor failed");
            }
        }
    }

    /// Subscribes `client_id` to `topic`. See [`Driver`] for the rules.
    pub async fn subscribe(&self, client_id: &str, topic: &Topic) -> DriverResult<()> {
        self.shared.subscribe(client_id, topic).await
    }

    /// Unsubscribes `client_id` from `topics`.
    pub async fn unsubscribe(&self, client_id: &str, topics: &[Topic]) -> DriverResult<()> {
        self.shared.unsubscribe(client_id, topics).await
    }

    /// Restores the physical subscriptions of every active topic.
    pub async fn resubscribe(&self) -> DriverResult<()> {
        self.shared.resubscribe().await
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("endpoint", &self.shared.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.shared.shutdown_tx.send_replace(true);
    }
}

// =============================================================================
// Supervisor
// =============================================================================

async fn supervise(shared: Arc<DriverShared>, mut lost_rx: mpsc::UnboundedReceiver<String>) {
    let mut shutdown_rx = shared.shutdown_tx.subscribe();
    let mut first_connect = true;

    'outer: loop {
        if *shutdown_rx.borrow_and_update() {
            break;
        }

        while lost_rx.try_recv().is_ok() {}
        shared.set_state(DriverState::Connecting);

        let result = tokio::select! {
            result = shared.adapter.connect(shared.context()) => result,
            _ = shutdown_rx.changed() => break,
        };

        match result {
            Ok(()) => {
                shared.set_state(DriverState::Connected);
                if first_connect {
                    first_connect = false;
                    if let Err(e) = shared.register_handlers() {
                        tracing::error!(driver = %shared.endpoint, error = %e, "Failed to register bus handlers");
                    }
                    shared.subscribe_on_startup().await;
                } else if let Err(e) = shared.resubscribe().await {
                    tracing::warn!(driver = %shared.endpoint, error = %e, "Resubscribe failed");
                }
                shared
                    .directory
                    .publish(ServiceRecord::driver(&shared.config.id, shared.system_type));
                tracing::info!(driver = %shared.endpoint, "Driver connected");

                tokio::select! {
                    reason = lost_rx.recv() => {
                        let reason = reason.unwrap_or_else(|| "channel closed".to_string());
                        tracing::warn!(driver = %shared.endpoint, %reason, "Connection lost, reconnecting");
                        shared.directory.unpublish(&shared.endpoint);
                        if let Err(e) = shared.adapter.disconnect().await {
                            tracing::debug!(driver = %shared.endpoint, error = %e, "Disconnect after loss failed");
                        }
                    }
                    _ = shutdown_rx.changed() => break 'outer,
                }
            }
            Err(e) => {
                shared.set_state(DriverState::Connecting);
                tracing::warn!(
                    driver = %shared.endpoint,
                    error = %e,
                    retry_in = ?shared.config.reconnect_delay,
                    "Connect failed"
                );
                tokio::select! {
                    _ = tokio::time::sleep(shared.config.reconnect_delay) => {}
                    _ = shutdown_rx.changed() => break 'outer,
                }
            }
        }
    }

    shared.stop().await;
}

impl DriverShared {
    fn set_state(&self, state: DriverState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!(driver = %self.endpoint, from = %previous, to = %state, "Driver state changed");
        }
    }

    fn context(&self) -> DriverContext {
        DriverContext {
            driver_id: self.config.id.clone(),
            system_type: self.system_type,
            bus: self.bus.clone(),
            lost_tx: self.lost_tx.clone(),
        }
    }

    async fn stop(&self) {
        self.set_state(DriverState::Disconnecting);
        let handlers: Vec<_> = self.handlers.lock().drain(..).collect();
        for registration in handlers {
            registration.unregister();
        }
        self.directory.unpublish(&self.endpoint);
        if let Err(e) = self.adapter.disconnect().await {
            tracing::warn!(driver = %self.endpoint, error = %e, "Disconnect failed");
        }
        self.adapter.shutdown().await;
        self.set_state(DriverState::Disconnected);
        tracing::info!(driver = %self.endpoint, "Driver stopped");
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    async fn subscribe(&self, client_id: &str, topic: &Topic) -> DriverResult<()> {
        if !topic.is_valid() {
            return Err(DriverError::invalid_topic(&topic.topic_name));
        }
        let _guard = self.subscriptions.lock().await;

        let (count, added) = self.registry.add_client(client_id, topic);
        if !added {
            tracing::warn!(driver = %self.endpoint, client = client_id, topic = %topic, "Client already subscribed");
            return Ok(());
        }
        if self.registry.is_active(topic) {
            tracing::debug!(driver = %self.endpoint, client = client_id, topic = %topic, count, "Topic already subscribed");
            return Ok(());
        }

        let result = self
            .adapter
            .subscribe_topics(std::slice::from_ref(topic))
            .await
            .and_then(|items| {
                if items.is_empty() {
                    Err(DriverError::subscription_failed(&topic.topic_name, "no monitored items created"))
                } else {
                    Ok(items)
                }
            });

        match result {
            Ok(items) => {
                self.record_items(items);
                tracing::info!(driver = %self.endpoint, client = client_id, topic = %topic, "Subscribed");
                Ok(())
            }
            Err(e) => {
                // Earlier clients of a pending topic stay for the next reconnect.
                self.registry.del_client(client_id, topic);
                tracing::warn!(driver = %self.endpoint, topic = %topic, error = %e, "Subscribe failed");
                Err(e)
            }
        }
    }

    async fn unsubscribe(&self, client_id: &str, topics: &[Topic]) -> DriverResult<()> {
        let _guard = self.subscriptions.lock().await;
        let mut released = Vec::new();
        let mut items = Vec::new();

        for topic in topics {
            let (count, removed) = self.registry.del_client(client_id, topic);
            if !removed {
                tracing::warn!(driver = %self.endpoint, client = client_id, topic = %topic, "Client was not subscribed");
                continue;
            }
            if count == 0 {
                items.extend(self.registry.del_topic(topic));
                released.push(topic.clone());
            }
        }

        if items.is_empty() {
            return Ok(());
        }
        self.adapter.unsubscribe_items(&released, &items).await?;
        tracing::info!(driver = %self.endpoint, topics = released.len(), "Unsubscribed");
        Ok(())
    }

    /// Re-creates physical subscriptions for every topic with clients.
    ///
    /// Items from the previous session are replaced per topic. Topics the
    /// adapter returns nothing for stay pending with their clients and are
    /// retried on the next reconnect.
    async fn resubscribe(&self) -> DriverResult<()> {
        let _guard = self.subscriptions.lock().await;
        let topics = self.registry.client_topics();
        if topics.is_empty() {
            return Ok(());
        }

        let items = match self.adapter.subscribe_topics(&topics).await {
            Ok(items) => items,
            Err(e) => {
                // Items of the lost session are dead either way.
                for topic in &topics {
                    self.registry.del_topic(topic);
                }
                return Err(e);
            }
        };

        let mut returned: HashMap<String, Vec<(Topic, MonitoredItem)>> = HashMap::new();
        for (topic, item) in items {
            returned.entry(topic.topic_name.clone()).or_default().push((topic, item));
        }

        let mut pending = Vec::new();
        for topic in &topics {
            self.registry.del_topic(topic);
            match returned.remove(&topic.topic_name) {
                Some(items) => self.record_items(items),
                None => pending.push(topic.topic_name.as_str()),
            }
        }
        if !pending.is_empty() {
            tracing::warn!(driver = %self.endpoint, topics = ?pending, "No monitored items after reconnect");
        }
        tracing::info!(
            driver = %self.endpoint,
            topics = topics.len() - pending.len(),
            pending = pending.len(),
            "Resubscribed"
        );
        Ok(())
    }

    fn record_items(&self, items: Vec<(Topic, MonitoredItem)>) {
        for (topic, item) in items {
            self.registry.add_monitored_item(item, &topic);
        }
    }

    async fn subscribe_on_startup(&self) {
        for item in &self.config.subscribe_on_startup {
            let topic = parse_topic(&format!("{}/{}", self.endpoint, item));
            if !topic.is_valid() {
                tracing::warn!(driver = %self.endpoint, item = %item, "Invalid startup topic");
                continue;
            }
            if let Err(e) = self.subscribe(&self.config.id, &topic).await {
                tracing::warn!(driver = %self.endpoint, topic = %topic, error = %e, "Startup subscribe failed");
            }
        }
    }

    // =========================================================================
    // Bus handlers
    // =========================================================================

    fn register_handlers(self: &Arc<Self>) -> DriverResult<()> {
        let mut registrations = Vec::with_capacity(HANDLER_NAMES.len());
        for name in HANDLER_NAMES {
            let weak = Arc::downgrade(self);
            let address = format!("{}/{}", self.endpoint, name);
            let registration = self
                .bus
                .register_handler(address, move |body| handle(weak.clone(), name, body))
                .map_err(|e| DriverError::protocol(e.to_string()))?;
            registrations.push(registration);
        }
        self.handlers.lock().extend(registrations);
        Ok(())
    }

    async fn dispatch(&self, name: &str, body: JsonValue) -> DriverResult<Option<JsonValue>> {
        match name {
            "Subscribe" => {
                let request: SubscribeRequest = decode_request(body)?;
                self.subscribe(&request.client_id, &request.topic).await?;
                Ok(None)
            }
            "Unsubscribe" => {
                let request: UnsubscribeRequest = decode_request(body)?;
                self.unsubscribe(&request.client_id, &request.all_topics()).await?;
                Ok(None)
            }
            "Publish" => {
                let request: PublishRequest = decode_request(body)?;
                let data = match (request.value, request.data) {
                    (Some(value), _) => PublishData::Value(value),
                    (None, Some(bytes)) => PublishData::Bytes(bytes),
                    (None, None) => return Err(DriverError::invalid_request("missing Value or Data")),
                };
                self.adapter.publish_topic(&request.topic, data).await?;
                Ok(None)
            }
            "ServerInfo" => self.adapter.server_info(body).await.map(Some),
            "Read" => self.adapter.read(body).await.map(Some),
            "Write" => self.adapter.write(body).await.map(Some),
            "Browse" => self.adapter.browse(body).await.map(Some),
            "Schema" => self.adapter.schema(body).await.map(Some),
            other => Err(DriverError::not_supported(other)),
        }
    }
}

async fn handle(shared: Weak<DriverShared>, name: &'static str, body: JsonValue) -> JsonValue {
    let Some(shared) = shared.upgrade() else {
        return BusReply::failure("driver stopped").to_json();
    };
    let reply = match shared.dispatch(name, body).await {
        Ok(Some(result)) => BusReply::with_result(result),
        Ok(None) => BusReply::success(),
        Err(e) => {
            tracing::debug!(driver = %shared.endpoint, handler = name, error = %e, "Request failed");
            BusReply::failure(e.to_string())
        }
    };
    reply.to_json()
}

fn decode_request<T: serde::de::DeserializeOwned>(body: JsonValue) -> DriverResult<T> {
    serde_json::from_value(body).map_err(|e| DriverError::invalid_request(e.to_string()))
}

// =============================================================================
// AdapterFactory / AdapterRegistry
// =============================================================================

/// Creates adapters of one kind from configuration options.
pub trait AdapterFactory: Send + Sync {
    /// Name used in configuration to select this factory.
    fn name(&self) -> &str;

    /// Protocol family of the adapters this factory creates.
    fn system_type(&self) -> SystemType;

    /// Creates an adapter for driver `driver_id`.
    fn create(&self, driver_id: &str, options: &JsonValue) -> DriverResult<Arc<dyn ProtocolAdapter>>;
}

/// Adapter factories keyed by name.
pub struct AdapterRegistry {
    factories: HashMap<String, Box<dyn AdapterFactory>>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers a factory, replacing any with the same name.
    pub fn register(&mut self, factory: Box<dyn AdapterFactory>) {
        let name = factory.name().to_string();
        tracing::debug!(adapter = %name, "Registered adapter factory");
        self.factories.insert(name, factory);
    }

    /// Creates an adapter with the factory registered as `name`.
    pub fn create(
        &self,
        name: &str,
        driver_id: &str,
        options: &JsonValue,
    ) -> DriverResult<Arc<dyn ProtocolAdapter>> {
        self.factories
            .get(name)
            .ok_or_else(|| DriverError::not_supported(format!("adapter '{}'", name)))?
            .create(driver_id, options)
    }

    /// Returns `true` if a factory is registered as `name`.
    pub fn supports(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered factory names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns `true` if no factory is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("factories", &self.names())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::InMemoryServiceDirectory;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

    #[derive(Default)]
    struct TestAdapter {
        connects: AtomicUsize,
        fail_connects: AtomicUsize,
        fail_subscribe: AtomicBool,
        subscribe_calls: Mutex<Vec<Vec<Topic>>>,
        unsubscribe_calls: Mutex<Vec<Vec<MonitoredItem>>>,
        next_handle: AtomicU64,
        ctx: Mutex<Option<DriverContext>>,
    }

    #[async_trait]
    impl ProtocolAdapter for TestAdapter {
        fn system_type(&self) -> SystemType {
            SystemType::Opc
        }

        async fn connect(&self, ctx: DriverContext) -> DriverResult<()> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail_connects.load(Ordering::SeqCst) > 0 {
                self.fail_connects.fetch_sub(1, Ordering::SeqCst);
                return Err(DriverError::connection_failed("refused"));
            }
            *self.ctx.lock() = Some(ctx);
            Ok(())
        }

        async fn disconnect(&self) -> DriverResult<()> {
            self.ctx.lock().take();
            Ok(())
        }

        async fn subscribe_topics(&self, topics: &[Topic]) -> DriverResult<Vec<(Topic, MonitoredItem)>> {
            if self.fail_subscribe.load(Ordering::SeqCst) {
                return Err(DriverError::subscription_failed("x", "rejected"));
            }
            self.subscribe_calls.lock().push(topics.to_vec());
            Ok(topics
                .iter()
                .map(|t| {
                    let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
                    (t.clone(), MonitoredItem::native(handle))
                })
                .collect())
        }

        async fn unsubscribe_items(&self, _topics: &[Topic], items: &[MonitoredItem]) -> DriverResult<()> {
            self.unsubscribe_calls.lock().push(items.to_vec());
            Ok(())
        }

        async fn publish_topic(&self, _topic: &Topic, _data: PublishData) -> DriverResult<()> {
            Ok(())
        }
    }

    fn driver_with(adapter: Arc<TestAdapter>) -> (Driver, MessageBus, Arc<InMemoryServiceDirectory>) {
        let bus = MessageBus::new(64);
        let directory = Arc::new(InMemoryServiceDirectory::new());
        let config = DriverConfig::new("line1").with_reconnect_delay(Duration::from_millis(10));
        let driver = Driver::new(config, adapter, bus.clone(), directory.clone());
        (driver, bus, directory)
    }

    #[tokio::test]
    async fn test_shared_topic_subscribes_once() {
        let adapter = Arc::new(TestAdapter::default());
        let (driver, _bus, _dir) = driver_with(adapter.clone());
        let topic = parse_topic("Opc/line1/Node/2/Motor.Speed");

        driver.subscribe("c1", &topic).await.unwrap();
        driver.subscribe("c2", &topic).await.unwrap();
        driver.subscribe("c2", &topic).await.unwrap();
        assert_eq!(adapter.subscribe_calls.lock().len(), 1);

        driver.unsubscribe("c1", &[topic.clone()]).await.unwrap();
        assert!(adapter.unsubscribe_calls.lock().is_empty());
        driver.unsubscribe("c2", &[topic.clone()]).await.unwrap();
        assert_eq!(*adapter.unsubscribe_calls.lock(), vec![vec![MonitoredItem::native(0)]]);
        assert!(driver.registry().get_topics().is_empty());
    }

    #[tokio::test]
    async fn test_failed_subscribe_rolls_back_client() {
        let adapter = Arc::new(TestAdapter::default());
        adapter.fail_subscribe.store(true, Ordering::SeqCst);
        let (driver, _bus, _dir) = driver_with(adapter.clone());
        let topic = parse_topic("Opc/line1/Node/2/A");

        assert!(driver.subscribe("c1", &topic).await.is_err());
        assert_eq!(driver.registry().client_count(&topic), 0);

        adapter.fail_subscribe.store(false, Ordering::SeqCst);
        driver.subscribe("c1", &topic).await.unwrap();
        assert_eq!(driver.registry().client_count(&topic), 1);
    }

    #[tokio::test]
    async fn test_invalid_topic_rejected() {
        let adapter = Arc::new(TestAdapter::default());
        let (driver, _bus, _dir) = driver_with(adapter.clone());
        let err = driver.subscribe("c1", &parse_topic("garbage")).await.unwrap_err();
        assert!(matches!(err, DriverError::InvalidTopic { .. }));
        assert!(adapter.subscribe_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_lifecycle_with_bus_handlers() {
        let adapter = Arc::new(TestAdapter::default());
        adapter.fail_connects.store(2, Ordering::SeqCst);
        let (driver, bus, directory) = driver_with(adapter.clone());

        assert_eq!(driver.state(), DriverState::Disconnected);
        driver.start();
        driver.wait_for(DriverState::Connected).await;
        assert_eq!(adapter.connects.load(Ordering::SeqCst), 3);
        assert!(bus.has_handler("Opc/line1/Subscribe"));
        assert_eq!(directory.services().len(), 1);

        let topic = parse_topic("Opc/line1/Node/2/Motor.Speed");
        let reply = bus
            .request_reply(
                "Opc/line1/Subscribe",
                json!({"ClientId": "c1", "Topic": topic.to_json()}),
            )
            .await
            .unwrap();
        assert!(reply.ok);

        let reply = bus.request_reply("Opc/line1/Read", json!({})).await.unwrap();
        assert!(!reply.ok);

        let reply = bus
            .request_reply("Opc/line1/Subscribe", json!({"bogus": true}))
            .await
            .unwrap();
        assert!(!reply.ok);

        driver.shutdown().await;
        assert_eq!(driver.state(), DriverState::Disconnected);
        assert!(!bus.has_handler("Opc/line1/Subscribe"));
        assert!(directory.services().is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_resubscribes() {
        let adapter = Arc::new(TestAdapter::default());
        let (driver, bus, _dir) = driver_with(adapter.clone());
        driver.start();
        driver.wait_for(DriverState::Connected).await;

        let topic = parse_topic("Opc/line1/Node/2/Motor.Speed");
        driver.subscribe("c1", &topic).await.unwrap();

        let mut subscriber = bus.subscribe(&topic.topic_name);
        let ctx = adapter.ctx.lock().clone().unwrap();
        assert_eq!(ctx.publish_value(&topic, TopicValue::plain(1.5f64)), 1);
        let point = subscriber.recv().await.unwrap().decode().unwrap();
        assert_eq!(point.value.value_as_double(), Some(1.5));

        ctx.connection_lost("socket closed");
        for _ in 0..200 {
            if adapter.subscribe_calls.lock().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(adapter.subscribe_calls.lock().len(), 2);
        assert_eq!(driver.registry().monitored_items(&topic), vec![MonitoredItem::native(1)]);
        assert_eq!(driver.registry().client_count(&topic), 1);

        driver.shutdown().await;
    }

    #[tokio::test]
    async fn test_startup_topics() {
        let adapter = Arc::new(TestAdapter::default());
        let bus = MessageBus::new(64);
        let directory = Arc::new(InMemoryServiceDirectory::new());
        let config = DriverConfig::new("line1")
            .with_startup_topics(vec!["Node/2/A".into(), "Bogus".into()]);
        let driver = Driver::new(config, adapter.clone(), bus, directory.clone());

        let mut events = directory.watch();
        driver.start();
        let _ = events.recv().await.unwrap();

        let topic = parse_topic("Opc/line1/Node/2/A");
        assert_eq!(driver.registry().client_count(&topic), 1);
        assert_eq!(adapter.subscribe_calls.lock().len(), 1);
        driver.shutdown().await;
    }

    #[test]
    fn test_adapter_registry() {
        struct Factory;
        impl AdapterFactory for Factory {
            fn name(&self) -> &str {
                "test"
            }
            fn system_type(&self) -> SystemType {
                SystemType::Opc
            }
            fn create(&self, _id: &str, _options: &JsonValue) -> DriverResult<Arc<dyn ProtocolAdapter>> {
                Ok(Arc::new(TestAdapter::default()))
            }
        }

        let mut registry = AdapterRegistry::new();
        assert!(registry.is_empty());
        registry.register(Box::new(Factory));
        assert!(registry.supports("test"));
        assert_eq!(registry.names(), vec!["test".to_string()]);
        assert!(registry.create("test", "a", &json!({})).is_ok());
        assert!(registry.create("nope", "a", &json!({})).is_err());
    }
}
