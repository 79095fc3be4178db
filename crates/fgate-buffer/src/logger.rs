// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Logger service: bus values in, sink writes out.
//!
//! A [`LoggerService`] owns one queue, one sink and one writer task. It
//! subscribes its logging topics on every matching driver that comes up in
//! the service directory, enqueues the JSON envelopes the drivers publish,
//! and lets the [`LoggerWriter`] drain the queue into the sink.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

use fgate_core::bus::{MessageBus, TopicSubscriber};
use fgate_core::error::QueueResult;
use fgate_core::message::{BusPayload, SubscribeRequest, UnsubscribeRequest};
use fgate_core::service::{ServiceDirectory, ServiceEvent, ServiceRecord};
use fgate_core::topic::{parse_topic, DataFormat, Topic};

use crate::metrics::LoggerMetricSet;
use crate::sink::SinkConfig;
use crate::traits::{LoggerQueue, QueueConfig};
use crate::writer::{LoggerSink, LoggerWriter, DEFAULT_RETRY_DELAY};

/// Interval of the input/output rate report.
pub const RATE_REPORT_INTERVAL: Duration = Duration::from_secs(10);

fn default_retry_delay() -> Duration {
    DEFAULT_RETRY_DELAY
}

/// Configuration of one logger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Logger id, also the client id of its subscriptions.
    pub id: String,
    /// Topic addresses to log.
    #[serde(default)]
    pub topics: Vec<String>,
    /// Write-behind queue.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Destination.
    #[serde(default)]
    pub sink: SinkConfig,
    /// Wait before retrying a failed sink.
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl LoggerConfig {
    /// Creates a config with defaults and no topics.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            topics: Vec::new(),
            queue: QueueConfig::default(),
            sink: SinkConfig::default(),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Adds a logging topic.
    pub fn with_topic(mut self, address: impl Into<String>) -> Self {
        self.topics.push(address.into());
        self
    }

    /// Sets the queue.
    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    /// Sets the sink.
    pub fn with_sink(mut self, sink: SinkConfig) -> Self {
        self.sink = sink;
        self
    }

    /// Sets the retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Parses the logging topics, forcing JSON format.
    ///
    /// Invalid addresses are skipped with a warning.
    pub fn parsed_topics(&self) -> Vec<Topic> {
        self.topics
            .iter()
            .filter_map(|address| {
                let topic = parse_topic(address);
                if topic.is_valid() {
                    Some(topic.with_format(DataFormat::Json))
                } else {
                    tracing::warn!(logger = %self.id, topic = %address, "Invalid logging topic");
                    None
                }
            })
            .collect()
    }
}

/// A running logger.
pub struct LoggerService {
    id: String,
    topics: Arc<Vec<Topic>>,
    retry_delay: Duration,
    queue: Arc<dyn LoggerQueue>,
    sink: Arc<dyn LoggerSink>,
    bus: MessageBus,
    directory: Arc<dyn ServiceDirectory>,
    metrics: LoggerMetricSet,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl LoggerService {
    /// Builds the queue and sink named by `config`.
    pub fn new(
        config: &LoggerConfig,
        bus: MessageBus,
        directory: Arc<dyn ServiceDirectory>,
        metrics: LoggerMetricSet,
    ) -> QueueResult<Self> {
        let queue = crate::create_queue(&config.id, &config.queue)?;
        let sink = config.sink.build(&config.id);
        Ok(Self::with_parts(config, queue, sink, bus, directory, metrics))
    }

    /// Uses an existing queue and sink.
    pub fn with_parts(
        config: &LoggerConfig,
        queue: Arc<dyn LoggerQueue>,
        sink: Arc<dyn LoggerSink>,
        bus: MessageBus,
        directory: Arc<dyn ServiceDirectory>,
        metrics: LoggerMetricSet,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            id: config.id.clone(),
            topics: Arc::new(config.parsed_topics()),
            retry_delay: config.retry_delay,
            queue,
            sink,
            bus,
            directory,
            metrics,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Logger id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Parsed logging topics.
    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    /// The write-behind queue.
    pub fn queue(&self) -> &Arc<dyn LoggerQueue> {
        &self.queue
    }

    /// Metric series of this logger.
    pub fn metrics(&self) -> &LoggerMetricSet {
        &self.metrics
    }

    /// Spawns the writer, the bus consumers and the directory watcher.
    ///
    /// Calling it again is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let span = tracing::info_span!("logger", id = %self.id);
        let mut tasks = self.tasks.lock();

        let writer = LoggerWriter::new(
            self.id.clone(),
            self.queue.clone(),
            self.sink.clone(),
            self.metrics.clone(),
        )
        .with_retry_delay(self.retry_delay);
        tasks.push(tokio::spawn(
            writer.run(self.shutdown_tx.subscribe()).instrument(span.clone()),
        ));

        // Bus subscriptions first so no value published after a driver
        // subscribe is missed.
        let addresses: BTreeSet<&str> = self.topics.iter().map(|t| t.topic_name.as_str()).collect();
        for address in addresses {
            let consumer = consume(
                self.bus.subscribe(address),
                self.queue.clone(),
                self.metrics.clone(),
                self.shutdown_tx.subscribe(),
            );
            tasks.push(tokio::spawn(consumer.instrument(span.clone())));
        }

        let watcher = watch_services(
            self.id.clone(),
            self.topics.clone(),
            self.bus.clone(),
            self.directory.clone(),
            self.shutdown_tx.subscribe(),
        );
        tasks.push(tokio::spawn(watcher.instrument(span.clone())));

        let reporter = report_rates(self.id.clone(), self.metrics.clone(), self.shutdown_tx.subscribe());
        tasks.push(tokio::spawn(reporter.instrument(span)));

        tracing::info!(logger = %self.id, topics = self.topics.len(), "Logger started");
    }

    /// Unsubscribes from the drivers, stops all tasks and closes the sink.
    pub async fn shutdown(&self) {
        for record in self.directory.services() {
            let topics = matching_topics(&self.topics, &record);
            if topics.is_empty() {
                continue;
            }
            let request = UnsubscribeRequest::many(self.id.clone(), topics);
            match serde_json::to_value(&request) {
                Ok(body) => {
                    if let Err(e) = self.bus.request_reply(&record.address("Unsubscribe"), body).await {
                        tracing::debug!(logger = %self.id, endpoint = %record.endpoint, error = %e, "Unsubscribe failed");
                    }
                }
                Err(e) => tracing::warn!(logger = %self.id, error = %e, "Cannot encode unsubscribe request"),
            }
        }

        self.shutdown_tx.send_replace(true);
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }

        if let Err(e) = self.sink.close().await {
            tracing::warn!(logger = %self.id, error = %e, "Sink close failed");
        }
        tracing::info!(logger = %self.id, pending = self.queue.size(), "Logger stopped");
    }
}

impl Drop for LoggerService {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

impl std::fmt::Debug for LoggerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerService")
            .field("id", &self.id)
            .field("topics", &self.topics.len())
            .field("sink", &self.sink.name())
            .finish()
    }
}

fn matching_topics(topics: &[Topic], record: &ServiceRecord) -> Vec<Topic> {
    topics
        .iter()
        .filter(|t| t.system_type == record.system_type && t.system_name == record.name)
        .cloned()
        .collect()
}

async fn consume(
    mut subscriber: TopicSubscriber,
    queue: Arc<dyn LoggerQueue>,
    metrics: LoggerMetricSet,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            received = subscriber.recv() => match received {
                Ok(payload) => enqueue(&payload, queue.as_ref(), &metrics),
                Err(_) => break,
            },
            _ = shutdown.changed() => break,
        }
    }
}

fn enqueue(payload: &BusPayload, queue: &dyn LoggerQueue, metrics: &LoggerMetricSet) {
    let Some(point) = payload.decode() else {
        return;
    };
    metrics.record_input();
    if !point.value.has_value() {
        return;
    }
    if !queue.add(point) {
        metrics.record_dropped();
    }
}

async fn watch_services(
    logger_id: String,
    topics: Arc<Vec<Topic>>,
    bus: MessageBus,
    directory: Arc<dyn ServiceDirectory>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut events = directory.watch();
    for record in directory.services() {
        subscribe_service(&logger_id, &topics, &bus, &record).await;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ServiceEvent::Up(record)) => {
                    subscribe_service(&logger_id, &topics, &bus, &record).await;
                }
                Ok(ServiceEvent::Down(record)) => {
                    tracing::debug!(logger = %logger_id, endpoint = %record.endpoint, "Service down");
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    for record in directory.services() {
                        subscribe_service(&logger_id, &topics, &bus, &record).await;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.changed() => break,
        }
    }
}

async fn subscribe_service(logger_id: &str, topics: &[Topic], bus: &MessageBus, record: &ServiceRecord) {
    let address = record.address("Subscribe");
    for topic in matching_topics(topics, record) {
        let body = match serde_json::to_value(SubscribeRequest::new(logger_id, topic.clone())) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(logger = %logger_id, error = %e, "Cannot encode subscribe request");
                continue;
            }
        };
        match bus.request_reply(&address, body).await {
            Ok(reply) if reply.ok => {
                tracing::debug!(logger = %logger_id, topic = %topic.topic_name, "Subscribed");
            }
            Ok(reply) => tracing::warn!(
                logger = %logger_id,
                topic = %topic.topic_name,
                error = reply.error.as_deref().unwrap_or("unknown"),
                "Subscribe rejected"
            ),
            Err(e) => tracing::warn!(
                logger = %logger_id,
                topic = %topic.topic_name,
                error = %e,
                "Subscribe request failed"
            ),
        }
    }
}

async fn report_rates(logger_id: String, metrics: LoggerMetricSet, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(RATE_REPORT_INTERVAL);
    ticker.tick().await;
    let (mut last_in, mut last_out) = (metrics.input_count(), metrics.output_count());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let (input, output) = (metrics.input_count(), metrics.output_count());
                let secs = RATE_REPORT_INTERVAL.as_secs_f64();
                tracing::info!(
                    logger = %logger_id,
                    input_rate = (input - last_in) as f64 / secs,
                    output_rate = (output - last_out) as f64 / secs,
                    "Logger throughput"
                );
                last_in = input;
                last_out = output;
            }
            _ = shutdown.changed() => break,
        }
    }
}
