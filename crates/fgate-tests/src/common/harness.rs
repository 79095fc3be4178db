// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Harness
//!
//! One bus, one service directory and a temp directory per test, plus
//! shortcuts for wiring drivers and loggers onto them.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tempfile::TempDir;

use fgate_buffer::{create_queue, LoggerConfig, LoggerMetrics, LoggerService, LoggerSink};
use fgate_core::{
    BusReply, Driver, DriverConfig, InMemoryServiceDirectory, MessageBus, ProtocolAdapter,
    ServiceDirectory,
};

use super::assertions::assert_eventually;
use super::init_test_logging;

/// Reconnect delay used by harness drivers.
pub const TEST_RECONNECT_DELAY: Duration = Duration::from_millis(50);

/// Shared infrastructure for one test.
pub struct TestHarness {
    /// Message bus.
    pub bus: MessageBus,
    /// Service directory.
    pub directory: Arc<dyn ServiceDirectory>,
    /// Unregistered logger metric families.
    pub metrics: LoggerMetrics,
    temp_dir: TempDir,
}

impl TestHarness {
    /// Creates a harness with a 2s request timeout.
    pub fn new() -> Self {
        init_test_logging();
        Self {
            bus: MessageBus::with_timeout(256, Duration::from_secs(2)),
            directory: Arc::new(InMemoryServiceDirectory::new()),
            metrics: LoggerMetrics::new().expect("metric families"),
            temp_dir: super::temp_test_dir("fgate-test-"),
        }
    }

    /// Path of `name` inside the test's temp directory.
    pub fn temp_path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Creates a stopped driver with a short reconnect delay.
    pub fn driver(&self, id: &str, adapter: Arc<dyn ProtocolAdapter>) -> Driver {
        self.driver_with(DriverConfig::new(id).with_reconnect_delay(TEST_RECONNECT_DELAY), adapter)
    }

    /// Creates a stopped driver from `config`.
    pub fn driver_with(&self, config: DriverConfig, adapter: Arc<dyn ProtocolAdapter>) -> Driver {
        Driver::new(config, adapter, self.bus.clone(), self.directory.clone())
    }

    /// Creates a stopped logger writing to `sink`.
    pub fn logger(&self, config: &LoggerConfig, sink: Arc<dyn LoggerSink>) -> LoggerService {
        let queue = create_queue(&config.id, &config.queue).expect("queue");
        LoggerService::with_parts(
            config,
            queue,
            sink,
            self.bus.clone(),
            self.directory.clone(),
            self.metrics.for_logger(&config.id),
        )
    }

    /// Sends a request and decodes the reply.
    pub async fn request(&self, address: &str, body: JsonValue) -> BusReply {
        self.bus
            .request_reply(address, body)
            .await
            .unwrap_or_else(|e| panic!("request to {} failed: {}", address, e))
    }

    /// Waits until `endpoint` is published in the directory.
    pub async fn wait_for_service(&self, endpoint: &str) {
        let directory = self.directory.clone();
        assert_eventually(&format!("service {} up", endpoint), || {
            directory.services().iter().any(|r| r.endpoint == endpoint)
        })
        .await;
    }

    /// Waits until `endpoint` is withdrawn from the directory.
    pub async fn wait_for_service_down(&self, endpoint: &str) {
        let directory = self.directory.clone();
        assert_eventually(&format!("service {} down", endpoint), || {
            directory.services().iter().all(|r| r.endpoint != endpoint)
        })
        .await;
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
