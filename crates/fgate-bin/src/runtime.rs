// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Gateway runtime orchestration.
//!
//! Startup order:
//!
//! 1. Message bus and service directory
//! 2. Loggers (their bus subscriptions must exist before values flow)
//! 3. Drivers
//!
//! Shutdown runs in reverse for loggers first, so pending client
//! unsubscribes still reach live drivers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use fgate_buffer::{LoggerMetrics, LoggerService};
use fgate_config::{load_config, GatewayConfig};
use fgate_core::{
    AdapterFactory, AdapterRegistry, Driver, InMemoryServiceDirectory, MessageBus, ServiceDirectory,
};

use crate::error::{BinError, BinResult};
use crate::loopback::LoopbackFactory;
use crate::shutdown::ShutdownCoordinator;

/// Default upper bound on teardown time.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// GatewayRuntime
// =============================================================================

/// Builds and runs every component named by a [`GatewayConfig`].
pub struct GatewayRuntime {
    config: Arc<GatewayConfig>,
    adapters: AdapterRegistry,
    shutdown: ShutdownCoordinator,
    shutdown_timeout: Duration,
    metrics: prometheus::Registry,
}

impl GatewayRuntime {
    /// Creates a runtime with the built-in adapters registered.
    pub fn new(config: GatewayConfig) -> Self {
        let mut adapters = AdapterRegistry::new();
        adapters.register(Box::new(LoopbackFactory));
        Self {
            config: Arc::new(config),
            adapters,
            shutdown: ShutdownCoordinator::new(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            metrics: prometheus::Registry::new(),
        }
    }

    /// Registers an additional adapter factory.
    pub fn with_adapter(mut self, factory: Box<dyn AdapterFactory>) -> Self {
        self.adapters.register(factory);
        self
    }

    /// Sets the teardown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Loaded configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Handle to request shutdown from elsewhere.
    pub fn shutdown_handle(&self) -> ShutdownCoordinator {
        self.shutdown.clone()
    }

    /// Registry holding the logger metrics.
    pub fn metrics_registry(&self) -> &prometheus::Registry {
        &self.metrics
    }

    /// Runs the gateway until shutdown is signalled.
    pub async fn run(self) -> BinResult<()> {
        info!(
            gateway = %self.config.gateway.id,
            version = fgate_core::VERSION,
            "Starting fgate"
        );

        let components = self.start()?;
        info!(
            drivers = components.drivers.len(),
            loggers = components.loggers.len(),
            "Gateway is ready"
        );

        self.shutdown.wait_for_shutdown().await;
        info!("Shutting down");

        if !self
            .shutdown
            .drain(self.shutdown_timeout, components.stop())
            .await
        {
            return Err(BinError::ShutdownTimeout(self.shutdown_timeout));
        }

        info!("fgate stopped");
        Ok(())
    }

    /// Builds and starts every component.
    ///
    /// On failure, components already started are dropped, which signals
    /// them to stop.
    pub fn start(&self) -> BinResult<GatewayComponents> {
        let bus = MessageBus::with_timeout(self.config.bus.capacity, self.config.bus.request_timeout);
        let directory: Arc<dyn ServiceDirectory> = Arc::new(InMemoryServiceDirectory::new());

        let logger_metrics = LoggerMetrics::registered(&self.metrics)?;

        let mut loggers = Vec::with_capacity(self.config.loggers.len());
        for config in &self.config.loggers {
            let logger = LoggerService::new(
                config,
                bus.clone(),
                directory.clone(),
                logger_metrics.for_logger(&config.id),
            )
            .map_err(|e| BinError::startup(format!("logger '{}'", config.id), e))?;
            logger.start();
            info!(logger = %config.id, topics = logger.topics().len(), "Logger started");
            loggers.push(logger);
        }

        let mut drivers = Vec::new();
        for entry in self.config.enabled_drivers() {
            let adapter = self
                .adapters
                .create(&entry.adapter, &entry.id, &entry.options)
                .map_err(|e| BinError::startup(format!("driver '{}'", entry.id), e))?;
            let driver = Driver::new(entry.driver_config(), adapter, bus.clone(), directory.clone());
            driver.start();
            info!(driver = %entry.id, endpoint = %driver.endpoint(), "Driver started");
            drivers.push(driver);
        }

        let skipped = self.config.drivers.len() - drivers.len();
        if skipped > 0 {
            warn!(count = skipped, "Disabled drivers skipped");
        }

        Ok(GatewayComponents {
            bus,
            directory,
            drivers,
            loggers,
        })
    }
}

// =============================================================================
// GatewayComponents
// =============================================================================

/// The running parts of a gateway.
pub struct GatewayComponents {
    /// Shared message bus.
    pub bus: MessageBus,
    /// Shared service directory.
    pub directory: Arc<dyn ServiceDirectory>,
    /// Started drivers.
    pub drivers: Vec<Driver>,
    /// Started loggers.
    pub loggers: Vec<LoggerService>,
}

impl GatewayComponents {
    /// Driver with `id`, if running.
    pub fn driver(&self, id: &str) -> Option<&Driver> {
        self.drivers.iter().find(|d| d.id() == id)
    }

    /// Logger with `id`, if running.
    pub fn logger(&self, id: &str) -> Option<&LoggerService> {
        self.loggers.iter().find(|l| l.id() == id)
    }

    /// Stops loggers, then drivers.
    pub async fn stop(self) {
        for logger in &self.loggers {
            logger.shutdown().await;
            info!(logger = %logger.id(), "Logger stopped");
        }
        for driver in &self.drivers {
            driver.shutdown().await;
        }
        let stats = self.bus.stats();
        info!(
            requests = stats.requests,
            published = stats.messages_published,
            dropped = stats.messages_dropped,
            "Bus closed"
        );
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`GatewayRuntime`].
#[derive(Default)]
pub struct RuntimeBuilder {
    config_path: Option<PathBuf>,
    config: Option<GatewayConfig>,
    shutdown_timeout: Option<Duration>,
}

impl RuntimeBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the configuration from `path`.
    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Uses `config` directly.
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the teardown timeout.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> BinResult<GatewayRuntime> {
        let config = match self.config {
            Some(config) => {
                config.validate()?;
                config
            }
            None => {
                let path = self
                    .config_path
                    .ok_or_else(|| BinError::usage("no configuration provided"))?;
                load_config(&path)?
            }
        };

        let runtime = GatewayRuntime::new(config);
        Ok(match self.shutdown_timeout {
            Some(timeout) => runtime.with_shutdown_timeout(timeout),
            None => runtime,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
