// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema.
//!
//! # Schema Structure
//!
//! ```text
//! GatewayConfig
//! ├── gateway: GatewaySection
//! ├── bus: BusConfig
//! ├── drivers: Vec<DriverEntry>
//! ├── loggers: Vec<LoggerConfig>
//! └── logging: LoggingConfig
//! ```
//!
//! Durations use humantime notation (`"5s"`, `"250ms"`).

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use fgate_buffer::{LoggerConfig, QueueKind, SinkConfig};
use fgate_core::driver::{DriverConfig, DEFAULT_RECONNECT_DELAY};
use fgate_core::topic::parse_topic;

use crate::error::{ConfigError, ConfigResult};

// =============================================================================
// Constants
// =============================================================================

/// Default capacity of bus channels.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Default bus request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// Root configuration of a gateway process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Instance identification.
    #[serde(default)]
    pub gateway: GatewaySection,

    /// Message bus tuning.
    #[serde(default)]
    pub bus: BusConfig,

    /// Protocol drivers.
    #[serde(default)]
    pub drivers: Vec<DriverEntry>,

    /// Loggers.
    #[serde(default)]
    pub loggers: Vec<LoggerConfig>,

    /// Process logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    /// Validates the whole configuration.
    ///
    /// Checks unique driver and logger ids, startup topic items, logging
    /// topic addresses and queue settings.
    pub fn validate(&self) -> ConfigResult<()> {
        self.gateway.validate()?;
        self.bus.validate()?;

        let mut ids = HashSet::new();
        for (i, driver) in self.drivers.iter().enumerate() {
            if !ids.insert(driver.id.as_str()) {
                return Err(ConfigError::duplicate_id("drivers", &driver.id));
            }
            driver.validate(i)?;
        }

        let mut ids = HashSet::new();
        for (i, logger) in self.loggers.iter().enumerate() {
            if !ids.insert(logger.id.as_str()) {
                return Err(ConfigError::duplicate_id("loggers", &logger.id));
            }
            validate_logger(logger, i)?;
        }

        Ok(())
    }

    /// Enabled drivers.
    pub fn enabled_drivers(&self) -> impl Iterator<Item = &DriverEntry> {
        self.drivers.iter().filter(|d| d.enabled)
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// Instance identification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    /// Instance id, used in logs.
    #[serde(default = "default_gateway_id")]
    pub id: String,

    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

fn default_gateway_id() -> String {
    "fgate-01".to_string()
}

impl GatewaySection {
    /// Validates the section.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::validation("gateway.id", "cannot be empty"));
        }
        if self.id.len() > 64 {
            return Err(ConfigError::validation("gateway.id", "cannot exceed 64 characters"));
        }
        Ok(())
    }
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            id: default_gateway_id(),
            description: None,
        }
    }
}

// =============================================================================
// Bus
// =============================================================================

/// Message bus tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    /// Channel capacity per handler and per topic.
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,

    /// Timeout of request/reply calls.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

fn default_bus_capacity() -> usize {
    DEFAULT_BUS_CAPACITY
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

impl BusConfig {
    /// Validates the section.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.capacity == 0 {
            return Err(ConfigError::validation("bus.capacity", "must be positive"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::validation("bus.request_timeout", "must be positive"));
        }
        Ok(())
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BUS_CAPACITY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

// =============================================================================
// Drivers
// =============================================================================

/// One protocol driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriverEntry {
    /// Driver id; becomes the second segment of its topics.
    pub id: String,

    /// Adapter factory name.
    pub adapter: String,

    /// Whether to start the driver.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Items subscribed right after the first connect, relative to the
    /// driver endpoint (`Node/ns=2;s=Speed`, `Path/Line/Motor`).
    #[serde(default)]
    pub subscribe_on_startup: Vec<String>,

    /// Wait between connection attempts.
    #[serde(default = "default_reconnect_delay", with = "humantime_serde")]
    pub reconnect_delay: Duration,

    /// Adapter-specific options.
    #[serde(default)]
    pub options: JsonValue,
}

fn default_enabled() -> bool {
    true
}

fn default_reconnect_delay() -> Duration {
    DEFAULT_RECONNECT_DELAY
}

impl DriverEntry {
    /// Creates an enabled entry with defaults.
    pub fn new(id: impl Into<String>, adapter: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            adapter: adapter.into(),
            enabled: true,
            subscribe_on_startup: Vec::new(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            options: JsonValue::Null,
        }
    }

    /// Validates the entry at position `index`.
    pub fn validate(&self, index: usize) -> ConfigResult<()> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::validation(format!("drivers[{}].id", index), "cannot be empty"));
        }
        if self.id.contains('/') {
            return Err(ConfigError::validation(
                format!("drivers[{}].id", index),
                "cannot contain '/'",
            ));
        }
        if self.adapter.trim().is_empty() {
            return Err(ConfigError::validation(
                format!("drivers[{}].adapter", index),
                "cannot be empty",
            ));
        }
        if self.reconnect_delay.is_zero() {
            return Err(ConfigError::validation(
                format!("drivers[{}].reconnect_delay", index),
                "must be positive",
            ));
        }
        for (j, item) in self.subscribe_on_startup.iter().enumerate() {
            // The system type is only known to the adapter.
            let parses = ["Opc", "Plc", "Mqtt"]
                .iter()
                .any(|prefix| parse_topic(&format!("{}/{}/{}", prefix, self.id, item)).is_valid());
            if !parses {
                return Err(ConfigError::invalid_topic(
                    format!("drivers[{}].subscribe_on_startup[{}]", index, j),
                    item,
                ));
            }
        }
        Ok(())
    }

    /// Runtime driver configuration.
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig::new(self.id.clone())
            .with_startup_topics(self.subscribe_on_startup.clone())
            .with_reconnect_delay(self.reconnect_delay)
    }
}

// =============================================================================
// Loggers
// =============================================================================

fn validate_logger(logger: &LoggerConfig, index: usize) -> ConfigResult<()> {
    if logger.id.trim().is_empty() {
        return Err(ConfigError::validation(format!("loggers[{}].id", index), "cannot be empty"));
    }
    for (j, address) in logger.topics.iter().enumerate() {
        if !parse_topic(address).is_valid() {
            return Err(ConfigError::invalid_topic(
                format!("loggers[{}].topics[{}]", index, j),
                address,
            ));
        }
    }

    let queue = &logger.queue;
    if queue.queue_size == 0 {
        return Err(ConfigError::validation(
            format!("loggers[{}].queue.queue_size", index),
            "must be positive",
        ));
    }
    if queue.block_size == 0 {
        return Err(ConfigError::validation(
            format!("loggers[{}].queue.block_size", index),
            "must be positive",
        ));
    }
    if queue.kind == QueueKind::Disk && queue.path.is_none() {
        return Err(ConfigError::validation(
            format!("loggers[{}].queue.path", index),
            "disk queues need a path",
        ));
    }
    if let SinkConfig::JsonLines { path } = &logger.sink {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::validation(
                format!("loggers[{}].sink.path", index),
                "cannot be empty",
            ));
        }
    }
    if logger.retry_delay.is_zero() {
        return Err(ConfigError::validation(
            format!("loggers[{}].retry_delay", index),
            "must be positive",
        ));
    }
    Ok(())
}

// =============================================================================
// Logging
// =============================================================================

/// Process logging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset.
    #[serde(default)]
    pub level: LogLevel,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Filter directive.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parses a level name, case-insensitive.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-field lines.
    #[default]
    Text,
    /// Single-line compact output.
    Compact,
    /// JSON objects.
    Json,
}

impl LogFormat {
    /// Parses a format name, case-insensitive.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Some(LogFormat::Text),
            "compact" => Some(LogFormat::Compact),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}
