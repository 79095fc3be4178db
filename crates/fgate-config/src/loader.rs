// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading.
//!
//! # Loading Pipeline
//!
//! 1. Read the file and pick the format from its extension
//! 2. Replace `${VAR}` / `${VAR:default}` placeholders
//! 3. Deserialize into [`GatewayConfig`]
//! 4. Apply `FGATE_*` environment overrides
//! 5. Resolve relative queue and sink paths against the file's directory
//! 6. Validate
//!
//! # Environment Variable Override
//!
//! ```text
//! FGATE_GATEWAY_ID=edge-7
//! FGATE_LOG_LEVEL=debug
//! FGATE_LOG_FORMAT=json
//! FGATE_BUS_REQUEST_TIMEOUT=10s
//! FGATE_DRIVERS_0_ENABLED=false
//! FGATE_LOGGERS_1_QUEUE_PATH=/var/lib/fgate/l1.buf
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use fgate_buffer::SinkConfig;

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{GatewayConfig, LogFormat, LogLevel};

// =============================================================================
// ConfigLoader
// =============================================================================

/// Loads [`GatewayConfig`] files.
///
/// # Examples
///
/// ```no_run
/// use fgate_config::loader::ConfigLoader;
///
/// let config = ConfigLoader::new().load("fgate.yaml").unwrap();
/// println!("{} drivers", config.drivers.len());
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    base_path: Option<PathBuf>,
    env_prefix: String,
    resolve_env_vars: bool,
    resolve_paths: bool,
}

impl ConfigLoader {
    /// Creates a loader with the `FGATE` prefix and all resolution enabled.
    pub fn new() -> Self {
        Self {
            base_path: None,
            env_prefix: "FGATE".to_string(),
            resolve_env_vars: true,
            resolve_paths: true,
        }
    }

    /// Sets the directory relative paths are resolved against.
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables placeholders and overrides.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Enables or disables relative path resolution.
    pub fn with_path_resolution(mut self, enabled: bool) -> Self {
        self.resolve_paths = enabled;
        self
    }

    /// Loads and validates a file.
    ///
    /// `.yaml`/`.yml`, `.toml` and `.json` are recognized.
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<GatewayConfig> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let base_path = self.base_path.clone().unwrap_or_else(|| {
            path.parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        });

        let content = self.read_file(path)?;
        let format = ConfigFormat::from_path(path)?;
        let mut config = self.parse_content(&content, format, path)?;

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config)?;
        }
        if self.resolve_paths {
            resolve_relative_paths(&mut config, &base_path);
        }
        config.validate()?;

        debug!(
            drivers = config.drivers.len(),
            loggers = config.loggers.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Parses and validates configuration text.
    ///
    /// Relative paths are resolved only if a base path was set.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> ConfigResult<GatewayConfig> {
        let content = if self.resolve_env_vars {
            resolve_env_placeholders(content)
        } else {
            content.to_string()
        };
        let mut config = parse_str(&content, format)?;

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config)?;
        }
        if let (true, Some(base)) = (self.resolve_paths, &self.base_path) {
            resolve_relative_paths(&mut config, base);
        }
        config.validate()?;
        Ok(config)
    }

    fn read_file(&self, path: &Path) -> ConfigResult<String> {
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }
        fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))
    }

    fn parse_content(&self, content: &str, format: ConfigFormat, path: &Path) -> ConfigResult<GatewayConfig> {
        let content = if self.resolve_env_vars {
            resolve_env_placeholders(content)
        } else {
            content.to_string()
        };
        parse_str(&content, format).map_err(|e| match e {
            ConfigError::Serialization { message } => ConfigError::parse(path, message),
            other => other,
        })
    }

    fn env(&self, suffix: &str) -> Option<(String, String)> {
        let name = format!("{}_{}", self.env_prefix, suffix);
        env::var(&name).ok().map(|value| (name, value))
    }

    fn apply_env_overrides(&self, config: &mut GatewayConfig) -> ConfigResult<()> {
        if let Some((_, value)) = self.env("GATEWAY_ID") {
            config.gateway.id = value;
        }

        if let Some((name, value)) = self.env("LOG_LEVEL") {
            config.logging.level = LogLevel::parse(&value)
                .ok_or_else(|| ConfigError::invalid_env_var(name, "expected trace, debug, info, warn or error"))?;
        }
        if let Some((name, value)) = self.env("LOG_FORMAT") {
            config.logging.format = LogFormat::parse(&value)
                .ok_or_else(|| ConfigError::invalid_env_var(name, "expected text, compact or json"))?;
        }

        if let Some((name, value)) = self.env("BUS_CAPACITY") {
            config.bus.capacity = value
                .parse()
                .map_err(|_| ConfigError::invalid_env_var(name, "expected a positive integer"))?;
        }
        if let Some((name, value)) = self.env("BUS_REQUEST_TIMEOUT") {
            config.bus.request_timeout = humantime::parse_duration(&value)
                .map_err(|e| ConfigError::invalid_env_var(name, e.to_string()))?;
        }

        for (i, driver) in config.drivers.iter_mut().enumerate() {
            if let Some((_, value)) = self.env(&format!("DRIVERS_{}_ENABLED", i)) {
                driver.enabled = parse_bool(&value);
            }
            if let Some((name, value)) = self.env(&format!("DRIVERS_{}_RECONNECT_DELAY", i)) {
                driver.reconnect_delay = humantime::parse_duration(&value)
                    .map_err(|e| ConfigError::invalid_env_var(name, e.to_string()))?;
            }
        }

        for (i, logger) in config.loggers.iter_mut().enumerate() {
            if let Some((_, value)) = self.env(&format!("LOGGERS_{}_QUEUE_PATH", i)) {
                logger.queue.path = Some(PathBuf::from(value));
            }
            if let Some((name, value)) = self.env(&format!("LOGGERS_{}_QUEUE_SIZE", i)) {
                logger.queue.queue_size = value
                    .parse()
                    .map_err(|_| ConfigError::invalid_env_var(name, "expected a positive integer"))?;
            }
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Determines the format from a file extension.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(other) => Err(ConfigError::unsupported_format(other)),
            None => Err(ConfigError::unsupported_format("(no extension)")),
        }
    }

    /// File extension of this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_str(content: &str, format: ConfigFormat) -> ConfigResult<GatewayConfig> {
    match format {
        ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| ConfigError::serialization(e.to_string())),
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| ConfigError::serialization(e.to_string())),
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| ConfigError::serialization(e.to_string())),
    }
}

/// Replaces `${VAR}` and `${VAR:default}` with environment values.
///
/// Unset variables without a default are left as written.
fn resolve_env_placeholders(content: &str) -> String {
    let mut result = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            result.push_str(&rest[start..]);
            return result;
        };

        let inner = &after[..end];
        let (name, default) = match inner.split_once(':') {
            Some((name, default)) => (name, Some(default)),
            None => (inner, None),
        };
        match (env::var(name), default) {
            (Ok(value), _) => result.push_str(&value),
            (Err(_), Some(default)) => result.push_str(default),
            (Err(_), None) => {
                warn!(variable = name, "Environment variable not set");
                result.push_str(&rest[start..start + 2 + end + 1]);
            }
        }
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    result
}

fn resolve_relative_paths(config: &mut GatewayConfig, base_path: &Path) {
    for logger in &mut config.loggers {
        if let Some(path) = logger.queue.path.as_mut() {
            if path.is_relative() {
                *path = base_path.join(&*path);
            }
        }
        if let SinkConfig::JsonLines { path } = &mut logger.sink {
            if path.is_relative() {
                *path = base_path.join(&*path);
            }
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "true" | "1" | "yes" | "on" | "enabled"
    )
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads a file with default settings.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<GatewayConfig> {
    ConfigLoader::new().load(path)
}

/// Parses configuration text with default settings.
pub fn load_config_str(content: &str, format: ConfigFormat) -> ConfigResult<GatewayConfig> {
    ConfigLoader::new().load_from_str(content, format)
}

// =============================================================================
// Tests
// =============================================================================
