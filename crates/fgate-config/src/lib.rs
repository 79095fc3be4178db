// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # fgate-config
//!
//! Configuration schema and loader for the fgate gateway.
//!
//! ## Quick Start
//!
//! ```no_run
//! use fgate_config::loader::load_config;
//!
//! let config = load_config("fgate.yaml").unwrap();
//! println!("Gateway ID: {}", config.gateway.id);
//! println!("Drivers: {}", config.drivers.len());
//! ```
//!
//! ## Example File
//!
//! ```yaml
//! gateway:
//!   id: edge-01
//!
//! drivers:
//!   - id: Line1
//!     adapter: loopback
//!     reconnect_delay: 5s
//!     subscribe_on_startup: ["Node/ns=2;s=Speed"]
//!     options: { system_type: Opc }
//!
//! loggers:
//!   - id: history
//!     topics: ["Opc/Line1/Node/ns=2;s=Speed"]
//!     queue: { type: disk, queue_size: 67108864, path: "${FGATE_DATA:/var/lib/fgate}/history.buf" }
//!     sink: { type: json_lines, path: history.jsonl }
//!
//! logging:
//!   level: info
//!   format: text
//! ```
//!
//! YAML, TOML and JSON are accepted; the format follows the file extension.
//! `FGATE_*` environment variables override selected values, see
//! [`loader`].

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, load_config_str, ConfigFormat, ConfigLoader};
pub use schema::{
    BusConfig, DriverEntry, GatewayConfig, GatewaySection, LogFormat, LogLevel, LoggingConfig,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
