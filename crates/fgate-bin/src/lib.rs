// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # fgate-bin
//!
//! The `fgate` executable and the runtime that wires the gateway together.
//!
//! ```text
//!                 main.rs
//!                    │
//!                 cli.rs
//!                    │
//!       ┌────────────┼────────────┐
//!       ▼            ▼            ▼
//!   commands      runtime      logging
//!                    │
//!          ┌─────────┼─────────┐
//!          ▼         ▼         ▼
//!       drivers     bus     loggers
//!          │                   │
//!      loopback            shutdown
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the gateway (default command)
//! fgate
//!
//! # Start with a custom config
//! fgate -c /etc/fgate/fgate.yaml run --shutdown-timeout 10s
//!
//! # Validate a configuration
//! fgate validate --show-config
//!
//! # Inspect a topic address
//! fgate topic "Opc/Line1/Node/2/Motor.Speed"
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod loopback;
pub mod runtime;
pub mod shutdown;

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::init_logging;
pub use loopback::{LoopbackAdapter, LoopbackFactory, LOOPBACK_ADAPTER};
pub use runtime::{GatewayComponents, GatewayRuntime, RuntimeBuilder};
pub use shutdown::ShutdownCoordinator;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
