// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Errors surfaced by the `fgate` executable and their exit codes.
//!
//! | Code | Meaning                                   |
//! |------|-------------------------------------------|
//! | 1    | bad input: arguments or configuration     |
//! | 2    | a component could not be started          |
//! | 3    | teardown exceeded its deadline            |
//! | 4    | output or filesystem failure              |

use std::time::Duration;

use thiserror::Error;

use fgate_config::ConfigError;
use fgate_core::GatewayError;

/// Result type alias for binary operations.
pub type BinResult<T> = Result<T, BinError>;

/// Why the `fgate` process gave up.
#[derive(Debug, Error)]
pub enum BinError {
    /// An argument the user passed makes no sense.
    #[error("invalid input: {0}")]
    Usage(String),

    /// The configuration file could not be loaded or failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A driver, logger or other component failed to come up.
    #[error("cannot start {component}: {source}")]
    Startup {
        /// Component label, e.g. `driver 'Line1'`.
        component: String,
        /// What went wrong.
        #[source]
        source: GatewayError,
    },

    /// Logger metrics could not be registered.
    #[error("cannot register metrics: {0}")]
    Metrics(#[from] prometheus::Error),

    /// The tracing subscriber could not be installed.
    #[error("cannot set up logging: {0}")]
    Logging(String),

    /// Components were still stopping when the deadline passed.
    #[error("shutdown did not finish within {}", humantime::format_duration(*.0))]
    ShutdownTimeout(Duration),

    /// Report output could not be encoded.
    #[error("cannot encode output: {0}")]
    Output(#[from] serde_json::Error),

    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BinError {
    /// Rejects user input.
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    /// Wraps a startup failure of `component`.
    pub fn startup(component: impl Into<String>, source: impl Into<GatewayError>) -> Self {
        Self::Startup {
            component: component.into(),
            source: source.into(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) | Self::Config(_) => 1,
            Self::Startup { .. } | Self::Metrics(_) | Self::Logging(_) => 2,
            Self::ShutdownTimeout(_) => 3,
            Self::Output(_) | Self::Io(_) => 4,
        }
    }
}

/// Prints `error` and each underlying cause to stderr, then exits.
pub fn report_error_and_exit(error: BinError) -> ! {
    eprintln!("fgate: {}", error);
    let mut cause = std::error::Error::source(&error);
    while let Some(inner) = cause {
        eprintln!("  because: {}", inner);
        cause = inner.source();
    }
    std::process::exit(error.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fgate_core::DriverError;

    #[test]
    fn test_startup_names_component() {
        let err = BinError::startup("driver 'Line1'", DriverError::not_supported("Browse"));
        assert!(err.to_string().starts_with("cannot start driver 'Line1': "));
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_exit_codes_by_category() {
        assert_eq!(BinError::usage("bad address").exit_code(), 1);
        assert_eq!(BinError::Logging("already set".into()).exit_code(), 2);

        let timeout = BinError::ShutdownTimeout(Duration::from_secs(30));
        assert_eq!(timeout.to_string(), "shutdown did not finish within 30s");
        assert_eq!(timeout.exit_code(), 3);

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(BinError::from(io).exit_code(), 4);
    }
}
