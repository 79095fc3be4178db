// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Command-line interface.
//!
//! - `run`: start the gateway (default)
//! - `validate`: check a configuration file
//! - `topic`: parse a topic address and print its fields
//! - `version`: show version information

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// fgate - industrial data gateway
///
/// Connects protocol drivers to loggers over an in-process message bus.
#[derive(Parser, Debug)]
#[command(
    name = "fgate",
    author = "Sylvex <contact@sylvex.io>",
    version = fgate_core::VERSION,
    about = "Industrial data gateway core",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "fgate.yaml", env = "FGATE_CONFIG", global = true)]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Log format; overrides the config file
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the gateway
    ///
    /// Default when no subcommand is given. Runs until SIGINT or SIGTERM.
    Run(RunArgs),

    /// Validate the configuration file
    Validate(ValidateArgs),

    /// Parse a topic address and print its fields
    Topic(TopicArgs),

    /// Show version information
    Version,
}

// =============================================================================
// Command Arguments
// =============================================================================

/// Arguments for the `run` command.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Maximum time to wait for drivers and loggers to stop
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    pub shutdown_timeout: Duration,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Arguments for the `validate` command.
#[derive(Args, Debug, Clone, Default)]
pub struct ValidateArgs {
    /// Print the parsed configuration
    #[arg(short, long)]
    pub show_config: bool,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the `topic` command.
#[derive(Args, Debug, Clone)]
pub struct TopicArgs {
    /// Topic address, e.g. `Opc/Line1/Node/ns=2;s=Speed`
    pub address: String,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

// =============================================================================
// Enums
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON objects
    Json,
    /// Single-line compact text
    Compact,
}

impl From<fgate_config::LogFormat> for LogFormat {
    fn from(format: fgate_config::LogFormat) -> Self {
        match format {
            fgate_config::LogFormat::Text => LogFormat::Text,
            fgate_config::LogFormat::Compact => LogFormat::Compact,
            fgate_config::LogFormat::Json => LogFormat::Json,
        }
    }
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON
    Json,
}

// =============================================================================
// Helper Methods
// =============================================================================

impl Cli {
    /// Parses the process arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The command to run, `Run` if none was given.
    pub fn effective_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Run(RunArgs::default()))
    }

    /// Level from `-q`/`-v`/`--log-level`, if any was given.
    pub fn log_level_override(&self) -> Option<&str> {
        if self.quiet {
            Some("warn")
        } else if self.verbose {
            Some("debug")
        } else {
            self.log_level.as_deref()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command() {
        let cli = Cli::parse_from(["fgate"]);
        assert!(cli.command.is_none());
        assert!(matches!(cli.effective_command(), Commands::Run(_)));
    }

    #[test]
    fn test_run_shutdown_timeout() {
        let cli = Cli::parse_from(["fgate", "run", "--shutdown-timeout", "5s"]);
        match cli.command {
            Some(Commands::Run(args)) => assert_eq!(args.shutdown_timeout, Duration::from_secs(5)),
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn test_topic_command() {
        let cli = Cli::parse_from(["fgate", "topic", "Opc/Line1/Node/ns=2;s=Speed", "-f", "json"]);
        match cli.command {
            Some(Commands::Topic(args)) => {
                assert_eq!(args.address, "Opc/Line1/Node/ns=2;s=Speed");
                assert_eq!(args.format, OutputFormat::Json);
            }
            other => panic!("expected topic, got {:?}", other),
        }
    }

    #[test]
    fn test_log_overrides() {
        let cli = Cli::parse_from(["fgate", "-c", "/etc/fgate.toml", "--log-format", "json"]);
        assert_eq!(cli.config, PathBuf::from("/etc/fgate.toml"));
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        assert_eq!(cli.log_level_override(), None);

        let cli = Cli::parse_from(["fgate", "-q", "-l", "trace"]);
        assert_eq!(cli.log_level_override(), Some("warn"));
        let cli = Cli::parse_from(["fgate", "-l", "trace"]);
        assert_eq!(cli.log_level_override(), Some("trace"));
    }
}
