// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! fgate - industrial data gateway
//!
//! Main binary entry point.

use fgate_bin::cli::{Cli, Commands, LogFormat};
use fgate_bin::commands::execute;
use fgate_bin::error::report_error_and_exit;
use fgate_bin::logging::init_logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    let (level, format) = log_settings(&cli);
    if let Err(e) = init_logging(&level, format) {
        report_error_and_exit(e);
    }

    if let Err(e) = execute(cli).await {
        report_error_and_exit(e);
    }
}

/// Command-line overrides first, then the config file, then defaults.
///
/// A config file that does not load here is reported properly by the
/// command itself.
fn log_settings(cli: &Cli) -> (String, LogFormat) {
    let from_file = match cli.effective_command() {
        Commands::Run(_) | Commands::Validate(_) => fgate_config::load_config(&cli.config)
            .ok()
            .map(|config| config.logging),
        Commands::Topic(_) | Commands::Version => None,
    };

    let level = cli
        .log_level_override()
        .map(str::to_string)
        .or_else(|| from_file.as_ref().map(|l| l.level.as_str().to_string()))
        .unwrap_or_else(|| "info".to_string());
    let format = cli
        .log_format
        .or_else(|| from_file.map(|l| LogFormat::from(l.format)))
        .unwrap_or_default();
    (level, format)
}
