// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use std::collections::HashSet;

use fgate_buffer::{QueueKind, SinkConfig};
use fgate_config::{load_config, GatewayConfig};

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::BinResult;

/// Loads and validates the configuration, then prints a summary.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let config_path = &cli.config;
    let config = load_config(config_path)?;
    let warnings = collect_warnings(&config);

    match args.format {
        OutputFormat::Text => {
            println!("✓ Configuration is valid: {}", config_path.display());
            println!();
            println!("Summary:");
            println!("  Gateway ID: {}", config.gateway.id);
            println!(
                "  Drivers:    {} ({} enabled)",
                config.drivers.len(),
                config.enabled_drivers().count()
            );
            for driver in &config.drivers {
                println!(
                    "    - {} [{}]{}",
                    driver.id,
                    driver.adapter,
                    if driver.enabled { "" } else { " disabled" }
                );
            }
            println!("  Loggers:    {}", config.loggers.len());
            for logger in &config.loggers {
                println!(
                    "    - {} ({} topics, {} queue)",
                    logger.id,
                    logger.topics.len(),
                    queue_kind_name(logger.queue.kind)
                );
            }

            if !warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &warnings {
                    println!("  ⚠ {}", warning);
                }
            }

            if args.show_config {
                println!();
                println!("Parsed configuration:");
                println!("{}", to_pretty_json(&config)?);
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "config_path": config_path.display().to_string(),
                "summary": {
                    "gateway_id": config.gateway.id,
                    "driver_count": config.drivers.len(),
                    "enabled_driver_count": config.enabled_drivers().count(),
                    "logger_count": config.loggers.len(),
                },
                "warnings": warnings,
                "config": if args.show_config { Some(&config) } else { None },
            });
            println!("{}", to_pretty_json(&output)?);
        }
    }

    Ok(())
}

/// Problems that do not make the configuration invalid but are probably
/// mistakes.
pub fn collect_warnings(config: &GatewayConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.drivers.is_empty() {
        warnings.push("No drivers configured".to_string());
    }
    if config.loggers.is_empty() {
        warnings.push("No loggers configured".to_string());
    }

    let enabled: HashSet<&str> = config.enabled_drivers().map(|d| d.id.as_str()).collect();
    for logger in &config.loggers {
        if logger.topics.is_empty() {
            warnings.push(format!("Logger '{}' has no topics", logger.id));
        }
        for topic in logger.parsed_topics() {
            if !enabled.contains(topic.system_name.as_str()) {
                warnings.push(format!(
                    "Logger '{}' topic '{}' names no enabled driver",
                    logger.id, topic.topic_name
                ));
            }
        }
        if logger.queue.kind == QueueKind::Memory {
            if let SinkConfig::JsonLines { .. } = logger.sink {
                warnings.push(format!(
                    "Logger '{}' writes to a file from a memory queue; points are lost on restart",
                    logger.id
                ));
            }
        }
    }

    warnings
}

fn queue_kind_name(kind: QueueKind) -> &'static str {
    match kind {
        QueueKind::Memory => "memory",
        QueueKind::Disk => "disk",
    }
}

fn to_pretty_json<T: serde::Serialize>(value: &T) -> BinResult<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fgate_buffer::LoggerConfig;
    use fgate_config::DriverEntry;

    #[test]
    fn test_empty_config_warnings() {
        let warnings = collect_warnings(&GatewayConfig::default());
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_topic_without_driver_warns() {
        let mut config = GatewayConfig::default();
        config.drivers.push(DriverEntry::new("Line1", "loopback"));
        config.loggers.push(
            LoggerConfig::new("archive")
                .with_topic("Opc/Line1/Node/2/Speed")
                .with_topic("Opc/Line9/Node/2/Speed"),
        );

        let warnings = collect_warnings(&config);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Line9"));
    }
}
