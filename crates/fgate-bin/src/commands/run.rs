// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `run` command.

use tracing::info;

use crate::cli::{Cli, RunArgs};
use crate::error::BinResult;
use crate::runtime::RuntimeBuilder;

/// Starts the gateway and blocks until it has shut down.
pub async fn run(cli: &Cli, args: RunArgs) -> BinResult<()> {
    info!(config = %cli.config.display(), "Loading configuration");

    let runtime = RuntimeBuilder::new()
        .config_path(&cli.config)
        .shutdown_timeout(args.shutdown_timeout)
        .build()?;

    runtime.run().await
}
