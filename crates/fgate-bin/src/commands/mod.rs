// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI command implementations.
//!
//! - `run`: start the gateway
//! - `validate`: check a configuration file
//! - `topic`: parse a topic address
//! - `version`: show version information

mod run;
mod topic;
mod validate;
mod version;

pub use run::run;
pub use topic::{describe_topic, topic};
pub use validate::{collect_warnings, validate};
pub use version::version;

use crate::cli::{Cli, Commands};
use crate::error::BinResult;

/// Executes the command selected on the command line.
pub async fn execute(cli: Cli) -> BinResult<()> {
    match cli.effective_command() {
        Commands::Run(args) => run::run(&cli, args).await,
        Commands::Validate(args) => validate::validate(&cli, args),
        Commands::Topic(args) => topic::topic(&cli, args),
        Commands::Version => version::version(&cli),
    }
}
