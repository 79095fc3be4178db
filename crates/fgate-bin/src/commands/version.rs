// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `version` command.

use crate::cli::Cli;
use crate::error::BinResult;

/// Prints component versions and build information.
pub fn version(_cli: &Cli) -> BinResult<()> {
    println!("fgate - industrial data gateway");
    println!();
    println!("Version Information:");
    println!("  fgate-bin:    {}", env!("CARGO_PKG_VERSION"));
    println!("  fgate-core:   {}", fgate_core::VERSION);
    println!("  fgate-config: {}", fgate_config::VERSION);
    println!("  fgate-buffer: {}", fgate_buffer::VERSION);
    println!();
    println!("Build Information:");
    println!("  Target:       {}", std::env::consts::ARCH);
    println!("  OS:           {}", std::env::consts::OS);
    println!();
    println!("License: PolyForm Noncommercial License 1.0.0");
    println!("Copyright (c) 2025 Sylvex. All rights reserved.");

    Ok(())
}
