// EmEx: Orchestrator for Emulated Multi-Operator Environments
// Copyright (C) 2023-2024 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use std::path::PathBuf;

use clap::Parser;

use emex::config::{DaemonConfig, DEFAULT_CONFIGURATION_FILE};

/// The EMEX daemon: launches one container per EMOE at client request.
#[derive(Debug, Parser)]
struct Cli {
    /// Path to the daemon XML configuration file.
    #[clap(long, short)]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_timed();

    let args = Cli::parse();

    let config = match args.config {
        Some(path) => DaemonConfig::from_file(path)?,
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIGURATION_FILE);
            if default_path.is_file() {
                DaemonConfig::from_file(default_path)?
            } else {
                DaemonConfig::default()
            }
        }
    };

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(emex::daemon::run(config))?;

    Ok(())
}
