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

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::exit;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use emex::driver::{shell::run_shell, BatchRunner, ScenarioRunner};
use emex_model::scenario::Scenario;

/// Run, batch and inspect EMOE scenarios against an emexd server.
#[derive(Debug, Parser)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run an EMEX scenario from an EMEX yaml file.
    Run(RunArgs),
    /// Run one or more scenarios in batch.
    Batch(BatchArgs),
    /// Interactively build and control EMOEs.
    Shell(ShellArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// IPV4 address of the emexd server.
    #[clap(long, default_value = "127.0.0.1")]
    address: String,
    /// Listening port of the emexd server.
    #[clap(long, default_value_t = 49901)]
    port: u16,
    /// Directory for output data artifacts. By default, a sub-directory
    /// is created in the current directory as emoe_handle.emoe_name.
    #[clap(long = "output-path")]
    output_path: Option<PathBuf>,
    /// Run the monitor and save its output to output-path.
    #[clap(long)]
    monitor: bool,
    /// Name for the EMOE.
    emoename: String,
    /// The EMEX scenario file.
    scenariofile: PathBuf,
}

#[derive(Debug, Args)]
struct BatchArgs {
    /// IPV4 address of the emexd server.
    #[clap(long, default_value = "127.0.0.1")]
    address: String,
    /// Listening port of the emexd server.
    #[clap(long, default_value_t = 49901)]
    port: u16,
    /// Directory for output data artifacts. For each scenario that is
    /// run, a subdirectory is created as emoe_handle.emoe_name.
    #[clap(long = "output-path")]
    output_path: Option<PathBuf>,
    /// The number of times to run each scenario.
    #[clap(long, default_value_t = 1)]
    numtrials: usize,
    /// Run the monitor for each emoe.
    #[clap(long)]
    monitor: bool,
    /// One or more EMEX scenario files to run in batch.
    #[clap(required = true)]
    scenariofiles: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct ShellArgs {
    /// IPV4 address of the emexd server.
    #[clap(long, default_value = "127.0.0.1")]
    address: String,
    /// Listening port of the emexd server.
    #[clap(long, default_value_t = 49901)]
    port: u16,
}

fn main() {
    pretty_env_logger::init_timed();

    let args = Cli::parse();

    match args.command {
        Command::Run(args) => run(args),
        Command::Batch(args) => batch(args),
        Command::Shell(args) => {
            if let Err(e) = run_shell(&args.address, args.port) {
                eprintln!("{e}");
                exit(1);
            }
        }
    }
}

fn run(args: RunArgs) {
    if !args.scenariofile.is_file() {
        eprintln!(
            "Cannot find scenario file \"{}\", quitting",
            args.scenariofile.display()
        );
        exit(1);
    }

    if let Some(output_path) = &args.output_path {
        if output_path.exists() {
            eprintln!(
                "output-path \"{}\" already exists. Quitting",
                output_path.display()
            );
            exit(3);
        }
    }

    let scenario = match Scenario::from_file(&args.scenariofile) {
        Ok(scenario) => scenario,
        Err(e) => {
            eprintln!("{e}");
            exit(1);
        }
    };

    let mut runner = match ScenarioRunner::new(
        (&args.address, args.port),
        &args.emoename,
        scenario,
        args.output_path,
        args.monitor,
    ) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("{e}");
            exit(1);
        }
    };

    log::info!(
        "{} requires {} cpus from server that has {} total allocated to it",
        args.emoename,
        runner.required_cpus(),
        runner.total_cpus()
    );

    if let Err(e) = runner.run() {
        eprintln!("{e}");
        exit(1);
    }
}

fn batch(args: BatchArgs) {
    for scenariofile in &args.scenariofiles {
        if !scenariofile.is_file() {
            eprintln!(
                "Cannot find scenario file \"{}\". Quitting.",
                scenariofile.display()
            );
            exit(1);
        }
    }

    if args.monitor && args.output_path.is_none() {
        eprintln!("Found \"monitor\" argument without \"output-path\" argument. Quitting.");
        exit(2);
    }

    if let Some(output_path) = &args.output_path {
        if !output_path.exists() {
            println!("Creating output-path \"{}\".", output_path.display());
            if let Err(e) = std::fs::create_dir_all(output_path) {
                eprintln!("Cannot create \"{}\": {e}. Quitting.", output_path.display());
                exit(3);
            }
        } else if !output_path.is_dir() {
            eprintln!(
                "Found output-path \"{}\" is not a directory. Quitting.",
                output_path.display()
            );
            exit(3);
        }
    }

    let mut scenarios = Vec::new();
    for scenariofile in &args.scenariofiles {
        match Scenario::from_file(scenariofile) {
            Ok(scenario) => scenarios.push(scenario),
            Err(e) => {
                eprintln!("{e}");
                exit(1);
            }
        }
    }

    let names: BTreeSet<&str> = scenarios.iter().map(|s| s.name()).collect();
    if names.len() != scenarios.len() {
        eprintln!("Found duplicate scenario names. Quitting.");
        exit(4);
    }

    let stop_flag = Arc::new(AtomicBool::new(false));
    {
        let stop_flag = stop_flag.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            stop_flag.store(true, Ordering::Relaxed);
        }) {
            eprintln!("cannot install the interrupt handler: {e}");
        }
    }

    let mut runner = match BatchRunner::new(
        (&args.address, args.port),
        scenarios,
        args.numtrials,
        args.output_path,
        stop_flag,
    ) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("{e}");
            exit(1);
        }
    };

    if let Err(e) = runner.run(Duration::from_secs(1)) {
        eprintln!("{e}");
        exit(1);
    }
}
