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

//! The EmEx emulation orchestrator.
//!
//! EmEx accepts declarative descriptions of wireless network emulations
//! (EMOEs), validates them against the installed resource templates,
//! allocates host cpus and TCP ports, launches one container per EMOE
//! with a generated configuration tree, and mediates the control plane
//! between external clients, the `emexd` daemon and the per-EMOE
//! in-container scenario agents.
//!
//! The crate is organized along the deployment roles:
//! - [`daemon`]: the `emexd` orchestrator — resource trackers, the
//!   per-EMOE state machine, the container worker and the framed TCP
//!   protocol frontend.
//! - [`agent`]: the `emex-containerd` process running inside each EMOE
//!   container — lifecycle signalling, heartbeat, and the scenario event
//!   fan-out to the traffic, emulator-event and jammer sinks.
//! - [`driver`]: the `emex` client — single-shot runs, multi-trial batch
//!   scheduling and the interactive shell.
//! - [`builder`]: deterministic materialisation of a per-EMOE
//!   configuration tree.
//! - [`engine`]: the abstract container engine and the docker CLI
//!   implementation.

pub mod agent;
pub mod builder;
pub mod config;
pub mod daemon;
pub mod driver;
pub mod engine;
pub mod resource;
pub mod runtime;
pub mod timestamp;

#[cfg(test)]
mod test;

use thiserror::Error;

/// Top level error of the orchestrator binaries.
#[derive(Debug, Error)]
pub enum EmexError {
    /// Error from the typed model.
    #[error("{0}")]
    Model(#[from] emex_model::ModelError),
    /// Error from the framing layer.
    #[error("{0}")]
    Frame(#[from] emex_proto::FrameError),
    /// Daemon configuration error; fatal at init.
    #[error("{0}")]
    Config(#[from] config::ConfigError),
    /// Resource tracker error.
    #[error("{0}")]
    Resource(#[from] resource::ResourceError),
    /// Configuration tree builder error.
    #[error("{0}")]
    Builder(#[from] builder::BuilderError),
    /// Container engine error.
    #[error("{0}")]
    Engine(#[from] engine::EngineError),
    /// Scenario driver error.
    #[error("{0}")]
    Driver(#[from] driver::DriverError),
    /// I/O error.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}
