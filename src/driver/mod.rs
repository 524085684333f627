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

//! The scenario driver: batch and single-run controllers, the blocking
//! RPC clients, and the interactive shell.

pub mod batch;
pub mod client;
pub mod run;
pub mod shell;

pub use batch::BatchRunner;
pub use client::{EmexdClient, ScenarioClient};
pub use run::ScenarioRunner;

use thiserror::Error;

use emex_model::ModelError;
use emex_proto::FrameError;

/// Errors raised by the driver side.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Socket I/O failed.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// A frame could not be decoded.
    #[error("{0}")]
    Frame(#[from] FrameError),
    /// A payload could not be decoded.
    #[error("cannot decode reply: {0}")]
    Decode(#[from] serde_json::Error),
    /// The model rejected the scenario.
    #[error("{0}")]
    Model(#[from] ModelError),
    /// The peer closed the connection mid-request.
    #[error("connection closed by peer")]
    ConnectionClosed,
    /// The daemon replied with an unexpected message kind.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
    /// A request was answered with FAIL.
    #[error("{0}")]
    Failed(String),
}

/// An endpoint monitor spawned for a running EMOE. Measurement readout
/// is outside the orchestrator core; this seam only carries the
/// lifecycle.
pub trait Monitor {
    /// Start monitoring the testpoint publish endpoint.
    fn start(&mut self, output_path: &std::path::Path, endpoint: (String, u16));
    /// Stop monitoring; receives the final flow table.
    fn stop(&mut self, flows: &[emex_proto::FlowRecord]);
}

/// A monitor that only logs the lifecycle.
#[derive(Debug, Default)]
pub struct LogMonitor;

impl Monitor for LogMonitor {
    fn start(&mut self, output_path: &std::path::Path, endpoint: (String, u16)) {
        log::info!(
            "monitor started for {}:{} writing to {}",
            endpoint.0,
            endpoint.1,
            output_path.display()
        );
    }

    fn stop(&mut self, flows: &[emex_proto::FlowRecord]) {
        log::info!("monitor stopped with {} flows", flows.len());
    }
}
