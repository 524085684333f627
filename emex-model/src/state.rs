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

//! The totally ordered lifecycle state of an EMOE.

use serde::{Deserialize, Serialize};

/// Lifecycle state of an EMOE. The order of the variants is the order of
/// the lifecycle: a runtime's state only ever advances, never regresses.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmoeState {
    /// Accepted and waiting for its container to come up.
    Queued,
    /// The in-container agent has dialed back to the daemon.
    Connected,
    /// The inner emulator is booting.
    Starting,
    /// The emulation is running and endpoints are published.
    Running,
    /// The emulation is being reconfigured.
    Updating,
    /// Teardown has begun.
    Stopping,
    /// Terminal: the EMOE stopped.
    Stopped,
    /// Terminal: the EMOE failed to start or run.
    Failed,
}

impl EmoeState {
    /// The canonical upper-case name of the state.
    pub fn name(&self) -> &'static str {
        match self {
            EmoeState::Queued => "QUEUED",
            EmoeState::Connected => "CONNECTED",
            EmoeState::Starting => "STARTING",
            EmoeState::Running => "RUNNING",
            EmoeState::Updating => "UPDATING",
            EmoeState::Stopping => "STOPPING",
            EmoeState::Stopped => "STOPPED",
            EmoeState::Failed => "FAILED",
        }
    }

    /// `true` iff this is one of the terminal states.
    pub fn terminal(&self) -> bool {
        matches!(self, EmoeState::Stopped | EmoeState::Failed)
    }
}

impl std::fmt::Display for EmoeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
