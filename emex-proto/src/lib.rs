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

//! Wire protocol shared by the EmEx daemon, the in-container agent and
//! the scenario clients.
//!
//! Every peer exchanges frames of the universal envelope
//! `uint32 big-endian length || payload`; payloads are the serialized
//! message enums of [`messages`]. Message compatibility is field-tag
//! stable: variants and fields may be appended but never reordered or
//! removed.

pub mod frame;
pub mod messages;

pub use frame::{encode_frame, FrameError, FrameReader, MAX_FRAME_LEN};
pub use messages::*;

/// Default address the daemon listens on for clients.
pub const DEFAULT_CLIENT_LISTEN_ADDRESS: &str = "127.0.0.1";
/// Default port the daemon listens on for clients.
pub const DEFAULT_CLIENT_LISTEN_PORT: u16 = 49901;
/// Default address the daemon listens on for launched containers (the
/// standard docker0 address).
pub const DEFAULT_CONTAINER_LISTEN_ADDRESS: &str = "172.17.0.1";
/// Default port the daemon listens on for launched containers.
pub const DEFAULT_CONTAINER_LISTEN_PORT: u16 = 49902;
/// Default port the in-container agent listens on for one scenario
/// driver.
pub const DEFAULT_SCENARIO_LISTEN_PORT: u16 = 3000;
