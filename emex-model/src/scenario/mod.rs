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

//! Declarative scenarios: the YAML file format, the event line grammars
//! and the wall-clock event sequencer.

mod events;
mod parser;
mod sequencer;

pub use events::{
    EventSet, EventTime, FlowOffRequest, FlowOnRequest, FlowPattern, JamOffEvent, JamOnEvent,
    TrafficProtocol,
};
pub use parser::Scenario;
pub use sequencer::{Clock, EventSequencer, SystemClock};
