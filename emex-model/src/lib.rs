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

//! Typed model of an Emulated Multi-Operator Environment (EMOE).
//!
//! An EMOE is a graph of *platforms* (named nodes), each aggregating typed
//! *components* (radios, hosts, traffic endpoints), cross-linked by
//! *antennas* and *initial conditions*. This crate contains the schema and
//! value store for the model ([`Param`], [`ParamGroup`], [`Component`],
//! [`Platform`], [`Antenna`], [`Emoe`]), the template registries that the
//! orchestrator loads at startup ([`ModelRegistry`]), the rule-driven
//! configuration helpers that auto-complete and validate an EMOE before it
//! is admitted ([`helpers`]), and the declarative scenario format driving a
//! running EMOE ([`scenario`]).
//!
//! All iteration over platforms and components is by sorted name. Two
//! identical EMOEs always produce identical iteration orders, which the
//! configuration builder in the `emex` crate relies on for byte-identical
//! output.

pub mod antenna;
pub mod component;
pub mod emoe;
pub mod helpers;
pub mod initial;
pub mod param;
pub mod platform;
pub mod registry;
pub mod scenario;
pub mod state;
pub mod types;

pub use antenna::{Antenna, AntennaProfile, AntennaType};
pub use component::Component;
pub use emoe::{AntennaDescription, Emoe, EmoeDescription, PlatformDescription};
pub use initial::{AntennaPointing, InitialCondition, PathlossEntry, Pov};
pub use param::{Param, ParamGroup, ParamGroupType, ParamType, ParamValue};
pub use platform::{ComponentType, Platform, PlatformTemplate, PlatformType};
pub use registry::ModelRegistry;
pub use state::EmoeState;
pub use types::{EmexKind, ModelError};

#[cfg(test)]
mod test;
