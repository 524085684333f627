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

//! Shared type definitions and the model error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The three component families of the model. The family decides which
/// registry a component typing is resolved from and whether the component
/// is an emane node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmexKind {
    /// A radio component (always an emane node).
    Waveform,
    /// A host component (traffic endpoints, application servers).
    Host,
    /// A standalone antenna definition.
    Antenna,
}

impl std::fmt::Display for EmexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmexKind::Waveform => f.write_str("waveform"),
            EmexKind::Host => f.write_str("host"),
            EmexKind::Antenna => f.write_str("antenna"),
        }
    }
}

/// Errors raised while building, completing or validating the model.
///
/// Validation errors are never exposed as type names on the wire; the
/// daemon flattens them into a `FAIL` result with the display string.
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    /// A parameter or parameter type name contains a `.`.
    #[error("Illegal character \".\" in {0}. Quitting.")]
    DottedName(String),
    /// Lookup of a parameter within a group failed.
    #[error("No parameter \"{1}\" in parameter group \"{0}\".")]
    NoSuchParam(String, String),
    /// Lookup of a parameter group within a component failed.
    #[error("No parameter group \"{1}\" in component \"{0}\".")]
    NoSuchGroup(String, String),
    /// Lookup of a component within a platform failed.
    #[error("No component \"{1}\" in platform \"{0}\".")]
    NoSuchComponent(String, String),
    /// A platform references an unknown platform type.
    #[error("Unknown platform type \"{1}\" for platform \"{0}\".")]
    UnknownPlatformType(String, String),
    /// An antenna references an unknown antenna type.
    #[error("Unknown antenna type \"{1}\" for antenna \"{0}\".")]
    UnknownAntennaType(String, String),
    /// An antenna configuration carries a parameter the type does not have.
    #[error("Unknown antenna parameter \"{0}\".")]
    UnknownAntennaParam(String),
    /// A platform template requires a component the platform does not name.
    #[error(
        "Platform template \"{0}\" requires component \"{1}\" but it is \
         not provided by platform type \"{2}\". Quitting."
    )]
    MissingTemplateComponent(String, String, String),
    /// A platform type references a component typing missing from the
    /// waveform/host registries.
    #[error("Unknown component typing \"{1}\" referenced by platform type \"{0}\".")]
    UnknownComponentTyping(String, String),
    /// A platform still has unconfigured parameters after the helper pass.
    #[error("Platform \"{0}\" has unconfigured parameters \"{1}\".")]
    Unconfigured(String, String),
    /// A helper rule was violated.
    #[error("{0}")]
    HelperCheck(String),
    /// `phy.antenna0` names an antenna that is not part of the EMOE.
    #[error("For platform \"{0}\" unknown antenna0 name \"{1}\"")]
    UnknownAntenna(String, String),
    /// An initial condition references an unknown platform.
    #[error("Unknown platform \"{0}\" in initial conditions.")]
    UnknownInitialConditionPlatform(String),
    /// Duplicate platform name within one EMOE.
    #[error("Duplicate platform name \"{0}\".")]
    DuplicatePlatform(String),
    /// A scenario line could not be parsed.
    #[error("{0}")]
    ScenarioParse(String),
    /// A template file could not be loaded.
    #[error("{0}")]
    TemplateLoad(String),
}
