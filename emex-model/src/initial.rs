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

//! Initial conditions: the `-Inf`-timestamped POV, pathloss and antenna
//! pointing state a platform starts with.

use serde::{Deserialize, Serialize};

/// Position, orientation and velocity of a platform (or a subset of its
/// components).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pov {
    /// The components the POV applies to; empty means all components of
    /// the platform.
    #[serde(default)]
    pub component_names: Vec<String>,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude in meters.
    pub altitude: f64,
    /// Velocity azimuth in degrees.
    #[serde(default)]
    pub azimuth: f64,
    /// Velocity elevation in degrees.
    #[serde(default)]
    pub elevation: f64,
    /// Velocity magnitude in meters per second.
    #[serde(default)]
    pub speed: f64,
    /// Orientation pitch in degrees.
    #[serde(default)]
    pub pitch: f64,
    /// Orientation roll in degrees.
    #[serde(default)]
    pub roll: f64,
    /// Orientation yaw in degrees.
    #[serde(default)]
    pub yaw: f64,
}

/// A pathloss entry towards a remote platform. Pathloss is symmetric:
/// consumers publish both directions with the same decibel value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathlossEntry {
    /// The remote platform name.
    pub remote_platform: String,
    /// The attenuation in decibel.
    pub pathloss_db: f64,
    /// Local components the entry applies to; empty means all.
    #[serde(default)]
    pub component_names: Vec<String>,
    /// Remote components the entry applies to; empty means all.
    #[serde(default)]
    pub remote_component_names: Vec<String>,
}

/// An antenna pointing for a platform (or a subset of its components).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntennaPointing {
    /// The components the pointing applies to; empty means all components
    /// of the platform that have an antenna assignment.
    #[serde(default)]
    pub component_names: Vec<String>,
    /// Pointing azimuth in degrees.
    pub azimuth: f64,
    /// Pointing elevation in degrees.
    pub elevation: f64,
}

/// The initial state of one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialCondition {
    /// The platform the condition applies to; must exist in the EMOE.
    pub platform_name: String,
    /// Optional initial POV.
    #[serde(default)]
    pub pov: Option<Pov>,
    /// Initial pathloss entries.
    #[serde(default)]
    pub pathlosses: Vec<PathlossEntry>,
    /// Initial antenna pointings.
    #[serde(default)]
    pub antenna_pointings: Vec<AntennaPointing>,
}

impl InitialCondition {
    /// Create a new initial condition.
    pub fn new(
        platform_name: impl Into<String>,
        pov: Option<Pov>,
        pathlosses: Vec<PathlossEntry>,
        antenna_pointings: Vec<AntennaPointing>,
    ) -> Self {
        Self {
            platform_name: platform_name.into(),
            pov,
            pathlosses,
            antenna_pointings,
        }
    }
}
