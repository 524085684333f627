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

//! Standalone antenna definitions and the structural antenna profile.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    param::{Param, ParamType, ParamValue},
    types::ModelError,
};

/// An antenna type: a named parameter bag with defaults (beamwidths, gain,
/// rejection and mount-point offsets north/east/up).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntennaType {
    name: String,
    description: String,
    paramtypes: BTreeMap<String, ParamType>,
}

impl AntennaType {
    /// Create a new antenna type.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        paramtypes: Vec<ParamType>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            paramtypes: paramtypes
                .into_iter()
                .map(|pt| (pt.name().to_string(), pt))
                .collect(),
        }
    }

    /// The antenna type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The antenna type description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The parameter types, ordered by name.
    pub fn paramtypes(&self) -> impl Iterator<Item = &ParamType> {
        self.paramtypes.values()
    }
}

/// A named antenna instance: the type defaults overlaid with user values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Antenna {
    name: String,
    antennatype_name: String,
    params: BTreeMap<String, Param>,
}

impl Antenna {
    /// Create an antenna instance from its type. Unknown parameter names
    /// in `config` are rejected.
    pub fn new(
        name: impl Into<String>,
        antennatype: &AntennaType,
        config: &BTreeMap<String, Vec<ParamValue>>,
    ) -> Result<Self, ModelError> {
        let mut params: BTreeMap<String, Param> = antennatype
            .paramtypes
            .values()
            .map(|pt| {
                (
                    pt.name().to_string(),
                    Param::new(pt.name(), pt.default().to_vec()).expect("checked on type creation"),
                )
            })
            .collect();

        for (p_name, values) in config {
            let param = params
                .get_mut(p_name)
                .ok_or_else(|| ModelError::UnknownAntennaParam(p_name.clone()))?;
            param.set(values.clone());
        }

        Ok(Self {
            name: name.into(),
            antennatype_name: antennatype.name.clone(),
            params,
        })
    }

    /// The antenna name (unique within an EMOE).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name of the antenna type.
    pub fn antennatype_name(&self) -> &str {
        &self.antennatype_name
    }

    /// The antenna parameters, ordered by name.
    pub fn params(&self) -> impl Iterator<Item = &Param> {
        self.params.values()
    }

    /// Look up one parameter by name.
    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.get(name)
    }

    fn offset(&self, name: &str) -> f64 {
        self.params
            .get(name)
            .and_then(|p| p.first())
            .and_then(ParamValue::as_float)
            .unwrap_or(0.0)
    }

    /// The mount-point offset to the north in meters.
    pub fn north(&self) -> f64 {
        self.offset("north")
    }

    /// The mount-point offset to the east in meters.
    pub fn east(&self) -> f64 {
        self.offset("east")
    }

    /// The mount-point offset upwards in meters.
    pub fn up(&self) -> f64 {
        self.offset("up")
    }
}

/// An antenna pattern together with its mount-point offsets. Equality and
/// hashing are structural over `(antenna name, north, east, up)` so that
/// the configuration builder can deduplicate profile files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntennaProfile {
    antenna: Antenna,
    north: f64,
    east: f64,
    up: f64,
}

impl AntennaProfile {
    /// Create a new profile.
    pub fn new(antenna: Antenna, north: f64, east: f64, up: f64) -> Self {
        Self {
            antenna,
            north,
            east,
            up,
        }
    }

    /// The underlying antenna.
    pub fn antenna(&self) -> &Antenna {
        &self.antenna
    }

    /// The antenna name.
    pub fn name(&self) -> &str {
        self.antenna.name()
    }

    /// Offset to the north in meters.
    pub fn north(&self) -> f64 {
        self.north
    }

    /// Offset to the east in meters.
    pub fn east(&self) -> f64 {
        self.east
    }

    /// Offset upwards in meters.
    pub fn up(&self) -> f64 {
        self.up
    }

    fn key(&self) -> (&str, u64, u64, u64) {
        (
            self.antenna.name(),
            self.north.to_bits(),
            self.east.to_bits(),
            self.up.to_bits(),
        )
    }
}

impl PartialEq for AntennaProfile {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for AntennaProfile {}

impl std::hash::Hash for AntennaProfile {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}
