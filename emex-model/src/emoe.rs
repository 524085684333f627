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

//! The EMOE: a validated graph of platforms, antennas and initial
//! conditions, plus the wire-level description it is built from.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    antenna::{Antenna, AntennaProfile},
    helpers,
    initial::InitialCondition,
    param::ParamValue,
    platform::{Platform, UserConfig},
    registry::ModelRegistry,
    types::ModelError,
};

/// One Emulated Multi-Operator Environment.
///
/// Constructing an [`Emoe`] runs the full helper pass over its platforms
/// and validates every invariant: platforms fully configured, unique NEM
/// ids, per-subnet unique IPv4 addresses, every `phy.antenna0` value
/// resolvable, and every initial condition referencing a known platform.
#[derive(Debug, Clone)]
pub struct Emoe {
    name: String,
    antennas: BTreeMap<String, Antenna>,
    platforms: Vec<Platform>,
    initial_conditions: Vec<InitialCondition>,
    antenna_assignments: BTreeMap<(String, String), AntennaProfile>,
}

impl Emoe {
    /// Build and validate an EMOE. The platforms are mutated by the
    /// configuration helpers before validation and sorted by name.
    pub fn new(
        name: impl Into<String>,
        mut platforms: Vec<Platform>,
        antennas: Vec<Antenna>,
        initial_conditions: Vec<InitialCondition>,
    ) -> Result<Self, ModelError> {
        helpers::configure_and_check(&mut platforms)?;

        platforms.sort_by(|a, b| a.name().cmp(b.name()));
        let mut seen = BTreeSet::new();
        for platform in &platforms {
            if !seen.insert(platform.name().to_string()) {
                return Err(ModelError::DuplicatePlatform(platform.name().to_string()));
            }
        }

        // antennas are unique by name
        let antennas: BTreeMap<String, Antenna> = antennas
            .into_iter()
            .map(|a| (a.name().to_string(), a))
            .collect();

        let mut antenna_assignments = BTreeMap::new();

        for platform in &platforms {
            for component in platform.components() {
                if !component.has_param("phy", "antenna0") {
                    continue;
                }

                // antenna0 must either be omni[_gain] or the name of one
                // of the directional antennas attached to this emoe
                let antennaname = component
                    .get_param("phy", "antenna0")?
                    .first()
                    .map(|v| v.to_string())
                    .unwrap_or_default();

                if antennaname.starts_with("omni") {
                    continue;
                }

                let antenna = antennas.get(&antennaname).ok_or_else(|| {
                    ModelError::UnknownAntenna(platform.name().to_string(), antennaname.clone())
                })?;

                let offset = |p: &str| -> f64 {
                    component
                        .get_param("phy", p)
                        .ok()
                        .and_then(|p| p.first().and_then(ParamValue::as_float))
                        .unwrap_or(0.0)
                };

                antenna_assignments.insert(
                    (platform.name().to_string(), component.name().to_string()),
                    AntennaProfile::new(
                        antenna.clone(),
                        offset("antenna0_north"),
                        offset("antenna0_east"),
                        offset("antenna0_up"),
                    ),
                );
            }
        }

        for ic in &initial_conditions {
            if !platforms.iter().any(|p| p.name() == ic.platform_name) {
                return Err(ModelError::UnknownInitialConditionPlatform(
                    ic.platform_name.clone(),
                ));
            }
        }

        Ok(Self {
            name: name.into(),
            antennas,
            platforms,
            initial_conditions,
            antenna_assignments,
        })
    }

    /// Resolve a description received over the wire against the model
    /// registries, re-running the full helper pass.
    pub fn from_description(
        description: &EmoeDescription,
        registry: &ModelRegistry,
    ) -> Result<Self, ModelError> {
        let mut antennas = Vec::new();
        for antenna in &description.antennas {
            let antennatype = registry.antennatype(&antenna.antenna_type).ok_or_else(|| {
                ModelError::UnknownAntennaType(
                    antenna.name.clone(),
                    antenna.antenna_type.clone(),
                )
            })?;
            antennas.push(Antenna::new(&antenna.name, antennatype, &antenna.parameters)?);
        }

        let mut platforms = Vec::new();
        for platform in &description.platforms {
            let platform_type =
                registry.platformtype(&platform.platform_type).ok_or_else(|| {
                    ModelError::UnknownPlatformType(
                        platform.name.clone(),
                        platform.platform_type.clone(),
                    )
                })?;

            let mut user_config = UserConfig::new();
            for (path, values) in &platform.parameters {
                let mut toks = path.splitn(3, '.');
                let (Some(c), Some(pg), Some(p)) = (toks.next(), toks.next(), toks.next())
                else {
                    return Err(ModelError::ScenarioParse(format!(
                        "Malformed parameter path \"{path}\" for platform \"{}\".",
                        platform.name
                    )));
                };
                user_config
                    .entry(c.to_string())
                    .or_default()
                    .entry(pg.to_string())
                    .or_default()
                    .insert(p.to_string(), values.clone());
            }

            platforms.push(Platform::new(
                &platform.name,
                platform_type,
                &user_config,
                &platform.labels,
            )?);
        }

        Emoe::new(
            &description.name,
            platforms,
            antennas,
            description.initial_conditions.clone(),
        )
    }

    /// Flatten the EMOE back into its wire description.
    pub fn to_description(&self) -> EmoeDescription {
        EmoeDescription {
            name: self.name.clone(),
            platforms: self
                .platforms
                .iter()
                .map(|platform| PlatformDescription {
                    name: platform.name().to_string(),
                    platform_type: platform.platform_type_name().to_string(),
                    labels: platform
                        .components()
                        .filter(|c| !c.labels().is_empty())
                        .map(|c| {
                            (
                                c.name().to_string(),
                                c.labels().iter().cloned().collect(),
                            )
                        })
                        .collect(),
                    parameters: platform
                        .get_params()
                        .into_iter()
                        .filter(|(_, _, _, v)| !v.is_empty())
                        .map(|(c, pg, p, v)| (format!("{c}.{pg}.{p}"), v))
                        .collect(),
                })
                .collect(),
            antennas: self
                .antennas
                .values()
                .map(|antenna| AntennaDescription {
                    name: antenna.name().to_string(),
                    antenna_type: antenna.antennatype_name().to_string(),
                    parameters: antenna
                        .params()
                        .map(|p| (p.name().to_string(), p.value().to_vec()))
                        .collect(),
                })
                .collect(),
            initial_conditions: self.initial_conditions.clone(),
        }
    }

    /// The EMOE name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The platforms, sorted by name.
    pub fn platforms(&self) -> &[Platform] {
        &self.platforms
    }

    /// Look up a platform by name.
    pub fn platform(&self, name: &str) -> Option<&Platform> {
        self.platforms.iter().find(|p| p.name() == name)
    }

    /// The attached antennas, unique by name.
    pub fn antennas(&self) -> &BTreeMap<String, Antenna> {
        &self.antennas
    }

    /// The initial conditions.
    pub fn initial_conditions(&self) -> &[InitialCondition] {
        &self.initial_conditions
    }

    /// The antenna profile assigned to `(platform, component)`, if any.
    pub fn antenna_assignment(
        &self,
        platform_name: &str,
        component_name: &str,
    ) -> Option<&AntennaProfile> {
        self.antenna_assignments
            .get(&(platform_name.to_string(), component_name.to_string()))
    }

    /// All antenna assignments keyed by `(platform, component)`.
    pub fn antenna_assignments(&self) -> &BTreeMap<(String, String), AntennaProfile> {
        &self.antenna_assignments
    }

    /// The sorted union of all NEM ids across all platforms.
    pub fn nemids(&self) -> Vec<i64> {
        let mut nemids: Vec<i64> = self
            .platforms
            .iter()
            .flat_map(|p| p.nemids())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        nemids.sort_unstable();
        nemids
    }

    /// The number of cpus the EMOE requires.
    pub fn cpus(&self) -> u32 {
        self.platforms.iter().map(Platform::cpus).sum()
    }
}

/// The wire-level description of an EMOE, as submitted by clients. The
/// daemon resolves it against its model registries and re-validates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmoeDescription {
    /// The EMOE name.
    pub name: String,
    /// Platform descriptions.
    #[serde(default)]
    pub platforms: Vec<PlatformDescription>,
    /// Antenna descriptions.
    #[serde(default)]
    pub antennas: Vec<AntennaDescription>,
    /// Initial conditions.
    #[serde(default)]
    pub initial_conditions: Vec<InitialCondition>,
}

/// One platform of an [`EmoeDescription`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformDescription {
    /// The platform name.
    pub name: String,
    /// The platform type to instantiate.
    pub platform_type: String,
    /// Labels per component.
    #[serde(default)]
    pub labels: BTreeMap<String, Vec<String>>,
    /// Parameter overlay addressed by `component.group.param`.
    #[serde(default)]
    pub parameters: BTreeMap<String, Vec<ParamValue>>,
}

/// One antenna of an [`EmoeDescription`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntennaDescription {
    /// The antenna name.
    pub name: String,
    /// The antenna type to instantiate.
    pub antenna_type: String,
    /// Parameter overlay.
    #[serde(default)]
    pub parameters: BTreeMap<String, Vec<ParamValue>>,
}
