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

//! Platform templates, platform types and configured platform instances.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    component::Component,
    param::{ParamGroupType, ParamValue},
    types::{EmexKind, ModelError},
};

/// Per-component user configuration overlay:
/// `component → group → param → values`.
pub type UserConfig = BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<ParamValue>>>>;

/// A platform template names the components a platform type must supply
/// and their roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformTemplate {
    name: String,
    description: String,
    components: BTreeMap<String, TemplateComponent>,
}

/// The role of one component slot within a platform template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateComponent {
    /// Slot name (becomes the component name).
    pub name: String,
    /// The family the slot must be filled from.
    pub kind: EmexKind,
    /// `true` iff the component terminates traffic flows.
    pub traffic_endpoint: bool,
    /// `true` iff the component publishes testpoint probes.
    pub testpoint_publisher: bool,
}

impl TemplateComponent {
    /// Waveform components are emane nodes.
    pub fn emane_node(&self) -> bool {
        self.kind == EmexKind::Waveform
    }
}

impl PlatformTemplate {
    /// Create a new platform template.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        components: Vec<TemplateComponent>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            components: components
                .into_iter()
                .map(|c| (c.name.clone(), c))
                .collect(),
        }
    }

    /// The template name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The template description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The component slots, ordered by name.
    pub fn components(&self) -> impl Iterator<Item = &TemplateComponent> {
        self.components.values()
    }

    /// Look up one component slot.
    pub fn component(&self, name: &str) -> Option<&TemplateComponent> {
        self.components.get(name)
    }
}

/// The concrete typing of one component slot: the slot role plus the
/// parameter group schema pulled from the waveform/host registries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentType {
    /// Slot name.
    pub name: String,
    /// Component family.
    pub kind: EmexKind,
    /// Concrete typing value, e.g. `rfpipe` or `lte.enb`.
    pub value: String,
    /// Name of the configuration template directory for this typing.
    pub template: String,
    /// `true` iff the component terminates traffic flows.
    pub traffic_endpoint: bool,
    /// `true` iff the component publishes testpoint probes.
    pub testpoint_publisher: bool,
    /// Parameter group schema.
    pub groups: BTreeMap<String, ParamGroupType>,
}

/// A platform type composes a [`PlatformTemplate`] with concrete component
/// typings for every slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformType {
    name: String,
    description: String,
    template_name: String,
    components: BTreeMap<String, ComponentType>,
}

impl PlatformType {
    /// Create a new platform type.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        template_name: impl Into<String>,
        components: Vec<ComponentType>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            template_name: template_name.into(),
            components: components
                .into_iter()
                .map(|c| (c.name.clone(), c))
                .collect(),
        }
    }

    /// The platform type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The platform type description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The name of the template this type was composed from.
    pub fn template_name(&self) -> &str {
        &self.template_name
    }

    /// The component typings, ordered by slot name.
    pub fn components(&self) -> impl Iterator<Item = &ComponentType> {
        self.components.values()
    }

    /// Create a [`Component`] for each typing, with `user_config` values
    /// overriding the schema defaults and `labels` attached per slot.
    pub fn configure_components(
        &self,
        user_config: &UserConfig,
        labels: &BTreeMap<String, Vec<String>>,
    ) -> Result<Vec<Component>, ModelError> {
        let mut components = Vec::new();

        for ct in self.components.values() {
            let mut groups: BTreeMap<String, _> = ct
                .groups
                .values()
                .map(|gt| (gt.group().to_string(), gt.default_group()))
                .collect();

            if let Some(overlay) = user_config.get(&ct.name) {
                for (pg_name, params) in overlay {
                    let group = groups.get_mut(pg_name).ok_or_else(|| {
                        ModelError::NoSuchGroup(ct.name.clone(), pg_name.clone())
                    })?;
                    for (p_name, values) in params {
                        group.set_param(p_name, values.clone())?;
                    }
                }
            }

            components.push(Component::new(
                ct.name.clone(),
                ct.kind,
                ct.value.clone(),
                ct.kind == EmexKind::Waveform,
                ct.traffic_endpoint,
                ct.testpoint_publisher,
                labels
                    .get(&ct.name)
                    .map(|ls| ls.iter().cloned().collect())
                    .unwrap_or_default(),
                groups.into_values().collect(),
            ));
        }

        Ok(components)
    }
}

/// A named node of an EMOE: a platform type instantiated with concrete
/// parameter values. Platforms sort by name so that iteration over an EMOE
/// is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    name: String,
    platform_type_name: String,
    template_name: String,
    components: BTreeMap<String, Component>,
}

impl Platform {
    /// Instantiate a platform from its type, overlaying `user_config` on
    /// the schema defaults.
    pub fn new(
        name: impl Into<String>,
        platform_type: &PlatformType,
        user_config: &UserConfig,
        labels: &BTreeMap<String, Vec<String>>,
    ) -> Result<Self, ModelError> {
        let components = platform_type.configure_components(user_config, labels)?;
        Ok(Self {
            name: name.into(),
            platform_type_name: platform_type.name().to_string(),
            template_name: platform_type.template_name().to_string(),
            components: components
                .into_iter()
                .map(|c| (c.name().to_string(), c))
                .collect(),
        })
    }

    /// The platform name (unique within an EMOE).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name of the platform type this platform was built from.
    pub fn platform_type_name(&self) -> &str {
        &self.platform_type_name
    }

    /// The name of the underlying platform template.
    pub fn template_name(&self) -> &str {
        &self.template_name
    }

    /// The components of the platform, ordered by name.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    /// Mutable access to the components, ordered by name.
    pub fn components_mut(&mut self) -> impl Iterator<Item = &mut Component> {
        self.components.values_mut()
    }

    /// The sorted component names.
    pub fn component_names(&self) -> Vec<&str> {
        self.components.keys().map(String::as_str).collect()
    }

    /// Look up a component by name.
    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.get(name)
    }

    /// All nemids assigned to components of this platform. Components
    /// without an `emane.nemid` parameter are skipped.
    pub fn nemids(&self) -> Vec<i64> {
        self.components.values().filter_map(Component::nemid).collect()
    }

    /// The number of cpus the platform requires: the ceiling of the summed
    /// `resources.cpus` parameters over all components.
    pub fn cpus(&self) -> u32 {
        let total: f64 = self
            .components
            .values()
            .filter_map(|c| c.get_param("resources", "cpus").ok())
            .flat_map(|p| p.value().iter().filter_map(ParamValue::as_float))
            .sum();
        total.ceil() as u32
    }

    /// `true` iff every component is fully configured.
    pub fn configured(&self) -> bool {
        self.components.values().all(Component::configured)
    }

    /// All `(component, group, param)` triples with an empty value.
    pub fn unconfigured(&self) -> Vec<(String, String, String)> {
        self.components
            .values()
            .flat_map(Component::unconfigured)
            .collect()
    }

    /// All `(component, group, param, value)` tuples of the platform,
    /// ordered by component then group then parameter name.
    pub fn get_params(&self) -> Vec<(String, String, String, Vec<ParamValue>)> {
        self.components
            .values()
            .flat_map(|c| {
                c.get_params()
                    .into_iter()
                    .map(|(pg, p, v)| (c.name().to_string(), pg, p, v))
            })
            .collect()
    }

    /// Look up a parameter addressed by `(component, group, param)`.
    pub fn get_param(
        &self,
        c_name: &str,
        pg_name: &str,
        p_name: &str,
    ) -> Result<&crate::param::Param, ModelError> {
        self.components
            .get(c_name)
            .ok_or_else(|| ModelError::NoSuchComponent(self.name.clone(), c_name.to_string()))?
            .get_param(pg_name, p_name)
    }

    /// Overwrite a parameter addressed by `(component, group, param)`.
    pub fn set_param(
        &mut self,
        c_name: &str,
        pg_name: &str,
        p_name: &str,
        value: Vec<ParamValue>,
    ) -> Result<(), ModelError> {
        let name = self.name.clone();
        self.components
            .get_mut(c_name)
            .ok_or_else(|| ModelError::NoSuchComponent(name, c_name.to_string()))?
            .set_param(pg_name, p_name, value)
    }

    /// Attach a label to one component.
    pub fn add_label(
        &mut self,
        c_name: &str,
        label: impl Into<String>,
    ) -> Result<(), ModelError> {
        let name = self.name.clone();
        self.components
            .get_mut(c_name)
            .ok_or_else(|| ModelError::NoSuchComponent(name, c_name.to_string()))?
            .add_label(label);
        Ok(())
    }
}
