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

//! A typed sub-element of a platform: a radio, a host or a traffic
//! endpoint.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    param::{Param, ParamGroup, ParamValue},
    types::{EmexKind, ModelError},
};

/// A typed component of a platform with its parameter groups and labels.
///
/// Labels are free-form tags the configuration helpers use to infer
/// network membership (labels starting with `net` partition components of
/// the same waveform type into subnets). The conventional parameter groups
/// are `net`, `phy`, `emane`, `rm` and `resources`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    name: String,
    kind: EmexKind,
    kind_value: String,
    emane_node: bool,
    traffic_endpoint: bool,
    testpoint_publisher: bool,
    labels: BTreeSet<String>,
    groups: BTreeMap<String, ParamGroup>,
}

impl Component {
    /// Create a new component.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        kind: EmexKind,
        kind_value: impl Into<String>,
        emane_node: bool,
        traffic_endpoint: bool,
        testpoint_publisher: bool,
        labels: BTreeSet<String>,
        groups: Vec<ParamGroup>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            kind_value: kind_value.into(),
            emane_node,
            traffic_endpoint,
            testpoint_publisher,
            labels,
            groups: groups
                .into_iter()
                .map(|g| (g.group().to_string(), g))
                .collect(),
        }
    }

    /// The component name (unique within its platform).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The component family (waveform, host or antenna).
    pub fn kind(&self) -> EmexKind {
        self.kind
    }

    /// The concrete component typing, e.g. `rfpipe` or `lte.enb`.
    pub fn kind_value(&self) -> &str {
        &self.kind_value
    }

    /// The waveform-type prefix of the typing (`lte.enb` → `lte`). The
    /// helpers group subnets and discover family helpers by this prefix.
    pub fn waveform_prefix(&self) -> &str {
        self.kind_value.split('.').next().unwrap_or(&self.kind_value)
    }

    /// `true` iff this component is an emane node (radio).
    pub fn emane_node(&self) -> bool {
        self.emane_node
    }

    /// `true` iff this component terminates traffic flows.
    pub fn traffic_endpoint(&self) -> bool {
        self.traffic_endpoint
    }

    /// `true` iff this component publishes testpoint probes.
    pub fn testpoint_publisher(&self) -> bool {
        self.testpoint_publisher
    }

    /// The sorted labels of the component.
    pub fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    /// The labels starting with `net` that partition this component into a
    /// subnet group.
    pub fn net_labels(&self) -> BTreeSet<String> {
        self.labels
            .iter()
            .filter(|l| l.to_lowercase().starts_with("net"))
            .cloned()
            .collect()
    }

    /// Attach a label.
    pub fn add_label(&mut self, label: impl Into<String>) {
        self.labels.insert(label.into());
    }

    /// The parameter groups, ordered by name.
    pub fn groups(&self) -> impl Iterator<Item = &ParamGroup> {
        self.groups.values()
    }

    /// The `emane.nemid` values, if the component carries the parameter.
    pub fn nemid(&self) -> Option<i64> {
        self.groups
            .get("emane")
            .and_then(|g| g.get_param("nemid").ok())
            .and_then(|p| p.first())
            .and_then(ParamValue::as_int)
    }

    /// `true` iff every parameter of every group is configured.
    pub fn configured(&self) -> bool {
        self.groups.values().all(ParamGroup::configured)
    }

    /// All `(component, group, param)` triples with an empty value.
    pub fn unconfigured(&self) -> Vec<(String, String, String)> {
        self.groups
            .values()
            .flat_map(|g| g.unconfigured())
            .map(|(pg, p)| (self.name.clone(), pg, p))
            .collect()
    }

    /// All `(group, param, value)` triples of the component, ordered by
    /// group then parameter name.
    pub fn get_params(&self) -> Vec<(String, String, Vec<ParamValue>)> {
        self.groups
            .values()
            .flat_map(|g| {
                g.params()
                    .map(|p| (g.group().to_string(), p.name().to_string(), p.value().to_vec()))
            })
            .collect()
    }

    /// `true` iff the component carries `group.param`.
    pub fn has_param(&self, pg_name: &str, p_name: &str) -> bool {
        self.groups
            .get(pg_name)
            .map(|g| g.has_param(p_name))
            .unwrap_or(false)
    }

    /// Look up a parameter of one group.
    pub fn get_param(&self, pg_name: &str, p_name: &str) -> Result<&Param, ModelError> {
        self.groups
            .get(pg_name)
            .ok_or_else(|| ModelError::NoSuchGroup(self.name.clone(), pg_name.to_string()))?
            .get_param(p_name)
    }

    /// Overwrite the value of one parameter.
    pub fn set_param(
        &mut self,
        pg_name: &str,
        p_name: &str,
        value: Vec<ParamValue>,
    ) -> Result<(), ModelError> {
        let name = self.name.clone();
        self.groups
            .get_mut(pg_name)
            .ok_or_else(|| ModelError::NoSuchGroup(name, pg_name.to_string()))?
            .set_param(p_name, value)
    }
}
