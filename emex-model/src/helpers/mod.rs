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

//! Rule-driven auto-completion and validation of platform parameters.
//!
//! Helpers capture the configuration rules that are tedious to apply by
//! hand: unique NEM ids, subnet-scoped IPv4 addressing, antenna gain
//! settings and waveform-family conventions. They run in two phases in a
//! fixed order — `configure` (mutating) for Nem → Ipv4 → Phy → family
//! helpers, then `check` (read-only) in the same order. Failure of any
//! check rejects the whole EMOE with a human-readable reason.
//!
//! Family helpers are discovered by the waveform-type prefix of the
//! components present in the EMOE (`lte.enb` → the [`LteHelper`]).

mod ipv4;
mod lte;
mod nem;
mod phy;

pub use ipv4::Ipv4Helper;
pub use lte::LteHelper;
pub use nem::NemHelper;
pub use phy::PhyHelper;

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;

use crate::{platform::Platform, types::ModelError};

/// Meta parameters derived per `(platform, component)`: flat
/// `group.param → value` maps substituted into the per-host configuration
/// templates but never written back into the model.
pub type MetaParams = BTreeMap<(String, String), BTreeMap<String, String>>;

/// Control-plane addresses per `(platform, component)`, provided by the
/// runtime when meta parameters are collected.
pub type ControlAddrs = BTreeMap<(String, String), String>;

/// A configuration rule. `configure` mutates the platforms to fill in
/// missing values, `check` verifies the rule holds and `meta_params`
/// derives substitution-only parameters.
pub trait ConfigHelper {
    /// Auto-complete the platforms according to the rule.
    fn configure(&self, platforms: &mut [Platform]) -> Result<(), ModelError>;

    /// Verify the rule; an `Err` rejects the EMOE.
    fn check(&self, platforms: &[Platform]) -> Result<(), ModelError>;

    /// Derive parameters that are substituted into the host configuration
    /// but not stored in the model.
    fn meta_params(
        &self,
        _platforms: &[Platform],
        _control_addrs: &ControlAddrs,
    ) -> Result<MetaParams, ModelError> {
        Ok(MetaParams::new())
    }
}

/// Discover the family helpers applicable to the given platforms by
/// waveform-type prefix.
pub fn platform_helpers(platforms: &[Platform]) -> Vec<Box<dyn ConfigHelper>> {
    let prefixes: BTreeSet<&str> = platforms
        .iter()
        .flat_map(|p| p.components())
        .map(|c| c.waveform_prefix())
        .collect();

    let mut helpers: Vec<Box<dyn ConfigHelper>> = Vec::new();
    if prefixes.contains("lte") {
        helpers.push(Box::new(LteHelper));
    }
    helpers
}

/// The full helper chain for the given platforms: the universal helpers in
/// their fixed order, then the discovered family helpers.
pub fn helper_chain(platforms: &[Platform]) -> Vec<Box<dyn ConfigHelper>> {
    let mut helpers: Vec<Box<dyn ConfigHelper>> =
        vec![Box::new(NemHelper), Box::new(Ipv4Helper::default()), Box::new(PhyHelper)];
    helpers.extend(platform_helpers(platforms));
    helpers
}

/// Run the two-phase helper pass over the platforms: all `configure`
/// calls, then the full-configuration check, then all `check` calls.
pub fn configure_and_check(platforms: &mut [Platform]) -> Result<(), ModelError> {
    let helpers = helper_chain(platforms);

    for helper in &helpers {
        helper.configure(platforms)?;
    }

    for platform in platforms.iter() {
        if !platform.configured() {
            let unconfigured = platform
                .unconfigured()
                .into_iter()
                .map(|(c, pg, p)| format!("{c}.{pg}.{p}"))
                .join(", ");
            return Err(ModelError::Unconfigured(
                platform.name().to_string(),
                unconfigured,
            ));
        }
    }

    for helper in &helpers {
        helper.check(platforms)?;
    }

    Ok(())
}

/// Collect the meta parameters of every helper applicable to the
/// platforms into one merged map.
pub fn collect_meta_params(
    platforms: &[Platform],
    control_addrs: &ControlAddrs,
) -> Result<MetaParams, ModelError> {
    let mut merged = MetaParams::new();
    for helper in helper_chain(platforms) {
        for (key, params) in helper.meta_params(platforms, control_addrs)? {
            merged.entry(key).or_default().extend(params);
        }
    }
    Ok(merged)
}

/// Group all components by `(waveform type prefix, net labels)`.
///
/// Components of the same waveform type are assumed to share a subnet
/// unless differentiated by a label starting with `net`; components with
/// identical net-label sets form one subnet group. The returned map
/// iterates in deterministic key order; the component lists preserve
/// platform order and sorted component order within a platform.
pub fn group_components_by_net_label(
    platforms: &[Platform],
) -> BTreeMap<(String, BTreeSet<String>), Vec<(String, String)>> {
    let mut groups: BTreeMap<(String, BTreeSet<String>), Vec<(String, String)>> = BTreeMap::new();

    for platform in platforms {
        for component in platform.components() {
            let key = (
                component.waveform_prefix().to_string(),
                component.net_labels(),
            );
            groups
                .entry(key)
                .or_default()
                .push((platform.name().to_string(), component.name().to_string()));
        }
    }

    groups
}

/// Assign a unique value of `group.param` to every listed component that
/// does not already carry one, drawing from `id_pool` and skipping values
/// that are already taken. Duplicated preassigned values are an error.
pub(crate) fn assign_unique_param_id(
    platforms: &mut [Platform],
    components: &[(String, String)],
    pg_name: &str,
    p_name: &str,
    id_pool: &[i64],
) -> Result<(), ModelError> {
    let mut assigned: BTreeSet<i64> = BTreeSet::new();
    let mut unconfigured: Vec<(String, String)> = Vec::new();

    for (plt_name, c_name) in components {
        let platform = platforms
            .iter()
            .find(|p| p.name() == plt_name)
            .expect("component list built from platforms");
        let param = platform.get_param(c_name, pg_name, p_name)?;
        if param.configured() {
            for value in param.value() {
                let value = value.as_int().unwrap_or_default();
                if !assigned.insert(value) {
                    return Err(ModelError::HelperCheck(format!(
                        "\"{pg_name}.{p_name}\" value {value} assigned more than once."
                    )));
                }
            }
        } else {
            unconfigured.push((plt_name.clone(), c_name.clone()));
        }
    }

    let mut pool = id_pool.iter().filter(|id| !assigned.contains(id));
    for (plt_name, c_name) in unconfigured {
        let next_id = *pool.next().ok_or_else(|| {
            ModelError::HelperCheck(format!(
                "\"{pg_name}.{p_name}\" id pool exhausted."
            ))
        })?;
        let platform = platforms
            .iter_mut()
            .find(|p| p.name() == plt_name)
            .expect("component list built from platforms");
        platform.set_param(&c_name, pg_name, p_name, vec![next_id.into()])?;
    }

    Ok(())
}
