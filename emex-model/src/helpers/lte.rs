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

//! LTE family conventions: one EPC per group, unique physical cell ids,
//! and the EPC's UE membership database.

use std::collections::{BTreeMap, BTreeSet};

use super::{assign_unique_param_id, ConfigHelper, ControlAddrs, MetaParams};
use crate::{platform::Platform, types::{EmexKind, ModelError}};

/// Components of one LTE group, keyed by role.
#[derive(Debug, Default)]
struct LteGroup {
    epcs: Vec<(String, String)>,
    enbs: Vec<(String, String)>,
    ues: Vec<(String, String)>,
}

/// The LTE family helper. Enforces exactly one EPC per label group,
/// assigns non-overlapping physical cell ids to the ENBs, and generates
/// the UE↔IMSI↔IPv4 membership string on each group's EPC host.
pub struct LteHelper;

impl LteHelper {
    fn lte_components(platforms: &[Platform]) -> Vec<(String, String, String)> {
        let mut components = Vec::new();
        for platform in platforms {
            for component in platform.components() {
                if matches!(component.kind(), EmexKind::Waveform | EmexKind::Host)
                    && component.kind_value().starts_with("lte")
                {
                    components.push((
                        platform.name().to_string(),
                        component.name().to_string(),
                        component.kind_value().to_string(),
                    ));
                }
            }
        }
        components.sort();
        components
    }

    fn group_components(
        platforms: &[Platform],
    ) -> BTreeMap<BTreeSet<String>, LteGroup> {
        let mut groups: BTreeMap<BTreeSet<String>, LteGroup> = BTreeMap::new();

        for (plt_name, c_name, kind_value) in Self::lte_components(platforms) {
            let platform = platforms.iter().find(|p| p.name() == plt_name).unwrap();
            let labels = platform.component(&c_name).unwrap().labels().clone();
            let group = groups.entry(labels).or_default();

            match kind_value.as_str() {
                "lte.epc" => group.epcs.push((plt_name, c_name)),
                "lte.enb" => group.enbs.push((plt_name, c_name)),
                "lte.ue" => group.ues.push((plt_name, c_name)),
                _ => {}
            }
        }

        groups
    }

    fn check_one_epc_per_group(
        groups: &BTreeMap<BTreeSet<String>, LteGroup>,
    ) -> Result<(), ModelError> {
        for (labels, group) in groups {
            if group.epcs.len() != 1 {
                let label = labels.iter().cloned().collect::<Vec<_>>().join(",");
                return Err(ModelError::HelperCheck(format!(
                    "LTE group \"{label}\" must have exactly 1 EPC."
                )));
            }
        }
        Ok(())
    }

    /// The non-overlapping control channel pool for physical cell ids.
    fn pci_pool() -> Vec<i64> {
        (0..3).flat_map(|i| (0..63).map(move |j| 8 * j + i)).collect()
    }

    fn assign_unique_meta_id(
        meta: &mut MetaParams,
        components: &[(String, String)],
        key: &str,
    ) {
        for (id, (plt_name, c_name)) in components.iter().enumerate() {
            meta.entry((plt_name.clone(), c_name.clone()))
                .or_default()
                .insert(key.to_string(), (id + 1).to_string());
        }
    }
}

impl ConfigHelper for LteHelper {
    fn configure(&self, platforms: &mut [Platform]) -> Result<(), ModelError> {
        let groups = Self::group_components(platforms);

        Self::check_one_epc_per_group(&groups)?;

        let enbs: Vec<(String, String)> = groups
            .values()
            .flat_map(|g| g.enbs.iter().cloned())
            .collect();

        assign_unique_param_id(platforms, &enbs, "rm", "pci", &Self::pci_pool())
    }

    fn check(&self, platforms: &[Platform]) -> Result<(), ModelError> {
        Self::check_one_epc_per_group(&Self::group_components(platforms))
    }

    fn meta_params(
        &self,
        platforms: &[Platform],
        control_addrs: &ControlAddrs,
    ) -> Result<MetaParams, ModelError> {
        let groups = Self::group_components(platforms);

        let mut meta = MetaParams::new();

        let all_ues: Vec<(String, String)> = groups
            .values()
            .flat_map(|g| g.ues.iter().cloned())
            .collect();
        let all_enbs: Vec<(String, String)> = groups
            .values()
            .flat_map(|g| g.enbs.iter().cloned())
            .collect();

        Self::assign_unique_meta_id(&mut meta, &all_ues, "rm.imsi");
        Self::assign_unique_meta_id(&mut meta, &all_enbs, "rm.enbid");
        Self::assign_unique_meta_id(&mut meta, &all_enbs, "rm.cellid");

        for group in groups.values() {
            let (epc_plt, epc_cmp) = group
                .epcs
                .first()
                .expect("one EPC per group checked in configure")
                .clone();

            // each ENB needs the control address of its group's EPC
            if let Some(epc_addr) = control_addrs.get(&(epc_plt.clone(), epc_cmp.clone())) {
                for (enb_plt, enb_cmp) in &group.enbs {
                    meta.entry((enb_plt.clone(), enb_cmp.clone()))
                        .or_default()
                        .insert("rm.epc_control_ipv4address".to_string(), epc_addr.clone());
                }
            }

            let mut ue_entries = String::new();
            for (ue_plt, ue_cmp) in &group.ues {
                let ueid = format!("{ue_plt}-{ue_cmp}");
                let imsi = meta
                    .get(&(ue_plt.clone(), ue_cmp.clone()))
                    .and_then(|m| m.get("rm.imsi"))
                    .cloned()
                    .unwrap_or_default();
                let platform = platforms.iter().find(|p| p.name() == *ue_plt).unwrap();
                let ipv4address = platform
                    .get_param(ue_cmp, "net", "ipv4address")?
                    .first()
                    .map(|v| v.to_string())
                    .unwrap_or_default();

                if !ue_entries.is_empty() {
                    ue_entries.push('|');
                }
                ue_entries.push_str(&format!("{ueid}:{imsi}:{ipv4address}"));
            }

            if !ue_entries.is_empty() {
                meta.entry((epc_plt, epc_cmp))
                    .or_default()
                    .insert("host.ue_entries".to_string(), ue_entries);
            }
        }

        Ok(meta)
    }
}
