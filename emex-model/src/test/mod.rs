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

use std::collections::BTreeMap;

use crate::{
    param::{ParamGroupType, ParamType, ParamValue},
    platform::{ComponentType, Platform, PlatformType, UserConfig},
    types::EmexKind,
};

mod test_emoe;
mod test_helpers;
mod test_param;
mod test_scenario;

/// Build a parameter group type from `(param, defaults)` pairs.
fn group(name: &str, params: &[(&str, &[ParamValue])]) -> ParamGroupType {
    ParamGroupType::new(
        name,
        params
            .iter()
            .map(|(p, d)| ParamType::new(*p, "", d.to_vec()).unwrap())
            .collect(),
    )
}

/// A single-radio platform type resembling an rfpipe node.
pub(crate) fn rfpipe_type() -> PlatformType {
    PlatformType::new(
        "rfpipe",
        "a single rfpipe radio",
        "single_radio",
        vec![ComponentType {
            name: "r1".to_string(),
            kind: EmexKind::Waveform,
            value: "rfpipe".to_string(),
            template: "rfpipe".to_string(),
            traffic_endpoint: true,
            testpoint_publisher: true,
            groups: [
                (
                    "emane".to_string(),
                    group("emane", &[("nemid", &[])]),
                ),
                (
                    "net".to_string(),
                    group(
                        "net",
                        &[
                            ("ipv4address", &[]),
                            ("ipv4mask", &[ParamValue::Int(16)]),
                            ("device", &[ParamValue::Str("ota0".to_string())]),
                        ],
                    ),
                ),
                (
                    "phy".to_string(),
                    group("phy", &[("antenna0", &[ParamValue::Str("omni".to_string())])]),
                ),
                (
                    "resources".to_string(),
                    group("resources", &[("cpus", &[ParamValue::Int(1)])]),
                ),
            ]
            .into_iter()
            .collect(),
        }],
    )
}

/// A single-component LTE platform type of the given role.
pub(crate) fn lte_type(role: &str, kind: EmexKind, c_name: &str) -> PlatformType {
    let mut groups: BTreeMap<String, ParamGroupType> = [
        (
            "net".to_string(),
            group(
                "net",
                &[
                    ("ipv4address", &[]),
                    ("ipv4mask", &[ParamValue::Int(16)]),
                    ("device", &[ParamValue::Str("ota0".to_string())]),
                ],
            ),
        ),
        (
            "resources".to_string(),
            group("resources", &[("cpus", &[ParamValue::Int(1)])]),
        ),
    ]
    .into_iter()
    .collect();

    if kind == EmexKind::Waveform {
        groups.insert("emane".to_string(), group("emane", &[("nemid", &[])]));
    }
    if role == "lte.enb" {
        groups.insert("rm".to_string(), group("rm", &[("pci", &[])]));
    }

    PlatformType::new(
        role.replace('.', "_"),
        role,
        "single_component",
        vec![ComponentType {
            name: c_name.to_string(),
            kind,
            value: role.to_string(),
            template: role.replace('.', "_"),
            traffic_endpoint: true,
            testpoint_publisher: kind == EmexKind::Waveform,
            groups,
        }],
    )
}

/// Instantiate a platform with an optional label on its only component.
pub(crate) fn platform_with_label(
    name: &str,
    platform_type: &PlatformType,
    c_name: &str,
    label: Option<&str>,
) -> Platform {
    let mut labels = BTreeMap::new();
    if let Some(label) = label {
        labels.insert(c_name.to_string(), vec![label.to_string()]);
    }
    Platform::new(name, platform_type, &UserConfig::new(), &labels).unwrap()
}
