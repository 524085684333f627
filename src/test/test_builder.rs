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
use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;

use emex_model::{
    param::{ParamGroupType, ParamType, ParamValue},
    platform::{ComponentType, Platform, PlatformType, UserConfig},
    Emoe, EmexKind, ModelRegistry,
};

use crate::{
    builder::ConfigTreeBuilder,
    runtime::EmoeRuntime,
    test::test_config,
    timestamp::Timestamp,
};

fn radio_type() -> PlatformType {
    let group = |name: &str, params: Vec<(&str, Vec<ParamValue>)>| {
        ParamGroupType::new(
            name,
            params
                .into_iter()
                .map(|(p, d)| ParamType::new(p, "", d).unwrap())
                .collect(),
        )
    };

    PlatformType::new(
        "rfpipe",
        "one rfpipe radio",
        "single_radio",
        vec![ComponentType {
            name: "r1".to_string(),
            kind: EmexKind::Waveform,
            value: "rfpipe".to_string(),
            template: "rfpipe".to_string(),
            traffic_endpoint: true,
            testpoint_publisher: true,
            groups: [
                ("emane".to_string(), group("emane", vec![("nemid", vec![])])),
                (
                    "net".to_string(),
                    group(
                        "net",
                        vec![
                            ("ipv4address", vec![]),
                            ("ipv4mask", vec![ParamValue::Int(16)]),
                            ("device", vec![ParamValue::Str("ota0".to_string())]),
                        ],
                    ),
                ),
                (
                    "phy".to_string(),
                    group(
                        "phy",
                        vec![("antenna0", vec![ParamValue::Str("omni".to_string())])],
                    ),
                ),
                (
                    "resources".to_string(),
                    group("resources", vec![("cpus", vec![ParamValue::Int(1)])]),
                ),
            ]
            .into_iter()
            .collect(),
        }],
    )
}

fn test_emoe() -> Emoe {
    let radio = radio_type();
    let platform = |name: &str| {
        Platform::new(name, &radio, &UserConfig::new(), &BTreeMap::new()).unwrap()
    };
    Emoe::new(
        "t",
        vec![platform("rfpipe-001"), platform("rfpipe-002")],
        vec![],
        vec![],
    )
    .unwrap()
}

/// Collect every file below `root` as `(relative path, contents)`.
fn collect_tree(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, files: &mut BTreeMap<PathBuf, Vec<u8>>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, files);
            } else {
                files.insert(
                    path.strip_prefix(root).unwrap().to_path_buf(),
                    std::fs::read(&path).unwrap(),
                );
            }
        }
    }

    let mut files = BTreeMap::new();
    walk(root, root, &mut files);
    files
}

#[test]
fn identical_emoes_build_identical_trees() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let registry = ModelRegistry::default();
    let builder = ConfigTreeBuilder::new(Box::new(crate::builder::SubstitutionRenderer), None);

    // same instant, two different workdir roots
    let build = |tag: &str| {
        let root = dir.path().join(tag);
        let timestamp = Timestamp::at(1_700_000_000, "host", &root);
        let mut rt = EmoeRuntime::new(timestamp, 1, test_emoe(), vec![1], &config);
        builder.build(&mut rt, &registry, &config).unwrap();
        collect_tree(&rt.workdir())
    };

    let first = build("a");
    let second = build("b");

    assert_eq!(first, second);
}

#[test]
fn nemid_map_lists_radios_in_sorted_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let builder = ConfigTreeBuilder::new(Box::new(crate::builder::SubstitutionRenderer), None);

    let timestamp = Timestamp::at(1_700_000_000, "host", dir.path());
    let mut rt = EmoeRuntime::new(timestamp, 1, test_emoe(), vec![1], &config);
    builder
        .build(&mut rt, &ModelRegistry::default(), &config)
        .unwrap();

    let nemid_map =
        std::fs::read_to_string(rt.workdir().join("config/doc/nemid_map.csv")).unwrap();
    assert_eq!(nemid_map, "rfpipe-001,r1,1,\nrfpipe-002,r1,2,\n");

    let hostfile = std::fs::read_to_string(rt.workdir().join("config/doc/hostfile")).unwrap();
    assert_eq!(
        hostfile,
        "localhost {\nlocalhost\nhelper-lxc\nrfpipe-001-r1\nrfpipe-002-r1\n}\n"
    );
}

#[test]
fn container_plan_assigns_sequential_bridge_addresses() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let builder = ConfigTreeBuilder::new(Box::new(crate::builder::SubstitutionRenderer), None);

    let timestamp = Timestamp::at(1_700_000_000, "host", dir.path());
    let mut rt = EmoeRuntime::new(timestamp, 1, test_emoe(), vec![1], &config);
    builder
        .build(&mut rt, &ModelRegistry::default(), &config)
        .unwrap();

    // both radios share one subnet group
    let node = &rt.nodes()[&("rfpipe-001".to_string(), "r1".to_string())];
    assert_eq!(node.device("backchan0").unwrap().ipv4address(), "10.76.1.1");
    assert_eq!(node.device("ota0").unwrap().ipv4address(), "10.77.1.1");

    let node = &rt.nodes()[&("rfpipe-002".to_string(), "r1".to_string())];
    assert_eq!(node.device("backchan0").unwrap().ipv4address(), "10.76.1.2");

    // the service ports of the socat multiplexer are registered
    assert_eq!(rt.container_ports()["emexcontainerd"], 3000);
    assert_eq!(rt.container_ports()["otestpoint-discovery"], 5002);
    assert_eq!(rt.container_ports()["otestpoint-publish"], 5003);
    assert_eq!(rt.container_ports()["emane-node-view"], 5000);
}

#[test]
fn sector_antenna_preserves_the_mirrored_horizontal_bound() {
    use emex_model::{Antenna, AntennaProfile, AntennaType};

    let antennatype = AntennaType::new(
        "sector",
        "a sector antenna",
        vec![
            ParamType::new("gain", "", vec![ParamValue::Float(6.0)]).unwrap(),
            ParamType::new("rejection", "", vec![ParamValue::Float(-90.0)]).unwrap(),
            ParamType::new("horizontal_beamwidth", "", vec![ParamValue::Float(60.0)]).unwrap(),
            ParamType::new("vertical_beamwidth", "", vec![ParamValue::Float(30.0)]).unwrap(),
            ParamType::new("north", "", vec![ParamValue::Float(0.0)]).unwrap(),
            ParamType::new("east", "", vec![ParamValue::Float(0.0)]).unwrap(),
            ParamType::new("up", "", vec![ParamValue::Float(0.0)]).unwrap(),
        ],
    );
    let antenna = Antenna::new("sector30", &antennatype, &BTreeMap::new()).unwrap();
    let profile = AntennaProfile::new(antenna, 0.0, 0.0, 1.0);

    let (file_name, xml) = crate::builder::AntennaBuilder.build(&profile).unwrap();

    assert_eq!(file_name, "sector30_north0_east0_up1.xml");
    // the sector spans bearings [0, 29] and [331, 359]; the mirrored
    // bound is 360 - 30
    assert!(xml.contains("<bearing min=\"0\" max=\"29\">"));
    assert!(xml.contains("<bearing min=\"30\" max=\"330\">"));
    assert!(xml.contains("<bearing min=\"331\" max=\"359\">"));
}
