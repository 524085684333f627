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

use pretty_assertions::assert_eq;

use super::{lte_type, platform_with_label, rfpipe_type};
use crate::{
    helpers::{self, ConfigHelper, ControlAddrs, NemHelper},
    param::ParamValue,
    types::EmexKind,
};

#[test]
fn nem_helper_assigns_smallest_unused() {
    let rfpipe = rfpipe_type();
    let mut platforms = vec![
        platform_with_label("rfpipe-001", &rfpipe, "r1", None),
        platform_with_label("rfpipe-002", &rfpipe, "r1", None),
        platform_with_label("rfpipe-003", &rfpipe, "r1", None),
    ];

    // preassign nemid 2 to the second platform
    platforms[1]
        .set_param("r1", "emane", "nemid", vec![2i64.into()])
        .unwrap();

    NemHelper.configure(&mut platforms).unwrap();

    let nemids: Vec<i64> = platforms.iter().flat_map(|p| p.nemids()).collect();
    assert_eq!(nemids, vec![1, 2, 3]);

    NemHelper.check(&platforms).unwrap();
}

#[test]
fn duplicate_nemids_are_rejected() {
    let rfpipe = rfpipe_type();
    let mut platforms = vec![
        platform_with_label("rfpipe-001", &rfpipe, "r1", None),
        platform_with_label("rfpipe-002", &rfpipe, "r1", None),
    ];
    for platform in &mut platforms {
        platform
            .set_param("r1", "emane", "nemid", vec![5i64.into()])
            .unwrap();
    }

    let err = helpers::configure_and_check(&mut platforms).unwrap_err();
    assert!(
        err.to_string().contains("Duplicate nemid \"5\""),
        "unexpected message: {err}"
    );
}

#[test]
fn ipv4_helper_assigns_sequential_subnet_addresses() {
    let rfpipe = rfpipe_type();
    let mut platforms = vec![
        platform_with_label("rfpipe-001", &rfpipe, "r1", None),
        platform_with_label("rfpipe-002", &rfpipe, "r1", None),
        platform_with_label("rfpipe-003", &rfpipe, "r1", None),
    ];

    helpers::configure_and_check(&mut platforms).unwrap();

    let addresses: Vec<String> = platforms
        .iter()
        .map(|p| {
            p.get_param("r1", "net", "ipv4address")
                .unwrap()
                .first()
                .unwrap()
                .to_string()
        })
        .collect();

    assert_eq!(addresses, vec!["10.0.1.1", "10.0.1.2", "10.0.1.3"]);
}

#[test]
fn ipv4_helper_separates_subnets_by_net_label() {
    let rfpipe = rfpipe_type();
    let mut platforms = vec![
        platform_with_label("rfpipe-001", &rfpipe, "r1", Some("net1")),
        platform_with_label("rfpipe-002", &rfpipe, "r1", Some("net2")),
    ];

    helpers::configure_and_check(&mut platforms).unwrap();

    let addresses: Vec<String> = platforms
        .iter()
        .map(|p| {
            p.get_param("r1", "net", "ipv4address")
                .unwrap()
                .first()
                .unwrap()
                .to_string()
        })
        .collect();

    // one subnet per net label
    assert_eq!(addresses, vec!["10.0.1.1", "10.0.2.1"]);
}

#[test]
fn ipv4_helper_rejects_mixed_groups() {
    let rfpipe = rfpipe_type();
    let mut platforms = vec![
        platform_with_label("rfpipe-001", &rfpipe, "r1", None),
        platform_with_label("rfpipe-002", &rfpipe, "r1", None),
        platform_with_label("rfpipe-003", &rfpipe, "r1", None),
    ];
    platforms[0]
        .set_param("r1", "net", "ipv4address", vec!["10.0.1.1".into()])
        .unwrap();

    let err = helpers::configure_and_check(&mut platforms).unwrap_err();
    assert!(
        err.to_string()
            .contains("configured and unconfigured ipv4_address"),
        "unexpected message: {err}"
    );
}

#[test]
fn phy_helper_derives_fixed_gain_settings() {
    let rfpipe = rfpipe_type();
    let mut platforms = vec![
        platform_with_label("rfpipe-001", &rfpipe, "r1", None),
        platform_with_label("rfpipe-002", &rfpipe, "r1", None),
    ];
    platforms[1]
        .set_param("r1", "phy", "antenna0", vec![ParamValue::parse("omni_20.0")])
        .unwrap();

    helpers::configure_and_check(&mut platforms).unwrap();

    let meta = helpers::collect_meta_params(&platforms, &ControlAddrs::new()).unwrap();

    let p1 = &meta[&("rfpipe-001".to_string(), "r1".to_string())];
    assert_eq!(p1["phy.fixedantennagainenable"], "true");
    assert_eq!(p1["phy.fixedantennagain"], "0");

    let p2 = &meta[&("rfpipe-002".to_string(), "r1".to_string())];
    assert_eq!(p2["phy.fixedantennagainenable"], "true");
    assert_eq!(p2["phy.fixedantennagain"], "20");
}

#[test]
fn lte_group_requires_exactly_one_epc() {
    let enb = lte_type("lte.enb", EmexKind::Waveform, "r1");
    let ue = lte_type("lte.ue", EmexKind::Waveform, "r1");

    let mut platforms = vec![
        platform_with_label("lteenb-001", &enb, "r1", Some("neta")),
        platform_with_label("lteue-001", &ue, "r1", Some("neta")),
    ];

    let err = helpers::configure_and_check(&mut platforms).unwrap_err();
    assert!(
        err.to_string().contains("must have exactly 1 EPC"),
        "unexpected message: {err}"
    );
}

#[test]
fn lte_helper_generates_epc_ue_entries() {
    let epc = lte_type("lte.epc", EmexKind::Host, "h1");
    let enb = lte_type("lte.enb", EmexKind::Waveform, "r1");
    let ue = lte_type("lte.ue", EmexKind::Waveform, "r1");

    let mut platforms = vec![
        platform_with_label("lteepc-001", &epc, "h1", Some("neta")),
        platform_with_label("lteenb-001", &enb, "r1", Some("neta")),
        platform_with_label("lteue-001", &ue, "r1", Some("neta")),
        platform_with_label("lteue-002", &ue, "r1", Some("neta")),
    ];

    helpers::configure_and_check(&mut platforms).unwrap();

    // the enb is assigned a pci from the pool
    assert!(platforms[1]
        .get_param("r1", "rm", "pci")
        .unwrap()
        .configured());

    let mut control_addrs = ControlAddrs::new();
    control_addrs.insert(
        ("lteepc-001".to_string(), "h1".to_string()),
        "10.76.1.1".to_string(),
    );

    let meta = helpers::collect_meta_params(&platforms, &control_addrs).unwrap();

    let enb_meta = &meta[&("lteenb-001".to_string(), "r1".to_string())];
    assert_eq!(enb_meta["rm.epc_control_ipv4address"], "10.76.1.1");
    assert_eq!(enb_meta["rm.enbid"], "1");

    // sequential imsis starting at 1, one entry per ue
    let ue1_ip = platforms[2]
        .get_param("r1", "net", "ipv4address")
        .unwrap()
        .first()
        .unwrap()
        .to_string();
    let ue2_ip = platforms[3]
        .get_param("r1", "net", "ipv4address")
        .unwrap()
        .first()
        .unwrap()
        .to_string();

    let epc_meta = &meta[&("lteepc-001".to_string(), "h1".to_string())];
    assert_eq!(
        epc_meta["host.ue_entries"],
        format!("lteue-001-r1:1:{ue1_ip}|lteue-002-r1:2:{ue2_ip}")
    );
}
