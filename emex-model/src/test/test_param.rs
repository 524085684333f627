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

use crate::{
    param::{Param, ParamGroup, ParamValue},
    types::ModelError,
};

#[test]
fn narrowest_type_conversion() {
    assert_eq!(ParamValue::parse("5"), ParamValue::Int(5));
    assert_eq!(ParamValue::parse("5.0"), ParamValue::Float(5.0));
    assert_eq!(ParamValue::parse("-74.315441"), ParamValue::Float(-74.315441));
    assert_eq!(ParamValue::parse("true"), ParamValue::Bool(true));
    assert_eq!(ParamValue::parse("FALSE"), ParamValue::Bool(false));
    assert_eq!(
        ParamValue::parse("omni_20.0"),
        ParamValue::Str("omni_20.0".to_string())
    );
    assert_eq!(
        ParamValue::parse("10.0.1.1"),
        ParamValue::Str("10.0.1.1".to_string())
    );
}

#[test]
fn display_round_trip() {
    for s in ["5", "5.5", "true", "false", "rfpipe-001"] {
        assert_eq!(ParamValue::parse(s).to_string(), s);
    }
}

#[test]
fn dotted_names_are_rejected() {
    assert_eq!(
        Param::new("a.b", vec![]).unwrap_err(),
        ModelError::DottedName("a.b".to_string())
    );
}

#[test]
fn group_configured_iff_all_params_nonempty() {
    let mut group = ParamGroup::new(
        "net",
        vec![
            Param::new("ipv4address", vec![]).unwrap(),
            Param::new("device", vec!["ota0".into()]).unwrap(),
        ],
    );

    assert!(!group.configured());
    assert_eq!(
        group.unconfigured(),
        vec![("net".to_string(), "ipv4address".to_string())]
    );

    group
        .set_param("ipv4address", vec!["10.0.1.1".into()])
        .unwrap();
    assert!(group.configured());
}

#[test]
fn unknown_param_lookup_fails() {
    let group = ParamGroup::new("net", vec![]);
    assert_eq!(
        group.get_param("nemid").unwrap_err(),
        ModelError::NoSuchParam("net".to_string(), "nemid".to_string())
    );
}
