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

use super::{platform_with_label, rfpipe_type};
use crate::{
    emoe::Emoe,
    initial::{InitialCondition, Pov},
    param::ParamValue,
    types::ModelError,
};

#[test]
fn empty_emoe_is_valid() {
    let emoe = Emoe::new("t", vec![], vec![], vec![]).unwrap();
    assert_eq!(emoe.cpus(), 0);
    assert!(emoe.nemids().is_empty());
}

#[test]
fn platforms_are_sorted_and_unique() {
    let rfpipe = rfpipe_type();
    let emoe = Emoe::new(
        "t",
        vec![
            platform_with_label("b", &rfpipe, "r1", None),
            platform_with_label("a", &rfpipe, "r1", None),
        ],
        vec![],
        vec![],
    )
    .unwrap();

    let names: Vec<&str> = emoe.platforms().iter().map(|p| p.name()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(emoe.cpus(), 2);

    let err = Emoe::new(
        "t",
        vec![
            platform_with_label("a", &rfpipe, "r1", None),
            platform_with_label("a", &rfpipe, "r1", None),
        ],
        vec![],
        vec![],
    )
    .unwrap_err();
    assert_eq!(err, ModelError::DuplicatePlatform("a".to_string()));
}

#[test]
fn unknown_antenna0_name_is_rejected() {
    let rfpipe = rfpipe_type();
    let mut platform = platform_with_label("rfpipe-001", &rfpipe, "r1", None);
    platform
        .set_param(
            "r1",
            "phy",
            "antenna0",
            vec![ParamValue::Str("sector30".to_string())],
        )
        .unwrap();

    let err = Emoe::new("t", vec![platform], vec![], vec![]).unwrap_err();
    assert_eq!(
        err,
        ModelError::UnknownAntenna("rfpipe-001".to_string(), "sector30".to_string())
    );
}

#[test]
fn initial_condition_must_reference_a_platform() {
    let rfpipe = rfpipe_type();
    let platform = platform_with_label("rfpipe-001", &rfpipe, "r1", None);

    let ic = InitialCondition::new(
        "rfpipe-999",
        Some(Pov {
            component_names: vec![],
            latitude: 37.0,
            longitude: -109.0,
            altitude: 3.0,
            azimuth: 0.0,
            elevation: 0.0,
            speed: 0.0,
            pitch: 0.0,
            roll: 0.0,
            yaw: 0.0,
        }),
        vec![],
        vec![],
    );

    let err = Emoe::new("t", vec![platform], vec![], vec![ic]).unwrap_err();
    assert_eq!(
        err,
        ModelError::UnknownInitialConditionPlatform("rfpipe-999".to_string())
    );
}

#[test]
fn description_round_trip_preserves_the_emoe() {
    let rfpipe = rfpipe_type();
    let emoe = Emoe::new(
        "t",
        vec![
            platform_with_label("rfpipe-001", &rfpipe, "r1", None),
            platform_with_label("rfpipe-002", &rfpipe, "r1", None),
        ],
        vec![],
        vec![],
    )
    .unwrap();

    let description = emoe.to_description();
    assert_eq!(description.name, "t");
    assert_eq!(description.platforms.len(), 2);

    let registry = crate::registry::ModelRegistry::from_parts(vec![rfpipe], vec![]);
    let rebuilt = Emoe::from_description(&description, &registry).unwrap();
    assert_eq!(rebuilt.nemids(), emoe.nemids());
    assert_eq!(rebuilt.cpus(), emoe.cpus());
}
