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

use std::collections::BTreeSet;

use pretty_assertions::assert_eq;

use emex_model::scenario::Scenario;

use crate::driver::batch::BatchCursor;

fn scenario(name: &str) -> Scenario {
    Scenario::from_str(&format!(
        "name: {name}\nemoe:\n    platforms:\n        {name}-001:\n            type: rfpipe\n"
    ))
    .unwrap()
}

#[test]
fn cursor_runs_trials_scenario_major() {
    let scenarios = vec![scenario("s1"), scenario("s2")];
    let mut cursor = BatchCursor::new(2, 2);

    assert_eq!(cursor.total_trials(), 4);

    let mut names = Vec::new();
    while let Some((index, name)) = cursor.next_emoe_name(&scenarios, &|_| false) {
        assert_eq!(index, names.len() / 2);
        names.push(name);
        cursor.bump();
    }

    assert_eq!(names, vec!["s1.001", "s1.002", "s2.001", "s2.002"]);
    assert!(cursor.done_starting());
}

#[test]
fn cursor_skips_names_still_in_use() {
    let scenarios = vec![scenario("s1")];
    let mut cursor = BatchCursor::new(1, 3);

    let in_use = |name: &str| name == "s1.001";

    let (_, name) = cursor.next_emoe_name(&scenarios, &in_use).unwrap();
    assert_eq!(name, "s1.002");
}

/// Scheduler liveness: with capacity for one EMOE at a time, every trial
/// is ultimately submitted and the runner exits.
#[test]
fn every_trial_runs_with_a_single_cpu_budget() {
    let scenarios = vec![scenario("s1"), scenario("s2")];
    let numtrials = 3;
    let mut cursor = BatchCursor::new(scenarios.len(), numtrials);

    // one slot of capacity; a submitted emoe frees it on the next tick
    let mut running: Option<String> = None;
    let mut completed: BTreeSet<String> = BTreeSet::new();

    for _tick in 0..100 {
        // the previously submitted emoe finishes
        if let Some(name) = running.take() {
            completed.insert(name);
        }

        if cursor.done_starting() && running.is_none() {
            break;
        }

        let running_ref = &running;
        if let Some((_, name)) = cursor.next_emoe_name(&scenarios, &|name| {
            running_ref.as_deref() == Some(name)
        }) {
            running = Some(name);
            cursor.bump();
        }
    }

    assert!(cursor.done_starting());
    assert_eq!(completed.len(), scenarios.len() * numtrials);
}
