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

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use pretty_assertions::assert_eq;

use crate::scenario::{
    Clock, EventSequencer, EventSet, EventTime, FlowPattern, Scenario, TrafficProtocol,
};

const SCENARIO: &str = r#"
name: fourplatforms
emoe:
    platforms:
        rfpipe-001:
            type: rfpipe
        rfpipe-002:
            type: rfpipe
        rfpipe-003:
            type: rfpipe
        sensor-001:
            type: sensor
    initial_conditions:
        pov: |
            rfpipe-001  37.005 -109.050 3.0
            rfpipe-002  37.005 -109.040 3.0
        pathloss: |
            rfpipe-001  rfpipe-002:90 rfpipe-003:120
            rfpipe-002                rfpipe-003:90
        antenna_pointing: |
            rfpipe-001  90.0 0.0
scenario:
    2.0: |
        flow_on name=f1 source=rfpipe-00[12] destination=rfpipe-003 periodic 10.0 1024
    5.0: |
        flow_off name=f1
        end
"#;

#[test]
fn scenario_file_parses() {
    let scenario = Scenario::from_str(SCENARIO).unwrap();

    assert_eq!(scenario.name(), "fourplatforms");
    assert_eq!(scenario.events().len(), 2);

    let first = &scenario.events()[&EventTime(2.0)];
    assert_eq!(first.flow_on.len(), 1);
    let flow = &first.flow_on[0];
    assert_eq!(flow.flow_name, "f1");
    assert_eq!(flow.sources, vec!["rfpipe-001", "rfpipe-002"]);
    assert_eq!(flow.destinations, vec!["rfpipe-003"]);
    assert_eq!(flow.protocol, TrafficProtocol::Udp);
    assert_eq!(flow.pattern, FlowPattern::Periodic);
    assert_eq!(flow.packet_rate, 10.0);
    assert_eq!(flow.size_bytes, 1024);

    let second = &scenario.events()[&EventTime(5.0)];
    assert_eq!(second.flow_off.len(), 1);
    assert!(second.end);

    let description = scenario.emoe_description("fourplatforms.001");
    assert_eq!(description.initial_conditions.len(), 3);
    let ic = &description.initial_conditions[0];
    assert_eq!(ic.platform_name, "rfpipe-001");
    assert_eq!(ic.pathlosses.len(), 2);
    assert_eq!(ic.pathlosses[0].remote_platform, "rfpipe-002");
    assert_eq!(ic.pathlosses[0].pathloss_db, 90.0);
    assert_eq!(ic.antenna_pointings.len(), 1);
}

#[test]
fn nonmatching_flow_regex_is_fatal() {
    let scenario = r#"
name: bad
emoe:
    platforms:
        rfpipe-001:
            type: rfpipe
scenario:
    1.0: |
        flow_on source=nosuchplatform.* periodic 10.0 1024
"#;

    let err = Scenario::from_str(scenario).unwrap_err();
    assert!(
        err.to_string().contains("does not match any platform name"),
        "unexpected message: {err}"
    );
}

/// A clock that only advances when slept on.
#[derive(Clone, Default)]
struct FakeClock {
    now: Rc<RefCell<f64>>,
    sleeps: Rc<RefCell<Vec<f64>>>,
}

impl Clock for FakeClock {
    fn monotonic(&self) -> f64 {
        *self.now.borrow()
    }

    fn sleep(&self, secs: f64) {
        *self.now.borrow_mut() += secs;
        self.sleeps.borrow_mut().push(secs);
    }
}

#[test]
fn sequencer_sleeps_until_each_event_offset() {
    let mut events: BTreeMap<EventTime, EventSet> = BTreeMap::new();
    events.insert(EventTime::INITIAL, EventSet::default());
    events.insert(EventTime(2.0), EventSet::default());
    events.insert(EventTime(5.0), EventSet::default());

    let clock = FakeClock::default();
    let sequencer = EventSequencer::new(&events);
    assert_eq!(sequencer.num_events(), 3);

    let times: Vec<EventTime> = sequencer
        .iter_with_clock(clock.clone())
        .map(|(t, _)| t)
        .collect();

    assert_eq!(times, vec![EventTime::INITIAL, EventTime(2.0), EventTime(5.0)]);
    // the initial event never sleeps; the rest sleep to their offsets
    assert_eq!(*clock.sleeps.borrow(), vec![2.0, 3.0]);
}

#[test]
fn overdue_events_do_not_sleep() {
    let mut events: BTreeMap<EventTime, EventSet> = BTreeMap::new();
    events.insert(EventTime(1.0), EventSet::default());

    let clock = FakeClock::default();
    // pretend four seconds already elapsed before iteration starts
    let sequencer = EventSequencer::new(&events);
    let mut iter = sequencer.iter_with_clock(clock.clone());
    *clock.now.borrow_mut() = 4.0;
    // account for the captured anchor: event time 1.0 is already overdue
    assert!(iter.next().is_some());
    assert!(clock.sleeps.borrow().is_empty());
}
