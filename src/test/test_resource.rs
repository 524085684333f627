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

use crate::resource::{ResourceError, ResourceTracker};

fn conserved(tracker: &ResourceTracker<u32>, total: usize) {
    assert_eq!(
        tracker.num_available() + tracker.num_allocated() + tracker.num_excluded(),
        total
    );
}

#[test]
fn allocation_is_ascending_and_all_or_nothing() {
    let mut tracker = ResourceTracker::new("cpu", [5u32, 1, 3, 2, 4]);

    assert_eq!(tracker.allocate(2).unwrap(), vec![1, 2]);
    conserved(&tracker, 5);

    // no partial success
    assert_eq!(
        tracker.allocate(4).unwrap_err(),
        ResourceError::Insufficient {
            name: "cpu",
            requested: 4,
            available: 3,
        }
    );
    conserved(&tracker, 5);

    assert_eq!(tracker.allocate(3).unwrap(), vec![3, 4, 5]);
    conserved(&tracker, 5);
}

#[test]
fn deallocation_restores_ascending_order() {
    let mut tracker = ResourceTracker::new("cpu", 1u32..=5);

    let allocated = tracker.allocate(3).unwrap();
    tracker.deallocate(allocated);

    assert_eq!(tracker.allocate(5).unwrap(), vec![1, 2, 3, 4, 5]);
}

#[test]
fn deallocating_unallocated_is_a_warning_not_fatal() {
    let mut tracker = ResourceTracker::new("cpu", 1u32..=3);

    tracker.deallocate([7]);
    conserved(&tracker, 3);
    assert_eq!(tracker.num_available(), 3);
}

#[test]
fn exclusion_moves_between_available_and_excluded_only() {
    let mut tracker = ResourceTracker::new("cpu", 1u32..=4);

    tracker.exclude(2);
    assert!(tracker.is_excluded(2));
    conserved(&tracker, 4);

    // idempotent
    tracker.exclude(2);
    assert_eq!(tracker.num_excluded(), 1);

    // allocated resources cannot be excluded
    let allocated = tracker.allocate(1).unwrap();
    assert_eq!(allocated, vec![1]);
    tracker.exclude(1);
    assert!(!tracker.is_excluded(1));
    assert_eq!(tracker.num_allocated(), 1);
    conserved(&tracker, 4);

    // excluded resources are not allocatable
    assert_eq!(tracker.allocate(3).unwrap_err(), ResourceError::Insufficient {
        name: "cpu",
        requested: 3,
        available: 2,
    });

    tracker.clear_excluded();
    assert_eq!(tracker.num_excluded(), 0);
    assert_eq!(tracker.allocate(3).unwrap(), vec![2, 3, 4]);
    conserved(&tracker, 4);
}
