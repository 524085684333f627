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

//! Wall-clock sequencing of scenario events.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use super::events::{EventSet, EventTime};

/// The clock seam of the sequencer. Production code uses [`SystemClock`];
/// tests substitute a fake.
pub trait Clock {
    /// Monotonic seconds since an arbitrary epoch.
    fn monotonic(&self) -> f64;
    /// Sleep for the given number of seconds.
    fn sleep(&self, secs: f64);
}

/// The wall clock.
#[derive(Debug)]
pub struct SystemClock {
    epoch: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn monotonic(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn sleep(&self, secs: f64) {
        std::thread::sleep(Duration::from_secs_f64(secs));
    }
}

/// Yields `(eventtime, events)` pairs in ascending event time, sleeping
/// until each event's wall-clock offset relative to the instant iteration
/// began. Overdue events and `-Inf` (initial condition) events never
/// sleep.
pub struct EventSequencer {
    events: Vec<(EventTime, EventSet)>,
}

impl EventSequencer {
    /// Create a sequencer over a time-ordered event map.
    pub fn new(events: &BTreeMap<EventTime, EventSet>) -> Self {
        Self {
            events: events.iter().map(|(t, e)| (*t, e.clone())).collect(),
        }
    }

    /// The number of scheduled timepoints.
    pub fn num_events(&self) -> usize {
        self.events.len()
    }

    /// Begin iteration with the given clock. The anchor instant is
    /// captured now; event times are offsets from it.
    pub fn iter_with_clock<C: Clock>(self, clock: C) -> EventSequencerIter<C> {
        let start = clock.monotonic();
        EventSequencerIter {
            events: self.events.into_iter(),
            clock,
            start,
        }
    }
}

impl IntoIterator for EventSequencer {
    type Item = (EventTime, EventSet);
    type IntoIter = EventSequencerIter<SystemClock>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_with_clock(SystemClock::default())
    }
}

/// The iteration state of an [`EventSequencer`].
pub struct EventSequencerIter<C> {
    events: std::vec::IntoIter<(EventTime, EventSet)>,
    clock: C,
    start: f64,
}

impl<C: Clock> Iterator for EventSequencerIter<C> {
    type Item = (EventTime, EventSet);

    fn next(&mut self) -> Option<Self::Item> {
        let (time, events) = self.events.next()?;

        if !time.is_initial() {
            let sleeptime = time.0 - (self.clock.monotonic() - self.start);
            if sleeptime > 0.0 {
                self.clock.sleep(sleeptime);
            }
        }

        Some((time, events))
    }
}
