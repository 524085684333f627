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

//! An allocatable pool of identifiers (cpus, host ports) with
//! exclude-on-conflict.

use std::collections::BTreeSet;
use std::fmt::Debug;

use thiserror::Error;

/// Error raised by a [`ResourceTracker`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResourceError {
    /// More resources were requested than are available.
    #[error("requested {name} ({requested}) exceeds available ({available}).")]
    Insufficient {
        /// The resource name.
        name: &'static str,
        /// The number of resources requested.
        requested: usize,
        /// The number of resources available.
        available: usize,
    },
}

/// Tracks an initial identifier set across three disjoint subsets:
/// *available* (ordered ascending), *allocated* and *excluded*. The union
/// of the three is constant over the tracker's lifetime.
///
/// Excluded members only move between the excluded and available sets; an
/// allocated resource cannot be excluded.
#[derive(Debug)]
pub struct ResourceTracker<T> {
    name: &'static str,
    available: Vec<T>,
    allocated: BTreeSet<T>,
    excluded: BTreeSet<T>,
}

impl<T: Ord + Copy + Debug> ResourceTracker<T> {
    /// Create a tracker over the given identifier set, allocating in
    /// ascending order.
    pub fn new(name: &'static str, allowed: impl IntoIterator<Item = T>) -> Self {
        let mut available: Vec<T> = allowed.into_iter().collect::<BTreeSet<T>>().into_iter().collect();
        available.sort_unstable();
        Self {
            name,
            available,
            allocated: BTreeSet::new(),
            excluded: BTreeSet::new(),
        }
    }

    /// The resource name used for logging.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The number of resources currently available for allocation.
    pub fn num_available(&self) -> usize {
        self.available.len()
    }

    /// The number of currently allocated resources.
    pub fn num_allocated(&self) -> usize {
        self.allocated.len()
    }

    /// The number of currently excluded resources.
    pub fn num_excluded(&self) -> usize {
        self.excluded.len()
    }

    /// Allocate the first `num_requested` available resources in
    /// ascending order. No partial success: either all requested
    /// resources are returned or none.
    pub fn allocate(&mut self, num_requested: usize) -> Result<Vec<T>, ResourceError> {
        if num_requested > self.available.len() {
            log::error!(
                "requested {} ({num_requested}) exceeds available ({}).",
                self.name,
                self.available.len()
            );
            return Err(ResourceError::Insufficient {
                name: self.name,
                requested: num_requested,
                available: self.available.len(),
            });
        }

        let resources: Vec<T> = self.available.drain(..num_requested).collect();
        self.allocated.extend(resources.iter().copied());

        log::info!("newly allocated {}s: {resources:?}", self.name);
        self.log_available();

        Ok(resources)
    }

    /// Return resources to the available set. Deallocating a resource
    /// that is not currently allocated is a warning, not fatal.
    pub fn deallocate(&mut self, resources: impl IntoIterator<Item = T>) {
        let mut returned = Vec::new();
        for resource in resources {
            if !self.allocated.remove(&resource) {
                log::warn!(
                    "Warning, deallocation of {resource:?} not currently allocated"
                );
                continue;
            }
            let pos = self.available.partition_point(|r| *r < resource);
            self.available.insert(pos, resource);
            returned.push(resource);
        }

        log::info!("newly deallocated {}s: {returned:?}", self.name);
        self.log_available();
    }

    /// Move a resource from available to excluded. Idempotent for already
    /// excluded resources; ignored for allocated ones.
    pub fn exclude(&mut self, resource: T) {
        if self.excluded.contains(&resource) {
            return;
        }

        if let Some(pos) = self.available.iter().position(|r| *r == resource) {
            self.available.remove(pos);
            self.excluded.insert(resource);
            log::info!(
                "excluding {}: {resource:?} from allocation pool",
                self.name
            );
            return;
        }

        log::info!(
            "ignoring request to exclude {}: {resource:?} which is not currently available",
            self.name
        );
    }

    /// Return all excluded resources to the available set. This may, for
    /// example, be attempted when there are not enough resources left to
    /// allocate.
    pub fn clear_excluded(&mut self) {
        for resource in std::mem::take(&mut self.excluded) {
            log::info!(
                "return {}: {resource:?} from excluded to available",
                self.name
            );
            let pos = self.available.partition_point(|r| *r < resource);
            self.available.insert(pos, resource);
        }
    }

    /// `true` iff the resource is currently excluded.
    pub fn is_excluded(&self, resource: T) -> bool {
        self.excluded.contains(&resource)
    }

    fn log_available(&self) {
        if self.available.len() > 10 {
            log::info!(
                "{} {}s available in range [{:?},{:?}]",
                self.available.len(),
                self.name,
                self.available.first().unwrap(),
                self.available.last().unwrap()
            );
        } else {
            log::info!("{}s available: {:?}", self.name, self.available);
        }
    }
}
