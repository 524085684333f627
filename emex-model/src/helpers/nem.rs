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

//! NEM id assignment and uniqueness.

use std::collections::{BTreeMap, BTreeSet};

use super::ConfigHelper;
use crate::{platform::Platform, types::ModelError};

/// Assigns the smallest unused positive integer to every component that
/// carries an `emane.nemid` parameter without a value, and rejects
/// duplicate NEM ids globally.
pub struct NemHelper;

impl ConfigHelper for NemHelper {
    fn configure(&self, platforms: &mut [Platform]) -> Result<(), ModelError> {
        let mut assigned: BTreeSet<i64> = BTreeSet::new();

        for platform in platforms.iter() {
            for (_, _, p, v) in platform.get_params() {
                if p == "nemid" {
                    if let Some(value) = v.first().and_then(|v| v.as_int()) {
                        assigned.insert(value);
                    }
                }
            }
        }

        let mut next_nemid = 1i64;
        while assigned.contains(&next_nemid) {
            next_nemid += 1;
        }

        for platform in platforms.iter_mut() {
            let missing: Vec<(String, String, String)> = platform
                .get_params()
                .into_iter()
                .filter(|(_, _, p, v)| p == "nemid" && v.is_empty())
                .map(|(c, pg, p, _)| (c, pg, p))
                .collect();

            for (c, pg, p) in missing {
                platform.set_param(&c, &pg, &p, vec![next_nemid.into()])?;
                assigned.insert(next_nemid);
                while assigned.contains(&next_nemid) {
                    next_nemid += 1;
                }
            }
        }

        Ok(())
    }

    fn check(&self, platforms: &[Platform]) -> Result<(), ModelError> {
        let mut nemids: BTreeMap<i64, Vec<String>> = BTreeMap::new();

        for platform in platforms {
            for (c, _, p, v) in platform.get_params() {
                if p == "nemid" {
                    if let Some(value) = v.first().and_then(|v| v.as_int()) {
                        nemids
                            .entry(value)
                            .or_default()
                            .push(format!("{}.{}", platform.name(), c));
                    }
                }
            }
        }

        for (nemid, owners) in nemids {
            if owners.len() > 1 {
                return Err(ModelError::HelperCheck(format!(
                    "Error: Duplicate nemid \"{nemid}\" assigned to {}",
                    owners.join(", ")
                )));
            }
        }

        Ok(())
    }
}
