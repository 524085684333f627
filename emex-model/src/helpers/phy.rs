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

//! Fixed antenna gain settings derived from the `phy.antenna0` pseudo
//! parameter.

use std::collections::BTreeMap;

use super::{ConfigHelper, ControlAddrs, MetaParams};
use crate::{platform::Platform, types::ModelError};

/// Derives `phy.fixedantennagainenable` and `phy.fixedantennagain` from
/// the `phy.antenna0` value: `omni` or `omni_GAIN` enables the fixed gain
/// (with the parsed gain, default 0.0); any other antenna name disables it.
pub struct PhyHelper;

impl ConfigHelper for PhyHelper {
    fn configure(&self, _platforms: &mut [Platform]) -> Result<(), ModelError> {
        Ok(())
    }

    fn check(&self, _platforms: &[Platform]) -> Result<(), ModelError> {
        Ok(())
    }

    fn meta_params(
        &self,
        platforms: &[Platform],
        _control_addrs: &ControlAddrs,
    ) -> Result<MetaParams, ModelError> {
        let mut meta = MetaParams::new();

        for platform in platforms {
            for (c, pg, p, v) in platform.get_params() {
                if pg != "phy" || p != "antenna0" {
                    continue;
                }
                let Some(antenna0) = v.first().map(|v| v.to_string()) else {
                    continue;
                };

                let settings = if antenna0.to_lowercase().starts_with("omni") {
                    // an omni antenna0 value may carry a gain, as in omni_20.0
                    let gain = antenna0
                        .split_once('_')
                        .and_then(|(_, g)| g.parse::<f64>().ok())
                        .unwrap_or(0.0);

                    log::debug!(
                        "platform {} has omni antenna with gain {gain}",
                        platform.name()
                    );

                    BTreeMap::from([
                        ("phy.fixedantennagainenable".to_string(), "true".to_string()),
                        ("phy.fixedantennagain".to_string(), gain.to_string()),
                    ])
                } else {
                    log::debug!("platform {} has antenna0 {antenna0}", platform.name());

                    BTreeMap::from([
                        ("phy.fixedantennagainenable".to_string(), "false".to_string()),
                        ("phy.fixedantennagain".to_string(), "0".to_string()),
                    ])
                };

                meta.insert((platform.name().to_string(), c), settings);
            }
        }

        Ok(meta)
    }
}
