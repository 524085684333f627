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

//! Jammer on/off control via the jammer control utility.

use std::collections::BTreeMap;
use std::process::Stdio;

use tokio::process::Command;

use emex_model::scenario::{JamOffEvent, JamOnEvent};

const JAMMER_CONTROL: &str = "emane-jammer-simple-control";
const JAMMER_CONTROL_PORT: u16 = 45715;

/// Spawns one jammer control invocation per targeted component.
pub struct JamController {
    nemid_map: BTreeMap<(String, String), i64>,
}

impl JamController {
    /// Create the controller over the nemid map loaded at boot.
    pub fn new(nemid_map: BTreeMap<(String, String), i64>) -> Self {
        Self { nemid_map }
    }

    /// Targets of one event: the named components, or every component of
    /// the platform when none are named.
    fn targets(&self, platform_name: &str, component_names: &[String]) -> Vec<(String, i64)> {
        self.nemid_map
            .iter()
            .filter(|((plt, cmp), _)| {
                plt == platform_name
                    && (component_names.is_empty() || component_names.contains(cmp))
            })
            .map(|((plt, cmp), nemid)| (format!("{plt}-{cmp}"), *nemid))
            .collect()
    }

    fn spawn(&self, args: Vec<String>) {
        log::debug!("run \"{JAMMER_CONTROL} {}\"", args.join(" "));

        if let Err(e) = Command::new(JAMMER_CONTROL)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            log::error!("cannot run {JAMMER_CONTROL}: {e}");
        }
    }

    /// Turn the jammers of the addressed components on.
    pub fn jam_on(&self, events: &[JamOnEvent]) -> (bool, String) {
        for event in events {
            for (hostname, nemid) in
                self.targets(&event.platform_name, &event.component_names)
            {
                let mut args = vec![
                    format!("{hostname}:{JAMMER_CONTROL_PORT}"),
                    "on".to_string(),
                    "-p".to_string(),
                    event.txpower.to_string(),
                    "-b".to_string(),
                    event.bandwidth.to_string(),
                    "-t".to_string(),
                    event.period.to_string(),
                    "-d".to_string(),
                    event.duty_cycle.to_string(),
                    nemid.to_string(),
                ];
                args.extend(event.frequencies.iter().map(u64::to_string));

                self.spawn(args);
            }
        }

        (true, String::new())
    }

    /// Turn the jammers of the addressed components off.
    pub fn jam_off(&self, events: &[JamOffEvent]) -> (bool, String) {
        for event in events {
            for (hostname, _) in self.targets(&event.platform_name, &event.component_names) {
                self.spawn(vec![
                    format!("{hostname}:{JAMMER_CONTROL_PORT}"),
                    "off".to_string(),
                ]);
            }
        }

        (true, String::new())
    }
}
