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

//! The scenario event fan-out of the in-container agent.
//!
//! Every request from the connected scenario driver is split between the
//! traffic agent, the emulator event sink and the jammer controller; the
//! combined result is reported back with the server sequence number and,
//! on request, the flow table.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use emex_proto::{ScenarioReply, ScenarioRequest};

use super::{
    events::{EelMulticastSink, EmulatorEventSink},
    jammer::JamController,
    traffic::TrafficAgent,
};

/// The nemid/profile-id map relative to the mounted workdir.
const NEMID_MAP_FILE: &str = "config/doc/nemid_map.csv";
/// The traffic endpoint map relative to the mounted workdir.
const PORT_MAP_FILE: &str = "config/doc/mgen_port_map.csv";
/// The daemon configuration mirror relative to the mounted workdir.
const DAEMON_CONFIG_FILE: &str = "config/doc/emexd-config.csv";

/// Fans scenario requests out to the traffic, emulator-event and jammer
/// sinks.
pub struct ScenarioManager {
    traffic: TrafficAgent,
    sink: Box<dyn EmulatorEventSink>,
    jammer: JamController,
    config_map: BTreeMap<String, String>,
    server_sequence: u32,
    etce_root: PathBuf,
}

impl ScenarioManager {
    /// Load the identifier maps from the mounted workdir and assemble the
    /// sinks.
    pub fn new(etce_root: &Path) -> std::io::Result<Self> {
        let (nemid_map, profileid_map) = read_nemid_profileid_map(&etce_root.join(NEMID_MAP_FILE))?;
        let config_map = read_daemon_config_map(&etce_root.join(DAEMON_CONFIG_FILE))?;
        let traffic = TrafficAgent::new(&etce_root.join(PORT_MAP_FILE), Path::new("/tmp"))?;

        Ok(Self {
            traffic,
            sink: Box::new(EelMulticastSink::new(nemid_map.clone(), profileid_map)),
            jammer: JamController::new(nemid_map),
            config_map,
            server_sequence: 1,
            etce_root: etce_root.to_path_buf(),
        })
    }

    /// Try to open the traffic control sockets; `true` once every
    /// endpoint is connected.
    pub fn connect(&mut self) -> bool {
        self.traffic.connect()
    }

    /// Apply one scenario request and build its reply.
    pub async fn handle_request(&mut self, request: ScenarioRequest) -> ScenarioReply {
        log::debug!(
            "handle_request client_sequence={}",
            request.client_sequence
        );

        let events = &request.events;

        let (start_ok, start_message) = self.traffic.start_flows(&events.flow_on).await;
        let (stop_ok, stop_message) = self.traffic.stop_flows(&events.flow_off).await;

        let mut events_ok = true;
        let mut events_message = String::new();
        for result in [
            self.sink.publish_povs(&events.povs).await,
            self.sink.publish_pathlosses(&events.pathlosses).await,
            self.sink
                .publish_antenna_pointings(&events.antenna_pointings)
                .await,
        ] {
            if let Err(message) = result {
                events_ok = false;
                events_message = message;
                break;
            }
        }

        let (jam_on_ok, jam_on_message) = self.jammer.jam_on(&events.jam_on);
        let (jam_off_ok, jam_off_message) = self.jammer.jam_off(&events.jam_off);

        let ok = start_ok && stop_ok && events_ok && jam_on_ok && jam_off_ok;
        let message = if !start_ok {
            start_message
        } else if !stop_ok {
            stop_message
        } else if !events_ok {
            events_message
        } else if !jam_on_ok {
            jam_on_message
        } else if !jam_off_ok {
            jam_off_message
        } else {
            format!("ok for client_sequence={}", request.client_sequence)
        };

        let flows = if request.list_flows {
            self.traffic.flows()
        } else {
            Vec::new()
        };

        let reply = ScenarioReply {
            client_sequence: request.client_sequence,
            server_sequence: self.server_sequence,
            result: ok,
            message,
            flows,
        };
        self.server_sequence += 1;
        reply
    }

    /// Remove the subdirectories the emulation created inside the mounted
    /// workdir, when the mirrored retention policy asks for it.
    pub fn clean_up(&self, did_run: bool) {
        let action = self
            .config_map
            .get("emexdirectory-action")
            .map(String::as_str)
            .unwrap_or("keep");

        if action == "keep" || (action == "deleteonsuccess" && !did_run) {
            return;
        }

        for dir in ["current_test", "data", "lxcroot", "lock"] {
            let path = self.etce_root.join(dir);
            log::info!("cleanup {}", path.display());
            let _ = std::fs::remove_dir_all(&path);
        }
        for file in ["etce.log", "emexcontainerd.log"] {
            let path = self.etce_root.join(file);
            if path.is_file() {
                log::info!("cleanup {}", path.display());
                let _ = std::fs::remove_file(&path);
            }
        }
    }
}

fn read_nemid_profileid_map(
    path: &Path,
) -> std::io::Result<(
    BTreeMap<(String, String), i64>,
    BTreeMap<(String, String), usize>,
)> {
    let contents = std::fs::read_to_string(path)?;

    let mut nemid_map = BTreeMap::new();
    let mut profileid_map = BTreeMap::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 4 {
            log::warn!("skipping malformed nemid map line \"{line}\"");
            continue;
        }

        let key = (fields[0].to_string(), fields[1].to_string());

        log::info!(
            "map plt:{} cmp:{} nemid:{} profileid:{}",
            fields[0],
            fields[1],
            fields[2],
            fields[3]
        );

        if let Ok(nemid) = fields[2].parse() {
            nemid_map.insert(key.clone(), nemid);
        }
        if let Ok(profileid) = fields[3].trim().parse() {
            profileid_map.insert(key, profileid);
        }
    }

    Ok((nemid_map, profileid_map))
}

fn read_daemon_config_map(path: &Path) -> std::io::Result<BTreeMap<String, String>> {
    let contents = std::fs::read_to_string(path)?;

    Ok(contents
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            line.split_once(',')
                .map(|(name, value)| (name.to_string(), value.to_string()))
        })
        .collect())
}
