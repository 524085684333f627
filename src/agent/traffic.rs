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

//! Remote control of the per-node traffic generator instances.
//!
//! Every traffic endpoint runs an MGEN-style generator remote-controlled
//! over a local unix datagram socket. The traffic agent tracks one flow
//! table across all endpoints and translates flow requests into the
//! per-instance ON/OFF/JOIN/LISTEN command strings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::net::UnixDatagram;

use emex_model::scenario::{FlowOffRequest, FlowOnRequest, FlowPattern, TrafficProtocol};
use emex_proto::FlowRecord;

/// One traffic endpoint, loaded from the builder's port map file.
#[derive(Debug, Clone)]
struct PlatformEntry {
    plt_num: u32,
    hostname: String,
    #[allow(dead_code)]
    ipv4address: String,
    device: String,
}

/// The traffic flow controller of one EMOE.
pub struct TrafficAgent {
    flows: Vec<FlowRecord>,
    flow_index: u32,
    flow_number: u32,
    platform_map: BTreeMap<String, PlatformEntry>,
    sockets: BTreeMap<String, UnixDatagram>,
    flow_count_by_platform: BTreeMap<String, u32>,
    socket_dir: PathBuf,
}

impl TrafficAgent {
    /// Load the platform map from the `mgen_port_map.csv` written by the
    /// configuration builder.
    pub fn new(port_map_file: &Path, socket_dir: &Path) -> std::io::Result<Self> {
        let contents = std::fs::read_to_string(port_map_file)?;

        let mut platform_map = BTreeMap::new();
        for (plt_num, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != 4 {
                log::warn!("skipping malformed port map line \"{line}\"");
                continue;
            }
            platform_map.insert(
                fields[0].to_string(),
                PlatformEntry {
                    plt_num: plt_num as u32 + 1,
                    hostname: fields[1].to_string(),
                    ipv4address: fields[2].to_string(),
                    device: fields[3].to_string(),
                },
            );
        }

        Ok(Self {
            flows: Vec::new(),
            flow_index: 0,
            flow_number: 1,
            platform_map,
            sockets: BTreeMap::new(),
            flow_count_by_platform: BTreeMap::new(),
            socket_dir: socket_dir.to_path_buf(),
        })
    }

    /// The connected state requires an open socket to every endpoint.
    pub fn connected(&self) -> bool {
        self.sockets.len() == self.platform_map.len()
    }

    /// Try to open the control sockets that are not yet connected.
    /// Returns the connected state.
    pub fn connect(&mut self) -> bool {
        for (platform, entry) in &self.platform_map {
            if self.sockets.contains_key(platform) {
                continue;
            }

            let socket_name = self.socket_dir.join(format!("mgen-{}", entry.hostname));
            log::debug!(
                "try connecting to mgen instance socket at {}",
                socket_name.display()
            );

            match UnixDatagram::unbound().and_then(|s| s.connect(&socket_name).map(|_| s)) {
                Ok(socket) => {
                    self.sockets.insert(platform.clone(), socket);
                }
                Err(_) => {
                    log::debug!("{} not running yet", socket_name.display());
                }
            }
        }

        self.connected()
    }

    /// The current flow table.
    pub fn flows(&self) -> Vec<FlowRecord> {
        self.flows.clone()
    }

    async fn send(&self, platform: &str, command: &str) {
        log::debug!("send {platform} {command}");
        if let Some(socket) = self.sockets.get(platform) {
            if let Err(e) = socket.send(format!("event {command}").as_bytes()).await {
                log::warn!("cannot send traffic command to {platform}: {e}");
            }
        }
    }

    fn next_flow_index(&mut self) -> u32 {
        self.flow_index += 1;
        self.flow_index
    }

    fn next_flow_count(&mut self, source: &str) -> u32 {
        let count = self.flow_count_by_platform.entry(source.to_string()).or_insert(1);
        let current = *count;
        *count += 1;
        current
    }

    /// Winnow the requested sources and destinations to known platform
    /// names; empty selections mean all platforms.
    fn select_platforms(&self, requested: &[String]) -> Vec<String> {
        let all: Vec<String> = self.platform_map.keys().cloned().collect();

        let unknown: Vec<&String> = requested
            .iter()
            .filter(|p| !self.platform_map.contains_key(*p))
            .collect();
        if !unknown.is_empty() {
            log::warn!("ignoring unknown traffic platforms {unknown:?}");
        }

        let mut selected: Vec<String> = requested
            .iter()
            .filter(|p| self.platform_map.contains_key(*p))
            .cloned()
            .collect();
        if selected.is_empty() {
            selected = all;
        }
        selected.sort();
        selected
    }

    fn flow_phrase(request: &FlowOnRequest) -> String {
        match request.pattern {
            FlowPattern::Periodic => {
                format!("PERIODIC [{} {}]", request.packet_rate, request.size_bytes)
            }
            FlowPattern::Poisson => {
                format!("POISSON [{} {}]", request.packet_rate, request.size_bytes)
            }
            FlowPattern::Jitter => format!(
                "JITTER [{} {} {}]",
                request.packet_rate, request.size_bytes, request.jitter_fraction
            ),
        }
    }

    /// Start the requested flows. The whole batch is validated before any
    /// flow starts: duplicate active flow names reject it entirely.
    pub async fn start_flows(&mut self, requests: &[FlowOnRequest]) -> (bool, String) {
        if requests.is_empty() {
            return (true, String::new());
        }
        if !self.connected() {
            return (false, "start_flows called before connected".to_string());
        }

        for request in requests {
            if !request.flow_name.is_empty()
                && self
                    .flows
                    .iter()
                    .any(|f| f.active && f.flow_name == request.flow_name)
            {
                let message = format!(
                    "invalid flow request, flow name {} already exists",
                    request.flow_name
                );
                log::error!("{message}");
                return (false, message);
            }
        }

        for request in requests {
            let flow_name = if request.flow_name.is_empty() {
                let name = format!("flow-{:03}", self.flow_number);
                self.flow_number += 1;
                name
            } else {
                request.flow_name.clone()
            };

            let sources = self.select_platforms(&request.sources);
            let destinations = self.select_platforms(&request.destinations);

            if request.protocol == TrafficProtocol::Multicast {
                self.start_multicast(&flow_name, request, &sources, &destinations)
                    .await;
            } else {
                self.start_unicast(&flow_name, request, &sources, &destinations)
                    .await;
            }
        }

        (true, String::new())
    }

    /// Each source emits once to its group; every other platform joins
    /// the group and listens.
    async fn start_multicast(
        &mut self,
        flow_name: &str,
        request: &FlowOnRequest,
        sources: &[String],
        destinations: &[String],
    ) {
        for source in sources {
            let entry = self.platform_map[source].clone();

            let flow_count = self.next_flow_count(source);

            // change the source port for each flow as TTL and TOS are
            // per source port
            let src_port = 5000 + flow_count;
            let flow_id = (entry.plt_num + 100) * 100 + flow_count;
            let dst_address = format!("224.1.1.{}", entry.plt_num);
            let dst_port = flow_id;

            let flow_phrase = Self::flow_phrase(request);

            for destination in destinations {
                // don't send multicast to the same node
                if source == destination {
                    continue;
                }

                let flow_index = self.next_flow_index();
                self.flows.push(FlowRecord {
                    flow_index,
                    flow_name: flow_name.to_string(),
                    active: true,
                    flow_id,
                    source: source.clone(),
                    destination: destination.clone(),
                    tos: request.tos,
                    ttl: request.ttl,
                    proto: request.protocol,
                    pattern: request.pattern,
                    size_bytes: request.size_bytes,
                    packet_rate: request.packet_rate,
                    jitter_fraction: request.jitter_fraction,
                });

                let dst_device = self.platform_map[destination].device.clone();
                self.send(destination, &format!("JOIN {dst_address} INTERFACE {dst_device}"))
                    .await;
                self.send(destination, &format!("LISTEN UDP {dst_port}")).await;
            }

            self.send(
                source,
                &format!(
                    "ON {flow_id} UDP DST {dst_address}/{dst_port} {flow_phrase} \
                     INTERFACE {} SRC {src_port} TOS 0x{:x} TTL {}",
                    entry.device, request.tos, request.ttl
                ),
            )
            .await;
        }
    }

    /// Each `(source, destination)` pair is a unique flow.
    async fn start_unicast(
        &mut self,
        flow_name: &str,
        request: &FlowOnRequest,
        sources: &[String],
        destinations: &[String],
    ) {
        for source in sources {
            for destination in destinations {
                if source == destination {
                    continue;
                }

                let entry = self.platform_map[source].clone();
                let flow_count = self.next_flow_count(source);
                let src_port = 5000 + flow_count;
                let flow_id = (entry.plt_num + 100) * 100 + flow_count;
                let dst_port = flow_id;

                let flow_index = self.next_flow_index();
                self.flows.push(FlowRecord {
                    flow_index,
                    flow_name: flow_name.to_string(),
                    active: true,
                    flow_id,
                    source: source.clone(),
                    destination: destination.clone(),
                    tos: request.tos,
                    ttl: request.ttl,
                    proto: request.protocol,
                    pattern: request.pattern,
                    size_bytes: request.size_bytes,
                    packet_rate: request.packet_rate,
                    jitter_fraction: request.jitter_fraction,
                });

                let flow_phrase = Self::flow_phrase(request);
                let dst_entry = self.platform_map[destination].clone();

                self.send(
                    destination,
                    &format!("LISTEN {} {dst_port}", request.protocol.keyword()),
                )
                .await;
                self.send(
                    source,
                    &format!(
                        "ON {flow_id} {} SRC {src_port} DST {}/{dst_port} {flow_phrase} \
                         TOS 0x{:x}",
                        request.protocol.keyword(),
                        dst_entry.ipv4address,
                        request.tos
                    ),
                )
                .await;
            }
        }
    }

    /// Stop the flows selected by name, id, source and/or destination. A
    /// request that only names a flow also drops its rows so that the
    /// name can be reused.
    pub async fn stop_flows(&mut self, requests: &[FlowOffRequest]) -> (bool, String) {
        if requests.is_empty() {
            return (true, String::new());
        }
        if !self.connected() {
            return (false, "stop_flows called before connected".to_string());
        }

        for request in requests {
            let selected: Vec<(u32, String, String, u32)> = self
                .flows
                .iter()
                .filter(|f| {
                    (request.flow_name.is_empty() || f.flow_name == request.flow_name)
                        && (request.flow_ids.is_empty() || request.flow_ids.contains(&f.flow_id))
                        && (request.sources.is_empty() || request.sources.contains(&f.source))
                        && (request.destinations.is_empty()
                            || request.destinations.contains(&f.destination))
                })
                .map(|f| (f.flow_index, f.source.clone(), f.destination.clone(), f.flow_id))
                .collect();

            for (flow_index, source, destination, flow_id) in selected {
                self.send(&source, &format!("OFF {flow_id}")).await;
                self.send(&destination, &format!("IGNORE {flow_id}")).await;

                if let Some(flow) = self.flows.iter_mut().find(|f| f.flow_index == flow_index) {
                    flow.active = false;
                }
            }

            if !request.flow_name.is_empty()
                && request.flow_ids.is_empty()
                && request.sources.is_empty()
                && request.destinations.is_empty()
            {
                self.flows.retain(|f| f.flow_name != request.flow_name);
            }
        }

        (true, String::new())
    }
}
