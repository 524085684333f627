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

//! The per-EMOE mutable runtime state: identifiers, allocated resources,
//! the container reference, device and port maps, and the position in the
//! lifecycle state machine.

use std::collections::BTreeMap;
use std::path::PathBuf;

use emex_model::{Emoe, EmoeState, ParamValue};

use crate::{
    config::{DaemonConfig, DatetimeTagFormat},
    timestamp::Timestamp,
};

/// How many times a container start is attempted before the runtime is
/// declared FAILED.
pub const START_ATTEMPTS: i32 = 3;

/// A network device inside one emulated node.
#[derive(Debug, Clone, PartialEq)]
pub enum Device {
    /// A plain host interface.
    Host {
        /// Device name.
        name: String,
        /// IPv4 address.
        ipv4address: String,
        /// Prefix length.
        masklen: u8,
    },
    /// A radio interface bound to a NEM.
    Radio {
        /// Device name.
        name: String,
        /// IPv4 address.
        ipv4address: String,
        /// Prefix length.
        masklen: u8,
        /// The NEM id of the radio.
        nemid: i64,
    },
    /// A bridged veth interface of the container plan.
    Bridge {
        /// Device name.
        name: String,
        /// IPv4 address.
        ipv4address: String,
        /// Prefix length.
        masklen: u8,
        /// Hardware address.
        hwaddr: String,
    },
}

impl Device {
    /// The device name.
    pub fn name(&self) -> &str {
        match self {
            Device::Host { name, .. } | Device::Radio { name, .. } | Device::Bridge { name, .. } => {
                name
            }
        }
    }

    /// The IPv4 address of the device.
    pub fn ipv4address(&self) -> &str {
        match self {
            Device::Host { ipv4address, .. }
            | Device::Radio { ipv4address, .. }
            | Device::Bridge { ipv4address, .. } => ipv4address,
        }
    }
}

/// The devices of one emulated node, keyed by device name, together with
/// the node's roles.
#[derive(Debug, Clone, Default)]
pub struct NodeRuntime {
    /// The node hostname (`<platform>-<component>`).
    pub hostname: String,
    /// `true` iff the node is an emane node.
    pub emane_node: bool,
    /// `true` iff the node terminates traffic flows.
    pub traffic_endpoint: bool,
    /// `true` iff the node publishes testpoint probes.
    pub testpoint_publisher: bool,
    /// Devices by name.
    pub devices: BTreeMap<String, Device>,
}

impl NodeRuntime {
    /// Look up a device by name.
    pub fn device(&self, name: &str) -> Option<&Device> {
        self.devices.get(name)
    }

    /// Add (or replace) a device.
    pub fn add_device(&mut self, device: Device) {
        self.devices.insert(device.name().to_string(), device);
    }
}

/// All runtime state of one submitted EMOE. Created when a start request
/// is accepted and destroyed on terminal teardown.
#[derive(Debug)]
pub struct EmoeRuntime {
    timestamp: Timestamp,
    client_id: u64,
    emoe: Emoe,
    cpus: Vec<u32>,
    container_name: String,
    state: EmoeState,
    did_run: bool,
    stop_count: u32,
    start_attempts: i32,
    container_handle: Option<String>,
    container_conn: Option<u64>,
    container_ports: BTreeMap<String, u16>,
    host_port_mappings: BTreeMap<u16, (String, u16)>,
    nodes: BTreeMap<(String, String), NodeRuntime>,
}

impl EmoeRuntime {
    /// Create the runtime for a newly accepted EMOE.
    pub fn new(
        timestamp: Timestamp,
        client_id: u64,
        emoe: Emoe,
        cpus: Vec<u32>,
        config: &DaemonConfig,
    ) -> Self {
        let container_name = match config.container_datetime_tag_format {
            DatetimeTagFormat::Prefix => format!("{}.{}", timestamp.emoe_id(), emoe.name()),
            DatetimeTagFormat::Suffix => format!("{}.{}", emoe.name(), timestamp.emoe_id()),
            DatetimeTagFormat::None => emoe.name().to_string(),
        };

        let mut runtime = Self {
            timestamp,
            client_id,
            emoe,
            cpus,
            container_name,
            state: EmoeState::Queued,
            did_run: false,
            stop_count: 0,
            start_attempts: START_ATTEMPTS,
            container_handle: None,
            container_conn: None,
            container_ports: BTreeMap::new(),
            host_port_mappings: BTreeMap::new(),
            nodes: BTreeMap::new(),
        };

        // pre-populate the per-node radio and host devices from the
        // configured net parameters
        let mut devices = Vec::new();
        for platform in runtime.emoe.platforms() {
            for component in platform.components() {
                let param_str = |pg: &str, p: &str| -> Option<String> {
                    component
                        .get_param(pg, p)
                        .ok()
                        .and_then(|p| p.first())
                        .map(ParamValue::to_string)
                };

                let (Some(addr), Some(mask), Some(device_name)) = (
                    param_str("net", "ipv4address"),
                    param_str("net", "ipv4mask"),
                    param_str("net", "device"),
                ) else {
                    continue;
                };
                let masklen = mask.parse().unwrap_or(16);

                let device = match component.nemid() {
                    Some(nemid) => Device::Radio {
                        name: device_name,
                        ipv4address: addr,
                        masklen,
                        nemid,
                    },
                    None => Device::Host {
                        name: device_name,
                        ipv4address: addr,
                        masklen,
                    },
                };
                devices.push((
                    platform.name().to_string(),
                    component.name().to_string(),
                    device,
                ));
            }
        }
        for (plt, cmp, device) in devices {
            runtime.node_mut(&plt, &cmp).add_device(device);
        }

        runtime
    }

    /// The timestamp the runtime was created with.
    pub fn timestamp(&self) -> &Timestamp {
        &self.timestamp
    }

    /// The EMOE id (also the client-visible handle).
    pub fn emoe_id(&self) -> String {
        self.timestamp.emoe_id()
    }

    /// The per-EMOE working directory.
    pub fn workdir(&self) -> PathBuf {
        self.timestamp.workdir(self.emoe.name())
    }

    /// The raw-event multicast address of the EMOE.
    pub fn mcast_address(&self) -> String {
        self.timestamp.mcast_address()
    }

    /// The owning client session.
    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    /// The validated EMOE.
    pub fn emoe(&self) -> &Emoe {
        &self.emoe
    }

    /// The container name derived from the datetime tag format.
    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// The allocated cpu ids, ascending.
    pub fn cpus(&self) -> &[u32] {
        &self.cpus
    }

    /// The number of allocated cpus.
    pub fn num_cpus(&self) -> u32 {
        self.cpus.len() as u32
    }

    /// The current lifecycle state.
    pub fn state(&self) -> EmoeState {
        self.state
    }

    /// Advance the lifecycle state. States are totally ordered and only
    /// ever advance; a regressing transition is rejected.
    pub fn advance_state(&mut self, state: EmoeState) -> bool {
        if state < self.state {
            log::warn!(
                "rejecting state regression {} -> {} for emoe {}",
                self.state,
                state,
                self.emoe.name()
            );
            return false;
        }
        if state != self.state {
            log::info!(
                "emoe {} state {} -> {}",
                self.emoe.name(),
                self.state,
                state
            );
        }
        self.state = state;
        if state == EmoeState::Running {
            self.did_run = true;
        }
        true
    }

    /// `true` iff the EMOE ever reached RUNNING.
    pub fn did_run(&self) -> bool {
        self.did_run
    }

    /// The number of STOPPING confirmations seen so far.
    pub fn stop_count(&self) -> u32 {
        self.stop_count
    }

    /// Overwrite the STOPPING confirmation count.
    pub fn set_stop_count(&mut self, count: u32) {
        self.stop_count = count;
    }

    /// The remaining start attempts.
    pub fn start_attempts(&self) -> i32 {
        self.start_attempts
    }

    /// Consume one start attempt; `true` while the budget lasts.
    pub fn can_start(&mut self) -> bool {
        self.start_attempts = (self.start_attempts - 1).max(-1);
        self.start_attempts >= 0
    }

    /// The engine handle of the started container, if any.
    pub fn container_handle(&self) -> Option<&str> {
        self.container_handle.as_deref()
    }

    /// Record the engine handle of the started container.
    pub fn set_container_handle(&mut self, handle: impl Into<String>) {
        self.container_handle = Some(handle.into());
    }

    /// The agent connection of the container, assigned if and when the
    /// container dials back to the daemon.
    pub fn container_conn(&self) -> Option<u64> {
        self.container_conn
    }

    /// Bind the agent connection.
    pub fn set_container_conn(&mut self, conn: u64) {
        self.container_conn = Some(conn);
    }

    /// `true` once the container's agent has connected.
    pub fn did_connect(&self) -> bool {
        self.container_conn.is_some()
    }

    /// The in-container service ports by service name.
    pub fn container_ports(&self) -> &BTreeMap<String, u16> {
        &self.container_ports
    }

    /// Register an in-container service port.
    pub fn add_container_port(&mut self, service_name: impl Into<String>, port: u16) {
        self.container_ports.insert(service_name.into(), port);
    }

    /// The host port mappings: host port → (service, container port).
    pub fn host_port_mappings(&self) -> &BTreeMap<u16, (String, u16)> {
        &self.host_port_mappings
    }

    /// Map a host port to a registered service.
    pub fn add_host_port_mapping(&mut self, host_port: u16, service_name: &str) {
        let Some(&container_port) = self.container_ports.get(service_name) else {
            log::error!(
                "Unknown service {service_name} when trying to map to host port {host_port}"
            );
            return;
        };
        self.host_port_mappings
            .insert(host_port, (service_name.to_string(), container_port));
    }

    /// Drop all host port mappings (after a failed container start).
    pub fn clear_host_port_mappings(&mut self) {
        self.host_port_mappings.clear();
    }

    /// The per-node runtime records, keyed by `(platform, component)`.
    pub fn nodes(&self) -> &BTreeMap<(String, String), NodeRuntime> {
        &self.nodes
    }

    /// Get or create the node record of `(platform, component)`.
    pub fn node_mut(&mut self, platform_name: &str, component_name: &str) -> &mut NodeRuntime {
        let key = (platform_name.to_string(), component_name.to_string());
        if !self.nodes.contains_key(&key) {
            let hostname = format!("{platform_name}-{component_name}");
            let (emane_node, traffic_endpoint, testpoint_publisher) = self
                .emoe
                .platform(platform_name)
                .and_then(|p| p.component(component_name))
                .map(|c| (c.emane_node(), c.traffic_endpoint(), c.testpoint_publisher()))
                .unwrap_or((false, false, false));
            self.nodes.insert(
                key.clone(),
                NodeRuntime {
                    hostname,
                    emane_node,
                    traffic_endpoint,
                    testpoint_publisher,
                    devices: BTreeMap::new(),
                },
            );
        }
        self.nodes.get_mut(&key).expect("inserted above")
    }

    /// All control-plane (`backchan0`) endpoints:
    /// `(platform, component, address, node)`, sorted by key.
    pub fn control_endpoints(&self) -> Vec<(&str, &str, &str, &NodeRuntime)> {
        self.nodes
            .iter()
            .filter_map(|((plt, cmp), node)| {
                node.device("backchan0")
                    .map(|d| (plt.as_str(), cmp.as_str(), d.ipv4address(), node))
            })
            .collect()
    }

    /// The traffic endpoint map: one entry per platform with a traffic
    /// endpoint component, `(platform, hostname, control address, radio
    /// device name)`, in sorted platform order.
    pub fn port_map(&self) -> Vec<(String, String, String, String)> {
        let mut entries: Vec<(String, String, String, String)> = Vec::new();

        for ((plt, cmp), node) in &self.nodes {
            if !node.traffic_endpoint {
                continue;
            }
            if entries.iter().any(|(p, _, _, _)| p == plt) {
                continue;
            }
            let control_addr = node
                .device("backchan0")
                .map(|d| d.ipv4address().to_string())
                .unwrap_or_default();
            let radio_device = self
                .emoe
                .platform(plt)
                .and_then(|p| p.component(cmp))
                .and_then(|c| c.get_param("net", "device").ok())
                .and_then(|p| p.first().map(ParamValue::to_string))
                .unwrap_or_else(|| "ota0".to_string());
            entries.push((plt.clone(), node.hostname.clone(), control_addr, radio_device));
        }

        entries
    }

    /// The NEM id of every radio component, keyed by
    /// `(platform, component)`, in sorted order.
    pub fn nemid_map(&self) -> BTreeMap<(String, String), i64> {
        let mut map = BTreeMap::new();
        for platform in self.emoe.platforms() {
            for component in platform.components() {
                if let Some(nemid) = component.nemid() {
                    map.insert(
                        (platform.name().to_string(), component.name().to_string()),
                        nemid,
                    );
                }
            }
        }
        map
    }
}
