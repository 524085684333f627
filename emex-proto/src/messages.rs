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

//! The message enums of the three protocol surfaces: client ↔ daemon,
//! daemon ↔ in-container agent, and agent ↔ scenario driver.

use serde::{Deserialize, Serialize};

use emex_model::{
    scenario::{EventSet, FlowPattern, TrafficProtocol},
    AntennaType, EmoeDescription, EmoeState, PlatformType,
};

/// A request from a client to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Retrieve the installed platform and antenna types.
    ModelTypesRequest,
    /// Validate an EMOE without starting it.
    CheckEmoeRequest {
        /// The EMOE name.
        emoe_name: String,
        /// The EMOE description.
        emoe: EmoeDescription,
    },
    /// Validate and start an EMOE.
    StartEmoeRequest {
        /// The EMOE name.
        emoe_name: String,
        /// The EMOE description.
        emoe: EmoeDescription,
    },
    /// List the EMOEs owned by the calling session.
    ListEmoesRequest,
    /// Stop a running EMOE by handle.
    StopEmoeRequest {
        /// The EMOE handle returned by the start reply.
        handle: String,
    },
}

/// A reply (or unsolicited event) from the daemon to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// The installed model types.
    ModelTypesReply {
        /// The installed platform types.
        platformtypes: Vec<PlatformType>,
        /// The installed antenna types.
        antennatypes: Vec<AntennaType>,
    },
    /// Result of a check request.
    CheckEmoeReply {
        /// The checked EMOE name.
        emoe_name: String,
        /// `true` for PASS.
        result: bool,
        /// Diagnostic message.
        message: String,
    },
    /// Result of a start request.
    StartEmoeReply {
        /// The started EMOE name.
        emoe_name: String,
        /// `true` for PASS.
        result: bool,
        /// Diagnostic message.
        message: String,
        /// The handle of the started EMOE (empty on FAIL).
        #[serde(default)]
        handle: String,
    },
    /// The EMOEs owned by the calling session.
    ListEmoesReply {
        /// Number of cpus allocated to the daemon.
        total_cpus: u32,
        /// Number of cpus currently unallocated.
        available_cpus: u32,
        /// One entry per owned runtime, in submission order.
        entries: Vec<ListEmoesEntry>,
    },
    /// Result of a stop request.
    StopEmoeReply {
        /// The handle of the stopped EMOE.
        handle: String,
        /// The stopped EMOE name.
        emoe_name: String,
        /// `true` for PASS.
        result: bool,
        /// Diagnostic message.
        message: String,
    },
    /// Unsolicited state transition notification; only sent when the
    /// daemon is configured with `state-messages` enabled.
    EmoeStateTransitionEvent {
        /// The EMOE handle.
        handle: String,
        /// The EMOE name.
        emoe_name: String,
        /// The new state.
        state: EmoeState,
        /// The number of assigned cpus.
        cpus: u32,
        /// Optional detail message.
        #[serde(default)]
        message: String,
        /// Service accessors; present while `state ≤ UPDATING`.
        #[serde(default)]
        service_accessors: Vec<ServiceAccessor>,
    },
}

/// One entry of a [`ServerMessage::ListEmoesReply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListEmoesEntry {
    /// The EMOE handle.
    pub handle: String,
    /// The EMOE name.
    pub emoe_name: String,
    /// The current state.
    pub state: EmoeState,
    /// The number of assigned cpus.
    pub cpus: u32,
    /// The exposed in-container services; present while
    /// `state ≤ UPDATING`.
    #[serde(default)]
    pub service_accessors: Vec<ServiceAccessor>,
}

/// An `(name, ip, port)` triple exposing an in-container service to
/// external clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceAccessor {
    /// The service name, e.g. `emexcontainerd` or `otestpoint-publish`.
    pub name: String,
    /// The host address the service is reachable at.
    pub ip_address: String,
    /// The mapped host port.
    pub port: u16,
}

/// The lifecycle command the daemon sends to an in-container agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmoeCommand {
    /// Boot the inner emulator.
    Start,
    /// Tear the emulation down.
    Stop,
}

impl std::fmt::Display for EmoeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmoeCommand::Start => f.write_str("START"),
            EmoeCommand::Stop => f.write_str("STOP"),
        }
    }
}

/// Daemon → agent lifecycle control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerControlMessage {
    /// The command.
    pub command: EmoeCommand,
    /// The addressed EMOE id; the agent ignores mismatching ids.
    pub emoe_id: String,
}

/// Agent → daemon state report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerStateMessage {
    /// The reporting EMOE id.
    pub emoe_id: String,
    /// The agent's current state.
    pub state: EmoeState,
    /// Optional diagnostic detail.
    #[serde(default)]
    pub detail: String,
}

/// Driver → agent scenario request: one batch of events plus a client
/// sequence number echoed in the reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioRequest {
    /// Client-side sequence number.
    pub client_sequence: u32,
    /// Include the flow table in the reply.
    #[serde(default)]
    pub list_flows: bool,
    /// The events to apply.
    pub events: EventSet,
}

/// Agent → driver reply to a [`ScenarioRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReply {
    /// Echo of the request's sequence number.
    pub client_sequence: u32,
    /// Server-side sequence number.
    pub server_sequence: u32,
    /// `true` iff all events were applied.
    pub result: bool,
    /// Diagnostic message.
    pub message: String,
    /// The flow table; included iff the request set `list_flows`.
    #[serde(default)]
    pub flows: Vec<FlowRecord>,
}

/// One row of the agent's traffic flow table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    /// Unique row index.
    pub flow_index: u32,
    /// The flow name.
    pub flow_name: String,
    /// `false` once the flow was stopped.
    pub active: bool,
    /// The flow id, synthesized per source.
    pub flow_id: u32,
    /// The source platform.
    pub source: String,
    /// The destination platform.
    pub destination: String,
    /// Type-of-service byte.
    pub tos: u8,
    /// Time-to-live.
    pub ttl: u8,
    /// The transport.
    pub proto: TrafficProtocol,
    /// The emission pattern.
    pub pattern: FlowPattern,
    /// Packet size in bytes.
    pub size_bytes: u32,
    /// Packet rate in packets per second.
    pub packet_rate: f64,
    /// Jitter fraction.
    pub jitter_fraction: f64,
}
