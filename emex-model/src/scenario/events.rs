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

//! The scenario event payloads delivered to a running EMOE.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::initial::{AntennaPointing, PathlossEntry, Pov};

/// The transport of a traffic flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficProtocol {
    /// Unicast UDP.
    Udp,
    /// Unicast TCP.
    Tcp,
    /// Multicast UDP.
    Multicast,
}

impl TrafficProtocol {
    /// The upper-case transport keyword used in traffic control commands.
    pub fn keyword(&self) -> &'static str {
        match self {
            TrafficProtocol::Udp | TrafficProtocol::Multicast => "UDP",
            TrafficProtocol::Tcp => "TCP",
        }
    }
}

/// The emission pattern of a traffic flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowPattern {
    /// Fixed-rate emission.
    Periodic,
    /// Poisson-distributed emission.
    Poisson,
    /// Periodic emission with a jitter fraction.
    Jitter,
}

/// Start one or more traffic flows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowOnRequest {
    /// Optional flow name; generated when empty. An active flow name must
    /// be unique.
    #[serde(default)]
    pub flow_name: String,
    /// Source platforms (already expanded from the source regex); empty
    /// means all platforms.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Destination platforms; empty means all platforms.
    #[serde(default)]
    pub destinations: Vec<String>,
    /// The transport.
    pub protocol: TrafficProtocol,
    /// Type-of-service byte.
    #[serde(default)]
    pub tos: u8,
    /// Time-to-live.
    #[serde(default = "default_ttl")]
    pub ttl: u8,
    /// The emission pattern.
    pub pattern: FlowPattern,
    /// Packet size in bytes.
    pub size_bytes: u32,
    /// Packet rate in packets per second.
    pub packet_rate: f64,
    /// Jitter fraction for [`FlowPattern::Jitter`].
    #[serde(default)]
    pub jitter_fraction: f64,
}

fn default_ttl() -> u8 {
    1
}

/// Stop traffic flows selected by name, id, source and/or destination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowOffRequest {
    /// Select by flow name.
    #[serde(default)]
    pub flow_name: String,
    /// Select by flow ids.
    #[serde(default)]
    pub flow_ids: Vec<u32>,
    /// Select by source platforms.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Select by destination platforms.
    #[serde(default)]
    pub destinations: Vec<String>,
}

/// Turn a jammer on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JamOnEvent {
    /// The jamming platform.
    pub platform_name: String,
    /// The targeted components; empty means all components of the
    /// platform.
    #[serde(default)]
    pub component_names: Vec<String>,
    /// Transmit power in dBm.
    pub txpower: f64,
    /// Bandwidth in Hz.
    pub bandwidth: u64,
    /// Period in microseconds.
    pub period: u64,
    /// Duty cycle in percent.
    pub duty_cycle: u64,
    /// The jammed frequencies in Hz.
    pub frequencies: Vec<u64>,
}

/// Turn a jammer off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JamOffEvent {
    /// The jamming platform.
    pub platform_name: String,
    /// The targeted components; empty means all components of the
    /// platform.
    #[serde(default)]
    pub component_names: Vec<String>,
}

/// All events of one scenario timepoint, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSet {
    /// Flow start requests.
    #[serde(default)]
    pub flow_on: Vec<FlowOnRequest>,
    /// Flow stop requests.
    #[serde(default)]
    pub flow_off: Vec<FlowOffRequest>,
    /// POV updates per platform.
    #[serde(default)]
    pub povs: BTreeMap<String, Vec<Pov>>,
    /// Pathloss updates per platform.
    #[serde(default)]
    pub pathlosses: BTreeMap<String, Vec<PathlossEntry>>,
    /// Antenna pointing updates per platform.
    #[serde(default)]
    pub antenna_pointings: BTreeMap<String, Vec<AntennaPointing>>,
    /// Jammer-on events.
    #[serde(default)]
    pub jam_on: Vec<JamOnEvent>,
    /// Jammer-off events.
    #[serde(default)]
    pub jam_off: Vec<JamOffEvent>,
    /// `true` iff the timepoint carries an `end` marker.
    #[serde(default)]
    pub end: bool,
}

impl EventSet {
    /// `true` iff the set carries no event at all.
    pub fn is_empty(&self) -> bool {
        self.flow_on.is_empty()
            && self.flow_off.is_empty()
            && self.povs.is_empty()
            && self.pathlosses.is_empty()
            && self.antenna_pointings.is_empty()
            && self.jam_on.is_empty()
            && self.jam_off.is_empty()
            && !self.end
    }

    /// Merge another set into this one.
    pub fn merge(&mut self, other: EventSet) {
        self.flow_on.extend(other.flow_on);
        self.flow_off.extend(other.flow_off);
        for (k, v) in other.povs {
            self.povs.entry(k).or_default().extend(v);
        }
        for (k, v) in other.pathlosses {
            self.pathlosses.entry(k).or_default().extend(v);
        }
        for (k, v) in other.antenna_pointings {
            self.antenna_pointings.entry(k).or_default().extend(v);
        }
        self.jam_on.extend(other.jam_on);
        self.jam_off.extend(other.jam_off);
        self.end |= other.end;
    }
}

/// A scenario timepoint in seconds from driver start. `-Inf` is reserved
/// for initial conditions and orders before every finite time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventTime(pub f64);

impl EventTime {
    /// The initial-condition timepoint.
    pub const INITIAL: EventTime = EventTime(f64::NEG_INFINITY);

    /// `true` iff this is the `-Inf` initial-condition timepoint.
    pub fn is_initial(&self) -> bool {
        self.0 == f64::NEG_INFINITY
    }
}

impl Eq for EventTime {}

impl PartialOrd for EventTime {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventTime {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl From<f64> for EventTime {
    fn from(t: f64) -> Self {
        EventTime(t)
    }
}

impl std::fmt::Display for EventTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_initial() {
            f.write_str("-Inf")
        } else {
            write!(f, "{}", self.0)
        }
    }
}
