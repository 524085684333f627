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

use std::path::Path;

use pretty_assertions::assert_eq;
use tokio::net::UnixDatagram;

use emex_model::scenario::{FlowOffRequest, FlowOnRequest, FlowPattern, TrafficProtocol};

use crate::agent::traffic::TrafficAgent;

/// Bind receiver sockets for the endpoints of the port map, so that the
/// agent can connect.
fn bind_endpoints(dir: &Path, hostnames: &[&str]) -> Vec<UnixDatagram> {
    hostnames
        .iter()
        .map(|hostname| UnixDatagram::bind(dir.join(format!("mgen-{hostname}"))).unwrap())
        .collect()
}

fn write_port_map(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("mgen_port_map.csv");
    std::fs::write(
        &path,
        "rfpipe-001,rfpipe-001-r1,10.76.1.1,ota0\n\
         rfpipe-002,rfpipe-002-r1,10.76.1.2,ota0\n",
    )
    .unwrap();
    path
}

async fn recv_commands(socket: &UnixDatagram, count: usize) -> Vec<String> {
    let mut commands = Vec::new();
    let mut buf = [0u8; 1024];
    for _ in 0..count {
        let n = socket.recv(&mut buf).await.unwrap();
        commands.push(String::from_utf8_lossy(&buf[..n]).to_string());
    }
    commands
}

fn flow_on(protocol: TrafficProtocol, sources: &[&str], destinations: &[&str]) -> FlowOnRequest {
    FlowOnRequest {
        flow_name: "f1".to_string(),
        sources: sources.iter().map(|s| s.to_string()).collect(),
        destinations: destinations.iter().map(|s| s.to_string()).collect(),
        protocol,
        tos: 0,
        ttl: 1,
        pattern: FlowPattern::Periodic,
        size_bytes: 1024,
        packet_rate: 10.0,
        jitter_fraction: 0.0,
    }
}

#[tokio::test]
async fn flows_require_connected_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let port_map = write_port_map(dir.path());

    let mut agent = TrafficAgent::new(&port_map, dir.path()).unwrap();
    assert!(!agent.connect());

    let (ok, message) = agent
        .start_flows(&[flow_on(TrafficProtocol::Udp, &[], &[])])
        .await;
    assert!(!ok);
    assert_eq!(message, "start_flows called before connected");
}

#[tokio::test]
async fn unicast_flow_ids_are_synthesized_per_source() {
    let dir = tempfile::tempdir().unwrap();
    let port_map = write_port_map(dir.path());
    let receivers = bind_endpoints(dir.path(), &["rfpipe-001-r1", "rfpipe-002-r1"]);

    let mut agent = TrafficAgent::new(&port_map, dir.path()).unwrap();
    assert!(agent.connect());

    let (ok, message) = agent
        .start_flows(&[flow_on(
            TrafficProtocol::Udp,
            &["rfpipe-001"],
            &["rfpipe-002"],
        )])
        .await;
    assert!(ok, "{message}");

    let flows = agent.flows();
    assert_eq!(flows.len(), 1);
    // plt_num 1: flow id (1 + 100) * 100 + 1, source port 5000 + 1
    assert_eq!(flows[0].flow_id, 10101);
    assert_eq!(flows[0].source, "rfpipe-001");
    assert_eq!(flows[0].destination, "rfpipe-002");
    assert!(flows[0].active);

    // the destination LISTENs, the source turns the flow ON
    let listen = recv_commands(&receivers[1], 1).await;
    assert_eq!(listen[0], "event LISTEN UDP 10101");

    let on = recv_commands(&receivers[0], 1).await;
    assert_eq!(
        on[0],
        "event ON 10101 UDP SRC 5001 DST 10.76.1.2/10101 PERIODIC [10 1024] TOS 0x0"
    );

    // duplicate active flow names are rejected atomically
    let (ok, message) = agent
        .start_flows(&[flow_on(
            TrafficProtocol::Udp,
            &["rfpipe-002"],
            &["rfpipe-001"],
        )])
        .await;
    assert!(!ok);
    assert!(message.contains("already exists"));
}

#[tokio::test]
async fn multicast_sources_emit_once_and_destinations_join() {
    let dir = tempfile::tempdir().unwrap();
    let port_map = write_port_map(dir.path());
    let receivers = bind_endpoints(dir.path(), &["rfpipe-001-r1", "rfpipe-002-r1"]);

    let mut agent = TrafficAgent::new(&port_map, dir.path()).unwrap();
    assert!(agent.connect());

    let (ok, message) = agent
        .start_flows(&[flow_on(TrafficProtocol::Multicast, &["rfpipe-001"], &[])])
        .await;
    assert!(ok, "{message}");

    // the other platform joins the source's group and listens
    let join = recv_commands(&receivers[1], 2).await;
    assert_eq!(join[0], "event JOIN 224.1.1.1 INTERFACE ota0");
    assert_eq!(join[1], "event LISTEN UDP 10101");

    // the source emits exactly once
    let on = recv_commands(&receivers[0], 1).await;
    assert_eq!(
        on[0],
        "event ON 10101 UDP DST 224.1.1.1/10101 PERIODIC [10 1024] INTERFACE ota0 \
         SRC 5001 TOS 0x0 TTL 1"
    );
}

#[tokio::test]
async fn name_only_stop_releases_the_flow_name() {
    let dir = tempfile::tempdir().unwrap();
    let port_map = write_port_map(dir.path());
    let receivers = bind_endpoints(dir.path(), &["rfpipe-001-r1", "rfpipe-002-r1"]);

    let mut agent = TrafficAgent::new(&port_map, dir.path()).unwrap();
    assert!(agent.connect());

    let (ok, _) = agent
        .start_flows(&[flow_on(
            TrafficProtocol::Udp,
            &["rfpipe-001"],
            &["rfpipe-002"],
        )])
        .await;
    assert!(ok);

    let (ok, message) = agent
        .stop_flows(&[FlowOffRequest {
            flow_name: "f1".to_string(),
            ..Default::default()
        }])
        .await;
    assert!(ok, "{message}");

    // OFF to the source, IGNORE to the destination
    let _ = recv_commands(&receivers[1], 1).await;
    let commands = recv_commands(&receivers[0], 2).await;
    assert_eq!(commands[1], "event OFF 10101");

    // rows are dropped, the name can be reused
    assert!(agent.flows().is_empty());
    let (ok, _) = agent
        .start_flows(&[flow_on(
            TrafficProtocol::Udp,
            &["rfpipe-001"],
            &["rfpipe-002"],
        )])
        .await;
    assert!(ok);
}
