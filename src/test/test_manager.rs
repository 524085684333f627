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

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use emex_model::{Emoe, EmoeState};
use emex_proto::{
    ClientMessage, ContainerControlMessage, ContainerStateMessage, EmoeCommand, ServerMessage,
};

use crate::{
    daemon::{DaemonEvent, Manager},
    test::{pump_until, test_config, test_manager, MockEngine},
};

fn empty_emoe(name: &str) -> Emoe {
    Emoe::new(name, vec![], vec![], vec![]).unwrap()
}

fn connect_client(manager: &mut Manager, client: u64) -> UnboundedReceiver<ServerMessage> {
    let (tx, rx) = unbounded_channel();
    manager.handle_event(DaemonEvent::ClientConnected {
        client,
        addr: "127.0.0.1:40000".parse().unwrap(),
        tx,
    });
    rx
}

fn connect_container(
    manager: &mut Manager,
    conn: u64,
) -> UnboundedReceiver<ContainerControlMessage> {
    let (tx, rx) = unbounded_channel();
    manager.handle_event(DaemonEvent::ContainerConnected { conn, tx });
    rx
}

fn report_state(manager: &mut Manager, conn: u64, emoe_id: &str, state: EmoeState) {
    manager.handle_event(DaemonEvent::ContainerState {
        conn,
        message: ContainerStateMessage {
            emoe_id: emoe_id.to_string(),
            state,
            detail: String::new(),
        },
    });
}

#[test]
fn check_reports_requested_and_available_cpus() {
    let dir = tempfile::tempdir().unwrap();
    let (manager, _wake) = test_manager(test_config(dir.path()), Arc::new(MockEngine::new([])));

    let (ok, message) = manager.check_emoe(&empty_emoe("t"));
    assert!(ok);
    assert_eq!(message, "requested cpus 0 available cpus 4");
}

#[test]
fn empty_emoe_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(MockEngine::new([]));
    let (mut manager, wake) = test_manager(test_config(dir.path()), engine);

    let mut client_rx = connect_client(&mut manager, 1);

    let (ok, message, handle) = manager.start_emoe(1, empty_emoe("t"));
    assert!(ok, "{message}");
    assert!(!handle.is_empty());
    assert!(manager.runtime(&handle).is_some());
    assert_eq!(manager.runtime(&handle).unwrap().state(), EmoeState::Queued);

    // a duplicate name is rejected
    let (ok, message) = manager.check_emoe(&empty_emoe("t"));
    assert!(!ok);
    assert!(message.contains("already exists"));

    pump_until(&mut manager, &wake, |m| {
        m.runtime(&handle).unwrap().container_handle().is_some()
    });

    // the client disconnect cancels the runtime
    manager.handle_event(DaemonEvent::ClientClosed { client: 1 });
    assert!(manager.runtime(&handle).is_none());
    assert!(manager.emoe_ids().is_empty());
    assert!(client_rx.try_recv().is_err());

    // all resources returned
    assert_eq!(manager.available_cpus(), 4);
    assert_eq!(manager.host_ports().num_allocated(), 0);
}

#[test]
fn state_transitions_are_monotonic() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(MockEngine::new([]));
    let (mut manager, wake) = test_manager(test_config(dir.path()), engine);

    connect_client(&mut manager, 1);
    let (ok, _, handle) = manager.start_emoe(1, empty_emoe("t"));
    assert!(ok);
    pump_until(&mut manager, &wake, |m| {
        m.runtime(&handle).unwrap().container_handle().is_some()
    });

    let mut control_rx = connect_container(&mut manager, 7);

    // the agent dials back: QUEUED -> CONNECTED, START is issued
    report_state(&mut manager, 7, &handle, EmoeState::Connected);
    assert_eq!(manager.runtime(&handle).unwrap().state(), EmoeState::Connected);
    assert_eq!(
        control_rx.try_recv().unwrap(),
        ContainerControlMessage {
            command: EmoeCommand::Start,
            emoe_id: handle.clone(),
        }
    );

    report_state(&mut manager, 7, &handle, EmoeState::Starting);
    assert_eq!(manager.runtime(&handle).unwrap().state(), EmoeState::Starting);

    report_state(&mut manager, 7, &handle, EmoeState::Running);
    let rt = manager.runtime(&handle).unwrap();
    assert_eq!(rt.state(), EmoeState::Running);
    assert!(rt.did_run());

    // a stale STARTING report never regresses the state
    report_state(&mut manager, 7, &handle, EmoeState::Starting);
    assert_eq!(manager.runtime(&handle).unwrap().state(), EmoeState::Running);

    // the agent begins tearing down; the first signal arms the count
    report_state(&mut manager, 7, &handle, EmoeState::Stopping);
    let rt = manager.runtime(&handle).unwrap();
    assert_eq!(rt.state(), EmoeState::Stopping);
    assert_eq!(rt.stop_count(), 1);
    assert_eq!(manager.available_cpus(), 4);

    // the second signal completes the teardown
    report_state(&mut manager, 7, &handle, EmoeState::Stopping);
    assert!(manager.runtime(&handle).is_none());
}

#[test]
fn client_stop_completes_on_the_agents_report() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(MockEngine::new([]));
    let (mut manager, wake) = test_manager(test_config(dir.path()), engine);

    connect_client(&mut manager, 1);
    let (ok, _, handle) = manager.start_emoe(1, empty_emoe("t"));
    assert!(ok);
    pump_until(&mut manager, &wake, |m| {
        m.runtime(&handle).unwrap().container_handle().is_some()
    });

    let mut control_rx = connect_container(&mut manager, 9);
    report_state(&mut manager, 9, &handle, EmoeState::Connected);
    assert_eq!(control_rx.try_recv().unwrap().command, EmoeCommand::Start);

    let (ok, _, _) = manager.stop_emoe(&handle);
    assert!(ok);
    assert_eq!(manager.runtime(&handle).unwrap().state(), EmoeState::Stopping);
    assert_eq!(control_rx.try_recv().unwrap().command, EmoeCommand::Stop);

    // stopping twice is refused
    let (ok, _, _) = manager.stop_emoe(&handle);
    assert!(!ok);

    // the agent's STOPPED report absorbs into the stop count and reaps
    report_state(&mut manager, 9, &handle, EmoeState::Stopped);
    assert!(manager.runtime(&handle).is_none());
}

#[test]
fn port_collision_is_excluded_and_retried() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(MockEngine::new([
        "driver failed programming external connectivity on endpoint emoe \
         (8f68a946): Bind for 0.0.0.0:9001 failed: port is already allocated"
            .to_string(),
    ]));
    let (mut manager, wake) = test_manager(test_config(dir.path()), engine);

    connect_client(&mut manager, 1);
    let (ok, _, handle) = manager.start_emoe(1, empty_emoe("t"));
    assert!(ok);
    assert_eq!(manager.runtime(&handle).unwrap().start_attempts(), 3);

    // the first attempt fails on the collision; 9001 is excluded, the
    // start is retried with one attempt consumed and the retry succeeds
    pump_until(&mut manager, &wake, |m| {
        m.runtime(&handle).unwrap().container_handle().is_some()
    });
    assert!(manager.host_ports().is_excluded(9001));
    assert_eq!(manager.runtime(&handle).unwrap().start_attempts(), 2);
    assert!(!manager
        .runtime(&handle)
        .unwrap()
        .host_port_mappings()
        .contains_key(&9001));

    let mut control_rx = connect_container(&mut manager, 3);
    report_state(&mut manager, 3, &handle, EmoeState::Connected);
    assert_eq!(manager.runtime(&handle).unwrap().state(), EmoeState::Connected);
    assert_eq!(control_rx.try_recv().unwrap().command, EmoeCommand::Start);
}

#[test]
fn exhausted_start_attempts_fail_the_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let error = "driver failed programming external connectivity on endpoint emoe: \
                 Error starting userland proxy: listen tcp4 0.0.0.0:9000: bind: \
                 address already in use"
        .to_string();
    let engine = Arc::new(MockEngine::new([
        error.clone(),
        error.clone(),
        error.clone(),
        error,
    ]));

    let mut config = test_config(dir.path());
    config.state_messages_enable = true;
    let (mut manager, wake) = test_manager(config, engine);

    let mut client_rx = connect_client(&mut manager, 1);
    let (ok, _, handle) = manager.start_emoe(1, empty_emoe("t"));
    assert!(ok);

    // three retries, then terminal failure
    pump_until(&mut manager, &wake, |m| m.runtime(&handle).is_none());

    assert!(manager.runtime(&handle).is_none());
    assert_eq!(manager.available_cpus(), 4);

    // the client was notified of the FAILED transition
    let mut saw_failed = false;
    while let Ok(message) = client_rx.try_recv() {
        if let ServerMessage::EmoeStateTransitionEvent { state, .. } = message {
            saw_failed |= state == EmoeState::Failed;
        }
    }
    assert!(saw_failed);
}

#[test]
fn list_entries_follow_submission_order_and_accessor_visibility() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(MockEngine::new([]));
    let (mut manager, wake) = test_manager(test_config(dir.path()), engine);

    let mut client_rx = connect_client(&mut manager, 1);

    let (ok, _, first) = manager.start_emoe(1, empty_emoe("a"));
    assert!(ok);
    let (ok, _, second) = manager.start_emoe(1, empty_emoe("b"));
    assert!(ok);
    pump_until(&mut manager, &wake, |m| {
        m.runtime(&first).unwrap().container_handle().is_some()
            && m.runtime(&second).unwrap().container_handle().is_some()
    });

    manager.handle_event(DaemonEvent::ClientRequest {
        client: 1,
        request: ClientMessage::ListEmoesRequest,
    });

    let reply = client_rx.try_recv().unwrap();
    let ServerMessage::ListEmoesReply {
        total_cpus,
        available_cpus,
        entries,
    } = reply
    else {
        panic!("unexpected reply {reply:?}");
    };

    assert_eq!(total_cpus, 4);
    assert_eq!(available_cpus, 4);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].handle, first);
    assert_eq!(entries[1].handle, second);

    // QUEUED is before UPDATING, so the accessors are visible
    assert!(!entries[0].service_accessors.is_empty());
    let names: Vec<&str> = entries[0]
        .service_accessors
        .iter()
        .map(|a| a.name.as_str())
        .collect();
    assert!(names.contains(&"emexcontainerd"));
}
