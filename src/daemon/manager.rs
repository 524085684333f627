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

//! The orchestrator core: the global state machine across all EMOEs.
//!
//! The manager coordinates container execution, resource allocation,
//! configuration generation and EMOE state tracking. It runs entirely on
//! the daemon's event thread; every event — client request, agent state
//! report, worker completion — is serialised through [`Manager::handle_event`],
//! so state transitions of one runtime are totally ordered and resource
//! allocation is never racy.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use emex_model::{Emoe, EmoeState, ModelRegistry};
use emex_proto::{
    ClientMessage, ContainerControlMessage, ContainerStateMessage, EmoeCommand, ListEmoesEntry,
    ServerMessage, ServiceAccessor,
};

use crate::{
    builder::ConfigTreeBuilder,
    config::{DaemonConfig, DirectoryAction},
    engine::ContainerEngine,
    resource::ResourceTracker,
    runtime::EmoeRuntime,
    timestamp::Timestamper,
};

use super::worker::{ContainerManager, WakeFn, WorkerOutcome, WorkerSettings};

/// Identifies one client session.
pub type ClientId = u64;
/// Identifies one container agent connection.
pub type ConnId = u64;

/// The events the manager consumes, produced by the protocol frontend
/// and the container workers.
#[derive(Debug)]
pub enum DaemonEvent {
    /// A client session opened.
    ClientConnected {
        /// The session id.
        client: ClientId,
        /// The peer address.
        addr: SocketAddr,
        /// Reply channel of the session.
        tx: UnboundedSender<ServerMessage>,
    },
    /// A client request arrived.
    ClientRequest {
        /// The session id.
        client: ClientId,
        /// The decoded request.
        request: ClientMessage,
    },
    /// A client session closed.
    ClientClosed {
        /// The session id.
        client: ClientId,
    },
    /// A container agent connected.
    ContainerConnected {
        /// The connection id.
        conn: ConnId,
        /// Control channel towards the agent.
        tx: UnboundedSender<ContainerControlMessage>,
    },
    /// A container agent reported its state.
    ContainerState {
        /// The connection id.
        conn: ConnId,
        /// The state report.
        message: ContainerStateMessage,
    },
    /// A container agent connection closed.
    ContainerClosed {
        /// The connection id.
        conn: ConnId,
    },
    /// A container worker completed a work item.
    WorkerWake {
        /// The completion tag (for logging only).
        tag: String,
    },
}

struct ClientHandle {
    addr: SocketAddr,
    tx: UnboundedSender<ServerMessage>,
}

/// The orchestrator core.
pub struct Manager {
    config: DaemonConfig,
    registry: ModelRegistry,
    builder: ConfigTreeBuilder,
    timestamper: Timestamper,
    cpum: ResourceTracker<u32>,
    hpm: ResourceTracker<u16>,
    cm: ContainerManager,
    emoes_by_id: BTreeMap<String, EmoeRuntime>,
    emoes_by_client: BTreeMap<ClientId, Vec<String>>,
    clients: HashMap<ClientId, ClientHandle>,
    containers: HashMap<ConnId, UnboundedSender<ContainerControlMessage>>,
    emoe_by_conn: HashMap<ConnId, String>,
}

impl Manager {
    /// Create the manager, spawning the container worker threads.
    pub fn new(
        config: DaemonConfig,
        registry: ModelRegistry,
        engine: Arc<dyn ContainerEngine>,
        worker_settings: WorkerSettings,
        wake: WakeFn,
    ) -> Self {
        let cpum = ResourceTracker::new("cpu", config.allowed_cpus.iter().copied());
        let hpm = ResourceTracker::new("host port", config.allowed_host_ports.iter().copied());
        let cm = ContainerManager::new(&config, engine, worker_settings, wake);
        let timestamper = Timestamper::new(&config.emex_workdir);
        let builder = ConfigTreeBuilder::new(
            Box::new(crate::builder::SubstitutionRenderer),
            config.model_path.clone(),
        );

        if let Err(e) = std::fs::create_dir_all(&config.emex_workdir) {
            log::error!(
                "cannot create workdir {}: {e}",
                config.emex_workdir.display()
            );
        }

        Self {
            config,
            registry,
            builder,
            timestamper,
            cpum,
            hpm,
            cm,
            emoes_by_id: BTreeMap::new(),
            emoes_by_client: BTreeMap::new(),
            clients: HashMap::new(),
            containers: HashMap::new(),
            emoe_by_conn: HashMap::new(),
        }
    }

    /// Number of cpus the daemon manages.
    pub fn total_cpus(&self) -> u32 {
        (self.cpum.num_available() + self.cpum.num_allocated()) as u32
    }

    /// Number of cpus currently unallocated.
    pub fn available_cpus(&self) -> u32 {
        self.cpum.num_available() as u32
    }

    /// Look up a runtime by EMOE id.
    pub fn runtime(&self, emoe_id: &str) -> Option<&EmoeRuntime> {
        self.emoes_by_id.get(emoe_id)
    }

    /// The ids of all known runtimes.
    pub fn emoe_ids(&self) -> Vec<String> {
        self.emoes_by_id.keys().cloned().collect()
    }

    /// The host port tracker.
    pub fn host_ports(&self) -> &ResourceTracker<u16> {
        &self.hpm
    }

    /// Stop every container of the configured image (daemon start/stop
    /// sweep).
    pub fn stop_all_containers(&mut self) {
        log::info!("stopping all existing emex containers");
        self.cm.stop_all();
    }

    /// Dispatch one event.
    pub fn handle_event(&mut self, event: DaemonEvent) {
        match event {
            DaemonEvent::ClientConnected { client, addr, tx } => {
                log::info!("process accept client: {client} endpoint: {addr}");
                self.clients.insert(client, ClientHandle { addr, tx });
            }
            DaemonEvent::ClientRequest { client, request } => {
                let reply = self.handle_client_request(client, request);
                self.send_to_client(client, reply);
            }
            DaemonEvent::ClientClosed { client } => self.handle_client_closed(client),
            DaemonEvent::ContainerConnected { conn, tx } => {
                log::debug!("container connection {conn} accepted");
                self.containers.insert(conn, tx);
            }
            DaemonEvent::ContainerState { conn, message } => {
                self.handle_container_state(conn, message)
            }
            DaemonEvent::ContainerClosed { conn } => {
                log::info!("closed container connection {conn}");
                self.containers.remove(&conn);
                self.emoe_by_conn.remove(&conn);
            }
            DaemonEvent::WorkerWake { tag } => self.handle_worker_wake(&tag),
        }
    }

    fn handle_client_request(&mut self, client: ClientId, request: ClientMessage) -> ServerMessage {
        match request {
            ClientMessage::ModelTypesRequest => {
                log::info!("received modelTypesRequest");
                ServerMessage::ModelTypesReply {
                    platformtypes: self.registry.platformtypes().cloned().collect(),
                    antennatypes: self.registry.antennatypes().cloned().collect(),
                }
            }
            ClientMessage::CheckEmoeRequest { emoe_name, emoe } => {
                log::info!(
                    "received checkEmoeRequest for emoe \"{emoe_name}\" with {} platforms.",
                    emoe.platforms.len()
                );
                let (result, message) = match Emoe::from_description(&emoe, &self.registry) {
                    Ok(emoe) => self.check_emoe(&emoe),
                    Err(e) => (false, e.to_string()),
                };
                log::info!(
                    "sending checkEmoeReply {} for emoe \"{emoe_name}\"",
                    if result { "PASS" } else { "FAIL" }
                );
                ServerMessage::CheckEmoeReply {
                    emoe_name,
                    result,
                    message,
                }
            }
            ClientMessage::StartEmoeRequest { emoe_name, emoe } => {
                log::info!(
                    "received startEmoeRequest from client {client} for emoe \
                     \"{emoe_name}\" with {} platforms.",
                    emoe.platforms.len()
                );
                let (result, message, handle) =
                    match Emoe::from_description(&emoe, &self.registry) {
                        Ok(emoe) => self.start_emoe(client, emoe),
                        Err(e) => (false, e.to_string(), String::new()),
                    };
                log::info!(
                    "sending startEmoeReply {} for emoe name:{emoe_name} handle:{handle}",
                    if result { "PASS" } else { "FAIL" }
                );
                ServerMessage::StartEmoeReply {
                    emoe_name,
                    result,
                    message,
                    handle,
                }
            }
            ClientMessage::ListEmoesRequest => {
                log::info!("received listEmoesRequest from client {client}");
                self.list_emoes(client)
            }
            ClientMessage::StopEmoeRequest { handle } => {
                log::info!(
                    "received stopEmoeRequest from client {client} for emoe \"{handle}\""
                );
                let (result, message, emoe_name) = self.stop_emoe(&handle);
                ServerMessage::StopEmoeReply {
                    handle,
                    emoe_name,
                    result,
                    message,
                }
            }
        }
    }

    /// Admission check: the name must be new and the cpu requirement must
    /// fit the currently available pool.
    pub fn check_emoe(&self, emoe: &Emoe) -> (bool, String) {
        let name_known = self
            .emoes_by_id
            .values()
            .any(|rt| rt.emoe().name() == emoe.name());
        if name_known {
            return (false, format!("EMOE name \"{}\" already exists.", emoe.name()));
        }

        let requested = emoe.cpus();
        let available = self.available_cpus();
        (
            requested <= available,
            format!("requested cpus {requested} available cpus {available}"),
        )
    }

    /// Accept an EMOE: allocate cpus, build the configuration tree and
    /// enqueue the container start.
    pub fn start_emoe(&mut self, client: ClientId, emoe: Emoe) -> (bool, String, String) {
        let (ok, message) = self.check_emoe(&emoe);
        if !ok {
            return (false, message, String::new());
        }

        let cpus = match self.cpum.allocate(emoe.cpus() as usize) {
            Ok(cpus) => cpus,
            Err(e) => return (false, e.to_string(), String::new()),
        };

        let timestamp = self.timestamper.next_timestamp();
        let mut rt = EmoeRuntime::new(timestamp, client, emoe, cpus, &self.config);

        if let Err(e) = self.builder.build(&mut rt, &self.registry, &self.config) {
            self.cpum.deallocate(rt.cpus().to_vec());
            return (false, e.to_string(), String::new());
        }

        if let Err(message) = self.cm.start(&mut rt, &mut self.hpm) {
            self.cpum.deallocate(rt.cpus().to_vec());
            return (false, message, String::new());
        }

        let emoe_id = rt.emoe_id();
        self.emoes_by_client
            .entry(client)
            .or_default()
            .push(emoe_id.clone());
        self.emoes_by_id.insert(emoe_id.clone(), rt);

        (true, "ok".to_string(), emoe_id)
    }

    /// Stop an EMOE: deallocate its resources and signal the agent. The
    /// teardown itself waits for the agent's confirmation.
    pub fn stop_emoe(&mut self, emoe_id: &str) -> (bool, String, String) {
        let Some(rt) = self.emoes_by_id.get(emoe_id) else {
            return (
                false,
                format!("could not find an emoe associated with id {emoe_id}"),
                String::new(),
            );
        };
        let emoe_name = rt.emoe().name().to_string();

        log::info!(
            "stop_emoe for emoe_id={emoe_id} emoe_name={emoe_name} state={}",
            rt.state()
        );

        if rt.state() >= EmoeState::Stopping {
            log::info!(
                "Ignore request to stop emoe_id={emoe_id} emoe_name={emoe_name} already stopped"
            );
            return (
                false,
                format!("emoe \"{emoe_name}\" is already stopping."),
                emoe_name,
            );
        }

        self.enter_stopping(emoe_id);
        self.send_container_control(emoe_id, EmoeCommand::Stop);

        // an accepted runtime whose container never connected has nobody
        // to confirm the teardown; reap it right away
        let connected = self
            .emoes_by_id
            .get(emoe_id)
            .map(|rt| rt.did_connect())
            .unwrap_or(false);
        if !connected {
            self.teardown(emoe_id);
        }

        (true, format!("stopping emoe \"{emoe_name}\"."), emoe_name)
    }

    /// Move a runtime into STOPPING: release its cpus and host ports and
    /// arm the first stop confirmation.
    fn enter_stopping(&mut self, emoe_id: &str) {
        let Some(rt) = self.emoes_by_id.get_mut(emoe_id) else {
            return;
        };
        rt.advance_state(EmoeState::Stopping);
        rt.set_stop_count(1);

        let cpus = rt.cpus().to_vec();
        let host_ports: Vec<u16> = rt.host_port_mappings().keys().copied().collect();
        self.cpum.deallocate(cpus);
        self.hpm.deallocate(host_ports);
    }

    /// Final teardown of a runtime: stop the container, apply the workdir
    /// retention policy and delete the runtime.
    fn teardown(&mut self, emoe_id: &str) {
        let Some(rt) = self.emoes_by_id.get(emoe_id) else {
            return;
        };

        if rt.container_handle().is_some() || rt.did_connect() {
            let name = rt.container_name().to_string();
            self.cm.stop(&name);
        }

        let rt = self.emoes_by_id.get(emoe_id).expect("checked above");
        let delete_workdir = match self.config.emexdirectory_action {
            DirectoryAction::Keep => false,
            DirectoryAction::Delete => true,
            DirectoryAction::DeleteOnSuccess => rt.did_run(),
        };
        if delete_workdir {
            log::info!(
                "emexdirectory action: {} {}",
                self.config.emexdirectory_action.keyword(),
                rt.workdir().display()
            );
            if let Err(e) = std::fs::remove_dir_all(rt.workdir()) {
                log::warn!("cannot remove {}: {e}", rt.workdir().display());
            }
        }

        self.delete_runtime(emoe_id);
    }

    fn delete_runtime(&mut self, emoe_id: &str) {
        let Some(rt) = self.emoes_by_id.remove(emoe_id) else {
            return;
        };
        if let Some(owned) = self.emoes_by_client.get_mut(&rt.client_id()) {
            owned.retain(|id| id != emoe_id);
        }
        if let Some(conn) = rt.container_conn() {
            self.emoe_by_conn.remove(&conn);
        }
    }

    fn list_emoes(&mut self, client: ClientId) -> ServerMessage {
        let mut entries = Vec::new();

        for emoe_id in self.emoes_by_client.get(&client).cloned().unwrap_or_default() {
            let Some(rt) = self.emoes_by_id.get(&emoe_id) else {
                continue;
            };

            // no accessors for EMOEs that have advanced past UPDATING
            let service_accessors = if rt.state() <= EmoeState::Updating {
                self.service_accessors(rt)
            } else {
                Vec::new()
            };

            entries.push(ListEmoesEntry {
                handle: emoe_id.clone(),
                emoe_name: rt.emoe().name().to_string(),
                state: rt.state(),
                cpus: rt.num_cpus(),
                service_accessors,
            });
        }

        ServerMessage::ListEmoesReply {
            total_cpus: self.total_cpus(),
            available_cpus: self.available_cpus(),
            entries,
        }
    }

    fn service_accessors(&self, rt: &EmoeRuntime) -> Vec<ServiceAccessor> {
        rt.host_port_mappings()
            .iter()
            .map(|(host_port, (service_name, _))| ServiceAccessor {
                name: service_name.clone(),
                ip_address: self.config.client_listen_address.clone(),
                port: *host_port,
            })
            .collect()
    }

    /// A closed client session stops all of its runtimes.
    fn handle_client_closed(&mut self, client: ClientId) {
        log::info!("client {client} closed, stopping its emoes");
        self.clients.remove(&client);

        for emoe_id in self.emoes_by_client.get(&client).cloned().unwrap_or_default() {
            self.stop_emoe(&emoe_id);
        }
    }

    /// The per-EMOE transition table, driven by agent state reports.
    fn handle_container_state(&mut self, conn: ConnId, message: ContainerStateMessage) {
        let emoe_id = message.emoe_id.clone();

        let Some(rt) = self.emoes_by_id.get_mut(&emoe_id) else {
            log::error!(
                "Received container state message from unknown emoe_id {emoe_id}. Ignoring."
            );
            return;
        };

        log::info!(
            "handle_container_state: emoe_id={emoe_id} current_state={} new_state={}",
            rt.state(),
            message.state
        );

        match (rt.state(), message.state) {
            // start the emulation on receiving CONNECTED on a QUEUED emoe
            (EmoeState::Queued, EmoeState::Connected) => {
                rt.set_container_conn(conn);
                rt.advance_state(EmoeState::Connected);
                self.emoe_by_conn.insert(conn, emoe_id.clone());
                self.send_container_control(&emoe_id, EmoeCommand::Start);
                self.notify_state(&emoe_id, &message.detail);
            }
            (EmoeState::Connected, EmoeState::Starting) => {
                rt.advance_state(EmoeState::Starting);
                self.notify_state(&emoe_id, &message.detail);
            }
            (EmoeState::Starting, EmoeState::Running) => {
                rt.advance_state(EmoeState::Running);
                self.notify_state(&emoe_id, &message.detail);
            }
            // the agent began tearing down on its own
            (state, EmoeState::Stopping) if state < EmoeState::Stopping => {
                self.enter_stopping(&emoe_id);
                log::debug!("STOPPING {emoe_id} count:1");
            }
            // the second signal while STOPPING completes the teardown
            (EmoeState::Stopping, _) => {
                rt.set_stop_count(2);
                log::debug!("STOPPING {emoe_id} count:2");
                self.notify_state(&emoe_id, &message.detail);
                self.teardown(&emoe_id);
            }
            _ => {
                log::debug!("on state message from {emoe_id}, no action");
            }
        }
    }

    /// Consume worker completions.
    fn handle_worker_wake(&mut self, tag: &str) {
        log::info!("handle_container_worker_event {tag}");

        for outcome in self.cm.drain_outcomes() {
            match outcome {
                WorkerOutcome::Start {
                    emoe_id,
                    result,
                    host_ports,
                } => self.handle_start_outcome(emoe_id, result, host_ports),
                WorkerOutcome::Stop {
                    container_name,
                    result,
                } => match result {
                    Ok(()) => log::info!("stopped container {container_name}"),
                    Err(message) => log::info!("stop {container_name}: {message}"),
                },
            }
        }
    }

    fn handle_start_outcome(
        &mut self,
        emoe_id: String,
        result: Result<String, String>,
        host_ports: Vec<u16>,
    ) {
        let Some(rt) = self.emoes_by_id.get_mut(&emoe_id) else {
            // the runtime was reaped while the start was in flight
            log::debug!("start outcome for unknown emoe {emoe_id}, ignoring");
            return;
        };

        match result {
            Ok(handle) => {
                rt.set_container_handle(handle);
                log::info!(
                    "started emoe \"{}\" using {} cpus.",
                    rt.emoe().name(),
                    rt.num_cpus()
                );
            }
            Err(message) => {
                log::error!("{message}");

                rt.clear_host_port_mappings();
                let container_name = rt.container_name().to_string();
                self.hpm.deallocate(host_ports.clone());

                // the container may be partially started
                self.cm.stop(&container_name);

                if !self
                    .cm
                    .handle_port_collision(&message, &host_ports, &mut self.hpm)
                {
                    log::info!(
                        "Container start failure does not appear to be a port collision."
                    );
                }

                let rt = self.emoes_by_id.get_mut(&emoe_id).expect("checked above");
                if rt.can_start() {
                    // try again
                    if let Err(message) = self.cm.start(rt, &mut self.hpm) {
                        log::error!("{message}");
                        self.handle_failed_container_start(&emoe_id);
                    }
                } else {
                    // exhausted attempts
                    self.handle_failed_container_start(&emoe_id);
                }
            }
        }
    }

    /// Terminal start failure: notify the client and reap the runtime.
    fn handle_failed_container_start(&mut self, emoe_id: &str) {
        let Some(rt) = self.emoes_by_id.get_mut(emoe_id) else {
            return;
        };

        log::error!(
            "handle_failed_container_start: {} failed to start from state {}",
            rt.emoe().name(),
            rt.state()
        );

        let cpus = rt.cpus().to_vec();
        rt.advance_state(EmoeState::Failed);
        self.cpum.deallocate(cpus);

        self.send_container_control(emoe_id, EmoeCommand::Stop);
        self.notify_state(emoe_id, "container start failed");
        self.delete_runtime(emoe_id);
    }

    /// Send a lifecycle command to the agent, if it has connected.
    fn send_container_control(&mut self, emoe_id: &str, command: EmoeCommand) {
        let Some(rt) = self.emoes_by_id.get(emoe_id) else {
            return;
        };
        let Some(conn) = rt.container_conn() else {
            return;
        };
        let Some(tx) = self.containers.get(&conn) else {
            return;
        };

        log::info!("send {command} command to emoe: {emoe_id}");
        let _ = tx.send(ContainerControlMessage {
            command,
            emoe_id: emoe_id.to_string(),
        });
    }

    /// Send an unsolicited state transition event to the owning client,
    /// when enabled.
    fn notify_state(&mut self, emoe_id: &str, detail: &str) {
        if !self.config.state_messages_enable {
            return;
        }
        let Some(rt) = self.emoes_by_id.get(emoe_id) else {
            return;
        };

        let service_accessors = if rt.state() <= EmoeState::Updating {
            self.service_accessors(rt)
        } else {
            Vec::new()
        };

        let event = ServerMessage::EmoeStateTransitionEvent {
            handle: emoe_id.to_string(),
            emoe_name: rt.emoe().name().to_string(),
            state: rt.state(),
            cpus: rt.num_cpus(),
            message: detail.to_string(),
            service_accessors,
        };

        log::info!(
            "sending emoeStateTransitionEvent for emoe name: {} id: {emoe_id} state: {}",
            rt.emoe().name(),
            rt.state()
        );

        let client = rt.client_id();
        self.send_to_client(client, event);
    }

    fn send_to_client(&mut self, client: ClientId, message: ServerMessage) {
        if let Some(handle) = self.clients.get(&client) {
            if handle.tx.send(message).is_err() {
                log::warn!("client {client} ({}) is gone", handle.addr);
            }
        }
    }
}
