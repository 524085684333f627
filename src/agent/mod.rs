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

//! The in-container scenario agent (`emex-containerd`).
//!
//! One agent runs inside each EMOE container. It dials back to the
//! daemon with its EMOE id, accepts exactly one scenario driver, follows
//! the inner emulator's step progress over a local multicast channel and
//! re-reports its state on a five second heartbeat until it stops.

pub mod events;
pub mod jammer;
pub mod scenario;
pub mod traffic;

pub use scenario::ScenarioManager;

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use emex_model::EmoeState;
use emex_proto::{
    frame, ContainerControlMessage, ContainerStateMessage, EmoeCommand, FrameReader,
    ScenarioReply, ScenarioRequest, DEFAULT_SCENARIO_LISTEN_PORT,
};

use crate::EmexError;

/// The heartbeat period.
const HEARTBEAT_SECS: u64 = 5;

/// The agent configuration, consumed from the environment the daemon
/// hands to the container.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// The daemon's container listen address.
    pub daemon_address: String,
    /// The daemon's container listen port.
    pub daemon_port: u16,
    /// The EMOE this agent belongs to.
    pub emoe_id: String,
    /// The emulator status multicast group.
    pub status_address: String,
    /// The emulator status multicast port.
    pub status_port: u16,
    /// The device the status multicast is joined on.
    pub status_device: String,
    /// The port the scenario driver connects to.
    pub scenario_listen_port: u16,
    /// The mounted working directory.
    pub etce_root: PathBuf,
}

impl AgentConfig {
    /// Read the configuration from the environment.
    pub fn from_env() -> std::io::Result<Self> {
        let require = |name: &str| {
            std::env::var(name).map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("environment variable {name} is not set"),
                )
            })
        };

        Ok(Self {
            daemon_address: require("EMEXD_LISTEN_ADDRESS")?,
            daemon_port: require("EMEXD_LISTEN_PORT")?
                .parse()
                .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "EMEXD_LISTEN_PORT"))?,
            emoe_id: require("EMOE_ID")?,
            status_address: std::env::var("ETCE_STATUSMCAST_ADDRESS")
                .unwrap_or_else(|_| "224.1.2.8".to_string()),
            status_port: std::env::var("ETCE_STATUSMCAST_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(48101),
            status_device: std::env::var("ETCE_STATUSMCAST_DEVICE")
                .unwrap_or_else(|_| "lo".to_string()),
            scenario_listen_port: std::env::var("EMEX_SCENARIO_LISTEN_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SCENARIO_LISTEN_PORT),
            etce_root: PathBuf::from("/tmp/etce"),
        })
    }
}

/// The emulator's step progress message.
#[derive(Debug, Deserialize)]
struct StatusMessage {
    step: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug)]
enum AgentEvent {
    Control(ContainerControlMessage),
    DaemonClosed,
    Status { step: String, message: String },
    ScenarioAccept {
        conn: u64,
        tx: mpsc::UnboundedSender<ScenarioReply>,
    },
    ScenarioRequest {
        conn: u64,
        request: ScenarioRequest,
    },
    ScenarioClosed { conn: u64 },
    Heartbeat,
}

/// Run the agent until it reaches STOPPED.
pub async fn run(config: AgentConfig) -> Result<(), EmexError> {
    log::info!(
        "connecting to emexd at {}:{} with emoe_id {}",
        config.daemon_address,
        config.daemon_port,
        config.emoe_id
    );

    let daemon = TcpStream::connect((config.daemon_address.as_str(), config.daemon_port)).await?;
    let (daemon_read, mut daemon_write) = daemon.into_split();

    let (events_tx, mut events_rx) = mpsc::channel::<AgentEvent>(64);

    // daemon control reader
    {
        let events = events_tx.clone();
        tokio::spawn(async move {
            let mut reader = FrameReader::new();
            let mut read_half = daemon_read;
            let mut buf = [0u8; 4096];
            loop {
                let n = match read_half.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                let Ok(payloads) = reader.push(&buf[..n]) else { break };
                for payload in payloads {
                    match serde_json::from_slice::<ContainerControlMessage>(&payload) {
                        Ok(message) => {
                            if events.send(AgentEvent::Control(message)).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => log::warn!("Error on receiving malformed message \"{e}\""),
                    }
                }
            }
            let _ = events.send(AgentEvent::DaemonClosed).await;
        });
    }

    // emulator status multicast
    {
        let events = events_tx.clone();
        let group: std::net::Ipv4Addr = config
            .status_address
            .parse()
            .unwrap_or(std::net::Ipv4Addr::new(224, 1, 2, 8));
        let port = config.status_port;
        tokio::spawn(async move {
            let socket = match UdpSocket::bind(("0.0.0.0", port)).await {
                Ok(socket) => socket,
                Err(e) => {
                    log::error!("cannot bind status multicast socket: {e}");
                    return;
                }
            };
            if let Err(e) = socket.join_multicast_v4(group, std::net::Ipv4Addr::UNSPECIFIED) {
                log::error!("cannot join status multicast group {group}: {e}");
                return;
            }
            let mut buf = [0u8; 65536];
            loop {
                let Ok(n) = socket.recv(&mut buf).await else { break };
                match serde_json::from_slice::<StatusMessage>(&buf[..n]) {
                    Ok(status) => {
                        log::info!("received emulator state message step \"{}\"", status.step);
                        if events
                            .send(AgentEvent::Status {
                                step: status.step,
                                message: status.message,
                            })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Err(e) => log::debug!("ignoring malformed status message: {e}"),
                }
            }
        });
    }

    // scenario driver listener
    {
        let events = events_tx.clone();
        let port = config.scenario_listen_port;
        tokio::spawn(async move {
            let listener = match TcpListener::bind(("0.0.0.0", port)).await {
                Ok(listener) => listener,
                Err(e) => {
                    log::error!("cannot bind scenario listener: {e}");
                    return;
                }
            };
            let mut next_conn = 1u64;
            loop {
                let Ok((stream, addr)) = listener.accept().await else { return };
                let conn = next_conn;
                next_conn += 1;
                log::info!("scenario connect from {addr} on conn {conn}");

                let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ScenarioReply>();
                if events
                    .send(AgentEvent::ScenarioAccept { conn, tx: reply_tx })
                    .await
                    .is_err()
                {
                    return;
                }

                let events = events.clone();
                tokio::spawn(async move {
                    let (mut read_half, mut write_half) = stream.into_split();

                    let writer = tokio::spawn(async move {
                        while let Some(reply) = reply_rx.recv().await {
                            let Ok(bytes) = frame::encode_message(&reply) else { continue };
                            if write_half.write_all(&bytes).await.is_err() {
                                return;
                            }
                        }
                    });

                    let mut reader = FrameReader::new();
                    let mut buf = [0u8; 65536];
                    loop {
                        let n = match read_half.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => n,
                        };
                        let Ok(payloads) = reader.push(&buf[..n]) else { break };
                        for payload in payloads {
                            match serde_json::from_slice::<ScenarioRequest>(&payload) {
                                Ok(request) => {
                                    if events
                                        .send(AgentEvent::ScenarioRequest { conn, request })
                                        .await
                                        .is_err()
                                    {
                                        return;
                                    }
                                }
                                Err(e) => {
                                    log::warn!("Error on receiving malformed message \"{e}\"")
                                }
                            }
                        }
                    }

                    let _ = events.send(AgentEvent::ScenarioClosed { conn }).await;
                    writer.abort();
                });
            }
        });
    }

    // heartbeat
    {
        let events = events_tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(HEARTBEAT_SECS));
            interval.tick().await;
            loop {
                interval.tick().await;
                if events.send(AgentEvent::Heartbeat).await.is_err() {
                    return;
                }
            }
        });
    }

    let mut agent = Agent {
        config: config.clone(),
        state: EmoeState::Queued,
        did_run: false,
        traffic_run_seen: false,
        sm: ScenarioManager::new(&config.etce_root)?,
        scenario_conn: None,
        run_process: None,
    };

    agent.change_state(EmoeState::Connected, None, &mut daemon_write).await;

    while let Some(event) = events_rx.recv().await {
        agent.handle_event(event, &mut daemon_write).await;
        if agent.state == EmoeState::Stopped {
            break;
        }
    }

    // give the final state message a moment to flush
    tokio::time::sleep(Duration::from_millis(500)).await;
    Ok(())
}

struct Agent {
    config: AgentConfig,
    state: EmoeState,
    did_run: bool,
    traffic_run_seen: bool,
    sm: ScenarioManager,
    scenario_conn: Option<(u64, mpsc::UnboundedSender<ScenarioReply>)>,
    run_process: Option<Child>,
}

impl Agent {
    async fn handle_event(
        &mut self,
        event: AgentEvent,
        daemon: &mut tokio::net::tcp::OwnedWriteHalf,
    ) {
        match event {
            AgentEvent::Control(message) => {
                if message.emoe_id != self.config.emoe_id {
                    log::error!(
                        "message emoe_id {} does not match container emoe_id {}. \
                         ignoring command",
                        message.emoe_id,
                        self.config.emoe_id
                    );
                    return;
                }
                match message.command {
                    EmoeCommand::Start => {
                        log::info!(
                            "received controller command START for emoe id {}",
                            message.emoe_id
                        );
                        self.handle_start(daemon).await;
                    }
                    EmoeCommand::Stop => {
                        log::info!(
                            "received controller command STOP for emoe id {}",
                            message.emoe_id
                        );
                        self.handle_stop(daemon).await;
                    }
                }
            }
            AgentEvent::DaemonClosed => {
                log::info!("closed controller channel");
            }
            AgentEvent::Status { step, message } => {
                self.handle_status(&step, &message, daemon).await;
            }
            AgentEvent::ScenarioAccept { conn, tx } => {
                // only one scenario client at a time
                if self.scenario_conn.is_none() {
                    log::info!("accept scenario client on conn {conn}");
                    self.scenario_conn = Some((conn, tx));
                } else {
                    log::error!(
                        "received connect from a second client on conn {conn}. Quitting."
                    );
                    self.handle_stop(daemon).await;
                }
            }
            AgentEvent::ScenarioRequest { conn, request } => {
                let reply = self.sm.handle_request(request).await;
                if let Some((active_conn, tx)) = &self.scenario_conn {
                    if *active_conn == conn {
                        let _ = tx.send(reply);
                    }
                }
            }
            AgentEvent::ScenarioClosed { conn } => {
                if matches!(&self.scenario_conn, Some((active, _)) if *active == conn) {
                    self.scenario_conn = None;
                }
            }
            AgentEvent::Heartbeat => {
                log::info!("heartbeat");
                match self.state {
                    EmoeState::Starting => {
                        if self.traffic_run_seen && self.sm.connect() {
                            self.change_state(EmoeState::Running, None, daemon).await;
                        } else {
                            self.send_state(None, daemon).await;
                        }
                    }
                    EmoeState::Stopped => {
                        log::info!("heartbeat timer stopped on STOPPED");
                    }
                    _ => {
                        self.send_state(None, daemon).await;
                    }
                }
            }
        }
    }

    async fn handle_start(&mut self, daemon: &mut tokio::net::tcp::OwnedWriteHalf) {
        // start the emulation only from the CONNECTED state
        if self.state != EmoeState::Connected {
            log::error!(
                "received emexd start message while in state \"{}\". ignoring.",
                self.state
            );
            return;
        }

        let log_file = std::fs::File::create(self.config.etce_root.join("etce.log"))
            .map(Stdio::from)
            .unwrap_or_else(|_| Stdio::null());

        match Command::new("/opt/run-etce.sh")
            .stdout(log_file)
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => {
                self.run_process = Some(child);
                self.change_state(EmoeState::Starting, None, daemon).await;
            }
            Err(e) => {
                self.change_state(
                    EmoeState::Stopping,
                    Some(format!("cannot start emulation: {e}")),
                    daemon,
                )
                .await;
            }
        }
    }

    async fn stop_emulation(&mut self) {
        if let Some(mut child) = self.run_process.take() {
            let _ = child.kill().await;

            let stop_log = std::fs::File::create(self.config.etce_root.join("etcestop.log"))
                .map(Stdio::from)
                .unwrap_or_else(|_| Stdio::null());
            let _ = Command::new("etce-lxc")
                .arg("stop")
                .stdout(stop_log)
                .stderr(Stdio::null())
                .spawn();
        }
    }

    async fn handle_stop(&mut self, daemon: &mut tokio::net::tcp::OwnedWriteHalf) {
        log::info!("handle_stop");
        self.stop_emulation().await;
        self.change_state(EmoeState::Stopped, None, daemon).await;
    }

    async fn handle_status(
        &mut self,
        step: &str,
        message: &str,
        daemon: &mut tokio::net::tcp::OwnedWriteHalf,
    ) {
        if step.eq_ignore_ascii_case("error") {
            self.change_state(
                EmoeState::Stopping,
                Some(format!("execution error: \"{message}\"")),
                daemon,
            )
            .await;
            // the controller daemon tears this container down
            return;
        }

        if step.eq_ignore_ascii_case("traffic.run") {
            self.traffic_run_seen = true;
            if self.state == EmoeState::Starting && self.sm.connect() {
                self.change_state(EmoeState::Running, None, daemon).await;
            }
        }
    }

    async fn change_state(
        &mut self,
        new_state: EmoeState,
        detail: Option<String>,
        daemon: &mut tokio::net::tcp::OwnedWriteHalf,
    ) {
        if self.state != new_state {
            log::info!("change state from {} to {new_state}", self.state);
        }

        self.state = new_state;

        if new_state == EmoeState::Running {
            self.did_run = true;
        }

        if new_state >= EmoeState::Stopped {
            self.sm.clean_up(self.did_run);
        }

        self.send_state(detail, daemon).await;
    }

    async fn send_state(
        &mut self,
        detail: Option<String>,
        daemon: &mut tokio::net::tcp::OwnedWriteHalf,
    ) {
        if self.state < EmoeState::Connected {
            log::error!(
                "trying to send state \"{}\" to controller before connected",
                self.state
            );
            return;
        }

        let message = ContainerStateMessage {
            emoe_id: self.config.emoe_id.clone(),
            state: self.state,
            detail: detail.unwrap_or_default(),
        };

        log::info!(
            "send state message {} for emoe_id {}",
            self.state,
            self.config.emoe_id
        );

        match frame::encode_message(&message) {
            Ok(bytes) => {
                if let Err(e) = daemon.write_all(&bytes).await {
                    log::warn!("cannot send state to controller: {e}");
                }
            }
            Err(e) => log::error!("cannot encode state message: {e}"),
        }
    }
}
