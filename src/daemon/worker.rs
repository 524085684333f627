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

//! Serialised container runtime calls.
//!
//! Container start and stop operations are long lasting calls; handling
//! them on the daemon's event thread would make `emexd` unresponsive to
//! clients while the operation lasts. They are moved to dedicated worker
//! threads that exchange work items with the [`ContainerManager`] through
//! an input queue and an outcome queue. Each completion wakes the event
//! loop through the wake callback.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    config::DaemonConfig,
    engine::{ContainerEngine, ContainerSpec},
    resource::ResourceTracker,
    runtime::EmoeRuntime,
};

/// One work item for a container worker thread.
#[derive(Debug)]
pub enum WorkerOp {
    /// Run a container and confirm it appears in the engine listing.
    Start {
        /// The EMOE the container belongs to.
        emoe_id: String,
        /// The run specification.
        spec: ContainerSpec,
        /// The host ports mapped for this attempt, for deallocation on
        /// failure.
        host_ports: Vec<u16>,
    },
    /// Stop and remove a container.
    Stop {
        /// The container name.
        container_name: String,
    },
    /// Stop and remove every container of the given image.
    StopAllImage {
        /// The image name.
        image: String,
    },
}

/// The completion record of one work item.
#[derive(Debug)]
pub enum WorkerOutcome {
    /// A start completed.
    Start {
        /// The EMOE the container belongs to.
        emoe_id: String,
        /// The engine handle on success, the engine message on failure.
        result: Result<String, String>,
        /// The host ports that were mapped for the attempt.
        host_ports: Vec<u16>,
    },
    /// A stop completed.
    Stop {
        /// The container name.
        container_name: String,
        /// `Err` carries the engine message.
        result: Result<(), String>,
    },
}

/// Tunables of the start confirmation poll.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// How often the listing is polled after a successful start call.
    pub confirm_attempts: u32,
    /// The poll interval.
    pub confirm_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            confirm_attempts: 10,
            confirm_interval: Duration::from_secs(1),
        }
    }
}

/// Called after every outcome push to wake the daemon event loop. The
/// string is a short human-readable completion tag.
pub type WakeFn = Box<dyn Fn(String) + Send + Sync>;

struct Worker {
    engine: Arc<dyn ContainerEngine>,
    outcomes: Arc<Mutex<VecDeque<WorkerOutcome>>>,
    wake: Arc<WakeFn>,
    settings: WorkerSettings,
    start_seq: u64,
    stop_seq: u64,
}

impl Worker {
    fn run(mut self, ops: mpsc::Receiver<WorkerOp>) {
        while let Ok(op) = ops.recv() {
            match op {
                WorkerOp::Start {
                    emoe_id,
                    spec,
                    host_ports,
                } => self.handle_start(emoe_id, spec, host_ports),
                WorkerOp::Stop { container_name } => self.handle_stop(container_name),
                WorkerOp::StopAllImage { image } => self.handle_stop_all(image),
            }
        }
    }

    fn handle_start(&mut self, emoe_id: String, spec: ContainerSpec, host_ports: Vec<u16>) {
        let result = match self.engine.run(&spec) {
            Ok(handle) => {
                // the run call did not fail; wait to confirm the
                // container appears in the engine listing
                let mut found = false;
                for _ in 0..self.settings.confirm_attempts {
                    std::thread::sleep(self.settings.confirm_interval);
                    if let Ok(listing) = self.engine.list() {
                        if listing.iter().any(|c| c.name == spec.name) {
                            found = true;
                            break;
                        }
                    }
                }
                if found {
                    Ok(handle)
                } else {
                    Err(format!(
                        "Failed to find emoe container \"{}\" in list of running emoes \
                         after successful start.",
                        spec.name
                    ))
                }
            }
            Err(e) => Err(e.message),
        };

        let tag = format!("start {} emoe \"{emoe_id}\"", self.start_seq);
        self.start_seq += 1;

        self.push_outcome(
            WorkerOutcome::Start {
                emoe_id,
                result,
                host_ports,
            },
            tag,
        );
    }

    fn handle_stop(&mut self, container_name: String) {
        let result = self.stop_and_remove(&container_name);

        let tag = format!("stop {} {container_name}", self.stop_seq);
        self.stop_seq += 1;

        self.push_outcome(
            WorkerOutcome::Stop {
                container_name,
                result,
            },
            tag,
        );
    }

    fn handle_stop_all(&mut self, image: String) {
        let names: Vec<String> = match self.engine.list() {
            Ok(listing) => listing
                .into_iter()
                .filter(|c| c.image == image)
                .map(|c| c.name)
                .collect(),
            Err(e) => {
                log::error!("cannot list containers: {e}");
                return;
            }
        };

        for container_name in names {
            self.handle_stop(container_name);
        }
    }

    fn stop_and_remove(&self, container_name: &str) -> Result<(), String> {
        let listing = self.engine.list().map_err(|e| e.message)?;
        let Some(info) = listing.iter().find(|c| c.name == container_name) else {
            return Err(format!("container {container_name} not found, ignoring stop."));
        };

        if info.active() {
            self.engine.stop(container_name).map_err(|e| e.message)?;
        }
        self.engine.remove(container_name).map_err(|e| e.message)
    }

    fn push_outcome(&self, outcome: WorkerOutcome, tag: String) {
        self.outcomes
            .lock()
            .expect("worker outcome queue poisoned")
            .push_back(outcome);
        (self.wake)(tag);
    }
}

lazy_static! {
    // the two engine error shapes that carry the colliding port
    static ref BIND_IN_USE_RE: Regex =
        Regex::new(r"\d+\.\d+\.\d+\.\d+:(?P<port>\d+): bind: address already in use").unwrap();
    static ref PORT_ALLOCATED_RE: Regex =
        Regex::new(r"\d+\.\d+\.\d+\.\d+:(?P<port>\d+) failed: port is already allocated").unwrap();
}

/// Owns the worker threads and builds the engine work items from EMOE
/// runtimes. Host ports are drawn from the port tracker at enqueue time
/// and excluded on collision.
pub struct ContainerManager {
    senders: Vec<mpsc::Sender<WorkerOp>>,
    next_worker: usize,
    outcomes: Arc<Mutex<VecDeque<WorkerOutcome>>>,
    image: String,
    loglevel: String,
    container_listen_address: String,
    container_listen_port: u16,
}

impl ContainerManager {
    /// Spawn the configured number of worker threads.
    pub fn new(
        config: &DaemonConfig,
        engine: Arc<dyn ContainerEngine>,
        settings: WorkerSettings,
        wake: WakeFn,
    ) -> Self {
        let outcomes = Arc::new(Mutex::new(VecDeque::new()));
        let wake = Arc::new(wake);

        let mut senders = Vec::new();
        for i in 0..config.container_workers.max(1) {
            let (tx, rx) = mpsc::channel();
            let worker = Worker {
                engine: engine.clone(),
                outcomes: outcomes.clone(),
                wake: wake.clone(),
                settings: settings.clone(),
                start_seq: 1,
                stop_seq: 1,
            };
            std::thread::Builder::new()
                .name(format!("container-worker-{i}"))
                .spawn(move || worker.run(rx))
                .expect("cannot spawn container worker");
            senders.push(tx);
        }

        Self {
            senders,
            next_worker: 0,
            outcomes,
            image: config.docker_image.clone(),
            loglevel: config.emexcontainerd_loglevel.clone(),
            container_listen_address: config.container_listen_address.clone(),
            container_listen_port: config.container_listen_port,
        }
    }

    fn submit(&mut self, op: WorkerOp) {
        let sender = &self.senders[self.next_worker % self.senders.len()];
        self.next_worker = self.next_worker.wrapping_add(1);
        if sender.send(op).is_err() {
            log::error!("container worker thread is gone");
        }
    }

    /// Map host ports to the runtime's registered container service
    /// ports and enqueue the container start.
    pub fn start(
        &mut self,
        rt: &mut EmoeRuntime,
        hpm: &mut ResourceTracker<u16>,
    ) -> Result<(), String> {
        let num_container_ports = rt.container_ports().len();

        if num_container_ports > hpm.num_available() {
            let message = format!(
                "Cannot allocate emoe: {num_container_ports} ports required but only {} \
                 available.",
                hpm.num_available()
            );
            log::error!("{message}");
            return Err(message);
        }

        let allocated = hpm.allocate(num_container_ports).map_err(|e| e.to_string())?;

        let mut ports: BTreeMap<u16, u16> = BTreeMap::new();
        let services: Vec<(String, u16)> = rt
            .container_ports()
            .iter()
            .map(|(s, p)| (s.clone(), *p))
            .collect();
        for (host_port, (service_name, container_port)) in allocated.iter().zip(services) {
            rt.add_host_port_mapping(*host_port, &service_name);
            ports.insert(container_port, *host_port);
        }

        log::info!(
            "Starting EMOE {} container {}",
            rt.emoe().name(),
            rt.container_name()
        );

        let spec = ContainerSpec {
            name: rt.container_name().to_string(),
            image: self.image.clone(),
            cpuset: rt.cpus().iter().join(","),
            env: vec![
                (
                    "EMEXD_LISTEN_ADDRESS".to_string(),
                    self.container_listen_address.clone(),
                ),
                (
                    "EMEXD_LISTEN_PORT".to_string(),
                    self.container_listen_port.to_string(),
                ),
                ("EMOE_ID".to_string(), rt.emoe_id()),
            ],
            workdir: rt.workdir(),
            ports,
            command: format!("/opt/run-emexcontainerd.sh -l {}", self.loglevel),
        };

        self.submit(WorkerOp::Start {
            emoe_id: rt.emoe_id(),
            spec,
            host_ports: allocated,
        });

        Ok(())
    }

    /// Enqueue a container stop.
    pub fn stop(&mut self, container_name: &str) {
        log::info!("stopping EMOE container {container_name}");
        self.submit(WorkerOp::Stop {
            container_name: container_name.to_string(),
        });
    }

    /// Enqueue a sweep stopping every container of the configured image.
    pub fn stop_all(&mut self) {
        self.submit(WorkerOp::StopAllImage {
            image: self.image.clone(),
        });
    }

    /// Drain all pending outcomes.
    pub fn drain_outcomes(&self) -> Vec<WorkerOutcome> {
        self.outcomes
            .lock()
            .expect("worker outcome queue poisoned")
            .drain(..)
            .collect()
    }

    /// Handle a port-already-bound start failure: extract the colliding
    /// port from the message and exclude it from the pool, or exclude
    /// every attempted port when the exact one cannot be determined.
    /// Returns `true` iff the message looks like a port collision.
    pub fn handle_port_collision(
        &mut self,
        message: &str,
        attempted_ports: &[u16],
        hpm: &mut ResourceTracker<u16>,
    ) -> bool {
        // the container was partially started, make sure it is gone

        let extracted = BIND_IN_USE_RE
            .captures(message)
            .or_else(|| PORT_ALLOCATED_RE.captures(message))
            .and_then(|c| c.name("port"))
            .and_then(|m| m.as_str().parse::<u16>().ok());

        if let Some(port) = extracted {
            hpm.exclude(port);
            return true;
        }

        let lower = message.to_lowercase();
        if lower.contains("port") || lower.contains("bind") {
            // cannot extract the exact port, exclude them all
            for port in attempted_ports {
                hpm.exclude(*port);
            }
            return true;
        }

        false
    }
}
