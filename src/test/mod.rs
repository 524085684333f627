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

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{
    config::DaemonConfig,
    daemon::{Manager, WorkerSettings},
    engine::{ContainerEngine, ContainerInfo, ContainerSpec, EngineError},
};

mod test_batch;
mod test_builder;
mod test_config;
mod test_manager;
mod test_resource;
mod test_traffic;

/// A container engine replaying queued start failures before succeeding.
pub(crate) struct MockEngine {
    errors: Mutex<VecDeque<String>>,
    containers: Mutex<Vec<ContainerInfo>>,
}

impl MockEngine {
    pub(crate) fn new(errors: impl IntoIterator<Item = String>) -> Self {
        Self {
            errors: Mutex::new(errors.into_iter().collect()),
            containers: Mutex::new(Vec::new()),
        }
    }
}

impl ContainerEngine for MockEngine {
    fn run(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        if let Some(message) = self.errors.lock().unwrap().pop_front() {
            return Err(EngineError::new(message));
        }
        self.containers.lock().unwrap().push(ContainerInfo {
            name: spec.name.clone(),
            status: "running".to_string(),
            image: spec.image.clone(),
        });
        Ok(format!("handle-{}", spec.name))
    }

    fn list(&self) -> Result<Vec<ContainerInfo>, EngineError> {
        Ok(self.containers.lock().unwrap().clone())
    }

    fn stop(&self, name: &str) -> Result<(), EngineError> {
        let mut containers = self.containers.lock().unwrap();
        for container in containers.iter_mut().filter(|c| c.name == name) {
            container.status = "exited".to_string();
        }
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), EngineError> {
        self.containers.lock().unwrap().retain(|c| c.name != name);
        Ok(())
    }
}

/// A small daemon configuration rooted at a temporary workdir.
pub(crate) fn test_config(workdir: &Path) -> DaemonConfig {
    DaemonConfig {
        allowed_cpus: (1..=4).collect(),
        allowed_host_ports: (9000..=9009).collect(),
        emex_workdir: workdir.to_path_buf(),
        container_workers: 1,
        ..Default::default()
    }
}

/// A manager over a mock engine, returning the wake receiver for
/// synchronising with the worker thread.
pub(crate) fn test_manager(
    config: DaemonConfig,
    engine: Arc<MockEngine>,
) -> (Manager, std::sync::mpsc::Receiver<String>) {
    let (wake_tx, wake_rx) = std::sync::mpsc::channel();

    let manager = Manager::new(
        config,
        emex_model::ModelRegistry::default(),
        engine,
        WorkerSettings {
            confirm_attempts: 1,
            confirm_interval: Duration::from_millis(1),
        },
        Box::new(move |tag| {
            let _ = wake_tx.send(tag);
        }),
    );

    (manager, wake_rx)
}

/// Feed worker completions through the manager until `done` holds.
pub(crate) fn pump_until(
    manager: &mut Manager,
    wake_rx: &std::sync::mpsc::Receiver<String>,
    mut done: impl FnMut(&Manager) -> bool,
) {
    for _ in 0..50 {
        if done(manager) {
            return;
        }
        match wake_rx.recv_timeout(Duration::from_secs(2)) {
            Ok(tag) => manager.handle_event(crate::daemon::DaemonEvent::WorkerWake { tag }),
            Err(_) => break,
        }
    }
    assert!(done(manager), "worker condition not reached in time");
}
