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

//! The abstract container runtime. All calls are blocking and are made
//! exclusively from the dedicated container worker threads.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;

use thiserror::Error;

/// A container engine error. The message text matters: the container
/// manager extracts colliding port numbers from it.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct EngineError {
    /// The error message as reported by the engine.
    pub message: String,
}

impl EngineError {
    /// Wrap an engine error message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Everything the engine needs to run one EMOE container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// The container name.
    pub name: String,
    /// The image to run.
    pub image: String,
    /// The cpu pinning string, e.g. `"2,3,4"`.
    pub cpuset: String,
    /// Environment variables.
    pub env: Vec<(String, String)>,
    /// The host working directory mounted to `/tmp/etce`.
    pub workdir: PathBuf,
    /// Port map container port → host port.
    pub ports: BTreeMap<u16, u16>,
    /// The command run inside the container.
    pub command: String,
}

/// One entry of a container listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// The container name.
    pub name: String,
    /// The engine-reported status, e.g. `running` or `exited`.
    pub status: String,
    /// The image the container runs.
    pub image: String,
}

impl ContainerInfo {
    /// `true` iff the container may still be running and must be stopped
    /// before removal.
    pub fn active(&self) -> bool {
        matches!(
            self.status.to_lowercase().as_str(),
            "created" | "restarting" | "running"
        )
    }
}

/// The container runtime the orchestrator drives. Implementations block;
/// the daemon only ever calls them from worker threads.
pub trait ContainerEngine: Send + Sync {
    /// Run a detached container, returning the engine handle.
    fn run(&self, spec: &ContainerSpec) -> Result<String, EngineError>;
    /// List all containers (running or not).
    fn list(&self) -> Result<Vec<ContainerInfo>, EngineError>;
    /// Stop a container by name.
    fn stop(&self, name: &str) -> Result<(), EngineError>;
    /// Remove a container by name.
    fn remove(&self, name: &str) -> Result<(), EngineError>;
}

/// Drives the docker command line client.
#[derive(Debug, Default)]
pub struct DockerCli;

impl DockerCli {
    fn docker(&self, args: &[String]) -> Result<String, EngineError> {
        log::debug!("docker {}", args.join(" "));

        let output = Command::new("docker")
            .args(args)
            .output()
            .map_err(|e| EngineError::new(format!("cannot execute docker: {e}")))?;

        if !output.status.success() {
            return Err(EngineError::new(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl ContainerEngine for DockerCli {
    fn run(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        let mut args: Vec<String> = vec![
            "run".into(),
            "--detach".into(),
            "--privileged".into(),
            "--name".into(),
            spec.name.clone(),
            "--cpuset-cpus".into(),
            spec.cpuset.clone(),
            "--volume".into(),
            format!("{}:/tmp/etce:rw", spec.workdir.display()),
        ];
        for (key, value) in &spec.env {
            args.push("--env".into());
            args.push(format!("{key}={value}"));
        }
        for (container_port, host_port) in &spec.ports {
            args.push("--publish".into());
            args.push(format!("{host_port}:{container_port}"));
        }
        args.push(spec.image.clone());
        args.extend(spec.command.split_whitespace().map(str::to_string));

        self.docker(&args)
    }

    fn list(&self) -> Result<Vec<ContainerInfo>, EngineError> {
        let stdout = self.docker(&[
            "ps".into(),
            "--all".into(),
            "--format".into(),
            "{{.Names}},{{.State}},{{.Image}}".into(),
        ])?;

        Ok(stdout
            .lines()
            .filter_map(|line| {
                let mut fields = line.splitn(3, ',');
                match (fields.next(), fields.next(), fields.next()) {
                    (Some(name), Some(status), Some(image)) => Some(ContainerInfo {
                        name: name.to_string(),
                        status: status.to_string(),
                        image: image.to_string(),
                    }),
                    _ => None,
                }
            })
            .collect())
    }

    fn stop(&self, name: &str) -> Result<(), EngineError> {
        self.docker(&["stop".into(), name.into()]).map(|_| ())
    }

    fn remove(&self, name: &str) -> Result<(), EngineError> {
        self.docker(&["rm".into(), "--force".into(), name.into()])
            .map(|_| ())
    }
}
