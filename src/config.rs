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

//! The daemon configuration file.
//!
//! `emexd` reads an optional XML configuration; every element overrides
//! one default. A malformed file is fatal at daemon initialisation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use emex_proto::{
    DEFAULT_CLIENT_LISTEN_ADDRESS, DEFAULT_CLIENT_LISTEN_PORT, DEFAULT_CONTAINER_LISTEN_ADDRESS,
    DEFAULT_CONTAINER_LISTEN_PORT,
};

/// Configuration errors are fatal at daemon startup.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Cannot read \"{0}\": {1}")]
    Read(String, String),
    /// The configuration file is not valid XML.
    #[error("Cannot parse \"{0}\": {1}")]
    Parse(String, String),
    /// An element carries an invalid attribute value.
    #[error("Invalid value \"{1}\" for {0}")]
    InvalidValue(&'static str, String),
    /// A numstring (comma/range list) is malformed.
    #[error("Malformed number list \"{0}\"")]
    Numstring(String),
}

/// What happens to a per-EMOE working directory after teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryAction {
    /// Keep the directory.
    Keep,
    /// Always delete the directory.
    Delete,
    /// Delete the directory only if the EMOE reached RUNNING.
    DeleteOnSuccess,
}

impl DirectoryAction {
    /// The configuration keyword of the action.
    pub fn keyword(&self) -> &'static str {
        match self {
            DirectoryAction::Keep => "keep",
            DirectoryAction::Delete => "delete",
            DirectoryAction::DeleteOnSuccess => "deleteonsuccess",
        }
    }
}

/// Where the container name carries the datetime tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatetimeTagFormat {
    /// `<emoe_id>.<emoe_name>`.
    Prefix,
    /// `<emoe_name>.<emoe_id>`.
    Suffix,
    /// `<emoe_name>` only.
    None,
}

/// The resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Address the daemon listens on for clients.
    pub client_listen_address: String,
    /// Port the daemon listens on for clients.
    pub client_listen_port: u16,
    /// Address the daemon listens on for launched containers.
    pub container_listen_address: String,
    /// Port the daemon listens on for launched containers.
    pub container_listen_port: u16,
    /// Send unsolicited state transition events to clients.
    pub state_messages_enable: bool,
    /// Host cpu ids available for allocation.
    pub allowed_cpus: BTreeSet<u32>,
    /// Host ports available for mapping container services.
    pub allowed_host_ports: BTreeSet<u16>,
    /// The container image EMOEs run in.
    pub docker_image: String,
    /// Log level handed to the in-container agent.
    pub emexcontainerd_loglevel: String,
    /// Stop all containers of the configured image at daemon start/stop.
    pub stop_all_containers: bool,
    /// Working directory retention policy.
    pub emexdirectory_action: DirectoryAction,
    /// Container name tagging format.
    pub container_datetime_tag_format: DatetimeTagFormat,
    /// Number of container worker threads.
    pub container_workers: usize,
    /// Root of the per-EMOE working directories.
    pub emex_workdir: PathBuf,
    /// Root of the model template tree; `None` falls back to the
    /// `EMEX_MODEL_PATH` environment variable.
    pub model_path: Option<PathBuf>,
}

/// Default range of host ports allocated to map container service ports.
pub const DEFAULT_ALLOWED_MIN_HOST_PORT: u16 = 9000;
/// Upper bound of the default host port range (inclusive).
pub const DEFAULT_ALLOWED_MAX_HOST_PORT: u16 = 9999;
/// Default container image used for running EMOEs.
pub const DEFAULT_DOCKER_IMAGE: &str = "emex:0.6.3";
/// `emexd` consults this location when no configuration file is given.
pub const DEFAULT_CONFIGURATION_FILE: &str = "/etc/emexd.xml";
/// Root directory of all per-EMOE working directories.
pub const DEFAULT_EMEX_WORKDIR: &str = "/tmp/emex";

impl Default for DaemonConfig {
    fn default() -> Self {
        let num_host_cpus = num_cpus::get() as u32;

        // allocate all cpus except for the minimum of the first 1/4 of
        // the ids, or the first 8
        let min_cpu_id = (num_host_cpus / 4).min(8);

        Self {
            client_listen_address: DEFAULT_CLIENT_LISTEN_ADDRESS.to_string(),
            client_listen_port: DEFAULT_CLIENT_LISTEN_PORT,
            container_listen_address: DEFAULT_CONTAINER_LISTEN_ADDRESS.to_string(),
            container_listen_port: DEFAULT_CONTAINER_LISTEN_PORT,
            state_messages_enable: false,
            allowed_cpus: (min_cpu_id..num_host_cpus).collect(),
            allowed_host_ports: (DEFAULT_ALLOWED_MIN_HOST_PORT..=DEFAULT_ALLOWED_MAX_HOST_PORT)
                .collect(),
            docker_image: DEFAULT_DOCKER_IMAGE.to_string(),
            emexcontainerd_loglevel: "info".to_string(),
            stop_all_containers: true,
            emexdirectory_action: DirectoryAction::Keep,
            container_datetime_tag_format: DatetimeTagFormat::Prefix,
            container_workers: 1,
            emex_workdir: PathBuf::from(DEFAULT_EMEX_WORKDIR),
            model_path: None,
        }
    }
}

impl DaemonConfig {
    /// Read a configuration file, falling back to the defaults for every
    /// element that is absent.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.display().to_string(), e.to_string()))?;
        Self::from_xml(&contents)
    }

    /// Parse a configuration document.
    pub fn from_xml(contents: &str) -> Result<Self, ConfigError> {
        let doc = roxmltree::Document::parse(contents)
            .map_err(|e| ConfigError::Parse("emexd configuration".to_string(), e.to_string()))?;

        let mut config = Self::default();
        let root = doc.root_element();

        for node in root.children().filter(|n| n.is_element()) {
            match node.tag_name().name() {
                "client-listen" => {
                    if let Some(address) = node.attribute("address") {
                        config.client_listen_address = address.to_string();
                    }
                    if let Some(port) = node.attribute("port") {
                        config.client_listen_port = parse_attr("client-listen port", port)?;
                    }
                }
                "container-listen" => {
                    if let Some(address) = node.attribute("address") {
                        config.container_listen_address = address.to_string();
                    }
                    if let Some(port) = node.attribute("port") {
                        config.container_listen_port = parse_attr("container-listen port", port)?;
                    }
                }
                "state-messages" => {
                    config.state_messages_enable = node.attribute("enable") == Some("true");
                }
                "allowed-cpus" => {
                    if let Some(ids) = node.attribute("ids") {
                        config.allowed_cpus = clamp_cpu_ids(numstr_to_numlist(ids)?);
                    }
                }
                "allowed-host-ports" => {
                    if let Some(ports) = node.attribute("ports") {
                        config.allowed_host_ports = numstr_to_numlist(ports)?
                            .into_iter()
                            .map(|p| {
                                u16::try_from(p).map_err(|_| {
                                    ConfigError::InvalidValue(
                                        "allowed-host-ports ports",
                                        p.to_string(),
                                    )
                                })
                            })
                            .collect::<Result<_, _>>()?;
                    }
                }
                "docker-image" => {
                    if let Some(name) = node.attribute("name") {
                        config.docker_image = name.to_string();
                    }
                }
                "emexcontainerd-loglevel" => {
                    if let Some(level) = node.attribute("level") {
                        config.emexcontainerd_loglevel = level.to_string();
                    }
                }
                "stop-all-containers" => {
                    config.stop_all_containers = node.attribute("enable") != Some("false");
                }
                "emexdirectory" => {
                    config.emexdirectory_action = match node.attribute("action") {
                        None | Some("keep") => DirectoryAction::Keep,
                        Some("delete") => DirectoryAction::Delete,
                        Some("deleteonsuccess") => DirectoryAction::DeleteOnSuccess,
                        Some(other) => {
                            return Err(ConfigError::InvalidValue(
                                "emexdirectory action",
                                other.to_string(),
                            ))
                        }
                    };
                }
                "container-datetime-tag" => {
                    config.container_datetime_tag_format = match node.attribute("format") {
                        None | Some("prefix") => DatetimeTagFormat::Prefix,
                        Some("suffix") => DatetimeTagFormat::Suffix,
                        Some("none") => DatetimeTagFormat::None,
                        Some(other) => {
                            return Err(ConfigError::InvalidValue(
                                "container-datetime-tag format",
                                other.to_string(),
                            ))
                        }
                    };
                }
                "container-workers" => {
                    if let Some(count) = node.attribute("count") {
                        config.container_workers = parse_attr("container-workers count", count)?;
                    }
                }
                other => {
                    return Err(ConfigError::InvalidValue("emexd element", other.to_string()));
                }
            }
        }

        config.log();
        Ok(config)
    }

    fn log(&self) {
        log::info!("client_address={}", self.client_listen_address);
        log::info!("client_port={}", self.client_listen_port);
        log::info!("container_address={}", self.container_listen_address);
        log::info!("container_port={}", self.container_listen_port);
        log::info!("state_messages_enable={}", self.state_messages_enable);
        log::info!("allowed_cpus={:?}", self.allowed_cpus);
        if let (Some(min), Some(max)) = (
            self.allowed_host_ports.iter().next(),
            self.allowed_host_ports.iter().last(),
        ) {
            log::info!("allowed_host_ports bounds [{min}, {max}]");
        }
        log::info!("docker_image={}", self.docker_image);
        log::info!("emexcontainerd_loglevel={}", self.emexcontainerd_loglevel);
        log::info!("stop_all_containers={}", self.stop_all_containers);
        log::info!(
            "emexdirectory_action={}",
            self.emexdirectory_action.keyword()
        );
        log::info!(
            "container_datetime_tag_format={:?}",
            self.container_datetime_tag_format
        );
        log::info!("container_workers={}", self.container_workers);
    }
}

fn parse_attr<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name, value.to_string()))
}

/// Parse a comma separated list of numbers and `lo-hi` ranges, e.g.
/// `"1,2,5-8"`.
pub fn numstr_to_numlist(num_str: &str) -> Result<BTreeSet<u32>, ConfigError> {
    let mut numbers = BTreeSet::new();

    for tok in num_str.split(',') {
        let tok = tok.trim();
        if tok.is_empty() {
            continue;
        }
        if let Some((lo, hi)) = tok.split_once('-') {
            let lo: u32 = lo
                .trim()
                .parse()
                .map_err(|_| ConfigError::Numstring(num_str.to_string()))?;
            let hi: u32 = hi
                .trim()
                .parse()
                .map_err(|_| ConfigError::Numstring(num_str.to_string()))?;
            if lo > hi {
                return Err(ConfigError::Numstring(num_str.to_string()));
            }
            numbers.extend(lo..=hi);
        } else {
            numbers.insert(
                tok.parse()
                    .map_err(|_| ConfigError::Numstring(num_str.to_string()))?,
            );
        }
    }

    Ok(numbers)
}

/// Clamp configured cpu ids to the ids present on the host and never
/// allocate cpu id 0.
fn clamp_cpu_ids(mut ids: BTreeSet<u32>) -> BTreeSet<u32> {
    let num_host_cpus = num_cpus::get() as u32;

    if let Some(&max_id) = ids.iter().last() {
        if max_id >= num_host_cpus {
            log::warn!(
                "Setting maximum allocated cpu to the maximum id available on the \
                 system ({}), because the configured value ({max_id}) exceeds it.",
                num_host_cpus - 1
            );
            ids.retain(|&id| id < num_host_cpus);
        }
    }

    if ids.remove(&0) {
        log::warn!("Will not allocate cpu id 0 as configured. Setting to 1.");
    }

    ids
}
