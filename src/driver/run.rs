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

//! The single-shot scenario run controller.

use std::path::PathBuf;
use std::time::Duration;

use emex_model::{scenario::{EventSequencer, Scenario}, Emoe, EmoeState, ModelRegistry};
use emex_proto::{FlowRecord, ListEmoesEntry, ServiceAccessor};

use super::{client::EmexdClient, client::ScenarioClient, DriverError, LogMonitor, Monitor};

/// Runs one EMOE through its full lifecycle: check, start, wait for
/// RUNNING, pump the scenario events, stop.
pub struct ScenarioRunner {
    client: EmexdClient,
    registry: ModelRegistry,
    emoe_name: String,
    scenario: Scenario,
    emoe: Emoe,
    output_path: Option<PathBuf>,
    monitor: Option<Box<dyn Monitor>>,
    total_cpus: u32,
}

impl ScenarioRunner {
    /// Connect to the daemon, fetch the models and build the EMOE from
    /// the scenario.
    pub fn new(
        endpoint: (&str, u16),
        emoe_name: &str,
        scenario: Scenario,
        output_path: Option<PathBuf>,
        monitor: bool,
    ) -> Result<Self, DriverError> {
        let mut client = EmexdClient::connect(endpoint.0, endpoint.1)?;
        let registry = client.models()?;
        let emoe = scenario.build_emoe(emoe_name, &registry)?;
        let (total_cpus, _, _) = client.list_emoes()?;

        Ok(Self {
            client,
            registry,
            emoe_name: emoe_name.to_string(),
            scenario,
            emoe,
            output_path,
            monitor: monitor.then(|| Box::new(LogMonitor) as Box<dyn Monitor>),
            total_cpus,
        })
    }

    /// The cpus the EMOE requires.
    pub fn required_cpus(&self) -> u32 {
        self.emoe.cpus()
    }

    /// The cpus the daemon manages.
    pub fn total_cpus(&self) -> u32 {
        self.total_cpus
    }

    /// The cpus the daemon currently has available.
    pub fn available_cpus(&mut self) -> Result<u32, DriverError> {
        Ok(self.client.list_emoes()?.1)
    }

    /// Ask the daemon to validate the EMOE.
    pub fn check(&mut self) -> Result<(bool, String), DriverError> {
        self.client
            .check_emoe(&self.scenario.emoe_description(&self.emoe_name))
    }

    /// Run the scenario end to end.
    pub fn run(&mut self) -> Result<(), DriverError> {
        let (ok, message) = self.check()?;
        if !ok {
            return Err(DriverError::Failed(format!(
                "{} failed check with message \"{message}\"",
                self.emoe_name
            )));
        }

        let handle = self
            .client
            .start_emoe(&self.scenario.emoe_description(&self.emoe_name))?;

        let entry = self.wait_for_emoe_running()?;

        let (emoe_endpoint, otestpoint_endpoint) = endpoints(&entry.service_accessors);

        let Some(emoe_endpoint) = emoe_endpoint else {
            return Err(DriverError::Failed(format!(
                "{} published no emexcontainerd accessor",
                self.emoe_name
            )));
        };

        if let (Some(monitor), Some(endpoint)) = (&mut self.monitor, otestpoint_endpoint) {
            let output_path = self
                .output_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(format!("{handle}.{}", self.emoe_name)));
            if let Err(e) = std::fs::create_dir_all(&output_path) {
                log::error!("cannot create {}: {e}", output_path.display());
            }
            monitor.start(&output_path, endpoint);
        }

        let flows = self.run_scenario(emoe_endpoint)?;

        if let Some(monitor) = &mut self.monitor {
            monitor.stop(&flows);
        }

        log::info!("scenario complete, stop emoe");
        let (ok, message) = self.client.stop_emoe(&handle)?;
        if !ok {
            return Err(DriverError::Failed(format!(
                "{} stop failed with message \"{message}\".",
                self.emoe_name
            )));
        }
        log::info!("{} stopped.", self.emoe_name);

        Ok(())
    }

    /// Poll the daemon at 1 Hz until the EMOE reports RUNNING.
    fn wait_for_emoe_running(&mut self) -> Result<ListEmoesEntry, DriverError> {
        loop {
            let (_, _, entries) = self.client.list_emoes()?;

            let Some(entry) = entries.iter().find(|e| e.emoe_name == self.emoe_name) else {
                return Err(DriverError::Failed(format!(
                    "{} disappeared while waiting for RUNNING",
                    self.emoe_name
                )));
            };

            log::info!("{} state: {}", self.emoe_name, entry.state);

            if entry.state == EmoeState::Running {
                return Ok(entry.clone());
            }
            if entry.state >= EmoeState::Stopping {
                return Err(DriverError::Failed(format!(
                    "{} stopped while waiting for RUNNING",
                    self.emoe_name
                )));
            }

            std::thread::sleep(Duration::from_secs(1));
        }
    }

    /// Pump the time-ordered event sequence into the running EMOE.
    fn run_scenario(
        &mut self,
        endpoint: (String, u16),
    ) -> Result<Vec<FlowRecord>, DriverError> {
        let mut scenario_client = ScenarioClient::connect(&endpoint.0, endpoint.1, true)?;

        log::info!("run {}", self.scenario.name());

        let sequencer = EventSequencer::new(self.scenario.events());
        let mut flows = Vec::new();

        for (eventtime, events) in sequencer {
            log::info!("event time={eventtime}");
            let (ok, message, reply_flows) = scenario_client.send_events(&events)?;
            if !ok {
                log::error!("event at {eventtime} failed: {message}");
            }
            flows = reply_flows;
        }

        Ok(flows)
    }

    /// The model registry fetched from the daemon.
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }
}

/// Pick the agent and testpoint endpoints out of the accessors.
pub(crate) fn endpoints(
    accessors: &[ServiceAccessor],
) -> (Option<(String, u16)>, Option<(String, u16)>) {
    let mut emoe_endpoint = None;
    let mut otestpoint_endpoint = None;

    for accessor in accessors {
        match accessor.name.as_str() {
            "emexcontainerd" => {
                emoe_endpoint = Some((accessor.ip_address.clone(), accessor.port))
            }
            "otestpoint-publish" => {
                otestpoint_endpoint = Some((accessor.ip_address.clone(), accessor.port))
            }
            _ => {}
        }
    }

    (emoe_endpoint, otestpoint_endpoint)
}
