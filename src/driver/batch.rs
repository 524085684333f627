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

//! Multi-trial batch scheduling.
//!
//! The runner keeps a cursor over `(scenario, trial)` pairs in submission
//! order. On every 1 Hz list tick it reconciles the daemon's reply with
//! its local state — spawning one event-pump thread per EMOE that
//! reached RUNNING and reaping EMOEs whose pump finished — and then
//! submits the next trial as long as it fits the available cpus.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use emex_model::{
    scenario::{EventSequencer, EventSet, EventTime, Scenario},
    EmoeState, ModelRegistry,
};
use emex_proto::ListEmoesEntry;

use super::{client::EmexdClient, client::ScenarioClient, run::endpoints, DriverError};

/// The scheduling cursor over `(scenario_index, trial_index)` pairs.
///
/// Trials run scenario-major: all trials of the first scenario are
/// submitted before the first trial of the second.
#[derive(Debug)]
pub struct BatchCursor {
    index: usize,
    numtrials: usize,
    num_scenarios: usize,
}

impl BatchCursor {
    /// Create a cursor over `num_scenarios × numtrials` submissions.
    pub fn new(num_scenarios: usize, numtrials: usize) -> Self {
        Self {
            index: 0,
            numtrials: numtrials.max(1),
            num_scenarios,
        }
    }

    /// The total number of submissions.
    pub fn total_trials(&self) -> usize {
        self.num_scenarios * self.numtrials
    }

    /// `true` once every trial was submitted.
    pub fn done_starting(&self) -> bool {
        self.index >= self.total_trials()
    }

    /// The `(scenario_index, trial_index)` under the cursor.
    pub fn index_trial(&self) -> (usize, usize) {
        (self.index / self.numtrials, self.index % self.numtrials)
    }

    /// Advance to the next submission.
    pub fn bump(&mut self) {
        self.index = (self.index + 1).min(self.total_trials());
        log::debug!("bump_index scenario_index: {}", self.index);
    }

    /// The next EMOE name that is not yet in use:
    /// `<scenario>.<trial+1, zero padded>`. Advances past used names.
    pub fn next_emoe_name(
        &mut self,
        scenarios: &[Scenario],
        in_use: &dyn Fn(&str) -> bool,
    ) -> Option<(usize, String)> {
        while !self.done_starting() {
            let (index, trial) = self.index_trial();
            let emoe_name = format!("{}.{:03}", scenarios[index].name(), trial + 1);
            if in_use(&emoe_name) {
                log::debug!("next_emoe_name: {emoe_name} already used");
                self.bump();
                continue;
            }
            return Some((index, emoe_name));
        }
        None
    }
}

struct ScenarioWorker {
    handle: JoinHandle<()>,
    log: Arc<Mutex<String>>,
}

impl ScenarioWorker {
    /// Spawn the event pump of one running EMOE.
    fn spawn(
        emoe_name: String,
        endpoint: (String, u16),
        events: BTreeMap<EventTime, EventSet>,
        stop_flag: Arc<AtomicBool>,
    ) -> Self {
        let log = Arc::new(Mutex::new(String::from("initialized")));
        let worker_log = log.clone();

        let handle = std::thread::spawn(move || {
            let set_log = |s: String| {
                *worker_log.lock().expect("scenario worker log poisoned") = s;
            };

            set_log(format!("connect to {}:{}", endpoint.0, endpoint.1));

            let mut client = match ScenarioClient::connect(&endpoint.0, endpoint.1, true) {
                Ok(client) => client,
                Err(e) => {
                    set_log(format!("EXCEPTION {e}"));
                    return;
                }
            };

            let sequencer = EventSequencer::new(&events);
            let num_events = sequencer.num_events();

            for (event_num, (eventtime, events)) in sequencer.into_iter().enumerate() {
                if stop_flag.load(Ordering::Relaxed) {
                    set_log("interrupted".to_string());
                    return;
                }

                set_log(format!(
                    "process: {event_num:3} of {num_events:3} events, eventtime:{eventtime}"
                ));

                if let Err(e) = client.send_events(&events) {
                    set_log(format!("EXCEPTION {e}"));
                    return;
                }
            }

            set_log(format!("{emoe_name} stopped"));
        });

        Self { handle, log }
    }

    fn finished(&self) -> bool {
        self.handle.is_finished()
    }

    fn log(&self) -> String {
        self.log.lock().expect("scenario worker log poisoned").clone()
    }
}

struct EmoeSlot {
    scenario_index: usize,
    entry: Option<ListEmoesEntry>,
    worker: Option<ScenarioWorker>,
    stopped: bool,
}

/// Schedules `numtrials × scenarios` EMOE runs against the daemon's
/// available cpus.
pub struct BatchRunner {
    client: EmexdClient,
    registry: ModelRegistry,
    scenarios: Vec<Scenario>,
    cursor: BatchCursor,
    emoes: BTreeMap<String, EmoeSlot>,
    stop_flag: Arc<AtomicBool>,
    #[allow(dead_code)]
    output_path: Option<PathBuf>,
}

impl BatchRunner {
    /// Connect to the daemon and prepare the schedule.
    pub fn new(
        endpoint: (&str, u16),
        scenarios: Vec<Scenario>,
        numtrials: usize,
        output_path: Option<PathBuf>,
        stop_flag: Arc<AtomicBool>,
    ) -> Result<Self, DriverError> {
        let mut client = EmexdClient::connect(endpoint.0, endpoint.1)?;
        let registry = client.models()?;
        let cursor = BatchCursor::new(scenarios.len(), numtrials);

        Ok(Self {
            client,
            registry,
            scenarios,
            cursor,
            emoes: BTreeMap::new(),
            stop_flag,
            output_path,
        })
    }

    /// The scheduler loop: list, reconcile, submit; exit when all trials
    /// ran and the daemon reports no remaining EMOEs.
    pub fn run(&mut self, interval: Duration) -> Result<(), DriverError> {
        loop {
            if self.stop_flag.load(Ordering::Relaxed) {
                log::info!("interrupted, stopping all emoes");
                self.stop_all()?;
                return Ok(());
            }

            let (total_cpus, available_cpus, entries) = self.client.list_emoes()?;
            log::info!(
                "rx listemoes entries:{} total_cpus:{total_cpus} available_cpus:{available_cpus}",
                entries.len()
            );

            self.process_emoe_list(entries)?;
            self.start_next_emoe(total_cpus, available_cpus)?;

            if self.cursor.done_starting() && self.emoes.is_empty() {
                log::info!("all trials complete");
                return Ok(());
            }

            std::thread::sleep(interval);
        }
    }

    /// Reconcile the list reply with the local slots: spawn the event
    /// pump when an EMOE reaches RUNNING, stop it when its pump is done,
    /// and drop slots the daemon no longer reports.
    fn process_emoe_list(&mut self, entries: Vec<ListEmoesEntry>) -> Result<(), DriverError> {
        let mut reported: Vec<String> = Vec::new();

        for entry in entries {
            reported.push(entry.emoe_name.clone());

            let Some(slot) = self.emoes.get_mut(&entry.emoe_name) else {
                log::error!("no local state for entry {}, Ignoring", entry.emoe_name);
                continue;
            };

            match entry.state {
                EmoeState::Running => {
                    if let Some(worker) = &slot.worker {
                        log::info!(
                            "emoe:{} state:{} eventlog: {}",
                            entry.emoe_name,
                            entry.state,
                            worker.log()
                        );

                        // for a continued RUNNING state, stop the emoe
                        // when the scenario thread ends
                        if worker.finished() && !slot.stopped {
                            log::info!("stopping emoe {}", entry.emoe_name);
                            self.client.stop_emoe(&entry.handle)?;
                            slot.stopped = true;
                        }
                    } else {
                        log::info!("emoe {} transitioned to state RUNNING", entry.emoe_name);

                        let (emoe_endpoint, _) = endpoints(&entry.service_accessors);
                        if let Some(endpoint) = emoe_endpoint {
                            let events =
                                self.scenarios[slot.scenario_index].events().clone();
                            slot.worker = Some(ScenarioWorker::spawn(
                                entry.emoe_name.clone(),
                                endpoint,
                                events,
                                self.stop_flag.clone(),
                            ));
                            log::info!("started {} events thread", entry.emoe_name);
                        } else {
                            log::error!(
                                "emoe {} has no emexcontainerd accessor",
                                entry.emoe_name
                            );
                        }
                    }
                }
                state => {
                    log::info!("emoe:{} state:{state}", entry.emoe_name);
                }
            }

            if let Some(slot) = self.emoes.get_mut(&entry.emoe_name) {
                slot.entry = Some(entry);
            }
        }

        // unreported emoes are complete
        let complete: Vec<String> = self
            .emoes
            .keys()
            .filter(|name| !reported.contains(name))
            .cloned()
            .collect();
        for emoe_name in complete {
            log::info!("\"{emoe_name}\" is complete");
            self.emoes.remove(&emoe_name);
        }

        Ok(())
    }

    /// Submit the next trial when it fits into the available cpus. A
    /// trial that can never fit the daemon's total allocation is skipped
    /// with an error.
    fn start_next_emoe(
        &mut self,
        total_cpus: u32,
        available_cpus: u32,
    ) -> Result<(), DriverError> {
        let emoes = &self.emoes;
        let Some((scenario_index, emoe_name)) = self
            .cursor
            .next_emoe_name(&self.scenarios, &|name| emoes.contains_key(name))
        else {
            return Ok(());
        };

        let scenario = &self.scenarios[scenario_index];
        let emoe = match scenario.build_emoe(&emoe_name, &self.registry) {
            Ok(emoe) => emoe,
            Err(e) => {
                log::error!("cannot build {emoe_name}: {e}, skipping.");
                self.cursor.bump();
                return Ok(());
            }
        };

        if emoe.cpus() > total_cpus {
            log::error!(
                "Cannot support {emoe_name} that requires {} CPUs but only {total_cpus} \
                 total CPUs allocated to the server, skipping.",
                emoe.cpus()
            );
            self.cursor.bump();
            return Ok(());
        }

        if emoe.cpus() > available_cpus {
            // not enough cpus right now
            return Ok(());
        }

        match self
            .client
            .start_emoe(&scenario.emoe_description(&emoe_name))
        {
            Ok(handle) => {
                log::debug!("adding {emoe_name} ({handle}) to the schedule");
                self.emoes.insert(
                    emoe_name,
                    EmoeSlot {
                        scenario_index,
                        entry: None,
                        worker: None,
                        stopped: false,
                    },
                );
                self.cursor.bump();
            }
            Err(e) => {
                log::error!("cannot start {emoe_name}: {e}");
            }
        }

        Ok(())
    }

    /// Stop every EMOE this runner started (interrupt path).
    fn stop_all(&mut self) -> Result<(), DriverError> {
        let handles: Vec<String> = self
            .emoes
            .values()
            .filter_map(|slot| slot.entry.as_ref().map(|e| e.handle.clone()))
            .collect();
        for handle in handles {
            let _ = self.client.stop_emoe(&handle);
        }
        Ok(())
    }
}
