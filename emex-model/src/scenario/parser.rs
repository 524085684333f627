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

//! The declarative scenario file: an `emoe` section describing platforms,
//! antennas and initial conditions, plus a `scenario` mapping from
//! timepoint to event lines.

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use crate::{
    emoe::{AntennaDescription, Emoe, EmoeDescription, PlatformDescription},
    initial::{AntennaPointing, InitialCondition, PathlossEntry, Pov},
    registry::{values_from_yaml, ModelRegistry},
    types::ModelError,
};

use super::events::{
    EventSet, EventTime, FlowOffRequest, FlowOnRequest, FlowPattern, JamOffEvent, JamOnEvent,
    TrafficProtocol,
};

/// A parsed scenario file.
#[derive(Debug, Clone)]
pub struct Scenario {
    name: String,
    description: String,
    platforms: Vec<PlatformDescription>,
    antennas: Vec<AntennaDescription>,
    initial_conditions: Vec<InitialCondition>,
    events: BTreeMap<EventTime, EventSet>,
}

impl Scenario {
    /// Parse a scenario file from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ModelError::ScenarioParse(format!(
                "Cannot read \"{}\": {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_str(&contents)
    }

    /// Parse a scenario file from a string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ModelError> {
        let doc: ScenarioDoc = serde_yaml::from_str(contents)
            .map_err(|e| ModelError::ScenarioParse(format!("Cannot parse scenario: {e}")))?;

        let platform_names: Vec<String> = doc.emoe.platforms.keys().cloned().collect();

        let mut platforms = Vec::new();
        for (name, config) in &doc.emoe.platforms {
            let mut labels: BTreeMap<String, Vec<String>> = BTreeMap::new();
            if let Some(label_str) = &config.labels {
                for tok in label_str.split_whitespace() {
                    let (c_name, label) = tok.trim().split_once('.').ok_or_else(|| {
                        ModelError::ScenarioParse(format!(
                            "Malformed label \"{tok}\" for platform \"{name}\"."
                        ))
                    })?;
                    labels
                        .entry(c_name.to_string())
                        .or_default()
                        .push(label.to_string());
                }
            }

            let mut parameters = BTreeMap::new();
            for (path, value) in config.parameters.clone().unwrap_or_default() {
                if path.splitn(3, '.').count() != 3 {
                    return Err(ModelError::ScenarioParse(format!(
                        "Malformed parameter path \"{path}\" for platform \"{name}\"."
                    )));
                }
                parameters.insert(path, values_from_yaml(Some(value)));
            }

            platforms.push(PlatformDescription {
                name: name.clone(),
                platform_type: config.platform_type.clone(),
                labels,
                parameters,
            });
        }

        let mut antennas = Vec::new();
        for (name, config) in doc.emoe.antennas.unwrap_or_default() {
            antennas.push(AntennaDescription {
                name,
                antenna_type: config.antenna_type,
                parameters: config
                    .parameters
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(p, v)| (p, values_from_yaml(Some(v))))
                    .collect(),
            });
        }

        let initial_conditions = doc
            .emoe
            .initial_conditions
            .map(|ic| parse_initial_conditions(&ic))
            .transpose()?
            .unwrap_or_default();

        let parser = EventLineParser {
            platform_names: &platform_names,
        };

        let mut events: BTreeMap<EventTime, EventSet> = BTreeMap::new();
        for (time, block) in doc.scenario.unwrap_or_default() {
            let time = parse_event_time(&time)?;
            let block = block.as_str().ok_or_else(|| {
                ModelError::ScenarioParse(format!(
                    "Scenario block at time {time} is not a string."
                ))
            })?;
            let set = events.entry(time).or_default();
            for line in block.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                parser.parse_line(line, set)?;
            }
        }

        Ok(Self {
            name: doc.name.clone(),
            description: doc.description.unwrap_or(doc.name),
            platforms,
            antennas,
            initial_conditions,
            events,
        })
    }

    /// The scenario name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The scenario description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The time-ordered event map.
    pub fn events(&self) -> &BTreeMap<EventTime, EventSet> {
        &self.events
    }

    /// The EMOE description with the given instance name filled in.
    pub fn emoe_description(&self, emoe_name: impl Into<String>) -> EmoeDescription {
        EmoeDescription {
            name: emoe_name.into(),
            platforms: self.platforms.clone(),
            antennas: self.antennas.clone(),
            initial_conditions: self.initial_conditions.clone(),
        }
    }

    /// Build and validate the EMOE against the model registries.
    pub fn build_emoe(
        &self,
        emoe_name: impl Into<String>,
        registry: &ModelRegistry,
    ) -> Result<Emoe, ModelError> {
        Emoe::from_description(&self.emoe_description(emoe_name), registry)
    }
}

#[derive(Debug, Deserialize)]
struct ScenarioDoc {
    name: String,
    description: Option<String>,
    emoe: EmoeSectionDoc,
    scenario: Option<serde_yaml::Mapping>,
}

#[derive(Debug, Deserialize)]
struct EmoeSectionDoc {
    platforms: BTreeMap<String, PlatformConfigDoc>,
    antennas: Option<BTreeMap<String, AntennaConfigDoc>>,
    initial_conditions: Option<InitialConditionsDoc>,
}

#[derive(Debug, Deserialize)]
struct PlatformConfigDoc {
    #[serde(rename = "type")]
    platform_type: String,
    labels: Option<String>,
    parameters: Option<BTreeMap<String, serde_yaml::Value>>,
}

#[derive(Debug, Deserialize)]
struct AntennaConfigDoc {
    #[serde(rename = "type")]
    antenna_type: String,
    parameters: Option<BTreeMap<String, serde_yaml::Value>>,
}

#[derive(Debug, Deserialize)]
struct InitialConditionsDoc {
    pov: Option<String>,
    pathloss: Option<String>,
    antenna_pointing: Option<String>,
}

fn parse_event_time(value: &serde_yaml::Value) -> Result<EventTime, ModelError> {
    match value {
        serde_yaml::Value::Number(n) => Ok(EventTime(n.as_f64().unwrap_or(0.0))),
        serde_yaml::Value::String(s) => match s.trim().to_lowercase().as_str() {
            "-inf" | "-.inf" => Ok(EventTime::INITIAL),
            t => t
                .parse::<f64>()
                .map(EventTime)
                .map_err(|_| ModelError::ScenarioParse(format!("Malformed event time \"{s}\"."))),
        },
        other => Err(ModelError::ScenarioParse(format!(
            "Malformed event time \"{other:?}\"."
        ))),
    }
}

/// Split a `PLATFORM[.COMPONENT]` token.
fn parse_platform_components(tok: &str) -> (String, Vec<String>) {
    match tok.split_once('.') {
        Some((plt, cmp)) => (plt.to_string(), vec![cmp.to_string()]),
        None => (tok.to_string(), vec![]),
    }
}

fn parse_initial_conditions(
    doc: &InitialConditionsDoc,
) -> Result<Vec<InitialCondition>, ModelError> {
    let mut povs: BTreeMap<String, Pov> = BTreeMap::new();
    for line in nonempty_lines(doc.pov.as_deref()) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let (plt_name, pov) = parse_pov_tokens(&tokens)?;
        if povs.insert(plt_name.clone(), pov).is_some() {
            log::warn!("found duplicate pov values for platform {plt_name}");
        }
    }

    let mut pathlosses: BTreeMap<String, Vec<PathlossEntry>> = BTreeMap::new();
    for line in nonempty_lines(doc.pathloss.as_deref()) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let (plt_name, entries) = parse_pathloss_tokens(&tokens)?;
        pathlosses.insert(plt_name, entries);
    }

    let mut pointings: BTreeMap<String, Vec<AntennaPointing>> = BTreeMap::new();
    for line in nonempty_lines(doc.antenna_pointing.as_deref()) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let (plt_name, pointing) = parse_antenna_pointing_tokens(&tokens)?;
        pointings.entry(plt_name).or_default().push(pointing);
    }

    let mut all_names: Vec<String> = povs
        .keys()
        .chain(pathlosses.keys())
        .chain(pointings.keys())
        .cloned()
        .collect();
    all_names.sort();
    all_names.dedup();

    Ok(all_names
        .into_iter()
        .map(|plt_name| {
            InitialCondition::new(
                plt_name.clone(),
                povs.remove(&plt_name),
                pathlosses.remove(&plt_name).unwrap_or_default(),
                pointings.remove(&plt_name).unwrap_or_default(),
            )
        })
        .collect())
}

fn nonempty_lines(block: Option<&str>) -> impl Iterator<Item = &str> {
    block
        .unwrap_or_default()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
}

fn parse_pov_tokens(tokens: &[&str]) -> Result<(String, Pov), ModelError> {
    let (plt_name, cmp_names) = parse_platform_components(tokens.first().ok_or_else(|| {
        ModelError::ScenarioParse("pov event is missing a platform name".to_string())
    })?);

    let vals = &tokens[1..];
    if vals.len() < 3 {
        return Err(ModelError::ScenarioParse(format!(
            "pov field for platform {plt_name} has too few fields"
        )));
    }
    if vals.len() > 9 {
        return Err(ModelError::ScenarioParse(format!(
            "pov field for platform {plt_name} has too many fields"
        )));
    }

    let mut fields = [0.0f64; 9];
    for (i, val) in vals.iter().enumerate() {
        fields[i] = val.parse().map_err(|_| {
            ModelError::ScenarioParse(format!(
                "Malformed pov value \"{val}\" for platform {plt_name}"
            ))
        })?;
    }

    Ok((
        plt_name,
        Pov {
            component_names: cmp_names,
            latitude: fields[0],
            longitude: fields[1],
            altitude: fields[2],
            azimuth: fields[3],
            elevation: fields[4],
            speed: fields[5],
            pitch: fields[6],
            roll: fields[7],
            yaw: fields[8],
        },
    ))
}

fn parse_pathloss_tokens(
    tokens: &[&str],
) -> Result<(String, Vec<PathlossEntry>), ModelError> {
    let (plt_name, cmp_names) = parse_platform_components(tokens.first().ok_or_else(|| {
        ModelError::ScenarioParse("pathloss event is missing a platform name".to_string())
    })?);

    let mut entries = Vec::new();
    for tok in &tokens[1..] {
        let (rmt, db) = tok.split_once(':').ok_or_else(|| {
            ModelError::ScenarioParse(format!(
                "Malformed pathloss entry \"{tok}\" for platform {plt_name}"
            ))
        })?;
        let (rmt_plt, rmt_cmps) = parse_platform_components(rmt);
        entries.push(PathlossEntry {
            remote_platform: rmt_plt,
            pathloss_db: db.parse().map_err(|_| {
                ModelError::ScenarioParse(format!(
                    "Malformed pathloss value \"{db}\" for platform {plt_name}"
                ))
            })?,
            component_names: cmp_names.clone(),
            remote_component_names: rmt_cmps,
        });
    }

    Ok((plt_name, entries))
}

fn parse_antenna_pointing_tokens(
    tokens: &[&str],
) -> Result<(String, AntennaPointing), ModelError> {
    let (plt_name, cmp_names) = parse_platform_components(tokens.first().ok_or_else(|| {
        ModelError::ScenarioParse("antenna_pointing event is missing a platform name".to_string())
    })?);

    if tokens.len() != 3 {
        return Err(ModelError::ScenarioParse(format!(
            "antenna_pointing event for platform {plt_name} has the wrong number of fields"
        )));
    }

    let az = tokens[1].parse().map_err(|_| {
        ModelError::ScenarioParse(format!("Malformed azimuth \"{}\"", tokens[1]))
    })?;
    let el = tokens[2].parse().map_err(|_| {
        ModelError::ScenarioParse(format!("Malformed elevation \"{}\"", tokens[2]))
    })?;

    Ok((
        plt_name,
        AntennaPointing {
            component_names: cmp_names,
            azimuth: az,
            elevation: el,
        },
    ))
}

struct EventLineParser<'a> {
    platform_names: &'a [String],
}

impl EventLineParser<'_> {
    fn parse_line(&self, line: &str, set: &mut EventSet) -> Result<(), ModelError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let (kind, rest) = tokens.split_first().expect("line is nonempty");

        match *kind {
            "flow_on" => set.flow_on.push(self.parse_flow_on(rest)?),
            "flow_off" => set.flow_off.push(self.parse_flow_off(rest)?),
            "pov" => {
                let (plt, pov) = parse_pov_tokens(rest)?;
                set.povs.entry(plt).or_default().push(pov);
            }
            "pathloss" => {
                let (plt, entries) = parse_pathloss_tokens(rest)?;
                set.pathlosses.entry(plt).or_default().extend(entries);
            }
            "antenna_pointing" => {
                let (plt, pointing) = parse_antenna_pointing_tokens(rest)?;
                set.antenna_pointings.entry(plt).or_default().push(pointing);
            }
            "jam_on" => set.jam_on.push(self.parse_jam_on(rest)?),
            "jam_off" => {
                let (plt, cmps) = parse_platform_components(rest.first().ok_or_else(|| {
                    ModelError::ScenarioParse("jam_off is missing a platform name".to_string())
                })?);
                set.jam_off.push(JamOffEvent {
                    platform_name: plt,
                    component_names: cmps,
                });
            }
            "end" => set.end = true,
            other => {
                return Err(ModelError::ScenarioParse(format!(
                    "unknown event kind \"{other}\""
                )))
            }
        }

        Ok(())
    }

    /// Expand a platform regex against the declared platform names. A
    /// regex that matches nothing is fatal.
    fn expand_regex(&self, regx: &str, role: &str) -> Result<Vec<String>, ModelError> {
        let re = Regex::new(regx).map_err(|e| {
            ModelError::ScenarioParse(format!("Malformed {role} regex \"{regx}\": {e}"))
        })?;
        let matches: Vec<String> = self
            .platform_names
            .iter()
            .filter(|name| re.is_match(name))
            .cloned()
            .collect();
        if matches.is_empty() {
            return Err(ModelError::ScenarioParse(format!(
                "Flow {role} {regx} does not match any platform name, quitting."
            )));
        }
        Ok(matches)
    }

    fn parse_flow_on(&self, tokens: &[&str]) -> Result<FlowOnRequest, ModelError> {
        let mut flow_name = String::new();
        let mut source_regx = ".*".to_string();
        let mut destination_regx = ".*".to_string();
        let mut protocol = TrafficProtocol::Udp;
        let mut tos = 0u8;
        let mut ttl = 1u8;

        let mut rest = tokens;
        while let Some((tok, tail)) = rest.split_first() {
            let Some((tname, tval)) = tok.split_once('=') else {
                break;
            };
            match tname.to_lowercase().as_str() {
                "name" => flow_name = tval.to_string(),
                "source" => source_regx = tval.to_string(),
                "destination" => destination_regx = tval.to_string(),
                "proto" => {
                    protocol = match tval.to_lowercase().as_str() {
                        "udp" => TrafficProtocol::Udp,
                        "tcp" => TrafficProtocol::Tcp,
                        "multicast" => TrafficProtocol::Multicast,
                        other => {
                            return Err(ModelError::ScenarioParse(format!(
                                "unknown flow_on protocol \"{other}\""
                            )))
                        }
                    }
                }
                "tos" => {
                    tos = tval.parse().map_err(|_| {
                        ModelError::ScenarioParse(format!("Malformed tos \"{tval}\""))
                    })?
                }
                "ttl" => {
                    ttl = tval.parse().map_err(|_| {
                        ModelError::ScenarioParse(format!("Malformed ttl \"{tval}\""))
                    })?
                }
                other => {
                    return Err(ModelError::ScenarioParse(format!(
                        "unknown flow_on specifier \"{other}\""
                    )))
                }
            }
            rest = tail;
        }

        let mut positional = rest.iter();

        let pattern = match positional.next() {
            Some(&"periodic") => FlowPattern::Periodic,
            Some(&"poisson") => FlowPattern::Poisson,
            Some(&"jitter") => FlowPattern::Jitter,
            other => {
                return Err(ModelError::ScenarioParse(format!(
                    "unknown flow_on flow type \"{}\"",
                    other.copied().unwrap_or_default()
                )))
            }
        };

        let packet_rate: f64 = positional
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| {
                ModelError::ScenarioParse("flow_on is missing a packet rate".to_string())
            })?;
        let size_bytes: u32 = positional
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| {
                ModelError::ScenarioParse("flow_on is missing a packet size".to_string())
            })?;
        let jitter_fraction: f64 = positional
            .next()
            .and_then(|t| t.parse().ok())
            .unwrap_or(0.0);

        Ok(FlowOnRequest {
            flow_name,
            sources: self.expand_regex(&source_regx, "source")?,
            destinations: self.expand_regex(&destination_regx, "destination")?,
            protocol,
            tos,
            ttl,
            pattern,
            size_bytes,
            packet_rate,
            jitter_fraction,
        })
    }

    fn parse_flow_off(&self, tokens: &[&str]) -> Result<FlowOffRequest, ModelError> {
        let mut flow_name = String::new();
        let mut flow_ids = Vec::new();
        let mut source_regx = ".*".to_string();
        let mut destination_regx = ".*".to_string();

        for tok in tokens {
            let Some((tname, tval)) = tok.split_once('=') else {
                return Err(ModelError::ScenarioParse(format!(
                    "unknown flow_off specifier \"{tok}\""
                )));
            };
            match tname.to_lowercase().as_str() {
                "name" => flow_name = tval.to_string(),
                "flow_id" => flow_ids.push(tval.parse().map_err(|_| {
                    ModelError::ScenarioParse(format!("Malformed flow_id \"{tval}\""))
                })?),
                "source" => source_regx = tval.to_string(),
                "destination" => destination_regx = tval.to_string(),
                other => {
                    return Err(ModelError::ScenarioParse(format!(
                        "unknown flow_off specifier \"{other}\""
                    )))
                }
            }
        }

        Ok(FlowOffRequest {
            flow_name,
            flow_ids,
            sources: self.expand_regex(&source_regx, "source")?,
            destinations: self.expand_regex(&destination_regx, "destination")?,
        })
    }

    fn parse_jam_on(&self, tokens: &[&str]) -> Result<JamOnEvent, ModelError> {
        let (plt_name, cmp_names) = parse_platform_components(tokens.first().ok_or_else(
            || ModelError::ScenarioParse("jam_on is missing a platform name".to_string()),
        )?);

        let rest = &tokens[1..];
        if rest.len() != 5 {
            return Err(ModelError::ScenarioParse(format!(
                "jam_on event for platform {plt_name} has the wrong number of fields"
            )));
        }

        let parse_num = |tok: &str| -> Result<u64, ModelError> {
            tok.parse().map_err(|_| {
                ModelError::ScenarioParse(format!("Malformed jam_on value \"{tok}\""))
            })
        };

        Ok(JamOnEvent {
            platform_name: plt_name.clone(),
            component_names: cmp_names,
            txpower: rest[0].parse().map_err(|_| {
                ModelError::ScenarioParse(format!("Malformed txpower \"{}\"", rest[0]))
            })?,
            bandwidth: parse_num(rest[1])?,
            period: parse_num(rest[2])?,
            duty_cycle: parse_num(rest[3])?,
            frequencies: rest[4]
                .split(',')
                .map(parse_num)
                .collect::<Result<_, _>>()?,
        })
    }
}
