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

//! Template registries loaded from a directory tree of declarative YAML
//! files.
//!
//! Every `.yml`/`.yaml` file below the model path declares one resource
//! with a `type` discriminator: `antenna`, `waveform`, `host`,
//! `platform_template` or `platform`. Platform declarations compose a
//! platform template with concrete component typings pulled from the
//! waveform/host registry; loading fails if a platform references an
//! unknown component.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{
    antenna::AntennaType,
    param::{ParamGroupType, ParamType, ParamValue},
    platform::{ComponentType, PlatformTemplate, PlatformType, TemplateComponent},
    types::{EmexKind, ModelError},
};

/// Environment variable overriding the model template search path.
pub const MODEL_PATH_ENV: &str = "EMEX_MODEL_PATH";

/// The four registries of installed resource templates.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    antennatypes: BTreeMap<String, AntennaType>,
    waveformtypes: BTreeMap<String, WaveformType>,
    platformtemplates: BTreeMap<String, PlatformTemplate>,
    platformtypes: BTreeMap<String, PlatformType>,
}

/// The typing of one waveform or host component family, as declared by a
/// `waveform` or `host` template file.
#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
pub struct WaveformType {
    /// The typing name, e.g. `rfpipe` or `lte.enb`.
    pub name: String,
    /// The component family.
    pub kind: EmexKind,
    /// The configuration template directory name.
    pub template: String,
    /// The typing description.
    pub description: String,
    /// The parameter group schema.
    pub groups: BTreeMap<String, ParamGroupType>,
}

impl ModelRegistry {
    /// Load all template files below `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(ModelError::TemplateLoad(format!(
                "Platforms path \"{}\" does not exist or is not a directory. Quitting.",
                path.display()
            )));
        }

        let mut files = Vec::new();
        collect_yml_files(path, &mut files)?;

        let mut antenna_docs = Vec::new();
        let mut waveform_docs = Vec::new();
        let mut template_docs = Vec::new();
        let mut platform_docs = Vec::new();

        for file in files {
            let contents = std::fs::read_to_string(&file).map_err(|e| {
                ModelError::TemplateLoad(format!("Cannot read \"{}\": {e}", file.display()))
            })?;
            let doc: TemplateDoc = serde_yaml::from_str(&contents).map_err(|e| {
                ModelError::TemplateLoad(format!("Cannot parse \"{}\": {e}", file.display()))
            })?;

            log::debug!("loading template file {}", file.display());

            match doc {
                TemplateDoc::Antenna(d) => antenna_docs.push(d),
                TemplateDoc::Waveform(d) => waveform_docs.push((EmexKind::Waveform, d)),
                TemplateDoc::Host(d) => waveform_docs.push((EmexKind::Host, d)),
                TemplateDoc::PlatformTemplate(d) => template_docs.push(d),
                TemplateDoc::Platform(d) => platform_docs.push(d),
            }
        }

        let mut registry = ModelRegistry::default();

        for doc in antenna_docs {
            let paramtypes = paramtypes_from_docs(doc.parameters)?;
            registry.antennatypes.insert(
                doc.name.clone(),
                AntennaType::new(doc.name, doc.description.unwrap_or_default(), paramtypes),
            );
        }

        for (kind, doc) in waveform_docs {
            let mut groups = BTreeMap::new();
            for (group, params) in doc.parameters.unwrap_or_default() {
                let paramtypes = paramtypes_from_docs(Some(params))?;
                groups.insert(group.clone(), ParamGroupType::new(group, paramtypes));
            }
            registry.waveformtypes.insert(
                doc.name.clone(),
                WaveformType {
                    description: doc.description.unwrap_or_else(|| doc.name.clone()),
                    name: doc.name,
                    kind,
                    template: doc.template,
                    groups,
                },
            );
        }

        for doc in template_docs {
            let components = doc
                .components
                .into_iter()
                .map(|(name, c)| TemplateComponent {
                    name,
                    kind: c.kind,
                    traffic_endpoint: c.traffic_endpoint,
                    testpoint_publisher: c.testpoint_publisher,
                })
                .collect();
            registry.platformtemplates.insert(
                doc.name.clone(),
                PlatformTemplate::new(doc.name, doc.description.unwrap_or_default(), components),
            );
        }

        for doc in platform_docs {
            let platformtype = registry.compose_platformtype(doc)?;
            registry
                .platformtypes
                .insert(platformtype.name().to_string(), platformtype);
        }

        log::info!(
            "loaded {} antenna types, {} component typings, {} platform templates, \
             {} platform types",
            registry.antennatypes.len(),
            registry.waveformtypes.len(),
            registry.platformtemplates.len(),
            registry.platformtypes.len()
        );

        Ok(registry)
    }

    /// Load from the `EMEX_MODEL_PATH` environment variable.
    pub fn load_from_env() -> Result<Self, ModelError> {
        let path = std::env::var(MODEL_PATH_ENV).map_err(|_| {
            ModelError::TemplateLoad(format!(
                "Environment variable \"{MODEL_PATH_ENV}\" is not defined."
            ))
        })?;
        Self::load(path)
    }

    /// Assemble a registry from platform and antenna types received over
    /// the wire (the client side of a `ModelTypesReply`).
    pub fn from_parts(platformtypes: Vec<PlatformType>, antennatypes: Vec<AntennaType>) -> Self {
        Self {
            antennatypes: antennatypes
                .into_iter()
                .map(|a| (a.name().to_string(), a))
                .collect(),
            waveformtypes: BTreeMap::new(),
            platformtemplates: BTreeMap::new(),
            platformtypes: platformtypes
                .into_iter()
                .map(|p| (p.name().to_string(), p))
                .collect(),
        }
    }

    fn compose_platformtype(&self, doc: PlatformDoc) -> Result<PlatformType, ModelError> {
        let template_name = doc.from.get("template").cloned().ok_or_else(|| {
            ModelError::TemplateLoad(format!(
                "Platform \"{}\" does not name a template.",
                doc.name
            ))
        })?;

        let template = self.platformtemplates.get(&template_name).ok_or_else(|| {
            ModelError::TemplateLoad(format!(
                "Platform \"{}\" references unknown template \"{template_name}\".",
                doc.name
            ))
        })?;

        let mut components = Vec::new();

        for slot in template.components() {
            let typing_name = doc.from.get(&slot.name).ok_or_else(|| {
                ModelError::MissingTemplateComponent(
                    template_name.clone(),
                    slot.name.clone(),
                    doc.name.clone(),
                )
            })?;

            let typing = self.waveformtypes.get(typing_name).ok_or_else(|| {
                ModelError::UnknownComponentTyping(doc.name.clone(), typing_name.clone())
            })?;

            components.push(ComponentType {
                name: slot.name.clone(),
                kind: typing.kind,
                value: typing.name.clone(),
                template: typing.template.clone(),
                traffic_endpoint: slot.traffic_endpoint,
                testpoint_publisher: slot.testpoint_publisher,
                groups: typing.groups.clone(),
            });
        }

        Ok(PlatformType::new(
            doc.name.clone(),
            doc.description.unwrap_or(doc.name),
            template_name,
            components,
        ))
    }

    /// Look up an antenna type.
    pub fn antennatype(&self, name: &str) -> Option<&AntennaType> {
        self.antennatypes.get(name)
    }

    /// All antenna types, ordered by name.
    pub fn antennatypes(&self) -> impl Iterator<Item = &AntennaType> {
        self.antennatypes.values()
    }

    /// Look up a component typing.
    pub fn waveformtype(&self, name: &str) -> Option<&WaveformType> {
        self.waveformtypes.get(name)
    }

    /// Look up a platform template.
    pub fn platformtemplate(&self, name: &str) -> Option<&PlatformTemplate> {
        self.platformtemplates.get(name)
    }

    /// Look up a platform type.
    pub fn platformtype(&self, name: &str) -> Option<&PlatformType> {
        self.platformtypes.get(name)
    }

    /// All platform types, ordered by name.
    pub fn platformtypes(&self) -> impl Iterator<Item = &PlatformType> {
        self.platformtypes.values()
    }
}

fn collect_yml_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), ModelError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        ModelError::TemplateLoad(format!("Cannot read \"{}\": {e}", dir.display()))
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| {
            ModelError::TemplateLoad(format!("Cannot read \"{}\": {e}", dir.display()))
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_yml_files(&path, files)?;
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yml") | Some("yaml")
        ) {
            files.push(path);
        }
    }

    files.sort();
    Ok(())
}

fn paramtypes_from_docs(
    docs: Option<BTreeMap<String, ParamTypeDoc>>,
) -> Result<Vec<ParamType>, ModelError> {
    docs.unwrap_or_default()
        .into_iter()
        .map(|(name, doc)| {
            ParamType::new(
                name,
                doc.description.unwrap_or_default(),
                values_from_yaml(doc.default),
            )
        })
        .collect()
}

/// Convert a YAML scalar or list into a parameter value list with the
/// narrowest-type conversion applied to every entry.
pub fn values_from_yaml(value: Option<serde_yaml::Value>) -> Vec<ParamValue> {
    match value {
        None | Some(serde_yaml::Value::Null) => vec![],
        Some(serde_yaml::Value::Sequence(seq)) => seq
            .into_iter()
            .map(|v| yaml_scalar_to_value(&v))
            .collect(),
        Some(v) => vec![yaml_scalar_to_value(&v)],
    }
}

fn yaml_scalar_to_value(value: &serde_yaml::Value) -> ParamValue {
    match value {
        serde_yaml::Value::Bool(b) => ParamValue::Bool(*b),
        serde_yaml::Value::Number(n) if n.is_i64() => ParamValue::Int(n.as_i64().unwrap_or(0)),
        serde_yaml::Value::Number(n) => ParamValue::Float(n.as_f64().unwrap_or(0.0)),
        serde_yaml::Value::String(s) => ParamValue::parse(s),
        other => ParamValue::Str(format!("{other:?}")),
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TemplateDoc {
    Antenna(AntennaTypeDoc),
    Waveform(WaveformTypeDoc),
    Host(WaveformTypeDoc),
    PlatformTemplate(PlatformTemplateDoc),
    Platform(PlatformDoc),
}

#[derive(Debug, Deserialize)]
struct AntennaTypeDoc {
    name: String,
    description: Option<String>,
    parameters: Option<BTreeMap<String, ParamTypeDoc>>,
}

#[derive(Debug, Deserialize)]
struct ParamTypeDoc {
    description: Option<String>,
    default: Option<serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
struct WaveformTypeDoc {
    name: String,
    template: String,
    description: Option<String>,
    parameters: Option<BTreeMap<String, BTreeMap<String, ParamTypeDoc>>>,
}

#[derive(Debug, Deserialize)]
struct PlatformTemplateDoc {
    name: String,
    description: Option<String>,
    components: BTreeMap<String, TemplateComponentDoc>,
}

#[derive(Debug, Deserialize)]
struct TemplateComponentDoc {
    #[serde(rename = "type")]
    kind: EmexKind,
    #[serde(default)]
    traffic_endpoint: bool,
    #[serde(default)]
    testpoint_publisher: bool,
}

#[derive(Debug, Deserialize)]
struct PlatformDoc {
    name: String,
    description: Option<String>,
    from: BTreeMap<String, String>,
}
