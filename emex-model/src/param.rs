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

//! Parameter schema and value store: [`ParamValue`], [`ParamType`],
//! [`Param`], [`ParamGroupType`] and [`ParamGroup`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::ModelError;

/// A single configuration value of the narrowest type among float, int,
/// bool and string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// A boolean value (`true`/`false`, case-insensitive on parse).
    Bool(bool),
    /// An integer value.
    Int(i64),
    /// A floating point value. Strings containing a `.` parse as floats.
    Float(f64),
    /// Any other value.
    Str(String),
}

impl ParamValue {
    /// Convert a configuration string to the narrowest matching type:
    /// float if the string contains a `.` and parses, then int, then bool
    /// (`TRUE`/`FALSE` in any case), then string.
    pub fn parse(val: &str) -> Self {
        if val.contains('.') {
            if let Ok(f) = val.parse::<f64>() {
                return ParamValue::Float(f);
            }
        }
        if let Ok(i) = val.parse::<i64>() {
            return ParamValue::Int(i);
        }
        match val.to_uppercase().as_str() {
            "TRUE" => ParamValue::Bool(true),
            "FALSE" => ParamValue::Bool(false),
            _ => ParamValue::Str(val.to_string()),
        }
    }

    /// Interpret the value as an integer if possible.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            ParamValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            ParamValue::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Interpret the value as a float if possible.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(f) => Some(*f),
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Str(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(x: bool) -> Self {
        ParamValue::Bool(x)
    }
}

impl From<i64> for ParamValue {
    fn from(x: i64) -> Self {
        ParamValue::Int(x)
    }
}

impl From<f64> for ParamValue {
    fn from(x: f64) -> Self {
        ParamValue::Float(x)
    }
}

impl From<&str> for ParamValue {
    fn from(x: &str) -> Self {
        ParamValue::parse(x)
    }
}

/// The schema of a single parameter: its name, a description and zero or
/// more default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamType {
    name: String,
    description: String,
    default: Vec<ParamValue>,
}

impl ParamType {
    /// Create a new parameter type. Names must not contain `.` since
    /// parameters are addressed with dotted `group.param` paths.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        default: Vec<ParamValue>,
    ) -> Result<Self, ModelError> {
        let name = name.into();
        if name.contains('.') {
            return Err(ModelError::DottedName(name));
        }
        Ok(Self {
            name,
            description: description.into(),
            default,
        })
    }

    /// The parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parameter description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The default values (may be empty).
    pub fn default(&self) -> &[ParamValue] {
        &self.default
    }
}

/// A parameter type with a concrete value list. An empty value list means
/// the parameter is *unconfigured*.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    name: String,
    value: Vec<ParamValue>,
}

impl Param {
    /// Create a new parameter. Names must not contain `.`.
    pub fn new(name: impl Into<String>, value: Vec<ParamValue>) -> Result<Self, ModelError> {
        let name = name.into();
        if name.contains('.') {
            return Err(ModelError::DottedName(name));
        }
        Ok(Self { name, value })
    }

    /// The parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current value list.
    pub fn value(&self) -> &[ParamValue] {
        &self.value
    }

    /// The first value, if any.
    pub fn first(&self) -> Option<&ParamValue> {
        self.value.first()
    }

    /// A parameter is configured iff its value list is nonempty.
    pub fn configured(&self) -> bool {
        !self.value.is_empty()
    }

    /// Replace the value list.
    pub fn set(&mut self, value: Vec<ParamValue>) {
        self.value = value;
    }
}

/// The schema of a named parameter group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamGroupType {
    group: String,
    paramtypes: BTreeMap<String, ParamType>,
}

impl ParamGroupType {
    /// Create a new parameter group type.
    pub fn new(group: impl Into<String>, paramtypes: Vec<ParamType>) -> Self {
        Self {
            group: group.into(),
            paramtypes: paramtypes
                .into_iter()
                .map(|pt| (pt.name.clone(), pt))
                .collect(),
        }
    }

    /// The group name.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// All parameter types of the group, ordered by name.
    pub fn paramtypes(&self) -> impl Iterator<Item = &ParamType> {
        self.paramtypes.values()
    }

    /// Instantiate a [`ParamGroup`] with every parameter set to its
    /// default value list.
    pub fn default_group(&self) -> ParamGroup {
        ParamGroup {
            group: self.group.clone(),
            params: self
                .paramtypes
                .values()
                .map(|pt| {
                    (
                        pt.name.clone(),
                        Param {
                            name: pt.name.clone(),
                            value: pt.default.clone(),
                        },
                    )
                })
                .collect(),
        }
    }
}

/// A named map from parameter name to [`Param`]. A group is *configured*
/// iff every parameter has a nonempty value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamGroup {
    group: String,
    params: BTreeMap<String, Param>,
}

impl ParamGroup {
    /// Create a new parameter group.
    pub fn new(group: impl Into<String>, params: Vec<Param>) -> Self {
        Self {
            group: group.into(),
            params: params.into_iter().map(|p| (p.name.clone(), p)).collect(),
        }
    }

    /// The group name.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// All parameters of the group, ordered by name.
    pub fn params(&self) -> impl Iterator<Item = &Param> {
        self.params.values()
    }

    /// `true` iff every parameter has a nonempty value.
    pub fn configured(&self) -> bool {
        self.params.values().all(Param::configured)
    }

    /// All `(group, param)` pairs with an empty value.
    pub fn unconfigured(&self) -> Vec<(String, String)> {
        self.params
            .values()
            .filter(|p| !p.configured())
            .map(|p| (self.group.clone(), p.name.clone()))
            .collect()
    }

    /// `true` iff the group holds a parameter with the given name.
    pub fn has_param(&self, p_name: &str) -> bool {
        self.params.contains_key(p_name)
    }

    /// Look up a parameter by name.
    pub fn get_param(&self, p_name: &str) -> Result<&Param, ModelError> {
        self.params
            .get(p_name)
            .ok_or_else(|| ModelError::NoSuchParam(self.group.clone(), p_name.to_string()))
    }

    /// Overwrite the value of a parameter.
    pub fn set_param(&mut self, p_name: &str, value: Vec<ParamValue>) -> Result<(), ModelError> {
        let group = self.group.clone();
        self.params
            .get_mut(p_name)
            .ok_or_else(|| ModelError::NoSuchParam(group, p_name.to_string()))?
            .set(value);
        Ok(())
    }

    /// Insert a parameter, replacing any previous one with the same name.
    pub fn insert_param(&mut self, param: Param) {
        self.params.insert(param.name.clone(), param);
    }
}
