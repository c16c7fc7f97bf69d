// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Deployment manifest model.
//!
//! Only the fields the plugin reads or rewrites are typed. Everything else is carried
//! through `#[serde(flatten)]` maps so that writing the manifest back preserves it.

use std::collections::BTreeMap;
use std::ops::Index;
use std::path::Path;

use figment::{
    providers::{Format, Json, Yaml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::config::PluginConfig;
use crate::error::PluginError;

/// Key of the plugin block under `custom`.
pub const CONFIG_KEY: &str = "newRelic";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins: Option<Value>,
    #[serde(default)]
    pub functions: BTreeMap<String, FunctionDefinition>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub custom: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Runtime inherited by functions that do not declare one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Declared (deployed) function name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub handler: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(default, skip_serializing_if = "Environment::is_empty")]
    pub environment: Environment,
    /// Layer references. Only plain ARN strings are compared; references such as
    /// `{Ref: MyLayer}` are kept as they are.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<Value>,
    #[serde(default, skip_serializing_if = "Package::is_empty")]
    pub package: Package,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Package {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Package {
    pub fn is_empty(&self) -> bool {
        self.exclude.is_empty() && self.extra.is_empty()
    }
}

impl FunctionDefinition {
    /// Name the function is deployed under: the declared name, else its key.
    pub fn deployed_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(key)
    }
}

pub fn log_group_name(function_name: &str) -> String {
    format!("/aws/lambda/{function_name}")
}

impl Manifest {
    /// Loads a manifest from a YAML or JSON file, picked by extension.
    pub fn load(path: &Path) -> Result<Self, PluginError> {
        if !path.is_file() {
            return Err(PluginError::Manifest(format!(
                "{} does not exist",
                path.display()
            )));
        }

        let figment = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Figment::new().merge(Json::file(path)),
            _ => Figment::new().merge(Yaml::file(path)),
        };

        figment
            .extract()
            .map_err(|e| PluginError::Manifest(format!("{}: {e}", path.display())))
    }

    /// Writes the manifest back as pretty JSON for the packaging stage.
    pub fn write_json(&self, path: &Path) -> Result<(), PluginError> {
        let body = serde_json::to_string_pretty(self)
            .map_err(|e| PluginError::Manifest(format!("failed to serialize manifest: {e}")))?;
        std::fs::write(path, body)
            .map_err(|e| PluginError::Manifest(format!("{}: {e}", path.display())))
    }

    /// Reads and validates the `custom.newRelic` block. A missing block yields defaults.
    pub fn plugin_config(&self) -> Result<PluginConfig, PluginError> {
        let config = match self.custom.get(CONFIG_KEY) {
            None | Some(Value::Null) => PluginConfig::default(),
            Some(block) => serde_json::from_value(block.clone())
                .map_err(|e| PluginError::InvalidConfig(format!("custom.{CONFIG_KEY}: {e}")))?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Declared plugin names, from either the list form or the `modules` form.
    pub fn plugin_names(&self) -> Vec<&str> {
        let list = match &self.plugins {
            Some(Value::Array(list)) => list,
            Some(Value::Object(block)) => match block.get("modules") {
                Some(Value::Array(list)) => list,
                _ => return Vec::new(),
            },
            _ => return Vec::new(),
        };
        list.iter().filter_map(Value::as_str).collect()
    }

    /// Runtime of a function, falling back to the provider default.
    pub fn runtime_of<'a>(&'a self, function: &'a FunctionDefinition) -> Option<&'a str> {
        function
            .runtime
            .as_deref()
            .or(self.provider.runtime.as_deref())
    }
}

/// Function environment.
///
/// Scalar values are read as strings. Anything else (`{Ref: OrdersTable}`,
/// `{"Fn::GetAtt": [...]}`) is resolved by the deployment framework later, so it is kept
/// verbatim and still counts as a set variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
    unresolved: BTreeMap<String, Value>,
}

impl Environment {
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty() && self.unresolved.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.vars.contains_key(key) || self.unresolved.contains_key(key)
    }

    /// String value of a variable. `None` for unset and unresolved variables.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: String, value: String) {
        self.unresolved.remove(&key);
        self.vars.insert(key, value);
    }

    /// Sets a variable unless it already has a value of any kind.
    pub fn set_default(&mut self, key: &str, value: String) {
        if !self.contains_key(key) {
            self.vars.insert(key.to_string(), value);
        }
    }
}

impl Index<&str> for Environment {
    type Output = String;

    fn index(&self, key: &str) -> &String {
        &self.vars[key]
    }
}

impl Serialize for Environment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut merged: BTreeMap<&str, Value> = self
            .unresolved
            .iter()
            .map(|(key, value)| (key.as_str(), value.clone()))
            .collect();
        merged.extend(
            self.vars
                .iter()
                .map(|(key, value)| (key.as_str(), Value::String(value.clone()))),
        );
        merged.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Environment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
        let mut environment = Environment::default();
        for (key, value) in raw {
            let scalar = match &value {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            };
            match scalar {
                Some(scalar) => {
                    environment.vars.insert(key, scalar);
                }
                None => {
                    environment.unresolved.insert(key, value);
                }
            }
        }
        Ok(environment)
    }
}
