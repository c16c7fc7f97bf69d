// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::PluginError;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::error;

pub const DEFAULT_LAYERS_HOST: &str = "layers.iopipe.com";

/// Plugin configuration, read once from the manifest's `custom.newRelic` block
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PluginConfig {
    /// New Relic account id reported by the layer
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub account_id: Option<String>,
    /// Trusted account key, used when no account id is known
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub trusted_account_key: Option<String>,
    /// Explicit layer ARN; bypasses the lookup service entirely
    pub layer_arn: Option<String>,
    /// Function keys left uninstrumented
    pub exclude: Vec<String>,
    /// Insert the layer first instead of last
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub prepend: bool,
    /// Sets `NEW_RELIC_LOG_LEVEL=debug` and raises plugin logging to debug
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub debug: bool,
    /// Value for `NEW_RELIC_SERVERLESS_MODE_ENABLED`, defaults to true
    #[serde(deserialize_with = "deserialize_optional_bool_from_anything")]
    pub serverless_mode_enabled: Option<bool>,
    /// Host of the layer lookup service, defaults to [`DEFAULT_LAYERS_HOST`]
    pub layers_host: Option<String>,
}

impl PluginConfig {
    pub fn validate(&self) -> Result<(), PluginError> {
        if let Some(layer_arn) = &self.layer_arn {
            if layer_arn.trim().is_empty() {
                return Err(PluginError::InvalidConfig(
                    "layerArn cannot be empty".to_string(),
                ));
            }
        }

        if let Some(host) = &self.layers_host {
            if host.trim().is_empty() {
                return Err(PluginError::InvalidConfig(
                    "layersHost cannot be empty".to_string(),
                ));
            }
        }

        if self.exclude.iter().any(|name| name.trim().is_empty()) {
            return Err(PluginError::InvalidConfig(
                "exclude cannot contain empty function names".to_string(),
            ));
        }

        Ok(())
    }

    pub fn is_excluded(&self, function_key: &str) -> bool {
        self.exclude.iter().any(|name| name == function_key)
    }

    pub fn layers_host(&self) -> &str {
        self.layers_host.as_deref().unwrap_or(DEFAULT_LAYERS_HOST)
    }

    pub fn serverless_mode_enabled(&self) -> bool {
        self.serverless_mode_enabled.unwrap_or(true)
    }
}

pub fn deserialize_string_or_int<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            if s.trim().is_empty() {
                Ok(None)
            } else {
                Ok(Some(s.trim().to_string()))
            }
        }
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => {
            error!("Failed to parse value, expected a string or an integer, got: {other}, ignoring");
            Ok(None)
        }
    }
}

fn bool_from_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" | "" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        _ => None,
    }
}

pub fn deserialize_optional_bool_from_anything<'de, D>(
    deserializer: D,
) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<Value> = Option::deserialize(deserializer)?;

    match opt {
        None | Some(Value::Null) => Ok(None),
        Some(value) => match bool_from_value(&value) {
            Some(b) => Ok(Some(b)),
            None => {
                error!("Failed to parse bool value: {value}, ignoring");
                Ok(None)
            }
        },
    }
}

pub fn deserialize_bool_from_anything<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_optional_bool_from_anything(deserializer)?.unwrap_or(false))
}
