// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Computes the layer, handler, environment and packaging changes that instrument a
//! function with the New Relic Lambda layer.
//!
//! Planning is split in two so the layer lookup can happen in between:
//! [`InstrumentationPlanner::check`] applies the skip policy without touching the
//! definition, and [`InstrumentationPlanner::apply`] mutates it once the layer ARN is known.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::config::PluginConfig;
use crate::manifest::{Environment, FunctionDefinition};
use crate::runtime::Runtime;

pub const ENV_LAMBDA_HANDLER: &str = "NEW_RELIC_LAMBDA_HANDLER";
pub const ENV_LOG: &str = "NEW_RELIC_LOG";
pub const ENV_LOG_LEVEL: &str = "NEW_RELIC_LOG_LEVEL";
pub const ENV_NO_CONFIG_FILE: &str = "NEW_RELIC_NO_CONFIG_FILE";
pub const ENV_APP_NAME: &str = "NEW_RELIC_APP_NAME";
pub const ENV_ACCOUNT_ID: &str = "NEW_RELIC_ACCOUNT_ID";
pub const ENV_TRUSTED_ACCOUNT_KEY: &str = "NEW_RELIC_TRUSTED_ACCOUNT_KEY";
pub const ENV_SERVERLESS_MODE_ENABLED: &str = "NEW_RELIC_SERVERLESS_MODE_ENABLED";

/// Why a function was left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoRegion,
    NoAccountId,
    UnsupportedRuntime(Option<String>),
    Excluded,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoRegion => f.write_str("no AWS region could be resolved"),
            SkipReason::NoAccountId => f.write_str(
                "no New Relic account id: set custom.newRelic.accountId or NEW_RELIC_ACCOUNT_ID",
            ),
            SkipReason::UnsupportedRuntime(Some(runtime)) => {
                write!(f, "unsupported runtime '{runtime}'")
            }
            SkipReason::UnsupportedRuntime(None) => f.write_str("no runtime declared"),
            SkipReason::Excluded => f.write_str("excluded by custom.newRelic.exclude"),
        }
    }
}

/// A function that passed the skip policy and can be instrumented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanTarget {
    pub runtime: Runtime,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    Instrumented,
    Skipped(SkipReason),
}

#[derive(Debug, Clone)]
pub struct InstrumentationPlanner {
    config: Arc<PluginConfig>,
}

impl InstrumentationPlanner {
    pub fn new(config: Arc<PluginConfig>) -> Self {
        Self { config }
    }

    /// Applies the skip policy in order: region, account id, runtime, exclusion.
    pub fn check(
        &self,
        key: &str,
        function: &FunctionDefinition,
        runtime: Option<&str>,
        region: Option<&str>,
    ) -> Result<PlanTarget, SkipReason> {
        let region = region
            .filter(|region| !region.trim().is_empty())
            .ok_or(SkipReason::NoRegion)?;

        if self.config.account_id.is_none() && !function.environment.contains_key(ENV_ACCOUNT_ID)
        {
            return Err(SkipReason::NoAccountId);
        }

        let runtime = runtime
            .ok_or(SkipReason::UnsupportedRuntime(None))?
            .parse::<Runtime>()
            .map_err(|e| SkipReason::UnsupportedRuntime(Some(e.0)))?;

        if self.config.is_excluded(key) {
            return Err(SkipReason::Excluded);
        }

        Ok(PlanTarget {
            runtime,
            region: region.to_string(),
        })
    }

    /// Attaches the layer, wraps the handler and fills in the environment.
    pub fn apply(
        &self,
        key: &str,
        function: &mut FunctionDefinition,
        runtime: Runtime,
        layer_arn: &str,
    ) {
        self.attach_layer(&mut function.layers, layer_arn);

        let family = runtime.family();
        let wrapper = family.wrapper_handler();

        // A wrapped handler no longer names the real one; keep what was recorded.
        let original_handler = std::mem::replace(&mut function.handler, wrapper.to_string());
        if original_handler != wrapper || !function.environment.contains_key(ENV_LAMBDA_HANDLER)
        {
            function
                .environment
                .insert(ENV_LAMBDA_HANDLER.to_string(), original_handler);
        }

        let app_name = function.deployed_name(key).to_string();
        self.fill_environment(&mut function.environment, app_name);

        if let Some(include) = family.package_include() {
            if !function.package.exclude.iter().any(|glob| glob == include) {
                function.package.exclude.push(include.to_string());
            }
        }
    }

    /// Runs [`Self::check`] then [`Self::apply`] with an already resolved layer ARN.
    pub fn plan(
        &self,
        key: &str,
        function: &mut FunctionDefinition,
        runtime: Option<&str>,
        region: Option<&str>,
        layer_arn: &str,
    ) -> PlanOutcome {
        match self.check(key, function, runtime, region) {
            Ok(target) => {
                self.apply(key, function, target.runtime, layer_arn);
                PlanOutcome::Instrumented
            }
            Err(reason) => PlanOutcome::Skipped(reason),
        }
    }

    fn attach_layer(&self, layers: &mut Vec<Value>, layer_arn: &str) {
        let present = layers
            .iter()
            .filter_map(Value::as_str)
            .any(|layer| layer.contains(layer_arn));
        if present {
            return;
        }
        let layer = Value::String(layer_arn.to_string());
        if self.config.prepend {
            layers.insert(0, layer);
        } else {
            layers.push(layer);
        }
    }

    fn fill_environment(&self, environment: &mut Environment, app_name: String) {
        let mut set_default = |key: &str, value: String| environment.set_default(key, value);

        set_default(ENV_LOG, "stdout".to_string());
        set_default(
            ENV_LOG_LEVEL,
            if self.config.debug { "debug" } else { "info" }.to_string(),
        );
        set_default(ENV_NO_CONFIG_FILE, "true".to_string());
        set_default(ENV_APP_NAME, app_name);
        set_default(
            ENV_SERVERLESS_MODE_ENABLED,
            self.config.serverless_mode_enabled().to_string(),
        );
        if let Some(account_id) = &self.config.account_id {
            set_default(ENV_ACCOUNT_ID, account_id.clone());
        }

        let trusted_account_key = environment
            .get(ENV_ACCOUNT_ID)
            .map(str::to_string)
            .or_else(|| self.config.trusted_account_key.clone());
        if let Some(trusted_account_key) = trusted_account_key {
            environment.set_default(ENV_TRUSTED_ACCOUNT_KEY, trusted_account_key);
        }
    }
}
