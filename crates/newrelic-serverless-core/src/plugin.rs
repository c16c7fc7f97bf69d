// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Runs the planner and the log filter reconciler over every function of a manifest.
//!
//! Functions are independent: each one gets its own task and its failure is recorded in
//! the [`RunReport`] without affecting the others.

use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::PluginConfig;
use crate::error::PluginError;
use crate::layer::LayerResolver;
use crate::log_filter::{FilterAction, LogFilterReconciler};
use crate::manifest::Manifest;
use crate::planner::InstrumentationPlanner;
use crate::provider::CloudProvider;

pub const PLUGIN_NAME: &str = "serverless-newrelic-lambda-layers";
/// Bundler that has to run before this plugin.
pub const BUNDLER_PLUGIN_NAME: &str = "serverless-webpack";

/// Per-function results of one lifecycle phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub succeeded: Vec<(String, String)>,
    pub skipped: Vec<(String, String)>,
    pub failed: Vec<(String, String)>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn sort(&mut self) {
        self.succeeded.sort();
        self.skipped.sort();
        self.failed.sort();
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (function, detail) in &self.succeeded {
            writeln!(f, "ok      {function}: {detail}")?;
        }
        for (function, reason) in &self.skipped {
            writeln!(f, "skipped {function}: {reason}")?;
        }
        for (function, reason) in &self.failed {
            writeln!(f, "failed  {function}: {reason}")?;
        }
        write!(
            f,
            "{} succeeded, {} skipped, {} failed",
            self.succeeded.len(),
            self.skipped.len(),
            self.failed.len()
        )
    }
}

/// Packaging phase driver: plans every function and resolves the layers it needs.
pub struct Packager {
    planner: InstrumentationPlanner,
    layers: Arc<LayerResolver>,
}

impl Packager {
    pub fn new(config: Arc<PluginConfig>, layers: LayerResolver) -> Self {
        Self {
            planner: InstrumentationPlanner::new(config),
            layers: Arc::new(layers),
        }
    }

    /// Warns when the bundler is declared after this plugin. Processing continues either way.
    pub fn check_plugin_order(manifest: &Manifest) -> bool {
        let plugins = manifest.plugin_names();
        let position = |name: &str| plugins.iter().position(|plugin| *plugin == name);
        match (position(BUNDLER_PLUGIN_NAME), position(PLUGIN_NAME)) {
            (Some(bundler), Some(this)) if bundler > this => {
                warn!(
                    "{PLUGIN_NAME} should be listed after {BUNDLER_PLUGIN_NAME} in plugins, \
                     the wrapper may be missing from bundled artifacts"
                );
                false
            }
            _ => true,
        }
    }

    /// Packaging phase: instruments every function of `manifest` in place.
    pub async fn instrument(&self, manifest: &mut Manifest) -> RunReport {
        let mut report = RunReport::default();
        let region = manifest.provider.region.as_deref();

        let mut lookups = Vec::new();
        for (key, function) in &manifest.functions {
            match self
                .planner
                .check(key, function, manifest.runtime_of(function), region)
            {
                Ok(target) => {
                    let layers = Arc::clone(&self.layers);
                    let handle = tokio::spawn(async move {
                        let layer_arn = layers.resolve(target.runtime, &target.region).await?;
                        Ok::<_, PluginError>((target.runtime, layer_arn))
                    });
                    lookups.push((key.clone(), handle));
                }
                Err(reason) => {
                    info!("Skipping {key}: {reason}");
                    report.skipped.push((key.clone(), reason.to_string()));
                }
            }
        }

        for (key, result) in join_all(lookups).await {
            let (runtime, layer_arn) = match result {
                Ok(resolved) => resolved,
                Err(e) => {
                    report.failed.push((key, e.to_string()));
                    continue;
                }
            };
            if let Some(function) = manifest.functions.get_mut(&key) {
                self.planner.apply(&key, function, runtime, &layer_arn);
                info!("Instrumented {key} ({runtime}) with {layer_arn}");
                report.succeeded.push((key, layer_arn));
            }
        }

        report.sort();
        report
    }
}

/// Deploy and removal phase driver for the log subscription filters.
pub struct LogSubscriptions {
    reconciler: LogFilterReconciler,
}

impl LogSubscriptions {
    pub fn new(provider: Arc<dyn CloudProvider>) -> Self {
        Self {
            reconciler: LogFilterReconciler::new(provider),
        }
    }

    /// Post-deploy phase: converges every function's log subscription filter.
    pub async fn add(&self, manifest: &Manifest) -> RunReport {
        let tasks = manifest
            .functions
            .iter()
            .map(|(key, function)| {
                let function_name = function.deployed_name(key).to_string();
                let reconciler = self.reconciler.clone();
                let handle =
                    tokio::spawn(async move { reconciler.reconcile(&function_name).await });
                (key.clone(), handle)
            })
            .collect();

        let mut report = RunReport::default();
        for (key, result) in join_all(tasks).await {
            match result {
                Ok(actions) => {
                    let detail = actions
                        .iter()
                        .map(describe_action)
                        .collect::<Vec<_>>()
                        .join(", ");
                    report.succeeded.push((key, detail));
                }
                Err(e) => report.failed.push((key, e.to_string())),
            }
        }
        report.sort();
        report
    }

    /// Removal phase: deletes every function's log subscription filter.
    pub async fn remove(&self, manifest: &Manifest) -> RunReport {
        let tasks = manifest
            .functions
            .iter()
            .map(|(key, function)| {
                let function_name = function.deployed_name(key).to_string();
                let reconciler = self.reconciler.clone();
                let handle = tokio::spawn(async move { reconciler.remove(&function_name).await });
                (key.clone(), handle)
            })
            .collect();

        let mut report = RunReport::default();
        for (key, result) in join_all(tasks).await {
            match result {
                Ok(()) => report.succeeded.push((key, "removed".to_string())),
                Err(e) => report.failed.push((key, e.to_string())),
            }
        }
        report.sort();
        report
    }
}

fn describe_action(action: &FilterAction) -> String {
    match action {
        FilterAction::Added => "filter added".to_string(),
        FilterAction::Unchanged => "filter up to date".to_string(),
        FilterAction::Replaced { stale_pattern } => {
            format!("stale filter ({stale_pattern}) replaced")
        }
    }
}

async fn join_all<T>(
    tasks: Vec<(String, JoinHandle<Result<T, PluginError>>)>,
) -> Vec<(String, Result<T, PluginError>)> {
    let mut results = Vec::with_capacity(tasks.len());
    for (key, handle) in tasks {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!("Task for {key} did not complete: {e}");
                Err(PluginError::Task(e.to_string()))
            }
        };
        if let Err(e) = &result {
            debug!("{key} failed: {e}");
        }
        results.push((key, result));
    }
    results
}
