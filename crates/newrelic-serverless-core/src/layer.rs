// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Resolves the latest New Relic layer ARN for a runtime and region.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tracing::{debug, error};

use crate::config::PluginConfig;
use crate::error::PluginError;
use crate::runtime::Runtime;

/// Where layer lookups are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupEndpoint {
    /// Regional host, queried as `https://{region}.{host}/get-layers`
    Host(String),
    /// Fixed base URL, queried as `{url}/get-layers` regardless of region
    Url(String),
}

impl LookupEndpoint {
    pub fn get_layers_url(&self, region: &str) -> String {
        match self {
            LookupEndpoint::Host(host) => format!("https://{region}.{host}/get-layers"),
            LookupEndpoint::Url(url) => format!("{}/get-layers", url.trim_end_matches('/')),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetLayersResponse {
    #[serde(default)]
    layers: Vec<LayerEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LayerEntry {
    latest_matching_version: Option<LayerVersion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LayerVersion {
    layer_version_arn: Option<String>,
}

type CacheKey = (Runtime, String);

/// Layer ARN resolver with a per-run, single-flight cache keyed by (runtime, region).
///
/// Concurrent callers for the same key wait on the first lookup instead of issuing their
/// own. Failed lookups are not cached.
#[derive(Debug)]
pub struct LayerResolver {
    client: Client,
    endpoint: LookupEndpoint,
    override_arn: Option<String>,
    cache: Mutex<HashMap<CacheKey, Arc<OnceCell<String>>>>,
}

impl LayerResolver {
    pub fn new(client: Client, endpoint: LookupEndpoint, override_arn: Option<String>) -> Self {
        Self {
            client,
            endpoint,
            override_arn,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(client: Client, config: &PluginConfig) -> Self {
        Self::new(
            client,
            LookupEndpoint::Host(config.layers_host().to_string()),
            config.layer_arn.clone(),
        )
    }

    pub async fn resolve(&self, runtime: Runtime, region: &str) -> Result<String, PluginError> {
        if let Some(layer_arn) = &self.override_arn {
            return Ok(layer_arn.clone());
        }

        let cell = {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(cache.entry((runtime, region.to_string())).or_default())
        };

        cell.get_or_try_init(|| self.fetch(runtime, region))
            .await
            .cloned()
    }

    async fn fetch(&self, runtime: Runtime, region: &str) -> Result<String, PluginError> {
        let url = self.endpoint.get_layers_url(region);
        debug!("Looking up layer for {runtime} in {region} at {url}");

        let response = self
            .client
            .get(&url)
            .query(&[("CompatibleRuntime", runtime.as_str())])
            .send()
            .await
            .map_err(|e| lookup_failure(runtime, region, &e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(lookup_failure(
                runtime,
                region,
                &format!("{status}: {body}"),
            ));
        }

        let body: GetLayersResponse = response
            .json()
            .await
            .map_err(|e| lookup_failure(runtime, region, &format!("malformed response: {e}")))?;

        let layer_arn = body
            .layers
            .into_iter()
            .next()
            .and_then(|layer| layer.latest_matching_version)
            .and_then(|version| version.layer_version_arn)
            .filter(|arn| !arn.trim().is_empty())
            .ok_or_else(|| {
                lookup_failure(
                    runtime,
                    region,
                    "response has no Layers[0].LatestMatchingVersion.LayerVersionArn",
                )
            })?;

        debug!("Resolved layer {layer_arn} for {runtime} in {region}");
        Ok(layer_arn)
    }
}

fn lookup_failure(runtime: Runtime, region: &str, message: &str) -> PluginError {
    error!("Failed to resolve layer for {runtime} in {region}: {message}");
    PluginError::LookupFailure(format!("layer for {runtime} in {region}: {message}"))
}
