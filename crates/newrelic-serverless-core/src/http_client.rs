// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::{Client, ClientBuilder, Proxy};
use std::time::Duration;
use tracing::debug;

use crate::error::PluginError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Creates a reqwest client builder using reqwest's rustls TLS implementation.
pub fn create_reqwest_client_builder() -> ClientBuilder {
    Client::builder().use_rustls_tls()
}

/// Builds the client used for the layer lookup service.
pub fn build_client(timeout: Duration, https_proxy: Option<&str>) -> Result<Client, PluginError> {
    let mut builder = create_reqwest_client_builder().timeout(timeout);
    if let Some(proxy) = https_proxy {
        debug!("Using HTTPS proxy {proxy} for layer lookups");
        let proxy = Proxy::https(proxy)
            .map_err(|e| PluginError::InvalidConfig(format!("invalid HTTPS proxy: {e}")))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| PluginError::InvalidConfig(format!("failed to build HTTP client: {e}")))
}
