// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use tracing::{debug, error};

use crate::error::PluginError;
use crate::provider::CloudProvider;

/// Function that receives streamed logs and forwards them to New Relic.
pub const INGESTION_FUNCTION_NAME: &str = "newrelic-log-ingestion";

/// Looks up the ARN of the log ingestion function.
#[derive(Clone)]
pub struct DestinationResolver {
    provider: Arc<dyn CloudProvider>,
    function_name: String,
}

impl DestinationResolver {
    pub fn new(provider: Arc<dyn CloudProvider>) -> Self {
        Self {
            provider,
            function_name: INGESTION_FUNCTION_NAME.to_string(),
        }
    }

    pub async fn resolve(&self) -> Result<String, PluginError> {
        match self.provider.get_function(&self.function_name).await {
            Ok(function) => {
                debug!(
                    "Resolved log destination {} to {}",
                    function.function_name, function.function_arn
                );
                Ok(function.function_arn)
            }
            Err(e) => {
                error!(
                    "Could not find the {} function, is it installed? {e}",
                    self.function_name
                );
                Err(PluginError::LookupFailure(format!(
                    "destination {}: {e}",
                    self.function_name
                )))
            }
        }
    }
}
