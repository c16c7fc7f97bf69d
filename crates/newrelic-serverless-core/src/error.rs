// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors that can abort a run or a single function's pipeline
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load manifest: {0}")]
    Manifest(String),

    #[error("Lookup failed: {0}")]
    LookupFailure(String),

    #[error("{operation} failed: {source}")]
    Provider {
        operation: &'static str,
        #[source]
        source: ProviderError,
    },

    #[error("Task error: {0}")]
    Task(String),
}

impl PluginError {
    pub fn provider(operation: &'static str, source: ProviderError) -> Self {
        Self::Provider { operation, source }
    }
}

/// Errors returned by a [`crate::provider::CloudProvider`] call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Service(String),
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
