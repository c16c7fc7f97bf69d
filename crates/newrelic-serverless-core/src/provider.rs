// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

use crate::error::ProviderError;

/// Reserved name of the subscription filter this plugin owns.
pub const FILTER_NAME: &str = "NewRelicLogStreaming";
/// Pattern the owned filter must carry.
pub const FILTER_PATTERN: &str = "NR_LAMBDA_MONITORING";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub function_name: String,
    pub function_arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionFilter {
    pub filter_name: String,
    pub filter_pattern: String,
    pub log_group_name: String,
    pub destination_arn: String,
}

impl SubscriptionFilter {
    /// The filter this plugin wants on `log_group_name`.
    pub fn desired(log_group_name: &str, destination_arn: &str) -> Self {
        Self {
            filter_name: FILTER_NAME.to_string(),
            filter_pattern: FILTER_PATTERN.to_string(),
            log_group_name: log_group_name.to_string(),
            destination_arn: destination_arn.to_string(),
        }
    }

    pub fn is_owned(&self) -> bool {
        self.filter_name == FILTER_NAME
    }
}

/// The cloud calls the plugin makes. Every call is remote and may fail.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn get_function(&self, function_name: &str) -> Result<FunctionInfo, ProviderError>;

    async fn describe_subscription_filters(
        &self,
        log_group_name: &str,
    ) -> Result<Vec<SubscriptionFilter>, ProviderError>;

    async fn put_subscription_filter(&self, filter: &SubscriptionFilter)
        -> Result<(), ProviderError>;

    async fn delete_subscription_filter(
        &self,
        log_group_name: &str,
        filter_name: &str,
    ) -> Result<(), ProviderError>;
}
