// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! [`CloudProvider`] backed by the AWS Lambda and CloudWatch Logs SDKs.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_lambda::error::{DisplayErrorContext, SdkError};
use std::error::Error;
use std::fmt::Debug;
use tracing::debug;

use crate::error::ProviderError;
use crate::provider::{CloudProvider, FunctionInfo, SubscriptionFilter};

#[derive(Debug, Clone)]
pub struct AwsProvider {
    lambda: aws_sdk_lambda::Client,
    logs: aws_sdk_cloudwatchlogs::Client,
}

impl AwsProvider {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            lambda: aws_sdk_lambda::Client::new(config),
            logs: aws_sdk_cloudwatchlogs::Client::new(config),
        }
    }

    /// Loads credentials from the default chain, pinned to `region` when given.
    pub async fn from_env(region: Option<String>) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(region.map(Region::new))
            .load()
            .await;
        debug!("Loaded AWS config for region {:?}", config.region());
        Self::new(&config)
    }
}

fn map_sdk_error<E, R>(
    err: SdkError<E, R>,
    resource: &str,
    is_not_found: impl Fn(&E) -> bool,
) -> ProviderError
where
    E: Error + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    if err.as_service_error().is_some_and(is_not_found) {
        return ProviderError::NotFound(resource.to_string());
    }
    ProviderError::Service(DisplayErrorContext(&err).to_string())
}

#[async_trait]
impl CloudProvider for AwsProvider {
    async fn get_function(&self, function_name: &str) -> Result<FunctionInfo, ProviderError> {
        let output = self
            .lambda
            .get_function()
            .function_name(function_name)
            .send()
            .await
            .map_err(|e| {
                map_sdk_error(e, function_name, |e| e.is_resource_not_found_exception())
            })?;

        let configuration = output
            .configuration()
            .ok_or_else(|| {
                ProviderError::Service(format!("{function_name} has no configuration"))
            })?;
        let function_arn = configuration
            .function_arn()
            .ok_or_else(|| ProviderError::Service(format!("{function_name} has no ARN")))?;

        Ok(FunctionInfo {
            function_name: configuration
                .function_name()
                .unwrap_or(function_name)
                .to_string(),
            function_arn: function_arn.to_string(),
        })
    }

    async fn describe_subscription_filters(
        &self,
        log_group_name: &str,
    ) -> Result<Vec<SubscriptionFilter>, ProviderError> {
        let output = self
            .logs
            .describe_subscription_filters()
            .log_group_name(log_group_name)
            .send()
            .await
            .map_err(|e| {
                map_sdk_error(e, log_group_name, |e| e.is_resource_not_found_exception())
            })?;

        Ok(output
            .subscription_filters()
            .iter()
            .map(|filter| SubscriptionFilter {
                filter_name: filter.filter_name().unwrap_or_default().to_string(),
                filter_pattern: filter.filter_pattern().unwrap_or_default().to_string(),
                log_group_name: filter
                    .log_group_name()
                    .unwrap_or(log_group_name)
                    .to_string(),
                destination_arn: filter.destination_arn().unwrap_or_default().to_string(),
            })
            .collect())
    }

    async fn put_subscription_filter(
        &self,
        filter: &SubscriptionFilter,
    ) -> Result<(), ProviderError> {
        self.logs
            .put_subscription_filter()
            .log_group_name(&filter.log_group_name)
            .filter_name(&filter.filter_name)
            .filter_pattern(&filter.filter_pattern)
            .destination_arn(&filter.destination_arn)
            .send()
            .await
            .map_err(|e| {
                map_sdk_error(e, &filter.log_group_name, |e| {
                    e.is_resource_not_found_exception()
                })
            })?;
        Ok(())
    }

    async fn delete_subscription_filter(
        &self,
        log_group_name: &str,
        filter_name: &str,
    ) -> Result<(), ProviderError> {
        self.logs
            .delete_subscription_filter()
            .log_group_name(log_group_name)
            .filter_name(filter_name)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, filter_name, |e| e.is_resource_not_found_exception()))?;
        Ok(())
    }
}
