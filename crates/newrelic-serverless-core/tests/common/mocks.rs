// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock cloud provider for driving the plugin end to end

use newrelic_serverless_core::provider::{CloudProvider, FunctionInfo, SubscriptionFilter};
use newrelic_serverless_core::ProviderError;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Cloud provider keeping functions and filters in memory. Log groups listed in
/// `broken_log_groups` fail every filter call with a service error.
#[derive(Default)]
pub struct MockCloudProvider {
    pub functions: Mutex<HashMap<String, String>>,
    pub filters: Mutex<HashMap<String, Vec<SubscriptionFilter>>>,
    pub broken_log_groups: Mutex<HashSet<String>>,
    pub puts: Mutex<Vec<SubscriptionFilter>>,
    pub deletes: Mutex<Vec<(String, String)>>,
}

#[allow(dead_code)]
impl MockCloudProvider {
    pub fn with_functions(names: &[&str]) -> Self {
        let provider = Self::default();
        for name in names {
            provider.functions.lock().unwrap().insert(
                name.to_string(),
                format!("arn:aws:lambda:us-east-1:123456789012:function:{name}"),
            );
        }
        provider
    }

    pub fn break_log_group(&self, log_group_name: &str) {
        self.broken_log_groups
            .lock()
            .unwrap()
            .insert(log_group_name.to_string());
    }

    pub fn set_filter(&self, log_group_name: &str, pattern: &str, destination_arn: &str) {
        self.filters.lock().unwrap().insert(
            log_group_name.to_string(),
            vec![SubscriptionFilter {
                filter_name: "NewRelicLogStreaming".to_string(),
                filter_pattern: pattern.to_string(),
                log_group_name: log_group_name.to_string(),
                destination_arn: destination_arn.to_string(),
            }],
        );
    }

    pub fn filters_on(&self, log_group_name: &str) -> Vec<SubscriptionFilter> {
        self.filters
            .lock()
            .unwrap()
            .get(log_group_name)
            .cloned()
            .unwrap_or_default()
    }

    fn check(&self, log_group_name: &str) -> Result<(), ProviderError> {
        if self.broken_log_groups.lock().unwrap().contains(log_group_name) {
            return Err(ProviderError::Service(format!(
                "ServiceUnavailable: {log_group_name}"
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl CloudProvider for MockCloudProvider {
    async fn get_function(&self, function_name: &str) -> Result<FunctionInfo, ProviderError> {
        self.functions
            .lock()
            .unwrap()
            .get(function_name)
            .map(|arn| FunctionInfo {
                function_name: function_name.to_string(),
                function_arn: arn.clone(),
            })
            .ok_or_else(|| ProviderError::NotFound(function_name.to_string()))
    }

    async fn describe_subscription_filters(
        &self,
        log_group_name: &str,
    ) -> Result<Vec<SubscriptionFilter>, ProviderError> {
        self.check(log_group_name)?;
        Ok(self.filters_on(log_group_name))
    }

    async fn put_subscription_filter(
        &self,
        filter: &SubscriptionFilter,
    ) -> Result<(), ProviderError> {
        self.check(&filter.log_group_name)?;
        self.puts.lock().unwrap().push(filter.clone());
        let mut filters = self.filters.lock().unwrap();
        let group = filters.entry(filter.log_group_name.clone()).or_default();
        group.retain(|existing| existing.filter_name != filter.filter_name);
        group.push(filter.clone());
        Ok(())
    }

    async fn delete_subscription_filter(
        &self,
        log_group_name: &str,
        filter_name: &str,
    ) -> Result<(), ProviderError> {
        self.check(log_group_name)?;
        self.deletes
            .lock()
            .unwrap()
            .push((log_group_name.to_string(), filter_name.to_string()));
        let mut filters = self.filters.lock().unwrap();
        let group = filters.entry(log_group_name.to_string()).or_default();
        let before = group.len();
        group.retain(|existing| existing.filter_name != filter_name);
        if group.len() == before {
            return Err(ProviderError::NotFound(filter_name.to_string()));
        }
        Ok(())
    }
}
