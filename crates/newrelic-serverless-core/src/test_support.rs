// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory [`CloudProvider`] that records every call.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::ProviderError;
use crate::provider::{CloudProvider, FunctionInfo, SubscriptionFilter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetFunction(String),
    Describe(String),
    Put(SubscriptionFilter),
    Delete {
        log_group_name: String,
        filter_name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetFunction,
    Describe,
    Put,
    Delete,
}

#[derive(Debug, Default)]
pub struct RecordingProvider {
    functions: Mutex<HashMap<String, String>>,
    filters: Mutex<HashMap<String, Vec<SubscriptionFilter>>>,
    failures: Mutex<HashMap<(Operation, String), ProviderError>>,
    calls: Mutex<Vec<Call>>,
}

impl RecordingProvider {
    pub fn add_function(&self, name: &str, arn: &str) {
        self.functions
            .lock()
            .unwrap()
            .insert(name.to_string(), arn.to_string());
    }

    pub fn add_filter(&self, filter: SubscriptionFilter) {
        self.filters
            .lock()
            .unwrap()
            .entry(filter.log_group_name.clone())
            .or_default()
            .push(filter);
    }

    /// Makes `operation` fail for `target` (function name or log group).
    pub fn fail_on(&self, operation: Operation, target: &str, error: ProviderError) {
        self.failures
            .lock()
            .unwrap()
            .insert((operation, target.to_string()), error);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn filters(&self, log_group_name: &str) -> Vec<SubscriptionFilter> {
        self.filters
            .lock()
            .unwrap()
            .get(log_group_name)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, call: Call, operation: Operation, target: &str) -> Result<(), ProviderError> {
        self.calls.lock().unwrap().push(call);
        match self
            .failures
            .lock()
            .unwrap()
            .get(&(operation, target.to_string()))
        {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CloudProvider for RecordingProvider {
    async fn get_function(&self, function_name: &str) -> Result<FunctionInfo, ProviderError> {
        self.record(
            Call::GetFunction(function_name.to_string()),
            Operation::GetFunction,
            function_name,
        )?;
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
        self.record(
            Call::Describe(log_group_name.to_string()),
            Operation::Describe,
            log_group_name,
        )?;
        Ok(self.filters(log_group_name))
    }

    async fn put_subscription_filter(
        &self,
        filter: &SubscriptionFilter,
    ) -> Result<(), ProviderError> {
        self.record(
            Call::Put(filter.clone()),
            Operation::Put,
            &filter.log_group_name,
        )?;
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
        self.record(
            Call::Delete {
                log_group_name: log_group_name.to_string(),
                filter_name: filter_name.to_string(),
            },
            Operation::Delete,
            log_group_name,
        )?;
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
