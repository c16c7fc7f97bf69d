// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Converges a function's log group to exactly one `NewRelicLogStreaming` subscription
//! filter with the expected pattern and destination.

use std::sync::Arc;
use tracing::{debug, error, info};

use crate::destination::DestinationResolver;
use crate::error::PluginError;
use crate::manifest::log_group_name;
use crate::provider::{CloudProvider, SubscriptionFilter, FILTER_NAME, FILTER_PATTERN};

/// What reconciliation did to one owned filter slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterAction {
    Added,
    Replaced { stale_pattern: String },
    Unchanged,
}

#[derive(Clone)]
pub struct LogFilterReconciler {
    provider: Arc<dyn CloudProvider>,
    destination: DestinationResolver,
}

impl LogFilterReconciler {
    pub fn new(provider: Arc<dyn CloudProvider>) -> Self {
        Self {
            destination: DestinationResolver::new(Arc::clone(&provider)),
            provider,
        }
    }

    /// Fetch, resolve destination, describe, then add or replace. Each step runs only
    /// after the previous one succeeded.
    pub async fn reconcile(&self, function_name: &str) -> Result<Vec<FilterAction>, PluginError> {
        if let Err(e) = self.provider.get_function(function_name).await {
            error!("Could not find function {function_name}, skipping log subscription: {e}");
            return Err(PluginError::provider("GetFunction", e));
        }

        let destination_arn = self.destination.resolve().await?;
        let log_group = log_group_name(function_name);

        let existing = match self.provider.describe_subscription_filters(&log_group).await {
            Ok(filters) => filters,
            Err(e) => {
                error!("Could not describe subscription filters for {log_group}: {e}");
                return Err(PluginError::provider("DescribeSubscriptionFilters", e));
            }
        };

        let owned: Vec<SubscriptionFilter> =
            existing.into_iter().filter(|f| f.is_owned()).collect();
        let desired = SubscriptionFilter::desired(&log_group, &destination_arn);

        if owned.is_empty() {
            debug!("No {FILTER_NAME} filter on {log_group}, adding one");
            self.add(&desired).await?;
            return Ok(vec![FilterAction::Added]);
        }

        let mut actions = Vec::with_capacity(owned.len());
        for filter in owned {
            if filter.filter_pattern == FILTER_PATTERN {
                debug!("{FILTER_NAME} filter on {log_group} is up to date");
                actions.push(FilterAction::Unchanged);
                continue;
            }

            info!(
                "Replacing stale {FILTER_NAME} filter on {log_group} (pattern '{}')",
                filter.filter_pattern
            );
            // no atomic update: the delete must finish before the put for the same slot
            self.delete(&log_group).await?;
            self.add(&desired).await?;
            actions.push(FilterAction::Replaced {
                stale_pattern: filter.filter_pattern,
            });
        }
        Ok(actions)
    }

    /// Removes the owned filter whatever its current state. A missing filter is fine.
    pub async fn remove(&self, function_name: &str) -> Result<(), PluginError> {
        let log_group = log_group_name(function_name);
        match self
            .provider
            .delete_subscription_filter(&log_group, FILTER_NAME)
            .await
        {
            Ok(()) => {
                info!("Removed {FILTER_NAME} filter from {log_group}");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!("No {FILTER_NAME} filter on {log_group} to remove");
                Ok(())
            }
            Err(e) => {
                error!("Could not remove {FILTER_NAME} filter from {log_group}: {e}");
                Err(PluginError::provider("DeleteSubscriptionFilter", e))
            }
        }
    }

    async fn add(&self, filter: &SubscriptionFilter) -> Result<(), PluginError> {
        match self.provider.put_subscription_filter(filter).await {
            Ok(()) => {
                info!(
                    "Added {} filter to {} streaming to {}",
                    filter.filter_name, filter.log_group_name, filter.destination_arn
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    "Could not add {} filter to {}: {e}",
                    filter.filter_name, filter.log_group_name
                );
                Err(PluginError::provider("PutSubscriptionFilter", e))
            }
        }
    }

    async fn delete(&self, log_group: &str) -> Result<(), PluginError> {
        self.provider
            .delete_subscription_filter(log_group, FILTER_NAME)
            .await
            .map_err(|e| {
                error!("Could not remove {FILTER_NAME} filter from {log_group}: {e}");
                PluginError::provider("DeleteSubscriptionFilter", e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::INGESTION_FUNCTION_NAME;
    use crate::error::ProviderError;
    use crate::test_support::{Call, Operation, RecordingProvider};
    use tracing_test::traced_test;

    const INGESTION_ARN: &str =
        "arn:aws:lambda:us-east-1:123456789012:function:newrelic-log-ingestion";

    fn provider() -> Arc<RecordingProvider> {
        let provider = RecordingProvider::default();
        provider.add_function(INGESTION_FUNCTION_NAME, INGESTION_ARN);
        provider.add_function(
            "orders-api",
            "arn:aws:lambda:us-east-1:123456789012:function:orders-api",
        );
        Arc::new(provider)
    }

    fn writes(provider: &RecordingProvider) -> Vec<Call> {
        provider
            .calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Put(_) | Call::Delete { .. }))
            .collect()
    }

    fn owned_filter(pattern: &str) -> SubscriptionFilter {
        SubscriptionFilter {
            filter_name: FILTER_NAME.to_string(),
            filter_pattern: pattern.to_string(),
            log_group_name: "/aws/lambda/orders-api".to_string(),
            destination_arn: INGESTION_ARN.to_string(),
        }
    }

    #[tokio::test]
    async fn test_adds_filter_when_none_exist() {
        let provider = provider();
        let reconciler = LogFilterReconciler::new(provider.clone());

        let actions = reconciler.reconcile("orders-api").await.unwrap();

        assert_eq!(actions, vec![FilterAction::Added]);
        assert_eq!(
            writes(&provider),
            vec![Call::Put(SubscriptionFilter::desired(
                "/aws/lambda/orders-api",
                INGESTION_ARN
            ))]
        );
    }

    #[tokio::test]
    async fn test_ignores_foreign_filters() {
        let provider = provider();
        provider.add_filter(SubscriptionFilter {
            filter_name: "SomethingElse".to_string(),
            ..owned_filter("ERROR")
        });
        let reconciler = LogFilterReconciler::new(provider.clone());

        let actions = reconciler.reconcile("orders-api").await.unwrap();
        assert_eq!(actions, vec![FilterAction::Added]);
        assert_eq!(writes(&provider).len(), 1);
    }

    #[tokio::test]
    async fn test_up_to_date_filter_is_untouched() {
        let provider = provider();
        provider.add_filter(owned_filter(FILTER_PATTERN));
        let reconciler = LogFilterReconciler::new(provider.clone());

        let actions = reconciler.reconcile("orders-api").await.unwrap();

        assert_eq!(actions, vec![FilterAction::Unchanged]);
        assert!(writes(&provider).is_empty());
    }

    #[tokio::test]
    async fn test_stale_filter_is_removed_then_added() {
        let provider = provider();
        provider.add_filter(owned_filter("OLD_PATTERN"));
        let reconciler = LogFilterReconciler::new(provider.clone());

        let actions = reconciler.reconcile("orders-api").await.unwrap();

        assert_eq!(
            actions,
            vec![FilterAction::Replaced {
                stale_pattern: "OLD_PATTERN".to_string()
            }]
        );
        assert_eq!(
            writes(&provider),
            vec![
                Call::Delete {
                    log_group_name: "/aws/lambda/orders-api".to_string(),
                    filter_name: FILTER_NAME.to_string(),
                },
                Call::Put(SubscriptionFilter::desired(
                    "/aws/lambda/orders-api",
                    INGESTION_ARN
                )),
            ]
        );
        assert_eq!(
            provider.filters("/aws/lambda/orders-api"),
            vec![owned_filter(FILTER_PATTERN)]
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_missing_function_aborts_before_any_write() {
        let provider = provider();
        let reconciler = LogFilterReconciler::new(provider.clone());

        let result = reconciler.reconcile("does-not-exist").await;

        assert!(matches!(
            result,
            Err(PluginError::Provider {
                operation: "GetFunction",
                ..
            })
        ));
        assert_eq!(
            provider.calls(),
            vec![Call::GetFunction("does-not-exist".to_string())]
        );
        assert!(logs_contain("Could not find function does-not-exist"));
    }

    #[tokio::test]
    async fn test_missing_destination_aborts() {
        let provider = Arc::new(RecordingProvider::default());
        provider.add_function("orders-api", "arn:orders-api");
        let reconciler = LogFilterReconciler::new(provider.clone());

        let result = reconciler.reconcile("orders-api").await;

        assert!(matches!(result, Err(PluginError::LookupFailure(_))));
        assert!(writes(&provider).is_empty());
    }

    #[tokio::test]
    async fn test_describe_failure_aborts() {
        let provider = provider();
        provider.fail_on(
            Operation::Describe,
            "/aws/lambda/orders-api",
            ProviderError::Service("Throttling".to_string()),
        );
        let reconciler = LogFilterReconciler::new(provider.clone());

        let result = reconciler.reconcile("orders-api").await;
        assert!(matches!(
            result,
            Err(PluginError::Provider {
                operation: "DescribeSubscriptionFilters",
                ..
            })
        ));
        assert!(writes(&provider).is_empty());
    }

    #[tokio::test]
    async fn test_failed_delete_skips_add() {
        let provider = provider();
        provider.add_filter(owned_filter("OLD_PATTERN"));
        provider.fail_on(
            Operation::Delete,
            "/aws/lambda/orders-api",
            ProviderError::Service("AccessDenied".to_string()),
        );
        let reconciler = LogFilterReconciler::new(provider.clone());

        let result = reconciler.reconcile("orders-api").await;
        assert!(result.is_err());
        assert!(!writes(&provider)
            .iter()
            .any(|call| matches!(call, Call::Put(_))));
    }

    #[tokio::test]
    async fn test_remove_issues_one_delete() {
        let provider = provider();
        provider.add_filter(owned_filter(FILTER_PATTERN));
        let reconciler = LogFilterReconciler::new(provider.clone());

        reconciler.remove("orders-api").await.unwrap();

        assert_eq!(
            provider.calls(),
            vec![Call::Delete {
                log_group_name: "/aws/lambda/orders-api".to_string(),
                filter_name: FILTER_NAME.to_string(),
            }]
        );
        assert!(provider.filters("/aws/lambda/orders-api").is_empty());
    }

    #[tokio::test]
    async fn test_remove_without_filter_is_ok() {
        let provider = provider();
        let reconciler = LogFilterReconciler::new(provider.clone());

        assert!(reconciler.remove("orders-api").await.is_ok());
        assert_eq!(provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_propagates_other_errors() {
        let provider = provider();
        provider.fail_on(
            Operation::Delete,
            "/aws/lambda/orders-api",
            ProviderError::Service("AccessDenied".to_string()),
        );
        let reconciler = LogFilterReconciler::new(provider.clone());

        assert!(reconciler.remove("orders-api").await.is_err());
    }
}
