// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

#[cfg(feature = "aws")]
pub mod aws;
pub mod config;
pub mod destination;
pub mod error;
pub mod http_client;
pub mod layer;
pub mod log_filter;
pub mod manifest;
pub mod planner;
pub mod plugin;
pub mod provider;
pub mod runtime;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::PluginConfig;
pub use error::{PluginError, ProviderError};
pub use manifest::{FunctionDefinition, Manifest};
pub use plugin::{LogSubscriptions, Packager, RunReport};
