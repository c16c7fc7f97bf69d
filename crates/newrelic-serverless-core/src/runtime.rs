// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Supported Lambda runtimes and the wrapper policy attached to each family.

use std::fmt;
use std::str::FromStr;

/// Wrapper entry point for Node.js functions.
pub const NODE_WRAPPER_HANDLER: &str = "newrelic-lambda-wrapper.handler";
/// Wrapper entry point for Python functions.
pub const PYTHON_WRAPPER_HANDLER: &str = "newrelic_lambda_wrapper.handler";
/// Negated exclude glob keeping the Node.js wrapper module in the packaged artifact.
pub const NODE_WRAPPER_INCLUDE: &str = "!node_modules/newrelic-lambda-wrapper/**";

/// Runtimes the New Relic layer is published for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Runtime {
    Nodejs12,
    Nodejs10,
    Nodejs810,
    Python27,
    Python36,
    Python37,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeFamily {
    Node,
    Python,
}

impl Runtime {
    pub const ALL: [Runtime; 6] = [
        Runtime::Nodejs12,
        Runtime::Nodejs10,
        Runtime::Nodejs810,
        Runtime::Python27,
        Runtime::Python36,
        Runtime::Python37,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Runtime::Nodejs12 => "nodejs12.x",
            Runtime::Nodejs10 => "nodejs10.x",
            Runtime::Nodejs810 => "nodejs8.10",
            Runtime::Python27 => "python2.7",
            Runtime::Python36 => "python3.6",
            Runtime::Python37 => "python3.7",
        }
    }

    pub fn family(&self) -> RuntimeFamily {
        match self {
            Runtime::Nodejs12 | Runtime::Nodejs10 | Runtime::Nodejs810 => RuntimeFamily::Node,
            Runtime::Python27 | Runtime::Python36 | Runtime::Python37 => RuntimeFamily::Python,
        }
    }
}

impl RuntimeFamily {
    pub fn wrapper_handler(&self) -> &'static str {
        match self {
            RuntimeFamily::Node => NODE_WRAPPER_HANDLER,
            RuntimeFamily::Python => PYTHON_WRAPPER_HANDLER,
        }
    }

    /// Packaging exclude pattern that must be present for this family, if any.
    pub fn package_include(&self) -> Option<&'static str> {
        match self {
            RuntimeFamily::Node => Some(NODE_WRAPPER_INCLUDE),
            RuntimeFamily::Python => None,
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedRuntime(pub String);

impl fmt::Display for UnsupportedRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported runtime '{}'", self.0)
    }
}

impl FromStr for Runtime {
    type Err = UnsupportedRuntime;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Runtime::ALL
            .into_iter()
            .find(|runtime| runtime.as_str() == s)
            .ok_or_else(|| UnsupportedRuntime(s.to_string()))
    }
}

/// Returns the wrapper handler for a runtime tag, or `None` when the tag is not a
/// supported runtime and the handler must be left untouched.
pub fn wrapper_handler_for(runtime: &str) -> Option<&'static str> {
    runtime
        .parse::<Runtime>()
        .ok()
        .map(|runtime| runtime.family().wrapper_handler())
}
