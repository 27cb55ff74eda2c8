// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use thiserror::Error;

/// Error type shared by every ggs-rs crate.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SegError {
    /// Malformed, empty, or non-finite input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Hyperparameter outside its admissible range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// A required numeric capability was not compiled in.
    #[error("missing dependency: {0}")]
    MissingDependency(String),
    #[error("numerical issue: {0}")]
    NumericalIssue(String),
    #[error("resource limit: {0}")]
    ResourceLimit(String),
    #[error("cancelled")]
    Cancelled,
}

impl SegError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub fn missing_dependency(msg: impl Into<String>) -> Self {
        Self::MissingDependency(msg.into())
    }

    pub fn numerical_issue(msg: impl Into<String>) -> Self {
        Self::NumericalIssue(msg.into())
    }

    pub fn resource_limit(msg: impl Into<String>) -> Self {
        Self::ResourceLimit(msg.into())
    }

    pub fn cancelled() -> Self {
        Self::Cancelled
    }

    /// Stable machine-readable code, used by the CLI error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidParameter(_) => "invalid_parameter",
            Self::MissingDependency(_) => "missing_dependency",
            Self::NumericalIssue(_) => "numerical_issue",
            Self::ResourceLimit(_) => "resource_limit",
            Self::Cancelled => "cancelled",
        }
    }
}
