//! Error types for the essight-analysis crate.

use essight_core::{ConfigError, LlmError};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// How a failure should be presented to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// A dependency is down; the same request may succeed later.
    Unavailable,
    /// The request is well-formed but cannot be computed with the current data.
    Precondition,
    /// The request itself is wrong.
    InvalidRequest,
}

impl ErrorClass {
    pub fn http_status(self) -> u16 {
        match self {
            ErrorClass::Unavailable => 503,
            ErrorClass::Precondition => 422,
            ErrorClass::InvalidRequest => 400,
        }
    }

    pub fn retryable(self) -> bool {
        matches!(self, ErrorClass::Unavailable)
    }
}

/// Failure to load or clean the survey snapshot. Fatal at startup.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("cannot read dataset source {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed {format} input: {message}")]
    Malformed {
        format: &'static str,
        message: String,
    },

    #[error("required variable '{variable}' is missing from the source")]
    MissingVariable { variable: String },

    #[error("row {row}, variable '{variable}': cannot parse '{value}' as a number")]
    UnparseableNumber {
        row: usize,
        variable: String,
        value: String,
    },
}

/// A variable whose variance is zero (or which has too few observations)
/// over the subset a statistic needs.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("variable '{variable}' has degenerate variance over {n} observations")]
pub struct DegenerateVarianceError {
    pub variable: String,
    pub n: usize,
}

/// Per-request analysis failures.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("insufficient data: {available} complete observations, at least {required} needed")]
    InsufficientData { available: usize, required: usize },

    #[error("singular design matrix: {reason}")]
    SingularDesignMatrix { reason: String },

    #[error(transparent)]
    DegenerateVariance(#[from] DegenerateVarianceError),

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl AnalysisError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AnalysisError::InsufficientData { .. }
            | AnalysisError::SingularDesignMatrix { .. }
            | AnalysisError::DegenerateVariance(_) => ErrorClass::Precondition,
            AnalysisError::UnknownVariable(_) | AnalysisError::InvalidRequest(_) => {
                ErrorClass::InvalidRequest
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AnalysisError::InsufficientData { .. } => "insufficient_data",
            AnalysisError::SingularDesignMatrix { .. } => "singular_design_matrix",
            AnalysisError::DegenerateVariance(_) => "degenerate_variance",
            AnalysisError::UnknownVariable(_) => "unknown_variable",
            AnalysisError::InvalidRequest(_) => "invalid_request",
        }
    }
}

/// The generative-AI client could not produce an answer.
#[derive(Debug, Error)]
#[error("research assistant unavailable after {attempts} attempt(s): {source}")]
pub struct AssistantUnavailableError {
    pub attempts: u32,
    #[source]
    pub source: LlmError,
}

/// Failures on the research-assistant path.
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error(transparent)]
    Unavailable(#[from] AssistantUnavailableError),

    #[error("research assistant is not configured: {0}")]
    NotConfigured(String),

    #[error("invalid research depth: {0}")]
    InvalidDepth(#[from] ConfigError),

    #[error("message must not be empty")]
    EmptyMessage,
}

impl AssistantError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AssistantError::Unavailable(_) | AssistantError::NotConfigured(_) => {
                ErrorClass::Unavailable
            }
            AssistantError::InvalidDepth(_) | AssistantError::EmptyMessage => {
                ErrorClass::InvalidRequest
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AssistantError::Unavailable(_) => "assistant_unavailable",
            AssistantError::NotConfigured(_) => "assistant_not_configured",
            AssistantError::InvalidDepth(_) => "invalid_research_depth",
            AssistantError::EmptyMessage => "empty_message",
        }
    }
}
