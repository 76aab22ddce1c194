//! Wire shapes for the HTTP API. Field names are part of the client contract.

use crate::error::ErrorClass;
use essight_core::ResearchDepth;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `GET /`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceBanner {
    pub message: String,
    pub status: String,
}

/// `GET /api/health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub observations: usize,
    pub generation: u64,
    pub uptime_secs: u64,
    pub assistant_configured: bool,
}

/// `GET /api/data-overview`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewResponse {
    pub total_observations: usize,
    pub total_variables: usize,
    pub total_countries: usize,
    /// `"min-max"` in whole years.
    pub age_range: String,
    /// Percent non-missing, one decimal.
    pub completeness: BTreeMap<String, f64>,
}

/// `GET /api/regression-analysis`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionResponse {
    pub model_summary: String,
    /// Degenerate cells are `null`.
    pub correlation_matrix: BTreeMap<String, BTreeMap<String, Option<f64>>>,
    /// Pre-formatted so non-finite values survive JSON.
    pub diagnostics: BTreeMap<String, String>,
    pub outliers: BTreeMap<String, usize>,
    pub coefficients: BTreeMap<String, f64>,
    pub p_values: BTreeMap<String, f64>,
    pub excluded_rows: usize,
}

/// `GET /api/data-distributions`: counts per integer code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionsResponse {
    pub immigration: Vec<usize>,
    pub political: Vec<usize>,
    pub age: Vec<usize>,
    pub education: Vec<usize>,
}

/// A rounded `{mean, std, count}` leaf.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub mean: f64,
    pub std: Option<f64>,
    pub count: usize,
}

/// `GET /api/country-analysis`: country → variable → summary.
pub type CountryResponse = BTreeMap<String, BTreeMap<String, GroupSummary>>;

/// `GET /api/demographics-analysis`: each leaf summarizes the response variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemographicsResponse {
    pub gender: BTreeMap<String, GroupSummary>,
    pub age_groups: BTreeMap<String, GroupSummary>,
    pub education: BTreeMap<String, GroupSummary>,
    pub political: BTreeMap<String, GroupSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterPoint {
    pub x: f64,
    pub y: f64,
    pub country: String,
    pub age: i64,
    pub gender: String,
    pub education: i64,
}

/// `GET /api/scatter-data`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterResponse {
    pub data: Vec<ScatterPoint>,
}

/// `POST /api/ai-assistant` body. The depth is parsed strictly by the handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantRequest {
    pub message: String,
    pub research_depth: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantResponse {
    pub response: String,
    pub research_depth: ResearchDepth,
}

/// `{error: {class, code, message, retryable}}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDetail {
    pub class: ErrorClass,
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl ErrorBody {
    pub fn new(class: ErrorClass, code: &str, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                class,
                code: code.to_string(),
                message: message.into(),
                retryable: class.retryable(),
            },
        }
    }
}
