//! Outlier detection over a fitted model.

use crate::stats::descriptive::{mad, median};
use crate::stats::regression::RegressionResult;
use essight_core::{OutlierConfig, OutlierMethod};
use serde::Serialize;
use std::collections::BTreeMap;

/// Scale factor that makes the MAD consistent with the normal standard deviation.
const ROBUST_Z_SCALE: f64 = 0.6745;

/// One flagged observation, attributed to one model variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierRecord {
    pub observation_id: usize,
    pub variable: String,
    pub score: f64,
    pub method: OutlierMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierReport {
    pub method: OutlierMethod,
    pub threshold: f64,
    pub records: Vec<OutlierRecord>,
    /// Flagged observations per model variable. Every scored variable has an entry.
    pub counts: BTreeMap<String, usize>,
}

/// Score every observation of the fit by its residual; flag `|score| > threshold`.
///
/// `standardized_residual` uses internally studentized residuals, which
/// account for each row's leverage; `robust_z_score` scales residuals by their
/// MAD. A flagged observation counts against the response and every numeric
/// predictor of the model, so each count is the number of influential rows the
/// variable took part in. Categorical predictors are not scored.
pub fn detect(result: &RegressionResult, config: &OutlierConfig) -> OutlierReport {
    // A perfect fit leaves only rounding noise in the residuals.
    let scores = match config.method {
        _ if result.perfect_fit => vec![0.0; result.residuals.len()],
        OutlierMethod::StandardizedResidual => result.studentized_residuals(),
        OutlierMethod::RobustZScore => robust_scores(&result.residuals),
    };
    let flagged: Vec<(usize, f64)> = result
        .observation_ids
        .iter()
        .zip(scores)
        .filter(|(_, score)| score.abs() > config.threshold)
        .map(|(id, score)| (*id, score))
        .collect();

    let variables = std::iter::once(&result.response).chain(result.predictor_values.keys());
    let mut records = Vec::new();
    let mut counts = BTreeMap::new();
    for variable in variables {
        counts.insert(variable.clone(), flagged.len());
        records.extend(flagged.iter().map(|(id, score)| OutlierRecord {
            observation_id: *id,
            variable: variable.clone(),
            score: *score,
            method: config.method,
        }));
    }

    OutlierReport {
        method: config.method,
        threshold: config.threshold,
        records,
        counts,
    }
}

/// `0.6745 (x − median) / MAD`; all zero when the MAD is zero.
fn robust_scores(values: &[f64]) -> Vec<f64> {
    match (median(values), mad(values)) {
        (Some(med), Some(dev)) if dev > 0.0 => values
            .iter()
            .map(|v| ROBUST_Z_SCALE * (v - med) / dev)
            .collect(),
        _ => vec![0.0; values.len()],
    }
}
