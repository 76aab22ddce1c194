//! Ordinary least squares via thin SVD.
//!
//! The design matrix is built from complete-case rows with an intercept column
//! first. With `X = U Σ Vᵀ`:
//!
//! - `β = V Σ⁻¹ Uᵀ y`
//! - `(XᵀX)⁻¹ = V Σ⁻² Vᵀ`
//! - leverage `hᵢᵢ = ‖Uᵢ‖²`
//! - condition number `σmax / σmin`
//!
//! Predictor columns are centered and scaled to unit norm before the
//! decomposition and the estimates mapped back afterwards, so predictors in
//! the millions fit as accurately as 0-10 scales. The reported condition
//! number is still that of the unscaled design.
//!
//! A fit either succeeds on exactly the requested terms or fails; predictors
//! are never dropped to make a singular design work.

use crate::data::Dataset;
use crate::error::{AnalysisError, DegenerateVarianceError};
use crate::stats::descriptive::{is_constant, mean};
use essight_core::AnalysisConfig;
use nalgebra::{DMatrix, DVector, SVD};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use tracing::debug;

/// Name of the intercept term in coefficient tables.
pub const INTERCEPT: &str = "Intercept";

/// SSE at or below this fraction of SST counts as a perfect fit.
const PERFECT_FIT_TOLERANCE: f64 = 1e-20;

/// Which model to fit.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub response: String,
    /// Numeric predictors, used as-is.
    pub predictors: Vec<String>,
    /// Categorical predictors, treatment-coded against their first sorted level.
    pub categorical: Vec<String>,
}

impl ModelSpec {
    pub fn new(response: &str, predictors: &[&str]) -> Self {
        Self {
            response: response.to_string(),
            predictors: predictors.iter().map(|p| p.to_string()).collect(),
            categorical: Vec::new(),
        }
    }

    pub fn with_categorical(mut self, categorical: &[&str]) -> Self {
        self.categorical = categorical.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            response: config.response.clone(),
            predictors: config.predictors.clone(),
            categorical: config.categorical_predictors.clone(),
        }
    }

    /// Patsy-style formula, e.g. `impcntr ~ lrscale + agea + C(cntry)`.
    pub fn formula(&self) -> String {
        let terms: Vec<String> = self
            .predictors
            .iter()
            .cloned()
            .chain(self.categorical.iter().map(|c| format!("C({c})")))
            .collect();
        format!("{} ~ {}", self.response, terms.join(" + "))
    }
}

/// One row of the coefficient table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coefficient {
    pub term: String,
    pub estimate: f64,
    pub std_error: f64,
    pub t_stat: f64,
    pub p_value: f64,
}

/// Everything a single OLS fit produces.
#[derive(Debug, Clone, Serialize)]
pub struct RegressionResult {
    pub formula: String,
    pub response: String,
    pub intercept: Coefficient,
    /// Non-intercept terms in design-matrix order.
    pub coefficients: Vec<Coefficient>,
    pub r_squared: f64,
    pub adjusted_r_squared: f64,
    pub f_statistic: f64,
    pub f_p_value: f64,
    pub log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
    /// `None` for a perfect fit.
    pub durbin_watson: Option<f64>,
    pub condition_number: f64,
    /// Residual standard error `σ`.
    pub sigma: f64,
    pub n_obs: usize,
    pub df_model: usize,
    pub df_resid: usize,
    pub excluded_rows: usize,
    /// Observation ids of the complete-case rows, aligned with the vectors below.
    pub observation_ids: Vec<usize>,
    pub residuals: Vec<f64>,
    pub fitted: Vec<f64>,
    pub leverage: Vec<f64>,
    /// Numeric predictor values over the complete-case rows.
    pub predictor_values: BTreeMap<String, Vec<f64>>,
    pub perfect_fit: bool,
}

impl RegressionResult {
    /// All terms including the intercept, intercept first.
    pub fn terms(&self) -> impl Iterator<Item = &Coefficient> {
        std::iter::once(&self.intercept).chain(self.coefficients.iter())
    }

    pub fn coefficient(&self, term: &str) -> Option<&Coefficient> {
        self.terms().find(|c| c.term == term)
    }

    /// Internally studentized residuals `eᵢ / (σ √(1 − hᵢᵢ))`.
    ///
    /// All zero for a perfect fit, and zero where `hᵢᵢ = 1`.
    pub fn studentized_residuals(&self) -> Vec<f64> {
        self.residuals
            .iter()
            .zip(&self.leverage)
            .map(|(e, h)| {
                let denom = self.sigma * (1.0 - h).max(0.0).sqrt();
                if self.perfect_fit || denom <= 0.0 {
                    0.0
                } else {
                    e / denom
                }
            })
            .collect()
    }
}

/// Complete-case design matrix and its bookkeeping.
struct Design {
    x: DMatrix<f64>,
    y: DVector<f64>,
    ids: Vec<usize>,
    terms: Vec<String>,
    predictor_values: BTreeMap<String, Vec<f64>>,
    excluded: usize,
}

fn build_design(dataset: &Dataset, spec: &ModelSpec) -> Result<Design, AnalysisError> {
    if spec.predictors.is_empty() && spec.categorical.is_empty() {
        return Err(AnalysisError::InvalidRequest(
            "a regression needs at least one predictor".to_string(),
        ));
    }
    let mut seen = BTreeSet::new();
    for name in std::iter::once(&spec.response)
        .chain(&spec.predictors)
        .chain(&spec.categorical)
    {
        if !seen.insert(name.as_str()) {
            return Err(AnalysisError::InvalidRequest(format!(
                "variable '{name}' appears more than once in the model"
            )));
        }
    }

    let response = dataset.numeric(&spec.response)?;
    let numeric = spec
        .predictors
        .iter()
        .map(|name| dataset.numeric(name))
        .collect::<Result<Vec<_>, _>>()?;
    let categorical = spec
        .categorical
        .iter()
        .map(|name| dataset.keys(name))
        .collect::<Result<Vec<_>, _>>()?;

    let complete: Vec<usize> = (0..dataset.len())
        .filter(|&row| {
            response[row].is_some()
                && numeric.iter().all(|col| col[row].is_some())
                && categorical.iter().all(|col| col[row].is_some())
        })
        .collect();
    let n = complete.len();

    // Levels come from the complete-case rows only.
    let levels: Vec<Vec<String>> = categorical
        .iter()
        .map(|col| {
            complete
                .iter()
                .filter_map(|&row| col[row].clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        })
        .collect();

    let mut terms: Vec<String> = spec.predictors.clone();
    for (name, lv) in spec.categorical.iter().zip(&levels) {
        terms.extend(lv.iter().skip(1).map(|level| format!("{name}[T.{level}]")));
    }
    let p = terms.len() + 1;

    if n <= p {
        return Err(AnalysisError::InsufficientData {
            available: n,
            required: p + 1,
        });
    }

    let mut predictor_values = BTreeMap::new();
    for (name, col) in spec.predictors.iter().zip(&numeric) {
        let values: Vec<f64> = complete.iter().filter_map(|&row| col[row]).collect();
        if is_constant(&values) {
            return Err(AnalysisError::SingularDesignMatrix {
                reason: format!("predictor '{name}' has zero variance"),
            });
        }
        predictor_values.insert(name.clone(), values);
    }
    for (name, lv) in spec.categorical.iter().zip(&levels) {
        if lv.len() < 2 {
            return Err(AnalysisError::SingularDesignMatrix {
                reason: format!("categorical predictor '{name}' has a single level"),
            });
        }
    }

    let y_values: Vec<f64> = complete.iter().filter_map(|&row| response[row]).collect();
    if is_constant(&y_values) {
        return Err(DegenerateVarianceError {
            variable: spec.response.clone(),
            n,
        }
        .into());
    }

    let mut x = DMatrix::<f64>::zeros(n, p);
    for (i, &row) in complete.iter().enumerate() {
        x[(i, 0)] = 1.0;
        let mut j = 1;
        for col in &numeric {
            x[(i, j)] = col[row].unwrap_or(0.0);
            j += 1;
        }
        for (col, lv) in categorical.iter().zip(&levels) {
            let value = col[row].as_deref();
            for level in lv.iter().skip(1) {
                x[(i, j)] = if value == Some(level.as_str()) { 1.0 } else { 0.0 };
                j += 1;
            }
        }
    }

    Ok(Design {
        x,
        y: DVector::from_vec(y_values),
        ids: complete.iter().map(|&row| dataset.observations()[row].id).collect(),
        terms,
        predictor_values,
        excluded: dataset.len() - n,
    })
}

/// Center every predictor column and scale it to unit norm.
///
/// Returns the transformed design and the upper-triangular `M` with
/// `X M = Xs`, so coefficients on the original scale are `M β_s` and
/// `(XᵀX)⁻¹ = M (XsᵀXs)⁻¹ Mᵀ`.
fn center_and_scale(x: &DMatrix<f64>) -> Result<(DMatrix<f64>, DMatrix<f64>), AnalysisError> {
    let p = x.ncols();
    let mut xs = x.clone();
    let mut transform = DMatrix::identity(p, p);
    for j in 1..p {
        let offset = x.column(j).mean();
        let mut column = xs.column_mut(j);
        column.add_scalar_mut(-offset);
        let scale = column.norm();
        if scale <= 0.0 {
            return Err(AnalysisError::SingularDesignMatrix {
                reason: format!("design column {j} has no variation"),
            });
        }
        column.unscale_mut(scale);
        transform[(j, j)] = 1.0 / scale;
        transform[(0, j)] = -offset / scale;
    }
    Ok((xs, transform))
}

/// `σmax / σmin` of the design as given, so badly scaled inputs still show.
fn raw_condition_number(x: &DMatrix<f64>) -> Result<f64, AnalysisError> {
    let svd = SVD::try_new(x.clone(), false, false, f64::EPSILON, 0).ok_or_else(|| {
        AnalysisError::SingularDesignMatrix {
            reason: "singular value decomposition did not converge".to_string(),
        }
    })?;
    let s = &svd.singular_values;
    let s_max = s.iter().cloned().fold(0.0_f64, f64::max);
    let s_min = s.iter().cloned().fold(f64::INFINITY, f64::min);
    Ok(s_max / s_min)
}

/// Fit `spec` on the complete-case rows of `dataset`.
///
/// Errors:
/// - `InvalidRequest` / `UnknownVariable` for a malformed model
/// - `InsufficientData` when there are not more rows than parameters
/// - `SingularDesignMatrix` for a zero-variance predictor or a rank-deficient design
/// - `DegenerateVariance` when the response is constant
pub fn fit(dataset: &Dataset, spec: &ModelSpec) -> Result<RegressionResult, AnalysisError> {
    let design = build_design(dataset, spec)?;
    let Design {
        x,
        y,
        ids,
        terms,
        predictor_values,
        excluded,
    } = design;
    let (n, p) = x.shape();

    let (xs, transform) = center_and_scale(&x)?;
    let svd = SVD::try_new(xs.clone(), true, true, f64::EPSILON, 0).ok_or_else(|| {
        AnalysisError::SingularDesignMatrix {
            reason: "singular value decomposition did not converge".to_string(),
        }
    })?;
    let (Some(u), Some(v_t)) = (svd.u.as_ref(), svd.v_t.as_ref()) else {
        return Err(AnalysisError::SingularDesignMatrix {
            reason: "singular vectors unavailable".to_string(),
        });
    };
    let s = &svd.singular_values;

    let s_max = s.iter().cloned().fold(0.0_f64, f64::max);
    let s_min = s.iter().cloned().fold(f64::INFINITY, f64::min);
    let tolerance = s_max * n.max(p) as f64 * f64::EPSILON;
    if s_min <= tolerance {
        return Err(AnalysisError::SingularDesignMatrix {
            reason: format!(
                "design matrix is rank-deficient (smallest singular value {s_min:.3e} <= tolerance {tolerance:.3e})"
            ),
        });
    }
    let condition_number = raw_condition_number(&x)?;

    let v = v_t.transpose();
    let uty = u.transpose() * &y;
    let beta_scaled = &v * uty.component_div(s);
    let inv_s2 = s.map(|sv| 1.0 / (sv * sv));
    let beta = &transform * &beta_scaled;
    let xtx_inv =
        &transform * (&v * DMatrix::from_diagonal(&inv_s2) * v.transpose()) * transform.transpose();
    let leverage: Vec<f64> = (0..n).map(|i| u.row(i).norm_squared()).collect();

    // Fitted values from the centered design keep the large offsets out of the sum.
    let fitted_vec = &xs * &beta_scaled;
    let residual_vec = &y - &fitted_vec;
    let sse = residual_vec.norm_squared();
    let y_mean = mean(y.as_slice());
    let sst: f64 = y.iter().map(|v| (v - y_mean).powi(2)).sum();
    let perfect_fit = sse <= PERFECT_FIT_TOLERANCE * sst;

    let df_resid = n - p;
    let df_model = p - 1;
    let sigma2 = sse / df_resid as f64;

    let t_dist = StudentsT::new(0.0, 1.0, df_resid as f64)
        .map_err(|e| AnalysisError::InvalidRequest(format!("t distribution: {e}")))?;
    let mut coefficients: Vec<Coefficient> = (0..p)
        .map(|j| {
            let estimate = beta[j];
            let std_error = if perfect_fit {
                0.0
            } else {
                (sigma2 * xtx_inv[(j, j)]).max(0.0).sqrt()
            };
            let (t_stat, p_value) = if std_error > 0.0 {
                let t = estimate / std_error;
                (t, (2.0 * t_dist.sf(t.abs())).min(1.0))
            } else if estimate == 0.0 {
                (0.0, 1.0)
            } else {
                (estimate.signum() * f64::INFINITY, 0.0)
            };
            Coefficient {
                term: if j == 0 {
                    INTERCEPT.to_string()
                } else {
                    terms[j - 1].clone()
                },
                estimate,
                std_error,
                t_stat,
                p_value,
            }
        })
        .collect();
    let intercept = coefficients.remove(0);

    let r_squared = 1.0 - sse / sst;
    let adjusted_r_squared = 1.0 - (1.0 - r_squared) * (n - 1) as f64 / df_resid as f64;
    let (f_statistic, f_p_value) = if perfect_fit {
        (f64::INFINITY, 0.0)
    } else {
        let f = ((sst - sse) / df_model as f64) / (sse / df_resid as f64);
        let f_dist = FisherSnedecor::new(df_model as f64, df_resid as f64)
            .map_err(|e| AnalysisError::InvalidRequest(format!("F distribution: {e}")))?;
        (f, f_dist.sf(f).clamp(0.0, 1.0))
    };

    let nf = n as f64;
    let log_likelihood = -nf / 2.0 * ((2.0 * std::f64::consts::PI).ln() + (sse / nf).ln() + 1.0);
    let aic = -2.0 * log_likelihood + 2.0 * p as f64;
    let bic = -2.0 * log_likelihood + p as f64 * nf.ln();

    let residuals: Vec<f64> = residual_vec.iter().copied().collect();
    let durbin_watson = if perfect_fit || sse == 0.0 {
        None
    } else {
        let num: f64 = residuals.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
        Some(num / sse)
    };

    debug!(
        formula = %spec.formula(),
        n_obs = n,
        excluded,
        r_squared,
        condition_number,
        "Fitted OLS model"
    );

    Ok(RegressionResult {
        formula: spec.formula(),
        response: spec.response.clone(),
        intercept,
        coefficients,
        r_squared,
        adjusted_r_squared,
        f_statistic,
        f_p_value,
        log_likelihood,
        aic,
        bic,
        durbin_watson,
        condition_number,
        sigma: sigma2.sqrt(),
        n_obs: n,
        df_model,
        df_resid,
        excluded_rows: excluded,
        observation_ids: ids,
        residuals,
        fitted: fitted_vec.iter().copied().collect(),
        leverage,
        predictor_values,
        perfect_fit,
    })
}

/// Plain-text OLS summary: model statistics, then the coefficient table.
pub fn model_summary(result: &RegressionResult) -> String {
    let rule = "=".repeat(78);
    let thin = "-".repeat(78);
    let mut out = String::new();

    let _ = writeln!(out, "{:^78}", "OLS Regression Results");
    let _ = writeln!(out, "{rule}");
    let rows = [
        (
            ("Dep. Variable:", result.response.clone()),
            ("R-squared:", format!("{:.3}", result.r_squared)),
        ),
        (
            ("Model:", "OLS".to_string()),
            ("Adj. R-squared:", format!("{:.3}", result.adjusted_r_squared)),
        ),
        (
            ("Method:", "Least Squares".to_string()),
            ("F-statistic:", format!("{:.4}", result.f_statistic)),
        ),
        (
            ("No. Observations:", result.n_obs.to_string()),
            ("Prob (F-statistic):", format!("{:.4e}", result.f_p_value)),
        ),
        (
            ("Df Residuals:", result.df_resid.to_string()),
            ("Log-Likelihood:", format!("{:.2}", result.log_likelihood)),
        ),
        (
            ("Df Model:", result.df_model.to_string()),
            ("AIC:", format!("{:.2}", result.aic)),
        ),
        (
            ("Excluded Rows:", result.excluded_rows.to_string()),
            ("BIC:", format!("{:.2}", result.bic)),
        ),
    ];
    for ((l_label, l_value), (r_label, r_value)) in rows {
        let _ = writeln!(out, "{l_label:<20}{l_value:>18}   {r_label:<20}{r_value:>17}");
    }
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(
        out,
        "{:<28}{:>12}{:>12}{:>12}{:>12}",
        "", "coef", "std err", "t", "P>|t|"
    );
    let _ = writeln!(out, "{thin}");
    for c in result.terms() {
        let term: String = c.term.chars().take(27).collect();
        let _ = writeln!(
            out,
            "{:<28}{:>12.4}{:>12.4}{:>12.3}{:>12.4}",
            term, c.estimate, c.std_error, c.t_stat, c.p_value
        );
    }
    let _ = writeln!(out, "{rule}");
    let dw = result
        .durbin_watson
        .map(|d| format!("{d:.3}"))
        .unwrap_or_else(|| "n/a".to_string());
    let _ = writeln!(
        out,
        "{:<20}{:>18}   {:<20}{:>17}",
        "Durbin-Watson:",
        dw,
        "Cond. No.",
        format!("{:.3e}", result.condition_number)
    );
    let _ = write!(out, "{rule}");
    out
}
