//! Response Assembler: engine outputs in, rounded contract structs out.

use crate::data::Dataset;
use crate::error::AnalysisError;
use crate::report::contract::{
    CountryResponse, DemographicsResponse, DistributionsResponse, GroupSummary, OverviewResponse,
    RegressionResponse, ScatterPoint, ScatterResponse,
};
use crate::stats::aggregate::{AGE_VARIABLE, COUNTRY_VARIABLE};
use crate::stats::{
    Binning, CorrelationMatrix, ModelSpec, OutlierReport, Overview, RegressionResult, SummaryStat,
    correlate, detect, distribution, fit, group_stats, model_summary, round_to,
};
use essight_core::AnalysisConfig;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::BTreeMap;

const COMPLETENESS_PLACES: u32 = 1;
const MEAN_PLACES: u32 = 2;
const AGE_PLACES: u32 = 1;
const CORRELATION_PLACES: u32 = 3;
const COEFFICIENT_PLACES: u32 = 4;

const IMMIGRATION_VARIABLE: &str = "impcntr";
const POLITICAL_VARIABLE: &str = "lrscale";
const EDUCATION_VARIABLE: &str = "eisced";
const GENDER_VARIABLE: &str = "gndr";

/// Variables summarized per country.
pub const COUNTRY_SUMMARY_VARIABLES: [&str; 3] = [IMMIGRATION_VARIABLE, POLITICAL_VARIABLE, AGE_VARIABLE];

/// Fit, outliers, and correlations for one regression-analysis request.
#[derive(Debug, Clone)]
pub struct RegressionAnalysis {
    pub result: RegressionResult,
    pub outliers: OutlierReport,
    pub correlation: CorrelationMatrix,
}

impl RegressionAnalysis {
    /// Run every engine the regression view needs. Fails as a whole: no
    /// partial analysis is returned.
    pub fn run(dataset: &Dataset, config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        let result = fit(dataset, &ModelSpec::from_config(config))?;
        let outliers = detect(&result, &config.outliers);
        let correlation = correlate(dataset, &config.correlation_variables)?;
        Ok(Self {
            result,
            outliers,
            correlation,
        })
    }

    pub fn to_response(&self) -> RegressionResponse {
        let r = &self.result;
        let coefficients = r
            .terms()
            .map(|c| (c.term.clone(), round_to(c.estimate, COEFFICIENT_PLACES)))
            .collect();
        let p_values = r
            .terms()
            .map(|c| (c.term.clone(), round_to(c.p_value, COEFFICIENT_PLACES)))
            .collect();

        RegressionResponse {
            model_summary: model_summary(r),
            correlation_matrix: correlation_table(&self.correlation),
            diagnostics: diagnostics(r),
            outliers: self.outliers.counts.clone(),
            coefficients,
            p_values,
            excluded_rows: r.excluded_rows,
        }
    }
}

fn format_number(value: f64, places: usize) -> String {
    if value.is_finite() {
        format!("{value:.places$}")
    } else if value.is_nan() {
        "NaN".to_string()
    } else if value > 0.0 {
        "inf".to_string()
    } else {
        "-inf".to_string()
    }
}

fn diagnostics(r: &RegressionResult) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    out.insert("r_squared".into(), format_number(r.r_squared, 4));
    out.insert("adj_r_squared".into(), format_number(r.adjusted_r_squared, 4));
    out.insert("f_statistic".into(), format_number(r.f_statistic, 2));
    out.insert("f_pvalue".into(), format_number(r.f_p_value, 4));
    out.insert("aic".into(), format_number(r.aic, 2));
    out.insert("bic".into(), format_number(r.bic, 2));
    out.insert("log_likelihood".into(), format_number(r.log_likelihood, 2));
    out.insert(
        "durbin_watson".into(),
        r.durbin_watson
            .map(|d| format_number(d, 3))
            .unwrap_or_else(|| "n/a".to_string()),
    );
    out.insert("condition_number".into(), format_number(r.condition_number, 2));
    out.insert("n_obs".into(), r.n_obs.to_string());
    out.insert("df_resid".into(), r.df_resid.to_string());
    out
}

fn correlation_table(matrix: &CorrelationMatrix) -> BTreeMap<String, BTreeMap<String, Option<f64>>> {
    matrix
        .variables()
        .iter()
        .map(|row| {
            let cols = matrix
                .variables()
                .iter()
                .map(|col| {
                    let value = matrix
                        .coefficient(row, col)
                        .map(|r| round_to(r, CORRELATION_PLACES));
                    (col.clone(), value)
                })
                .collect();
            (row.clone(), cols)
        })
        .collect()
}

pub fn overview_response(overview: &Overview) -> OverviewResponse {
    let age_range = match overview.age_range {
        Some((lo, hi)) => format!("{}-{}", lo.trunc() as i64, hi.trunc() as i64),
        None => "n/a".to_string(),
    };
    OverviewResponse {
        total_observations: overview.total_observations,
        total_variables: overview.total_variables,
        total_countries: overview.total_countries,
        age_range,
        completeness: overview
            .completeness
            .iter()
            .map(|(name, pct)| (name.clone(), round_to(*pct, COMPLETENESS_PLACES)))
            .collect(),
    }
}

pub fn distributions_response(dataset: &Dataset) -> Result<DistributionsResponse, AnalysisError> {
    let counts = |variable: &str| distribution(dataset, variable, Binning::Integer).map(|h| h.counts);
    Ok(DistributionsResponse {
        immigration: counts(IMMIGRATION_VARIABLE)?,
        political: counts(POLITICAL_VARIABLE)?,
        age: counts(AGE_VARIABLE)?,
        education: counts(EDUCATION_VARIABLE)?,
    })
}

fn summary(stat: &SummaryStat, places: u32) -> GroupSummary {
    GroupSummary {
        mean: round_to(stat.mean, places),
        std: stat.std.map(|s| round_to(s, places)),
        count: stat.count,
    }
}

fn places_for(variable: &str) -> u32 {
    if variable == AGE_VARIABLE {
        AGE_PLACES
    } else {
        MEAN_PLACES
    }
}

pub fn country_response(dataset: &Dataset) -> Result<CountryResponse, AnalysisError> {
    let stats = group_stats(dataset, COUNTRY_VARIABLE, &COUNTRY_SUMMARY_VARIABLES)?;
    Ok(stats
        .into_iter()
        .map(|(country, vars)| {
            let vars = vars
                .iter()
                .map(|(var, stat)| (var.clone(), summary(stat, places_for(var))))
                .collect();
            (country, vars)
        })
        .collect())
}

/// `group → summary of response` for one grouping column, relabelling keys.
fn response_by(
    dataset: &Dataset,
    group_key: &str,
    response: &str,
    relabel: impl Fn(&str) -> Option<String>,
) -> Result<BTreeMap<String, GroupSummary>, AnalysisError> {
    let stats = group_stats(dataset, group_key, &[response])?;
    Ok(stats
        .into_iter()
        .filter_map(|(group, vars)| {
            let label = relabel(&group)?;
            vars.get(response)
                .map(|stat| (label, summary(stat, places_for(response))))
        })
        .collect())
}

pub fn demographics_response(
    dataset: &Dataset,
    response: &str,
) -> Result<DemographicsResponse, AnalysisError> {
    let same = |g: &str| Some(g.to_string());
    Ok(DemographicsResponse {
        gender: response_by(dataset, GENDER_VARIABLE, response, |g| match g {
            "1" => Some("male".to_string()),
            "2" => Some("female".to_string()),
            _ => None,
        })?,
        age_groups: response_by(dataset, "age_group", response, same)?,
        education: response_by(dataset, "education_group", response, same)?,
        political: response_by(dataset, "political_group", response, same)?,
    })
}

/// Deterministic sample of at most `sample_size` complete points.
///
/// The same dataset, size, and seed always give the same points, in row order.
pub fn scatter_response(
    dataset: &Dataset,
    sample_size: usize,
    seed: u64,
) -> Result<ScatterResponse, AnalysisError> {
    let x = dataset.numeric(POLITICAL_VARIABLE)?;
    let y = dataset.numeric(IMMIGRATION_VARIABLE)?;
    let age = dataset.numeric(AGE_VARIABLE)?;
    let education = dataset.numeric(EDUCATION_VARIABLE)?;
    let country = dataset.keys(COUNTRY_VARIABLE)?;
    let gender = dataset.keys(GENDER_VARIABLE)?;

    let complete: Vec<ScatterPoint> = (0..dataset.len())
        .filter_map(|row| {
            Some(ScatterPoint {
                x: x[row]?,
                y: y[row]?,
                country: country[row].clone()?,
                age: age[row]?.trunc() as i64,
                gender: gender[row].clone()?,
                education: education[row]?.trunc() as i64,
            })
        })
        .collect();

    if complete.len() <= sample_size {
        return Ok(ScatterResponse { data: complete });
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut picked = rand::seq::index::sample(&mut rng, complete.len(), sample_size).into_vec();
    picked.sort_unstable();
    Ok(ScatterResponse {
        data: picked.into_iter().map(|i| complete[i].clone()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Catalog, Cell, clean};
    use crate::stats::overview;
    use pretty_assertions::assert_eq;

    /// 40 respondents across three countries with a clear lrscale effect.
    fn dataset() -> Dataset {
        let n = 40;
        let col = |f: &dyn Fn(usize) -> f64| (0..n).map(|i| Cell::Number(f(i))).collect::<Vec<_>>();
        let raw = Dataset::from_columns(
            Catalog::ess_default(),
            vec![
                (
                    "cntry".into(),
                    (0..n)
                        .map(|i| Cell::Text(["AT", "DE", "FR"][i % 3].to_string()))
                        .collect(),
                ),
                ("impcntr".into(), col(&|i| (1 + ((i % 11) * 3 / 10 + i % 2) % 4) as f64)),
                ("lrscale".into(), col(&|i| (i % 11) as f64)),
                ("hincfel".into(), col(&|i| (1 + (i * 3) % 4) as f64)),
                ("eisced".into(), col(&|i| (1 + (i * 5) % 7) as f64)),
                ("aesfdrk".into(), col(&|i| (1 + (i / 2) % 4) as f64)),
                ("agea".into(), col(&|i| 18.0 + ((i * 7) % 70) as f64)),
                ("gndr".into(), col(&|i| (1 + (i / 3) % 2) as f64)),
            ],
        )
        .unwrap();
        clean(&raw, &["impcntr".to_string()]).unwrap().0
    }

    #[test]
    fn test_overview_response_rounds() {
        let mut ov = overview(&dataset());
        ov.completeness.insert("lrscale".into(), 97.349);
        ov.age_range = Some((18.0, 87.0));
        let resp = overview_response(&ov);
        assert_eq!(resp.completeness["lrscale"], 97.3);
        assert_eq!(resp.age_range, "18-87");
        assert_eq!(resp.total_observations, 40);
    }

    #[test]
    fn test_regression_response_shape() {
        let ds = dataset();
        let analysis = RegressionAnalysis::run(&ds, &AnalysisConfig::default()).unwrap();
        let resp = analysis.to_response();

        assert!(resp.coefficients.contains_key("Intercept"));
        assert!(resp.coefficients.contains_key("lrscale"));
        assert!(resp.coefficients.contains_key("cntry[T.DE]"));
        assert!(resp.coefficients.contains_key("cntry[T.FR]"));
        assert_eq!(resp.coefficients.len(), resp.p_values.len());
        for key in ["r_squared", "adj_r_squared", "f_statistic", "f_pvalue", "aic", "bic"] {
            assert!(resp.diagnostics.contains_key(key), "missing {key}");
        }
        assert_eq!(resp.outliers.len(), 7);
        assert_eq!(resp.correlation_matrix.len(), 5);
        assert_eq!(resp.correlation_matrix["impcntr"]["impcntr"], Some(1.0));
        assert_eq!(
            resp.correlation_matrix["lrscale"]["agea"],
            resp.correlation_matrix["agea"]["lrscale"]
        );
        assert!(resp.model_summary.contains("OLS Regression Results"));
    }

    #[test]
    fn test_distributions_response() {
        let ds = dataset();
        let resp = distributions_response(&ds).unwrap();
        assert_eq!(resp.immigration.len(), 4);
        assert_eq!(resp.political.len(), 11);
        assert_eq!(resp.age.len(), 85);
        assert_eq!(resp.education.len(), 7);
        assert_eq!(resp.immigration.iter().sum::<usize>(), 40);
    }

    #[test]
    fn test_country_and_demographics() {
        let ds = dataset();
        let countries = country_response(&ds).unwrap();
        assert_eq!(countries.keys().collect::<Vec<_>>(), vec!["AT", "DE", "FR"]);
        let at = &countries["AT"];
        assert_eq!(at["impcntr"].count, 14);
        assert!(at.contains_key("agea"));

        let demo = demographics_response(&ds, "impcntr").unwrap();
        assert_eq!(demo.gender.keys().collect::<Vec<_>>(), vec!["female", "male"]);
        assert_eq!(demo.gender["male"].count + demo.gender["female"].count, 40);
        assert_eq!(demo.political.len(), 3);
        for leaf in demo.age_groups.values() {
            assert!(leaf.count >= 1);
        }
    }

    #[test]
    fn test_scatter_sample_is_deterministic() {
        let ds = dataset();
        let all = scatter_response(&ds, 2000, 42).unwrap();
        assert_eq!(all.data.len(), 40);

        let a = scatter_response(&ds, 10, 42).unwrap();
        let b = scatter_response(&ds, 10, 42).unwrap();
        assert_eq!(a.data.len(), 10);
        assert_eq!(a, b);
        assert!(a.data.iter().all(|p| ["AT", "DE", "FR"].contains(&p.country.as_str())));
    }

    #[test]
    fn test_format_number_non_finite() {
        assert_eq!(format_number(f64::INFINITY, 2), "inf");
        assert_eq!(format_number(0.123_456, 4), "0.1235");
    }
}
