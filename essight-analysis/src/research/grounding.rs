//! Grounding facts: short statements about the data and the latest analyses
//! that anchor an assistant answer.

use crate::cache::{CachedResult, ResultKind, ResultsCache};
use crate::data::DatasetSnapshot;
use crate::stats::aggregate::COUNTRY_VARIABLE;
use crate::stats::{CorrelationMatrix, OutlierReport, Overview, RegressionResult};

pub const NO_REGRESSION_FACT: &str = "No regression has been computed in this session.";
pub const NO_CORRELATION_FACT: &str = "No correlation matrix has been computed in this session.";
pub const NO_OVERVIEW_FACT: &str = "No data overview has been computed in this session.";

/// Terms reported individually, strongest |t| first.
const MAX_TERM_FACTS: usize = 4;
/// Correlation pairs reported individually.
const MAX_PAIR_FACTS: usize = 3;

/// Builds the ordered fact list from the current snapshot and the last-results
/// cache. Never runs an engine: anything not cached yields its default fact.
///
/// Headline facts come first so that a short fact budget still covers the
/// dataset, the model, and the strongest correlation.
pub struct GroundingBuilder<'a> {
    snapshot: &'a DatasetSnapshot,
    cache: &'a ResultsCache,
}

impl<'a> GroundingBuilder<'a> {
    pub fn new(snapshot: &'a DatasetSnapshot, cache: &'a ResultsCache) -> Self {
        Self { snapshot, cache }
    }

    pub fn build(&self) -> Vec<String> {
        let generation = self.snapshot.generation;
        let regression = self.cache.get_current(ResultKind::Regression, generation);
        let correlation = self.cache.get_current(ResultKind::Correlation, generation);
        let overview = self.cache.get_current(ResultKind::Overview, generation);

        let regression = regression.as_deref().and_then(|entry| match &entry.result {
            CachedResult::Regression { result, outliers } => Some((result.as_ref(), outliers)),
            _ => None,
        });
        let correlation = correlation.as_deref().and_then(|entry| match &entry.result {
            CachedResult::Correlation(matrix) => Some(matrix),
            _ => None,
        });
        let overview = overview.as_deref().and_then(|entry| match &entry.result {
            CachedResult::Overview(ov) => Some(ov),
            _ => None,
        });

        let mut headline = vec![self.dataset_fact()];
        let mut detail = Vec::new();

        match regression {
            Some((result, outliers)) => {
                headline.push(regression_headline(result));
                detail.extend(term_facts(result));
                detail.push(outlier_fact(outliers));
            }
            None => headline.push(NO_REGRESSION_FACT.to_string()),
        }

        match correlation {
            Some(matrix) => {
                let mut pairs = pair_facts(matrix).into_iter();
                match pairs.next() {
                    Some(first) => headline.push(first),
                    None => headline.push(
                        "No correlation in the latest matrix could be computed.".to_string(),
                    ),
                }
                detail.extend(pairs);
            }
            None => headline.push(NO_CORRELATION_FACT.to_string()),
        }

        match overview {
            Some(ov) => detail.extend(overview_facts(ov)),
            None => detail.push(NO_OVERVIEW_FACT.to_string()),
        }

        headline.extend(detail);
        headline
    }

    fn dataset_fact(&self) -> String {
        let dataset = &self.snapshot.dataset;
        let countries = dataset
            .keys(COUNTRY_VARIABLE)
            .map(|keys| {
                keys.into_iter()
                    .flatten()
                    .collect::<std::collections::BTreeSet<_>>()
                    .len()
            })
            .unwrap_or(0);
        format!(
            "European Social Survey round 11: {} respondents from {} countries after cleaning.",
            dataset.len(),
            countries
        )
    }
}

fn regression_headline(result: &RegressionResult) -> String {
    format!(
        "OLS model {}: R² = {:.3} (adjusted {:.3}), F = {:.2} (p = {:.3e}), n = {}.",
        result.formula,
        result.r_squared,
        result.adjusted_r_squared,
        result.f_statistic,
        result.f_p_value,
        result.n_obs
    )
}

fn term_facts(result: &RegressionResult) -> Vec<String> {
    let mut terms: Vec<_> = result.coefficients.iter().collect();
    terms.sort_by(|a, b| b.t_stat.abs().total_cmp(&a.t_stat.abs()));
    terms
        .into_iter()
        .take(MAX_TERM_FACTS)
        .map(|c| {
            format!(
                "Coefficient for {} on {}: {:+.4} (t = {:.2}, p = {:.4}).",
                c.term, result.response, c.estimate, c.t_stat, c.p_value
            )
        })
        .collect()
}

fn outlier_fact(outliers: &OutlierReport) -> String {
    let flagged: Vec<String> = outliers
        .counts
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(var, count)| format!("{var} {count}"))
        .collect();
    if flagged.is_empty() {
        format!(
            "No outliers beyond |score| {} by {}.",
            outliers.threshold, outliers.method
        )
    } else {
        format!(
            "Outliers beyond |score| {} by {}: {}.",
            outliers.threshold,
            outliers.method,
            flagged.join(", ")
        )
    }
}

fn pair_facts(matrix: &CorrelationMatrix) -> Vec<String> {
    matrix
        .strongest_pairs(MAX_PAIR_FACTS)
        .into_iter()
        .map(|p| {
            format!(
                "Correlation between {} and {}: r = {:.3} (n = {}).",
                p.left, p.right, p.r, p.n
            )
        })
        .collect()
}

fn overview_facts(ov: &Overview) -> Vec<String> {
    let mut facts = Vec::new();
    if let Some((lo, hi)) = ov.age_range {
        facts.push(format!("Respondent ages range from {lo} to {hi}."));
    }
    if let Some((var, pct)) = ov
        .completeness
        .iter()
        .min_by(|a, b| a.1.total_cmp(b.1))
    {
        facts.push(format!("Least complete variable: {var} at {pct:.1}% non-missing."));
    }
    facts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Catalog, Cell, Dataset, DatasetStore, SourceInfo};
    use crate::stats::{ModelSpec, correlate, detect, fit, overview};
    use essight_core::OutlierConfig;

    fn store() -> DatasetStore {
        let n = 12;
        let num = |f: &dyn Fn(usize) -> f64| (0..n).map(|i| Cell::Number(f(i))).collect::<Vec<_>>();
        let raw = Dataset::from_columns(
            Catalog::ess_default(),
            vec![
                (
                    "cntry".into(),
                    (0..n)
                        .map(|i| Cell::Text(if i % 2 == 0 { "DE" } else { "FR" }.into()))
                        .collect(),
                ),
                ("impcntr".into(), num(&|i| (1 + i % 4) as f64)),
                ("lrscale".into(), num(&|i| (i % 11) as f64)),
                ("hincfel".into(), num(&|i| (1 + (i * 7) % 4) as f64)),
                ("eisced".into(), num(&|i| (1 + i % 7) as f64)),
                ("aesfdrk".into(), num(&|i| (1 + (i / 3) % 4) as f64)),
                ("agea".into(), num(&|i| 20.0 + 4.0 * i as f64)),
                ("gndr".into(), num(&|i| (1 + i % 2) as f64)),
            ],
        )
        .unwrap();
        DatasetStore::from_raw(
            raw,
            Catalog::ess_default(),
            vec!["impcntr".into()],
            SourceInfo::in_memory(),
        )
        .unwrap()
    }

    #[test]
    fn test_defaults_when_cache_empty() {
        let store = store();
        let snapshot = store.snapshot();
        let cache = ResultsCache::new();
        let facts = GroundingBuilder::new(&snapshot, &cache).build();
        assert_eq!(facts.len(), 4);
        assert!(facts[0].contains("12 respondents from 2 countries"));
        assert_eq!(facts[1], NO_REGRESSION_FACT);
        assert_eq!(facts[2], NO_CORRELATION_FACT);
        assert_eq!(facts[3], NO_OVERVIEW_FACT);
    }

    #[test]
    fn test_facts_from_cached_results() {
        let store = store();
        let snapshot = store.snapshot();
        let cache = ResultsCache::new();
        let ds = &snapshot.dataset;

        let result = fit(ds, &ModelSpec::new("impcntr", &["lrscale", "agea"])).unwrap();
        let outliers = detect(&result, &OutlierConfig::default());
        cache.publish(
            snapshot.generation,
            CachedResult::Regression {
                result: Box::new(result),
                outliers,
            },
        );
        let vars: Vec<String> = ["impcntr", "lrscale", "agea"].iter().map(|s| s.to_string()).collect();
        cache.publish(snapshot.generation, CachedResult::Correlation(correlate(ds, &vars).unwrap()));
        cache.publish(snapshot.generation, CachedResult::Overview(overview(ds)));

        let facts = GroundingBuilder::new(&snapshot, &cache).build();
        assert!(facts[1].starts_with("OLS model impcntr ~ lrscale + agea"));
        assert!(facts[2].starts_with("Correlation between"));
        assert!(facts.iter().any(|f| f.starts_with("Coefficient for lrscale")));
        assert!(facts.iter().any(|f| f.contains("Outliers") || f.contains("No outliers")));
        assert!(facts.iter().any(|f| f.starts_with("Respondent ages range")));
        assert!(!facts.iter().any(|f| f == NO_REGRESSION_FACT));
    }

    #[test]
    fn test_entries_from_other_generation_ignored() {
        let store = store();
        let snapshot = store.snapshot();
        let cache = ResultsCache::new();
        cache.publish(
            snapshot.generation + 1,
            CachedResult::Overview(overview(&snapshot.dataset)),
        );
        let facts = GroundingBuilder::new(&snapshot, &cache).build();
        assert!(facts.contains(&NO_OVERVIEW_FACT.to_string()));
    }
}
