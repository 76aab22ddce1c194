//! Aggregation: overview metrics, grouped summaries, histograms, frequencies.
//!
//! Every function here is a pure function of the dataset it is given.

use crate::data::{Dataset, VariableKind};
use crate::error::AnalysisError;
use crate::stats::descriptive::{SummaryStat, summarize};
use serde::Serialize;
use std::collections::BTreeMap;

/// Column holding the respondent's country code.
pub const COUNTRY_VARIABLE: &str = "cntry";
/// Column holding the respondent's age.
pub const AGE_VARIABLE: &str = "agea";

/// Headline metrics for the loaded dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub total_observations: usize,
    pub total_variables: usize,
    pub total_countries: usize,
    /// `(min, max)` of age, when any age is present.
    pub age_range: Option<(f64, f64)>,
    /// Percentage of non-missing values per cataloged source variable.
    pub completeness: BTreeMap<String, f64>,
}

pub fn overview(dataset: &Dataset) -> Overview {
    let total = dataset.len();

    let total_countries = dataset
        .keys(COUNTRY_VARIABLE)
        .map(|keys| {
            keys.into_iter()
                .flatten()
                .collect::<std::collections::BTreeSet<_>>()
                .len()
        })
        .unwrap_or(0);

    let age_range = dataset.numeric(AGE_VARIABLE).ok().and_then(|ages| {
        let present: Vec<f64> = ages.into_iter().flatten().collect();
        summarize(&present).map(|s| (s.min, s.max))
    });

    let completeness = dataset
        .catalog()
        .source_variables()
        .filter_map(|spec| {
            let present = dataset.non_missing(&spec.name).ok()?;
            let pct = if total == 0 {
                0.0
            } else {
                present as f64 / total as f64 * 100.0
            };
            Some((spec.name.clone(), pct))
        })
        .collect();

    Overview {
        total_observations: total,
        total_variables: dataset.columns().len(),
        total_countries,
        age_range,
        completeness,
    }
}

/// Per-group summaries: `group -> variable -> SummaryStat`.
///
/// Observations with a missing group key are skipped. Groups with no members
/// and (group, variable) pairs with no values are omitted, so every emitted
/// `SummaryStat` has `count >= 1`.
pub fn group_stats(
    dataset: &Dataset,
    group_key: &str,
    value_vars: &[&str],
) -> Result<BTreeMap<String, BTreeMap<String, SummaryStat>>, AnalysisError> {
    let keys = dataset.keys(group_key)?;
    let columns = value_vars
        .iter()
        .map(|name| dataset.numeric(name).map(|values| (*name, values)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut buckets: BTreeMap<String, BTreeMap<&str, Vec<f64>>> = BTreeMap::new();
    for (row, key) in keys.iter().enumerate() {
        let Some(key) = key else { continue };
        let bucket = buckets.entry(key.clone()).or_default();
        for (name, values) in &columns {
            if let Some(v) = values[row] {
                bucket.entry(*name).or_default().push(v);
            }
        }
    }

    Ok(buckets
        .into_iter()
        .filter_map(|(group, vars)| {
            let stats: BTreeMap<String, SummaryStat> = vars
                .into_iter()
                .filter_map(|(name, values)| summarize(&values).map(|s| (name.to_string(), s)))
                .collect();
            (!stats.is_empty()).then_some((group, stats))
        })
        .collect())
}

/// How numeric values are bucketed into a histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binning {
    /// One bin per integer code in the cataloged range.
    Integer,
    /// `n` equal-width bins across the cataloged range; the last is right-closed.
    Equal(usize),
}

/// Bin edges (`counts.len() + 1` of them) and per-bin counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

pub fn distribution(
    dataset: &Dataset,
    variable: &str,
    binning: Binning,
) -> Result<Histogram, AnalysisError> {
    let values = dataset.numeric(variable)?;
    let (lo, hi) = dataset
        .spec(variable)
        .and_then(|s| s.valid_range)
        .ok_or_else(|| {
            AnalysisError::InvalidRequest(format!("variable '{variable}' has no cataloged range"))
        })?;

    match binning {
        Binning::Integer => {
            let first = lo.ceil() as i64;
            let last = hi.floor() as i64;
            let n = (last - first + 1).max(0) as usize;
            let edges = (0..=n).map(|i| first as f64 + i as f64 - 0.5).collect();
            let mut counts = vec![0usize; n];
            for v in values.into_iter().flatten() {
                let code = v.round() as i64;
                if code >= first && code <= last {
                    counts[(code - first) as usize] += 1;
                }
            }
            Ok(Histogram { edges, counts })
        }
        Binning::Equal(bins) => {
            if bins == 0 {
                return Err(AnalysisError::InvalidRequest(
                    "histogram needs at least one bin".to_string(),
                ));
            }
            let width = (hi - lo) / bins as f64;
            let edges = (0..=bins).map(|i| lo + width * i as f64).collect();
            let mut counts = vec![0usize; bins];
            for v in values.into_iter().flatten() {
                if v < lo || v > hi {
                    continue;
                }
                let idx = if width > 0.0 {
                    (((v - lo) / width).floor() as usize).min(bins - 1)
                } else {
                    0
                };
                counts[idx] += 1;
            }
            Ok(Histogram { edges, counts })
        }
    }
}

/// Category counts for a categorical or ordinal variable, missing excluded.
pub fn frequency(dataset: &Dataset, variable: &str) -> Result<BTreeMap<String, usize>, AnalysisError> {
    if dataset
        .spec(variable)
        .is_some_and(|s| s.kind == VariableKind::Continuous)
    {
        return Err(AnalysisError::InvalidRequest(format!(
            "variable '{variable}' is continuous; use a histogram"
        )));
    }
    let mut counts = BTreeMap::new();
    for key in dataset.keys(variable)?.into_iter().flatten() {
        *counts.entry(key).or_insert(0) += 1;
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Catalog, Cell, clean};
    use pretty_assertions::assert_eq;

    fn num(v: f64) -> Cell {
        Cell::Number(v)
    }

    fn dataset() -> Dataset {
        let raw = Dataset::from_columns(
            Catalog::ess_default(),
            vec![
                (
                    "cntry".into(),
                    ["DE", "DE", "FR", "FR", "AT"]
                        .iter()
                        .map(|c| Cell::Text(c.to_string()))
                        .collect(),
                ),
                (
                    "impcntr".into(),
                    vec![num(1.0), num(2.0), num(3.0), num(4.0), num(2.0)],
                ),
                (
                    "lrscale".into(),
                    vec![num(2.0), num(5.0), num(77.0), num(10.0), num(4.0)],
                ),
                (
                    "hincfel".into(),
                    vec![num(1.0), num(2.0), num(3.0), num(4.0), num(1.0)],
                ),
                (
                    "eisced".into(),
                    vec![num(7.0), num(1.0), num(3.0), num(1.0), num(2.0)],
                ),
                (
                    "aesfdrk".into(),
                    vec![num(1.0), num(2.0), num(3.0), num(4.0), num(1.0)],
                ),
                (
                    "agea".into(),
                    vec![num(22.0), num(40.0), num(70.0), num(999.0), num(35.0)],
                ),
                (
                    "gndr".into(),
                    vec![num(1.0), num(2.0), num(2.0), num(1.0), num(1.0)],
                ),
            ],
        )
        .unwrap();
        clean(&raw, &["impcntr".to_string()]).unwrap().0
    }

    #[test]
    fn test_overview() {
        let ds = dataset();
        let ov = overview(&ds);
        assert_eq!(ov.total_observations, 5);
        assert_eq!(ov.total_variables, 8 + 6);
        assert_eq!(ov.total_countries, 3);
        assert_eq!(ov.age_range, Some((22.0, 70.0)));
        assert_eq!(ov.completeness["impcntr"], 100.0);
        assert_eq!(ov.completeness["lrscale"], 80.0);
        assert_eq!(ov.completeness["agea"], 80.0);
        // Derived variables are not part of completeness.
        assert!(!ov.completeness.contains_key("age_group"));
    }

    #[test]
    fn test_group_stats_by_country() {
        let ds = dataset();
        let stats = group_stats(&ds, "cntry", &["impcntr", "lrscale"]).unwrap();
        assert_eq!(stats.keys().collect::<Vec<_>>(), vec!["AT", "DE", "FR"]);

        let de = &stats["DE"]["impcntr"];
        assert_eq!(de.count, 2);
        assert_eq!(de.mean, 1.5);

        let fr = &stats["FR"];
        assert_eq!(fr["lrscale"].count, 1);
        assert_eq!(fr["lrscale"].std, None);

        assert_eq!(stats["AT"]["impcntr"].std, None);
        for vars in stats.values() {
            for s in vars.values() {
                assert!(s.count >= 1);
            }
        }
    }

    #[test]
    fn test_group_stats_omits_empty_pairs() {
        let ds = dataset();
        // Only FR row 3 has agea missing; FR row 2 still has an age.
        let stats = group_stats(&ds, "political_group", &["agea"]).unwrap();
        // lrscale 10 -> Right, but that row has no age.
        assert!(!stats.contains_key("Right"));
        assert_eq!(stats["Left"]["agea"].count, 1);
        assert_eq!(stats["Center"]["agea"].count, 2);
    }

    #[test]
    fn test_group_stats_numeric_key_rendering() {
        let ds = dataset();
        let stats = group_stats(&ds, "gndr", &["impcntr"]).unwrap();
        assert_eq!(stats.keys().collect::<Vec<_>>(), vec!["1", "2"]);
        assert_eq!(stats["1"]["impcntr"].count, 3);
    }

    #[test]
    fn test_integer_distribution() {
        let ds = dataset();
        let hist = distribution(&ds, "impcntr", Binning::Integer).unwrap();
        assert_eq!(hist.counts, vec![1, 2, 1, 1]);
        assert_eq!(hist.edges, vec![0.5, 1.5, 2.5, 3.5, 4.5]);

        let hist = distribution(&ds, "lrscale", Binning::Integer).unwrap();
        assert_eq!(hist.counts.len(), 11);
        assert_eq!(hist.counts.iter().sum::<usize>(), 4);
    }

    #[test]
    fn test_equal_width_distribution() {
        let ds = dataset();
        let hist = distribution(&ds, "lrscale", Binning::Equal(2)).unwrap();
        assert_eq!(hist.edges, vec![0.0, 5.0, 10.0]);
        // 2 and 4 fall in [0,5); 5 and 10 in [5,10].
        assert_eq!(hist.counts, vec![2, 2]);
        assert!(distribution(&ds, "lrscale", Binning::Equal(0)).is_err());
        assert!(distribution(&ds, "cntry", Binning::Integer).is_err());
    }

    #[test]
    fn test_frequency() {
        let ds = dataset();
        let freq = frequency(&ds, "education_group").unwrap();
        assert_eq!(freq["Low"], 3);
        assert_eq!(freq["Medium"], 1);
        assert_eq!(freq["High"], 1);
        assert!(frequency(&ds, "agea").is_err());
    }
}
