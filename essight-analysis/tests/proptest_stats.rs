//! Property tests for cleaning, aggregation, and correlation.

use essight_analysis::data::{Catalog, Cell, Dataset, VariableSpec, clean};
use essight_analysis::stats::{correlate, group_stats, overview};
use proptest::prelude::*;

/// A raw ESS code: mostly valid, sometimes a sentinel, out of range, or missing.
fn code(lo: i32, hi: i32, sentinel: i32) -> impl Strategy<Value = Cell> {
    prop_oneof![
        6 => (lo..=hi).prop_map(|v| Cell::Number(f64::from(v))),
        1 => Just(Cell::Number(f64::from(sentinel))),
        1 => Just(Cell::Number(f64::from(hi + 1))),
        1 => Just(Cell::Missing),
    ]
}

fn row() -> impl Strategy<Value = Vec<Cell>> {
    (
        prop::sample::select(vec!["AT", "BE", "DE", "FR"]),
        code(1, 4, 8),
        code(0, 10, 88),
        code(1, 4, 8),
        code(1, 7, 77),
        code(1, 4, 8),
        code(16, 100, 999),
        code(1, 2, 9),
    )
        .prop_map(|(cntry, imp, lr, hinc, eis, aes, age, gndr)| {
            vec![Cell::Text(cntry.to_string()), imp, lr, hinc, eis, aes, age, gndr]
        })
}

fn raw_dataset(rows: Vec<Vec<Cell>>) -> Dataset {
    let names = [
        "cntry", "impcntr", "lrscale", "hincfel", "eisced", "aesfdrk", "agea", "gndr",
    ];
    let columns = names
        .iter()
        .enumerate()
        .map(|(j, name)| (name.to_string(), rows.iter().map(|r| r[j].clone()).collect()))
        .collect();
    Dataset::from_columns(Catalog::ess_default(), columns).unwrap()
}

proptest! {
    #[test]
    fn cleaning_is_idempotent(rows in prop::collection::vec(row(), 0..60)) {
        let required = vec!["impcntr".to_string()];
        let (once, _) = clean(&raw_dataset(rows), &required).unwrap();
        let (twice, report) = clean(&once, &required).unwrap();
        prop_assert!(report.is_noop());
        prop_assert_eq!(once.len(), twice.len());
        prop_assert_eq!(once.observations(), twice.observations());
    }

    #[test]
    fn overview_counts_cleaned_rows(rows in prop::collection::vec(row(), 0..60)) {
        let (cleaned, report) = clean(&raw_dataset(rows), &["impcntr".to_string()]).unwrap();
        let ov = overview(&cleaned);
        prop_assert_eq!(ov.total_observations, cleaned.len());
        prop_assert_eq!(ov.total_observations, report.rows_out);
        for pct in ov.completeness.values() {
            prop_assert!((0.0..=100.0).contains(pct));
        }
    }

    #[test]
    fn group_stats_never_emit_empty(rows in prop::collection::vec(row(), 0..60)) {
        let (cleaned, _) = clean(&raw_dataset(rows), &["impcntr".to_string()]).unwrap();
        let stats = group_stats(&cleaned, "cntry", &["impcntr", "lrscale", "agea"]).unwrap();
        for vars in stats.values() {
            prop_assert!(!vars.is_empty());
            for s in vars.values() {
                prop_assert!(s.count >= 1);
                prop_assert!(s.min <= s.mean && s.mean <= s.max);
            }
        }
    }

    #[test]
    fn correlation_matrix_is_symmetric(
        columns in prop::collection::vec(
            prop::collection::vec(prop::option::weighted(0.85, -50.0f64..50.0), 25),
            2..5,
        )
    ) {
        let names: Vec<String> = (0..columns.len()).map(|i| format!("v{i}")).collect();
        let catalog = Catalog::new(
            names
                .iter()
                .map(|n| VariableSpec::continuous(n, n, -1e3, 1e3, &[]))
                .collect(),
        );
        let ds = Dataset::from_columns(
            catalog,
            names
                .iter()
                .zip(&columns)
                .map(|(n, values)| {
                    (
                        n.clone(),
                        values.iter().map(|v| v.map(Cell::Number).unwrap_or(Cell::Missing)).collect(),
                    )
                })
                .collect(),
        )
        .unwrap();

        let matrix = correlate(&ds, &names).unwrap();
        for a in &names {
            let diag = matrix.get(a, a).unwrap();
            if diag.value.is_ok() {
                prop_assert_eq!(diag.coefficient(), Some(1.0));
            }
            for b in &names {
                let ab = matrix.get(a, b).unwrap();
                let ba = matrix.get(b, a).unwrap();
                prop_assert_eq!(ab, ba);
                if let Some(r) = ab.coefficient() {
                    prop_assert!((-1.0..=1.0).contains(&r));
                }
            }
        }
    }
}
