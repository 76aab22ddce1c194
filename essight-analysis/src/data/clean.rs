//! Cleaning and feature derivation.
//!
//! Rules run in a fixed order:
//! 1. sentinel and out-of-range codes become missing
//! 2. rows missing a required variable are dropped
//! 3. non-integral ordinal/categorical codes become missing
//! 4. derived fields are recomputed from the cleaned values
//!
//! Cleaning never mutates its input and is idempotent: feeding the output back
//! in yields the same rows and an all-zero report.

use crate::data::catalog::{Catalog, VariableSpec};
use crate::data::dataset::{Cell, Dataset, Observation};
use crate::error::IngestError;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// What the cleaner changed, per rule and per field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleaningReport {
    pub rows_in: usize,
    pub rows_out: usize,
    /// Rule 1: cataloged refusal / don't know / no answer codes.
    pub sentinel_to_missing: BTreeMap<String, usize>,
    /// Rule 1: codes outside the cataloged valid range.
    pub out_of_range_to_missing: BTreeMap<String, usize>,
    /// Rule 2: rows dropped, keyed by the first required variable found missing.
    pub rows_dropped: BTreeMap<String, usize>,
    /// Rule 3: values that could not be coerced to the cataloged type.
    pub coerced_to_missing: BTreeMap<String, usize>,
}

impl CleaningReport {
    pub fn total_rows_dropped(&self) -> usize {
        self.rows_dropped.values().sum()
    }

    pub fn total_values_to_missing(&self) -> usize {
        self.sentinel_to_missing.values().sum::<usize>()
            + self.out_of_range_to_missing.values().sum::<usize>()
            + self.coerced_to_missing.values().sum::<usize>()
    }

    /// True when the cleaner changed nothing.
    pub fn is_noop(&self) -> bool {
        self.total_rows_dropped() == 0 && self.total_values_to_missing() == 0
    }
}

/// A derived categorical field: right-closed bins over a cleaned source value.
struct BinnedField {
    name: &'static str,
    source: &'static str,
    /// Upper edges paired with labels; a value falls in the first bin whose
    /// upper edge it does not exceed, provided it exceeds `lower`.
    lower: f64,
    bins: &'static [(f64, &'static str)],
}

const BINNED_FIELDS: &[BinnedField] = &[
    BinnedField {
        name: "age_group",
        source: "agea",
        lower: 0.0,
        bins: &[
            (24.0, "18-24"),
            (34.0, "25-34"),
            (49.0, "35-49"),
            (64.0, "50-64"),
            (100.0, "65+"),
        ],
    },
    BinnedField {
        name: "education_group",
        source: "eisced",
        lower: 0.0,
        bins: &[(2.0, "Low"), (5.0, "Medium"), (7.0, "High")],
    },
    BinnedField {
        name: "income_group",
        source: "hincfel",
        lower: 0.0,
        bins: &[(2.0, "Low"), (4.0, "High")],
    },
    BinnedField {
        name: "political_group",
        source: "lrscale",
        lower: -1.0,
        bins: &[(3.0, "Left"), (6.0, "Center"), (10.0, "Right")],
    },
    BinnedField {
        name: "immigration_group",
        source: "impcntr",
        lower: 0.0,
        bins: &[(2.0, "Liberal"), (4.0, "Restrictive")],
    },
];

impl BinnedField {
    fn label(&self, value: f64) -> Option<&'static str> {
        if value <= self.lower {
            return None;
        }
        self.bins
            .iter()
            .find(|(upper, _)| value <= *upper)
            .map(|(_, label)| *label)
    }
}

fn gender_female(gndr: &Cell) -> Cell {
    match gndr.as_f64() {
        Some(v) if v == 2.0 => Cell::Number(1.0),
        Some(v) if v == 1.0 => Cell::Number(0.0),
        _ => Cell::Missing,
    }
}

/// Rule 1 for a single cell. Returns the cleaned cell and which counter to bump.
fn map_sentinels(spec: &VariableSpec, cell: &Cell) -> (Cell, Option<Rule1>) {
    match cell {
        Cell::Number(v) if spec.is_sentinel(*v) => (Cell::Missing, Some(Rule1::Sentinel)),
        Cell::Number(v) if !spec.in_range(*v) => (Cell::Missing, Some(Rule1::OutOfRange)),
        other => (other.clone(), None),
    }
}

enum Rule1 {
    Sentinel,
    OutOfRange,
}

/// Rule 3 for a single cell: true if the value cannot be kept.
fn fails_coercion(spec: &VariableSpec, cell: &Cell) -> bool {
    match cell {
        Cell::Missing => false,
        Cell::Number(v) => spec.text || (spec.requires_integral() && v.fract() != 0.0),
        Cell::Text(_) => spec.is_numeric(),
    }
}

/// Clean `dataset`, dropping rows missing any of `required`.
///
/// Fails with `IngestError::MissingVariable` if a required variable is not a
/// column of the dataset.
pub fn clean(dataset: &Dataset, required: &[String]) -> Result<(Dataset, CleaningReport), IngestError> {
    let catalog = dataset.catalog();
    let mut report = CleaningReport {
        rows_in: dataset.len(),
        ..Default::default()
    };

    // Derived columns are dropped here and recomputed at the end.
    let kept: Vec<(usize, &String)> = dataset
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, name)| !catalog.get(name).is_some_and(|s| s.derived))
        .collect();
    let specs: Vec<Option<&VariableSpec>> =
        kept.iter().map(|(_, name)| catalog.get(name)).collect();

    let mut required_pos = Vec::with_capacity(required.len());
    for name in required {
        let pos = kept
            .iter()
            .position(|(_, c)| *c == name)
            .ok_or_else(|| IngestError::MissingVariable {
                variable: name.clone(),
            })?;
        required_pos.push(pos);
    }

    let mut rows: Vec<Observation> = Vec::with_capacity(dataset.len());
    'rows: for obs in dataset.observations() {
        let mut cells = Vec::with_capacity(kept.len() + BINNED_FIELDS.len() + 1);
        for ((col, name), spec) in kept.iter().zip(&specs) {
            let cell = obs.get(*col);
            let cell = match spec {
                Some(spec) => {
                    let (cell, hit) = map_sentinels(spec, cell);
                    match hit {
                        Some(Rule1::Sentinel) => {
                            *report.sentinel_to_missing.entry((*name).clone()).or_default() += 1
                        }
                        Some(Rule1::OutOfRange) => {
                            *report
                                .out_of_range_to_missing
                                .entry((*name).clone())
                                .or_default() += 1
                        }
                        None => {}
                    }
                    cell
                }
                None => cell.clone(),
            };
            cells.push(cell);
        }

        // A required value that cannot be coerced counts as missing here, so a
        // second pass never drops a row the first pass kept.
        for &pos in &required_pos {
            let unusable = cells[pos].is_missing()
                || specs[pos].is_some_and(|spec| fails_coercion(spec, &cells[pos]));
            if unusable {
                *report
                    .rows_dropped
                    .entry(kept[pos].1.clone())
                    .or_default() += 1;
                continue 'rows;
            }
        }

        for (i, spec) in specs.iter().enumerate() {
            if let Some(spec) = spec {
                if fails_coercion(spec, &cells[i]) {
                    *report
                        .coerced_to_missing
                        .entry(kept[i].1.clone())
                        .or_default() += 1;
                    cells[i] = Cell::Missing;
                }
            }
        }

        rows.push(Observation::new(obs.id, cells));
    }

    let mut columns: Vec<String> = kept.iter().map(|(_, name)| (*name).clone()).collect();
    let mut catalog: Catalog = catalog.clone();
    derive_fields(&mut columns, &mut rows, &mut catalog);

    report.rows_out = rows.len();
    if report.total_rows_dropped() > 0 {
        warn!(
            dropped = report.total_rows_dropped(),
            by_variable = ?report.rows_dropped,
            "Dropped rows missing required variables"
        );
    }
    info!(
        rows_in = report.rows_in,
        rows_out = report.rows_out,
        recoded = report.total_values_to_missing(),
        "Cleaned survey table"
    );

    let cleaned = Dataset::new(catalog, columns, rows)?;
    Ok((cleaned, report))
}

/// Rule 4: append derived columns computed from the cleaned source values.
fn derive_fields(columns: &mut Vec<String>, rows: &mut Vec<Observation>, catalog: &mut Catalog) {
    let position = |columns: &[String], name: &str| columns.iter().position(|c| c == name);

    let mut derived: Vec<(String, Vec<Cell>)> = Vec::new();
    for field in BINNED_FIELDS {
        if let Some(src) = position(columns, field.source) {
            let values = rows
                .iter()
                .map(|o| {
                    o.get(src)
                        .as_f64()
                        .and_then(|v| field.label(v))
                        .map(|label| Cell::Text(label.to_string()))
                        .unwrap_or(Cell::Missing)
                })
                .collect();
            derived.push((field.name.to_string(), values));
            if !catalog.contains(field.name) {
                catalog.insert(VariableSpec::text(field.name, field.name).into_derived());
            }
        }
    }
    if let Some(src) = position(columns, "gndr") {
        let values = rows.iter().map(|o| gender_female(o.get(src))).collect();
        derived.push(("gender_female".to_string(), values));
        if !catalog.contains("gender_female") {
            catalog.insert(
                VariableSpec::categorical("gender_female", "Respondent is female", 0.0, 1.0, &[])
                    .into_derived(),
            );
        }
    }

    let rebuilt: Vec<Observation> = rows
        .iter()
        .enumerate()
        .map(|(i, obs)| {
            let mut cells = obs.cells().to_vec();
            cells.extend(derived.iter().map(|(_, values)| values[i].clone()));
            Observation::new(obs.id, cells)
        })
        .collect();
    *rows = rebuilt;
    columns.extend(derived.into_iter().map(|(name, _)| name));
}
