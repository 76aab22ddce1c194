//! In-memory survey table.

use crate::data::catalog::{Catalog, VariableSpec};
use crate::error::{AnalysisError, IngestError};
use serde::Serialize;
use std::collections::HashMap;

/// A single value in the table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Missing,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Render the cell as a grouping key. Integral numbers print without a
    /// fractional part, so code `1.0` becomes `"1"`.
    pub fn as_key(&self) -> Option<String> {
        match self {
            Cell::Missing => None,
            Cell::Number(v) if v.fract() == 0.0 && v.abs() < 1e15 => Some(format!("{}", *v as i64)),
            Cell::Number(v) => Some(v.to_string()),
            Cell::Text(s) => Some(s.clone()),
        }
    }
}

/// One respondent record. `id` is the zero-based row index in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub id: usize,
    cells: Vec<Cell>,
}

impl Observation {
    pub fn new(id: usize, cells: Vec<Cell>) -> Self {
        Self { id, cells }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn get(&self, column: usize) -> &Cell {
        self.cells.get(column).unwrap_or(&Cell::Missing)
    }
}

/// Ordered observations plus the catalog describing their columns.
///
/// Never mutated after construction; cleaning builds a new `Dataset`.
#[derive(Debug, Clone)]
pub struct Dataset {
    catalog: Catalog,
    columns: Vec<String>,
    index: HashMap<String, usize>,
    observations: Vec<Observation>,
}

impl Dataset {
    /// Build a dataset, checking that every observation has one cell per column
    /// and that every source variable in the catalog is present.
    pub fn new(
        catalog: Catalog,
        columns: Vec<String>,
        observations: Vec<Observation>,
    ) -> Result<Self, IngestError> {
        let index: HashMap<String, usize> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        if index.len() != columns.len() {
            return Err(IngestError::Malformed {
                format: "table",
                message: "duplicate column names".to_string(),
            });
        }
        for spec in catalog.source_variables() {
            if !index.contains_key(&spec.name) {
                return Err(IngestError::MissingVariable {
                    variable: spec.name.clone(),
                });
            }
        }
        if let Some(bad) = observations.iter().find(|o| o.cells.len() != columns.len()) {
            return Err(IngestError::Malformed {
                format: "table",
                message: format!(
                    "row {} has {} cells, expected {}",
                    bad.id,
                    bad.cells.len(),
                    columns.len()
                ),
            });
        }
        Ok(Self {
            catalog,
            columns,
            index,
            observations,
        })
    }

    /// Build a dataset from named columns of equal length. Row ids are 0..n.
    pub fn from_columns(
        catalog: Catalog,
        columns: Vec<(String, Vec<Cell>)>,
    ) -> Result<Self, IngestError> {
        let n = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
        if let Some((name, _)) = columns.iter().find(|(_, c)| c.len() != n) {
            return Err(IngestError::Malformed {
                format: "table",
                message: format!("column '{name}' has a different length"),
            });
        }
        let names: Vec<String> = columns.iter().map(|(name, _)| name.clone()).collect();
        let mut rows: Vec<Vec<Cell>> = (0..n).map(|_| Vec::with_capacity(names.len())).collect();
        for (_, cells) in columns {
            for (row, cell) in rows.iter_mut().zip(cells) {
                row.push(cell);
            }
        }
        let observations = rows
            .into_iter()
            .enumerate()
            .map(|(id, cells)| Observation::new(id, cells))
            .collect();
        Self::new(catalog, names, observations)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    fn require_column(&self, name: &str) -> Result<usize, AnalysisError> {
        self.column_index(name)
            .ok_or_else(|| AnalysisError::UnknownVariable(name.to_string()))
    }

    /// Catalog entry for a column, if it is cataloged.
    pub fn spec(&self, name: &str) -> Option<&VariableSpec> {
        self.catalog.get(name)
    }

    /// Column `name` as numbers, `None` where missing.
    ///
    /// Fails for unknown columns and for text variables.
    pub fn numeric(&self, name: &str) -> Result<Vec<Option<f64>>, AnalysisError> {
        let col = self.require_column(name)?;
        if self.spec(name).is_some_and(|s| s.text) {
            return Err(AnalysisError::InvalidRequest(format!(
                "variable '{name}' is not numeric"
            )));
        }
        self.observations
            .iter()
            .map(|o| match o.get(col) {
                Cell::Missing => Ok(None),
                Cell::Number(v) => Ok(Some(*v)),
                Cell::Text(_) => Err(AnalysisError::InvalidRequest(format!(
                    "variable '{name}' is not numeric"
                ))),
            })
            .collect()
    }

    /// Column `name` rendered as grouping keys, `None` where missing.
    pub fn keys(&self, name: &str) -> Result<Vec<Option<String>>, AnalysisError> {
        let col = self.require_column(name)?;
        Ok(self.observations.iter().map(|o| o.get(col).as_key()).collect())
    }

    /// Number of non-missing cells in column `name`.
    pub fn non_missing(&self, name: &str) -> Result<usize, AnalysisError> {
        let col = self.require_column(name)?;
        Ok(self
            .observations
            .iter()
            .filter(|o| !o.get(col).is_missing())
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::catalog::VariableSpec;

    fn small_catalog() -> Catalog {
        Catalog::new(vec![
            VariableSpec::continuous("x", "x", 0.0, 10.0, &[]),
            VariableSpec::text("label", "label"),
        ])
    }

    #[test]
    fn test_from_columns() {
        let ds = Dataset::from_columns(
            small_catalog(),
            vec![
                (
                    "x".into(),
                    vec![Cell::Number(1.0), Cell::Missing, Cell::Number(2.5)],
                ),
                (
                    "label".into(),
                    vec![
                        Cell::Text("a".into()),
                        Cell::Text("b".into()),
                        Cell::Missing,
                    ],
                ),
            ],
        )
        .unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.numeric("x").unwrap(), vec![Some(1.0), None, Some(2.5)]);
        assert_eq!(ds.non_missing("label").unwrap(), 2);
        assert_eq!(ds.observations()[2].id, 2);
    }

    #[test]
    fn test_numeric_rejects_text_and_unknown() {
        let ds = Dataset::from_columns(
            small_catalog(),
            vec![
                ("x".into(), vec![Cell::Number(1.0)]),
                ("label".into(), vec![Cell::Text("a".into())]),
            ],
        )
        .unwrap();
        assert!(matches!(
            ds.numeric("label"),
            Err(AnalysisError::InvalidRequest(_))
        ));
        assert!(matches!(
            ds.numeric("nope"),
            Err(AnalysisError::UnknownVariable(_))
        ));
    }

    #[test]
    fn test_missing_source_variable() {
        let err = Dataset::from_columns(
            small_catalog(),
            vec![("x".into(), vec![Cell::Number(1.0)])],
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::MissingVariable { variable } if variable == "label"));
    }

    #[test]
    fn test_cell_keys() {
        assert_eq!(Cell::Number(1.0).as_key().as_deref(), Some("1"));
        assert_eq!(Cell::Number(2.5).as_key().as_deref(), Some("2.5"));
        assert_eq!(Cell::Text("DE".into()).as_key().as_deref(), Some("DE"));
        assert_eq!(Cell::Missing.as_key(), None);
    }
}
