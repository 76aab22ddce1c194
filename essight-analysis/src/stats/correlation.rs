//! Pairwise-complete Pearson correlation matrix.

use crate::data::Dataset;
use crate::error::{AnalysisError, DegenerateVarianceError};
use serde::Serialize;

/// One matrix cell: the coefficient (or why it is undefined) and the pairwise n.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationCell {
    pub n: usize,
    pub value: Result<f64, DegenerateVarianceError>,
}

impl CorrelationCell {
    pub fn coefficient(&self) -> Option<f64> {
        self.value.as_ref().ok().copied()
    }
}

/// Symmetric correlation matrix over an ordered variable list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    variables: Vec<String>,
    cells: Vec<Vec<CorrelationCell>>,
}

/// An off-diagonal pair and its coefficient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationPair {
    pub left: String,
    pub right: String,
    pub r: f64,
    pub n: usize,
}

impl CorrelationMatrix {
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v == name)
    }

    pub fn get(&self, row: &str, col: &str) -> Option<&CorrelationCell> {
        let i = self.position(row)?;
        let j = self.position(col)?;
        Some(&self.cells[i][j])
    }

    pub fn coefficient(&self, row: &str, col: &str) -> Option<f64> {
        self.get(row, col).and_then(CorrelationCell::coefficient)
    }

    /// The `k` off-diagonal pairs with the largest `|r|`, strongest first.
    pub fn strongest_pairs(&self, k: usize) -> Vec<CorrelationPair> {
        let mut pairs = Vec::new();
        for i in 0..self.variables.len() {
            for j in (i + 1)..self.variables.len() {
                if let Some(r) = self.cells[i][j].coefficient() {
                    pairs.push(CorrelationPair {
                        left: self.variables[i].clone(),
                        right: self.variables[j].clone(),
                        r,
                        n: self.cells[i][j].n,
                    });
                }
            }
        }
        pairs.sort_by(|a, b| b.r.abs().total_cmp(&a.r.abs()));
        pairs.truncate(k);
        pairs
    }
}

/// Correlate every pair of `variables` over the rows where both are present.
///
/// A degenerate pair (fewer than two rows, or zero variance on that subset)
/// marks only its own cell.
pub fn correlate(dataset: &Dataset, variables: &[String]) -> Result<CorrelationMatrix, AnalysisError> {
    let columns = variables
        .iter()
        .map(|name| dataset.numeric(name))
        .collect::<Result<Vec<_>, _>>()?;

    let k = variables.len();
    let mut cells: Vec<Vec<Option<CorrelationCell>>> = vec![vec![None; k]; k];
    for i in 0..k {
        let own: Vec<(f64, f64)> = columns[i].iter().flatten().map(|v| (*v, *v)).collect();
        cells[i][i] = Some(match pearson(&own) {
            Some(_) => CorrelationCell {
                n: own.len(),
                value: Ok(1.0),
            },
            None => degenerate(&variables[i], own.len()),
        });
        for j in (i + 1)..k {
            let pairs: Vec<(f64, f64)> = columns[i]
                .iter()
                .zip(&columns[j])
                .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
                .collect();
            let cell = match pearson(&pairs) {
                Some(r) => CorrelationCell {
                    n: pairs.len(),
                    value: Ok(r.clamp(-1.0, 1.0)),
                },
                None => {
                    // Name the constant side; below two pairs blame the row variable.
                    let culprit = if pairs.len() < 2 || !has_variance(pairs.iter().map(|p| p.0)) {
                        &variables[i]
                    } else {
                        &variables[j]
                    };
                    degenerate(culprit, pairs.len())
                }
            };
            cells[j][i] = Some(cell.clone());
            cells[i][j] = Some(cell);
        }
    }

    Ok(CorrelationMatrix {
        variables: variables.to_vec(),
        cells: cells
            .into_iter()
            .map(|row| row.into_iter().flatten().collect())
            .collect(),
    })
}

fn degenerate(variable: &str, n: usize) -> CorrelationCell {
    CorrelationCell {
        n,
        value: Err(DegenerateVarianceError {
            variable: variable.to_string(),
            n,
        }),
    }
}

fn has_variance(mut values: impl Iterator<Item = f64>) -> bool {
    match values.next() {
        Some(first) => values.any(|v| v != first),
        None => false,
    }
}

/// Pearson r; `None` below two pairs or when either side is constant.
fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    // Exact check: a constant like 0.1 leaves a tiny nonzero sum of squares.
    if pairs.len() < 2
        || !has_variance(pairs.iter().map(|p| p.0))
        || !has_variance(pairs.iter().map(|p| p.1))
    {
        return None;
    }
    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in pairs {
        let (dx, dy) = (x - mx, y - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return None;
    }
    Some(sxy / (sxx * syy).sqrt())
}
