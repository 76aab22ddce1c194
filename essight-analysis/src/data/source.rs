//! Reading the raw survey table from CSV or JSON.

use crate::data::catalog::Catalog;
use crate::data::dataset::{Cell, Dataset, Observation};
use crate::error::IngestError;
use essight_core::DatasetSourceConfig;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Textual values treated as missing, compared case-insensitively.
pub const MISSING_TOKENS: &[&str] = &["", "na", "n/a", "nan", ".", "null"];

pub fn is_missing_token(raw: &str) -> bool {
    let trimmed = raw.trim();
    MISSING_TOKENS
        .iter()
        .any(|t| trimmed.eq_ignore_ascii_case(t))
}

/// Where a snapshot was read from.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SourceInfo {
    pub format: &'static str,
    pub path: PathBuf,
}

impl SourceInfo {
    pub fn from_config(source: &DatasetSourceConfig) -> Self {
        match source {
            DatasetSourceConfig::Csv { path, .. } => Self {
                format: "csv",
                path: path.clone(),
            },
            DatasetSourceConfig::Json { path } => Self {
                format: "json",
                path: path.clone(),
            },
        }
    }

    /// For datasets built in memory.
    pub fn in_memory() -> Self {
        Self {
            format: "memory",
            path: PathBuf::new(),
        }
    }
}

/// Load the raw (uncleaned) table described by `source`.
pub fn load(source: &DatasetSourceConfig, catalog: &Catalog) -> Result<Dataset, IngestError> {
    let dataset = match source {
        DatasetSourceConfig::Csv { path, delimiter } => load_csv(path, *delimiter, catalog)?,
        DatasetSourceConfig::Json { path } => load_json(path, catalog)?,
    };
    info!(
        rows = dataset.len(),
        columns = dataset.columns().len(),
        "Loaded raw survey table"
    );
    Ok(dataset)
}

fn load_csv(path: &Path, delimiter: char, catalog: &Catalog) -> Result<Dataset, IngestError> {
    if !delimiter.is_ascii() {
        return Err(IngestError::Malformed {
            format: "csv",
            message: format!("delimiter '{delimiter}' is not a single-byte character"),
        });
    }
    let file = std::fs::File::open(path).map_err(|source| IngestError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "Reading CSV source");

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .trim(csv::Trim::All)
        .from_reader(file);

    let columns: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut observations = Vec::new();
    for (id, record) in reader.records().enumerate() {
        let record = record.map_err(csv_error)?;
        let cells = columns
            .iter()
            .zip(record.iter())
            .map(|(column, raw)| parse_cell(catalog, column, raw, id))
            .collect::<Result<Vec<_>, _>>()?;
        observations.push(Observation::new(id, cells));
    }

    Dataset::new(catalog.clone(), columns, observations)
}

fn csv_error(err: csv::Error) -> IngestError {
    IngestError::Malformed {
        format: "csv",
        message: err.to_string(),
    }
}

fn load_json(path: &Path, catalog: &Catalog) -> Result<Dataset, IngestError> {
    let content = std::fs::read_to_string(path).map_err(|source| IngestError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let records: Vec<serde_json::Map<String, Value>> =
        serde_json::from_str(&content).map_err(|e| IngestError::Malformed {
            format: "json",
            message: e.to_string(),
        })?;

    let mut columns: Vec<String> = Vec::new();
    for record in &records {
        for key in record.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let mut observations = Vec::with_capacity(records.len());
    for (id, record) in records.iter().enumerate() {
        let cells = columns
            .iter()
            .map(|column| match record.get(column) {
                None | Some(Value::Null) => Ok(Cell::Missing),
                Some(Value::Number(n)) => json_number(catalog, column, n, id),
                Some(Value::String(s)) => parse_cell(catalog, column, s, id),
                Some(Value::Bool(b)) => parse_cell(catalog, column, &b.to_string(), id),
                Some(other) => Err(IngestError::Malformed {
                    format: "json",
                    message: format!("row {id}, field '{column}': unsupported value {other}"),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        observations.push(Observation::new(id, cells));
    }

    Dataset::new(catalog.clone(), columns, observations)
}

fn json_number(
    catalog: &Catalog,
    column: &str,
    n: &serde_json::Number,
    row: usize,
) -> Result<Cell, IngestError> {
    if catalog.get(column).is_some_and(|s| s.text) {
        return Ok(Cell::Text(n.to_string()));
    }
    n.as_f64()
        .filter(|v| v.is_finite())
        .map(Cell::Number)
        .ok_or_else(|| IngestError::UnparseableNumber {
            row,
            variable: column.to_string(),
            value: n.to_string(),
        })
}

/// Parse one raw field according to its catalog entry.
///
/// Cataloged numeric variables must parse or be a missing token. Uncataloged
/// columns keep whatever shape they have.
fn parse_cell(catalog: &Catalog, column: &str, raw: &str, row: usize) -> Result<Cell, IngestError> {
    let raw = raw.trim();
    if is_missing_token(raw) {
        return Ok(Cell::Missing);
    }
    match catalog.get(column) {
        Some(spec) if spec.text => Ok(Cell::Text(raw.to_string())),
        Some(_) => raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Cell::Number)
            .ok_or_else(|| IngestError::UnparseableNumber {
                row,
                variable: column.to_string(),
                value: raw.to_string(),
            }),
        None => Ok(raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Cell::Number)
            .unwrap_or_else(|| Cell::Text(raw.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "idno,cntry,impcntr,lrscale,hincfel,eisced,aesfdrk,agea,gndr";

    fn write_temp(content: &str, suffix: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_missing_tokens() {
        for token in ["", "NA", "n/a", "NaN", ".", "NULL", "  na "] {
            assert!(is_missing_token(token), "{token:?}");
        }
        assert!(!is_missing_token("0"));
    }

    #[test]
    fn test_load_csv() {
        let file = write_temp(
            &format!("{HEADER}\n1,DE,2,5,2,4,1,34,1\n2,FR,NA,77,1,.,2,61,2\n"),
            ".csv",
        );
        let source = DatasetSourceConfig::Csv {
            path: file.path().to_path_buf(),
            delimiter: ',',
        };
        let ds = load(&source, &Catalog::ess_default()).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.columns().len(), 9);
        assert_eq!(ds.numeric("impcntr").unwrap(), vec![Some(2.0), None]);
        // Sentinels survive loading; the cleaner maps them.
        assert_eq!(ds.numeric("lrscale").unwrap(), vec![Some(5.0), Some(77.0)]);
        assert_eq!(ds.keys("cntry").unwrap()[1].as_deref(), Some("FR"));
        // Uncataloged columns are kept.
        assert!(ds.has_column("idno"));
    }

    #[test]
    fn test_load_csv_semicolon() {
        let file = write_temp(
            "cntry;impcntr;lrscale;hincfel;eisced;aesfdrk;agea;gndr\nAT;1;3;2;5;1;40;2\n",
            ".csv",
        );
        let source = DatasetSourceConfig::Csv {
            path: file.path().to_path_buf(),
            delimiter: ';',
        };
        let ds = load(&source, &Catalog::ess_default()).unwrap();
        assert_eq!(ds.numeric("agea").unwrap(), vec![Some(40.0)]);
    }

    #[test]
    fn test_unparseable_number_fails() {
        let file = write_temp(&format!("{HEADER}\n1,DE,two,5,2,4,1,34,1\n"), ".csv");
        let source = DatasetSourceConfig::Csv {
            path: file.path().to_path_buf(),
            delimiter: ',',
        };
        let err = load(&source, &Catalog::ess_default()).unwrap_err();
        match err {
            IngestError::UnparseableNumber {
                row,
                variable,
                value,
            } => {
                assert_eq!(row, 0);
                assert_eq!(variable, "impcntr");
                assert_eq!(value, "two");
            }
            other => panic!("expected UnparseableNumber, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_required_variable_fails() {
        let file = write_temp("cntry,impcntr\nDE,1\n", ".csv");
        let source = DatasetSourceConfig::Csv {
            path: file.path().to_path_buf(),
            delimiter: ',',
        };
        let err = load(&source, &Catalog::ess_default()).unwrap_err();
        assert!(matches!(err, IngestError::MissingVariable { .. }));
    }

    #[test]
    fn test_unreadable_source() {
        let source = DatasetSourceConfig::Csv {
            path: PathBuf::from("/definitely/not/here.csv"),
            delimiter: ',',
        };
        let err = load(&source, &Catalog::ess_default()).unwrap_err();
        assert!(matches!(err, IngestError::Unreadable { .. }));
    }

    #[test]
    fn test_load_json() {
        let file = write_temp(
            r#"[
                {"cntry": "DE", "impcntr": 2, "lrscale": 5, "hincfel": 2, "eisced": 4, "aesfdrk": 1, "agea": 34, "gndr": 1},
                {"cntry": "FR", "impcntr": null, "lrscale": "NA", "hincfel": 1, "eisced": 3, "aesfdrk": 2, "agea": 61, "gndr": 2}
            ]"#,
            ".json",
        );
        let source = DatasetSourceConfig::Json {
            path: file.path().to_path_buf(),
        };
        let ds = load(&source, &Catalog::ess_default()).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.numeric("impcntr").unwrap(), vec![Some(2.0), None]);
        assert_eq!(ds.numeric("lrscale").unwrap(), vec![Some(5.0), None]);
    }

    #[test]
    fn test_load_json_malformed() {
        let file = write_temp("{not json", ".json");
        let source = DatasetSourceConfig::Json {
            path: file.path().to_path_buf(),
        };
        let err = load(&source, &Catalog::ess_default()).unwrap_err();
        assert!(matches!(err, IngestError::Malformed { format: "json", .. }));
    }
}
