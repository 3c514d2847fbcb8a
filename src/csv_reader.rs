use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use csv::StringRecord;
use ndarray::{Array1, Array2};
use serde::Deserialize;
use tracing::{debug, warn};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::{AnalysisError, Result};

/// Feature columns fed to k-means, in matrix column order.
pub const FEATURE_COLUMNS: [&str; 7] = ["V17", "V14", "V16", "V12", "V10", "V11", "V18"];
/// Fraud indicator column (1 = fraudulent).
pub const LABEL_COLUMN: &str = "Class";
/// Archive entries with this suffix are treated as data files.
pub const DATA_FILE_SUFFIX: &str = ".csv";

/// Selected features and labels for every row of the data file.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub features: Array2<f64>,
    pub labels: Array1<i64>,
}

impl Dataset {
    pub fn n_rows(&self) -> usize {
        self.labels.len()
    }
}

/// One row of the transaction file. Columns not named here are skipped by serde.
#[derive(Debug, Deserialize, Clone)]
pub struct Transaction {
    #[serde(rename = "V17")]
    pub v17: f64,
    #[serde(rename = "V14")]
    pub v14: f64,
    #[serde(rename = "V16")]
    pub v16: f64,
    #[serde(rename = "V12")]
    pub v12: f64,
    #[serde(rename = "V10")]
    pub v10: f64,
    #[serde(rename = "V11")]
    pub v11: f64,
    #[serde(rename = "V18")]
    pub v18: f64,
    #[serde(rename = "Class")]
    pub class: i64,
}

impl Transaction {
    // Same order as FEATURE_COLUMNS.
    pub fn to_feature_vector(&self) -> [f64; 7] {
        [self.v17, self.v14, self.v16, self.v12, self.v10, self.v11, self.v18]
    }
}

/// Checks that every feature column and the label column are in the header row.
pub fn validate_schema(headers: &StringRecord, features: &[&str], label: &str) -> Result<()> {
    let missing: Vec<String> = features
        .iter()
        .chain(std::iter::once(&label))
        .filter(|name| !headers.iter().any(|h| h == **name))
        .map(|name| name.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AnalysisError::Schema { missing })
    }
}

// Opens the archive and parses the first CSV entry in listing order.
pub fn load_dataset(path: &Path) -> Result<Dataset> {
    let file = File::open(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => AnalysisError::NotFound(path.display().to_string()),
        _ => AnalysisError::Parse(err.to_string()),
    })?;

    let mut archive = ZipArchive::new(file).map_err(|err| match err {
        ZipError::InvalidArchive(msg) | ZipError::UnsupportedArchive(msg) => {
            AnalysisError::CorruptArchive(msg.to_string())
        }
        other => AnalysisError::Parse(other.to_string()),
    })?;

    let mut candidates = Vec::new();
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|err| AnalysisError::Parse(err.to_string()))?;
        if !entry.is_dir() && entry.name().ends_with(DATA_FILE_SUFFIX) {
            candidates.push((i, entry.name().to_string()));
        }
    }

    let (index, name) = candidates.first().cloned().ok_or(AnalysisError::NoDataFile)?;
    if candidates.len() > 1 {
        warn!(
            used = %name,
            ignored = candidates.len() - 1,
            "archive holds several CSV files; only the first is read"
        );
    }
    debug!(entry = %name, archive = %path.display(), "reading data file");

    let entry = archive
        .by_index(index)
        .map_err(|err| AnalysisError::Parse(err.to_string()))?;
    read_dataset(entry)
}

/// Parses CSV text into a dataset, keeping only the selected columns.
pub fn read_dataset<R: Read>(reader: R) -> Result<Dataset> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers()?.clone();
    validate_schema(&headers, &FEATURE_COLUMNS, LABEL_COLUMN)?;

    let mut values = Vec::new();
    let mut labels = Vec::new();
    for (idx, result) in rdr.deserialize::<Transaction>().enumerate() {
        let tx = result.map_err(|err| parse_error(err, &headers))?;
        let features = tx.to_feature_vector();
        if let Some(pos) = features.iter().position(|v| !v.is_finite()) {
            return Err(AnalysisError::Parse(format!(
                "row {}: column {} is not a finite number",
                idx + 1,
                FEATURE_COLUMNS[pos]
            )));
        }
        values.extend_from_slice(&features);
        labels.push(tx.class);
    }

    if labels.is_empty() {
        return Err(AnalysisError::EmptyDataset);
    }

    let features = Array2::from_shape_vec((labels.len(), FEATURE_COLUMNS.len()), values)
        .map_err(|err| AnalysisError::Internal(err.to_string()))?;

    Ok(Dataset {
        features,
        labels: Array1::from(labels),
    })
}

// Row numbers count data rows from 1; the header is record 0.
fn parse_error(err: csv::Error, headers: &StringRecord) -> AnalysisError {
    let row = err.position().map(|pos| pos.record()).unwrap_or(0);
    if let csv::ErrorKind::Deserialize { err: de, .. } = err.kind() {
        let column = de
            .field()
            .and_then(|field| headers.get(field as usize))
            .unwrap_or("?");
        return AnalysisError::Parse(format!("row {row}: column {column}: {}", de.kind()));
    }
    AnalysisError::Parse(format!("row {row}: {err}"))
}
