// Error taxonomy for the analysis pipeline and the JSON error body returned to callers.
use serde::Serialize;
use thiserror::Error;

/// Everything that can go wrong between reading the archive and producing a report.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("archive not found at {0}")]
    NotFound(String),

    #[error("archive is corrupt or not a valid ZIP file: {0}")]
    CorruptArchive(String),

    #[error("the ZIP archive does not contain any CSV file")]
    NoDataFile,

    #[error("error reading the data file: {0}")]
    Parse(String),

    #[error("the CSV is missing required columns: {}", .missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("invalid parameter {name}: {message}")]
    InvalidParameter { name: &'static str, message: String },

    #[error("the dataset contains no rows")]
    EmptyDataset,

    #[error("metric computation failed: {0}")]
    MetricComputation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AnalysisError {
    /// Machine-readable kind, stable across message wording changes.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::NotFound(_) => "not_found",
            AnalysisError::CorruptArchive(_) => "corrupt_archive",
            AnalysisError::NoDataFile => "no_data_file",
            AnalysisError::Parse(_) => "parse",
            AnalysisError::Schema { .. } => "schema",
            AnalysisError::InvalidParameter { .. } => "invalid_parameter",
            AnalysisError::EmptyDataset => "empty_dataset",
            AnalysisError::MetricComputation(_) => "metric_computation",
            AnalysisError::Internal(_) => "internal",
        }
    }
}

impl From<csv::Error> for AnalysisError {
    fn from(err: csv::Error) -> Self {
        AnalysisError::Parse(err.to_string())
    }
}

impl From<linfa_clustering::KMeansError> for AnalysisError {
    fn from(err: linfa_clustering::KMeansError) -> Self {
        AnalysisError::Internal(format!("k-means fit failed: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Body returned for any failed request. `error` keeps the plain message field
/// older clients read; `kind` is what programs should branch on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub error: String,
    pub kind: String,
}

impl ErrorReport {
    pub fn new(kind: &str, message: impl Into<String>) -> Self {
        ErrorReport {
            error: message.into(),
            kind: kind.to_string(),
        }
    }
}

impl From<&AnalysisError> for ErrorReport {
    fn from(err: &AnalysisError) -> Self {
        ErrorReport::new(err.kind(), err.to_string())
    }
}
