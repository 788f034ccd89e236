use thiserror::Error;

use crate::model::ModelFamily;

pub type BandcastResult<T> = Result<T, BandcastError>;

#[derive(Debug, Error)]
pub enum BandcastError {
    #[error(transparent)]
    Alignment(#[from] AlignmentError),

    #[error(transparent)]
    Model(#[from] ModelLoadError),

    #[error(transparent)]
    Empty(#[from] EmptyInputError),

    #[error(transparent)]
    Fetch(#[from] UpstreamFetchError),

    #[error(transparent)]
    Data(#[from] DataError),
}

/// Errors raised while synchronizing features, targets, and dates.
/// Fatal for the table that produced them.
#[derive(Debug, Error)]
pub enum AlignmentError {
    #[error("Required column '{0}' is missing from the table")]
    MissingColumn(String),

    #[error("Column '{column}' is not numeric: {msg}")]
    NonNumericColumn { column: String, msg: String },

    #[error("Length mismatch between {left} ({left_len}) and {right} ({right_len})")]
    LengthMismatch {
        left: String,
        left_len: usize,
        right: String,
        right_len: usize,
    },
}

/// Errors raised while loading serialized model artifacts.
/// A missing or corrupt artifact soft-skips that model family only.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("Model artifact not found for table '{table}', family '{family}'")]
    ArtifactNotFound { table: String, family: ModelFamily },

    #[error("Feature scaler artifact not found for table '{0}'")]
    ScalerNotFound(String),

    #[error("Corrupt model artifact: {0}")]
    Corrupt(String),

    #[error("Artifact for table '{table}' holds family '{found}', expected '{expected}'")]
    WrongFamily {
        table: String,
        expected: ModelFamily,
        found: ModelFamily,
    },

    #[error("Artifact IO failed: {0}")]
    Io(String),
}

/// Zero rows survived cleaning or windowing. Soft-skip for the table;
/// no output row is emitted.
#[derive(Debug, Error)]
pub enum EmptyInputError {
    #[error("No rows survived cleaning for table '{0}'")]
    NoRowsAfterCleaning(String),

    #[error("Insufficient history for table '{table}': {rows} rows, {n_steps} steps required")]
    InsufficientHistory {
        table: String,
        rows: usize,
        n_steps: usize,
    },
}

/// The source dataset is unavailable. Fatal for the whole run.
#[derive(Debug, Error)]
pub enum UpstreamFetchError {
    #[error("Feature store unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to read table '{table}': {msg}")]
    TableRead { table: String, msg: String },
}

/// Errors related to tabular data handling and internal invariants.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Data frame error: {0}")]
    DataFrame(String),

    #[error("Failed timestamp conversion: {0}")]
    TimestampConversion(String),

    #[error("Model family '{family}' does not support {op}")]
    UnsupportedFamily { family: ModelFamily, op: String },

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Missing internal field: {0}")]
    MissingField(String),
}

impl From<polars::error::PolarsError> for BandcastError {
    fn from(e: polars::error::PolarsError) -> Self {
        Self::Data(DataError::DataFrame(e.to_string()))
    }
}
