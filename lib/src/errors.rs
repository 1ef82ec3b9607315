//! Error types used by this lib.
use thiserror::Error;

/// Reason a single frame was left out of an estimation window.
///
/// These never reach the caller of the service; they are counted and logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameRejection {
    #[error("Sample vector of length {actual} does not match expected length {expected}")]
    UnexpectedLength { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error in frame store: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Could not encode sample vector: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Frame store lock was poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Malformed CSV row: {0}")]
    Csv(#[from] csv::Error),
    #[error("Payload is missing the 'frames' list")]
    MissingFrames,
    #[error("Could not parse receipt timestamp '{0}'")]
    InvalidTimestamp(String),
    #[error("Malformed serial row: {0}")]
    MalformedRow(String),
    #[error("IO error while reading payloads: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not store frames: {0}")]
    Store(#[from] StoreError),
    #[error("Ingestion writer is no longer running")]
    WriterGone,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[cfg(feature = "parquet")]
    #[error("Error in writing parquet file: {0}")]
    Parquet(String),
    #[error("Error in writing CSV file: {0}")]
    Csv(#[from] csv::Error),
    #[error("Unsupported output file: {0}")]
    UnsupportedFile(String),
    #[error("IO error in file persistence: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "parquet")]
impl From<arrow::error::ArrowError> for PersistenceError {
    fn from(e: arrow::error::ArrowError) -> Self {
        PersistenceError::Parquet(e.to_string())
    }
}
