use crate::errors::PersistenceError;
use crate::frame::format_timestamp;
use crate::replay::ReplayWindow;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};

#[cfg(feature = "parquet")]
mod parquet;

/// File formats supported for writing replay results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Comma separated values with a header row
    Csv,
    /// Apache Parquet file
    #[cfg(feature = "parquet")]
    Parquet,
}

/// Struct specifying a file to write replay results to
#[derive(Debug, Clone)]
pub struct ReplayFile {
    /// Path to file
    pub file_path: PathBuf,
    /// Type of file
    pub file_type: FileType,
}

impl ReplayFile {
    /// Infers the file type from the path's extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let file_type = extension
            .parse::<FileType>()
            .map_err(|_| PersistenceError::UnsupportedFile(path.display().to_string()))?;

        Ok(Self {
            file_path: path.to_path_buf(),
            file_type,
        })
    }
}

/// One replay window as written to CSV.
#[derive(Serialize)]
struct CsvRow {
    window_start: String,
    window_end: String,
    sampling_rate: f64,
    median_bpm: f64,
    bpm: u32,
}

impl From<&ReplayWindow> for CsvRow {
    fn from(w: &ReplayWindow) -> Self {
        Self {
            window_start: format_timestamp(&w.window_start),
            window_end: format_timestamp(&w.window_end),
            sampling_rate: w.sampling_rate_hz,
            median_bpm: w.median_bpm,
            bpm: w.bpm,
        }
    }
}

/// A writer to handle file writes
#[allow(clippy::large_enum_variant)]
pub enum Writer {
    Csv(csv::Writer<File>),
    #[cfg(feature = "parquet")]
    Parquet(parquet::BatchWriter),
}

impl Writer {
    /// Create a new file writer.
    ///
    /// # Arguments
    ///
    /// * `file` - The file to write to
    pub fn new(file: ReplayFile) -> Result<Self, PersistenceError> {
        log::info!(
            "Writing replay results to {} ({:?})",
            file.file_path.display(),
            file.file_type
        );
        let writer = match file.file_type {
            FileType::Csv => Self::Csv(csv::Writer::from_path(file.file_path)?),
            #[cfg(feature = "parquet")]
            FileType::Parquet => Self::Parquet(parquet::BatchWriter::new(file.file_path)?),
        };

        Ok(writer)
    }

    /// Add a batch of windows to the writer
    pub fn add_batch(&mut self, data: &[ReplayWindow]) -> Result<(), PersistenceError> {
        match self {
            Writer::Csv(writer) => {
                for window in data {
                    writer.serialize(CsvRow::from(window))?;
                }
                Ok(())
            }
            #[cfg(feature = "parquet")]
            Writer::Parquet(writer) => writer.add_batch(data),
        }
    }

    /// Finalize the file writes, i.e. clear all buffers and make sure
    /// the data is actually written to file.
    pub fn finalize(&mut self) -> Result<(), PersistenceError> {
        match self {
            Writer::Csv(writer) => Ok(writer.flush()?),
            #[cfg(feature = "parquet")]
            Writer::Parquet(writer) => writer.finalize(),
        }
    }
}

/// Writes all windows to `file` in one go.
pub fn save(file: ReplayFile, data: &[ReplayWindow]) -> Result<(), PersistenceError> {
    let mut writer = Writer::new(file)?;
    writer.add_batch(data)?;
    writer.finalize()
}

impl std::str::FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(FileType::Csv),
            #[cfg(feature = "parquet")]
            "parquet" => Ok(FileType::Parquet),
            _ => Err(format!("Invalid file type: {}", s)),
        }
    }
}
