//! Parquet file writer
use crate::errors::PersistenceError;
use crate::replay::ReplayWindow;
use arrow::array::{
    ArrayRef, Float64Builder, TimestampMicrosecondBuilder, UInt32Builder, UInt64Builder,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

/// Create the schema of the replay series
fn create_replay_schema() -> Schema {
    let timestamp = DataType::Timestamp(TimeUnit::Microsecond, None);
    Schema::new(vec![
        Field::new("window_start", timestamp.clone(), false),
        Field::new("window_end", timestamp, false),
        Field::new("sampling_rate", DataType::Float64, false),
        Field::new("median_bpm", DataType::Float64, false),
        Field::new("bpm", DataType::UInt32, false),
        Field::new("frames", DataType::UInt64, false),
    ])
}

/// A batch writer to write replay windows to a Parquet file.
pub struct BatchWriter {
    writer: Option<ArrowWriter<File>>,
    schema: Arc<Schema>,
}

impl BatchWriter {
    pub fn new(file_path: PathBuf) -> Result<Self, PersistenceError> {
        let file = File::create(&file_path)?;
        let schema = Arc::new(create_replay_schema());
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let writer = ArrowWriter::try_new(file, schema.clone(), Some(props))
            .map_err(|e| PersistenceError::Parquet(e.to_string()))?;
        Ok(Self {
            writer: Some(writer),
            schema,
        })
    }

    /// Write a record batch
    fn write(&mut self, batch: RecordBatch) -> Result<(), PersistenceError> {
        if let Some(writer) = &mut self.writer {
            writer
                .write(&batch)
                .map_err(|e| PersistenceError::Parquet(e.to_string()))
        } else {
            Err(PersistenceError::Parquet(
                "Writer has been finalized".into(),
            ))
        }
    }

    /// Close the underlying file writer. Fails if called twice.
    pub fn finalize(&mut self) -> Result<(), PersistenceError> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| PersistenceError::Parquet("Writer already finalized".into()))?;
        let metadata = writer
            .close()
            .map_err(|e| PersistenceError::Parquet(e.to_string()))?;
        log::debug!("Closed parquet file with {} rows", metadata.num_rows);
        Ok(())
    }

    /// Add a batch of replay windows.
    pub fn add_batch(&mut self, data: &[ReplayWindow]) -> Result<(), PersistenceError> {
        let mut start_builder = TimestampMicrosecondBuilder::with_capacity(data.len());
        let mut end_builder = TimestampMicrosecondBuilder::with_capacity(data.len());
        let mut fs_builder = Float64Builder::with_capacity(data.len());
        let mut median_builder = Float64Builder::with_capacity(data.len());
        let mut bpm_builder = UInt32Builder::with_capacity(data.len());
        let mut frames_builder = UInt64Builder::with_capacity(data.len());

        for w in data {
            start_builder.append_value(w.window_start.and_utc().timestamp_micros());
            end_builder.append_value(w.window_end.and_utc().timestamp_micros());
            fs_builder.append_value(w.sampling_rate_hz);
            median_builder.append_value(w.median_bpm);
            bpm_builder.append_value(w.bpm);
            frames_builder.append_value(w.frames as u64);
        }

        let arrays = vec![
            Arc::new(start_builder.finish()) as ArrayRef,
            Arc::new(end_builder.finish()) as ArrayRef,
            Arc::new(fs_builder.finish()) as ArrayRef,
            Arc::new(median_builder.finish()) as ArrayRef,
            Arc::new(bpm_builder.finish()) as ArrayRef,
            Arc::new(frames_builder.finish()) as ArrayRef,
        ];

        let batch = RecordBatch::try_new(self.schema.clone(), arrays)?;
        self.write(batch)
    }
}
