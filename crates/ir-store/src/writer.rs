//! Batched Parquet writer for artifact tables.
//!
//! Provides buffered writes with automatic flushing and crash safety:
//! data lands in a `.parquet.tmp` file and is atomically renamed on close,
//! so a crashed batch run never leaves a partially-written artifact behind
//! where a reader would pick it up.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::Schema;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, Encoding, ZstdLevel};
use parquet::file::properties::{WriterProperties, WriterVersion};
use thiserror::Error;

use crate::schema::TableName;

/// Errors from artifact store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Writer not initialized")]
    NotInitialized,

    #[error("Buffer empty")]
    EmptyBuffer,

    #[error("Unexpected column '{column}' type in {table}")]
    SchemaMismatch { table: String, column: String },
}

/// Configuration for the batched writer.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Directory for artifact files.
    pub base_dir: PathBuf,

    /// Compression codec.
    pub compression: Compression,

    /// Row group size in bytes.
    pub row_group_size: usize,

    /// Maximum rows to buffer before flushing.
    pub batch_size: usize,

    /// Run ID suffix for file naming.
    pub run_suffix: String,
}

impl WriterConfig {
    /// Create config with defaults.
    pub fn new(base_dir: PathBuf, run_suffix: String) -> Self {
        WriterConfig {
            base_dir,
            compression: Compression::ZSTD(ZstdLevel::try_new(3).unwrap_or_default()),
            row_group_size: 512 * 1024,
            batch_size: crate::DEFAULT_BATCH_SIZE,
            run_suffix,
        }
    }

    /// Use snappy compression instead of zstd.
    pub fn with_snappy(mut self) -> Self {
        self.compression = Compression::SNAPPY;
        self
    }

    /// Set custom batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }
}

/// Batched writer for a single artifact table.
pub struct BatchedWriter {
    table: TableName,
    schema: Arc<Schema>,
    config: WriterConfig,
    buffer: Vec<RecordBatch>,
    rows_buffered: usize,
    output_path: Option<PathBuf>,
    temp_path: Option<PathBuf>,
    writer: Option<ArrowWriter<File>>,
}

impl BatchedWriter {
    /// Create a new batched writer for a table.
    pub fn new(table: TableName, schema: Arc<Schema>, config: WriterConfig) -> Self {
        BatchedWriter {
            table,
            schema,
            config,
            buffer: Vec::new(),
            rows_buffered: 0,
            output_path: None,
            temp_path: None,
            writer: None,
        }
    }

    /// Write a record batch to the buffer.
    ///
    /// If the buffer exceeds the batch size, it will be flushed to disk.
    pub fn write(&mut self, batch: RecordBatch) -> Result<(), StoreError> {
        let num_rows = batch.num_rows();
        self.buffer.push(batch);
        self.rows_buffered += num_rows;

        if self.rows_buffered >= self.config.batch_size {
            self.flush()?;
        }

        Ok(())
    }

    /// Flush buffered data to disk.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        if self.writer.is_none() {
            self.init_writer()?;
        }

        let writer = self.writer.as_mut().ok_or(StoreError::NotInitialized)?;

        for batch in self.buffer.drain(..) {
            writer.write(&batch)?;
        }

        self.rows_buffered = 0;
        Ok(())
    }

    /// Close the writer and finalize the file.
    pub fn close(mut self) -> Result<PathBuf, StoreError> {
        if self.writer.is_none() && self.buffer.is_empty() {
            return Err(StoreError::EmptyBuffer);
        }
        self.flush()?;

        if let Some(writer) = self.writer.take() {
            writer.close()?;
        }

        let temp_path = self.temp_path.take().ok_or(StoreError::NotInitialized)?;
        let output_path = self.output_path.take().ok_or(StoreError::NotInitialized)?;
        atomic_rename(&temp_path, &output_path)?;

        tracing::debug!(
            table = %self.table,
            path = %output_path.display(),
            "artifact finalized"
        );

        Ok(output_path)
    }

    /// Get the current output path (if writer is initialized).
    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    /// Initialize the Parquet writer.
    fn init_writer(&mut self) -> Result<(), StoreError> {
        let output_path = self.build_output_path();

        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = output_path.with_extension("parquet.tmp");
        let file = File::create(&temp_path)?;

        let props = WriterProperties::builder()
            .set_writer_version(WriterVersion::PARQUET_2_0)
            .set_compression(self.config.compression)
            .set_max_row_group_size(self.config.row_group_size)
            // Dictionary encoding compresses the outcome and band columns well
            .set_dictionary_enabled(true)
            .set_encoding(Encoding::PLAIN)
            .build();

        let writer = ArrowWriter::try_new(file, self.schema.clone(), Some(props))?;

        self.writer = Some(writer);
        self.temp_path = Some(temp_path);
        self.output_path = Some(output_path);

        Ok(())
    }

    /// Build the output path: `<base_dir>/<table>_<run_suffix>.parquet`.
    fn build_output_path(&self) -> PathBuf {
        let filename = format!("{}_{}.parquet", self.table.as_str(), self.config.run_suffix);
        self.config.base_dir.join(filename)
    }
}

impl Drop for BatchedWriter {
    fn drop(&mut self) {
        // Best-effort flush on drop
        if !self.buffer.is_empty() {
            let _ = self.flush();
        }
    }
}

/// Helper to rename temp file to final path atomically.
pub fn atomic_rename(temp_path: &Path, final_path: &Path) -> Result<(), StoreError> {
    fs::rename(temp_path, final_path)?;
    Ok(())
}
