//! Inspection Risk artifact storage.
//!
//! This crate provides:
//! - Arrow schema definitions for the persisted cycle table and the
//!   published segment-rate table
//! - Batched Parquet writer with zstd compression and crash-safe
//!   temp-file + atomic-rename finalization
//! - A streaming reader so re-aggregation never re-derives cycle
//!   boundaries from raw source data

pub mod reader;
pub mod schema;
pub mod writer;

pub use reader::{read_cycle_rows, read_segment_rate_rows, CycleReader};
pub use schema::{
    cycle_batch, cycles_schema, segment_rate_batch, segment_rates_schema, ArtifactSchema,
    CycleRow, SegmentRateRow, TableName,
};
pub use writer::{atomic_rename, BatchedWriter, StoreError, WriterConfig};

/// Schema version for artifact tables.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Default batch size for buffered writes.
pub const DEFAULT_BATCH_SIZE: usize = 8192;
