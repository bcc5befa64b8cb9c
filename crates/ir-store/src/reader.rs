//! Streaming reader for artifact tables.
//!
//! Re-aggregation reads the persisted cycle table back as record batches,
//! so cycle boundaries never have to be re-derived from raw source data.

use std::fs::File;
use std::path::Path;

use arrow::array::{Array, BooleanArray, Date32Array, Float64Array, StringArray, UInt64Array};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};

use crate::schema::{days_to_date, CycleRow, SegmentRateRow};
use crate::writer::StoreError;

/// Streaming cycle-table reader yielding rows batch by batch.
pub struct CycleReader {
    inner: ParquetRecordBatchReader,
    pending: std::vec::IntoIter<CycleRow>,
}

impl CycleReader {
    /// Open a cycle artifact file.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let file = File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let inner = builder.build()?;
        Ok(CycleReader {
            inner,
            pending: Vec::new().into_iter(),
        })
    }
}

impl Iterator for CycleReader {
    type Item = Result<CycleRow, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.pending.next() {
                return Some(Ok(row));
            }
            match self.inner.next() {
                Some(Ok(batch)) => match decode_cycle_batch(&batch) {
                    Ok(rows) => self.pending = rows.into_iter(),
                    Err(e) => return Some(Err(e)),
                },
                Some(Err(e)) => return Some(Err(e.into())),
                None => return None,
            }
        }
    }
}

/// Read an entire cycle artifact into memory.
///
/// Intended for tests and small re-aggregation runs; large corpora should
/// iterate `CycleReader` instead.
pub fn read_cycle_rows(path: &Path) -> Result<Vec<CycleRow>, StoreError> {
    CycleReader::open(path)?.collect()
}

/// Read an entire segment-rate artifact into memory.
pub fn read_segment_rate_rows(path: &Path) -> Result<Vec<SegmentRateRow>, StoreError> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let reader = builder.build()?;

    let mut rows = Vec::new();
    for batch in reader {
        rows.extend(decode_segment_rate_batch(&batch?)?);
    }
    Ok(rows)
}

fn column_err(table: &str, column: &str) -> StoreError {
    StoreError::SchemaMismatch {
        table: table.to_string(),
        column: column.to_string(),
    }
}

fn decode_cycle_batch(batch: &RecordBatch) -> Result<Vec<CycleRow>, StoreError> {
    let vehicle_ids = batch
        .column(0)
        .as_any()
        .downcast_ref::<UInt64Array>()
        .ok_or_else(|| column_err("cycles", "vehicle_id"))?;
    let dates = batch
        .column(1)
        .as_any()
        .downcast_ref::<Date32Array>()
        .ok_or_else(|| column_err("cycles", "test_date"))?;
    let cycle_ids = batch
        .column(2)
        .as_any()
        .downcast_ref::<UInt64Array>()
        .ok_or_else(|| column_err("cycles", "cycle_id"))?;
    let firsts = batch
        .column(3)
        .as_any()
        .downcast_ref::<BooleanArray>()
        .ok_or_else(|| column_err("cycles", "cycle_first"))?;
    let outcomes = batch
        .column(4)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| column_err("cycles", "outcome"))?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        rows.push(CycleRow {
            vehicle_id: vehicle_ids.value(i),
            test_date: days_to_date(dates.value(i)),
            cycle_id: cycle_ids.value(i),
            cycle_first: firsts.value(i),
            outcome: outcomes.value(i).to_string(),
        });
    }
    Ok(rows)
}

fn decode_segment_rate_batch(batch: &RecordBatch) -> Result<Vec<SegmentRateRow>, StoreError> {
    let get_str = |idx: usize, name: &str| -> Result<&StringArray, StoreError> {
        batch
            .column(idx)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| column_err("segment_rates", name))
    };

    let categories = get_str(0, "category")?;
    let age_bands = get_str(1, "age_band")?;
    let mileage_bands = get_str(2, "mileage_band")?;
    let regimes = get_str(3, "regime")?;
    let powertrains = get_str(4, "powertrain")?;
    let makes = get_str(5, "make")?;
    let models = get_str(6, "model")?;
    let trials = batch
        .column(7)
        .as_any()
        .downcast_ref::<UInt64Array>()
        .ok_or_else(|| column_err("segment_rates", "trials"))?;
    let failures = batch
        .column(8)
        .as_any()
        .downcast_ref::<UInt64Array>()
        .ok_or_else(|| column_err("segment_rates", "failures"))?;
    let rates = batch
        .column(9)
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| column_err("segment_rates", "smoothed_rate"))?;

    let opt = |arr: &StringArray, i: usize| -> Option<String> {
        if arr.is_null(i) {
            None
        } else {
            Some(arr.value(i).to_string())
        }
    };

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        rows.push(SegmentRateRow {
            category: categories.value(i).to_string(),
            age_band: age_bands.value(i).to_string(),
            mileage_band: mileage_bands.value(i).to_string(),
            regime: opt(regimes, i),
            powertrain: opt(powertrains, i),
            make: opt(makes, i),
            model: opt(models, i),
            trials: trials.value(i),
            failures: failures.value(i),
            smoothed_rate: rates.value(i),
        });
    }
    Ok(rows)
}
