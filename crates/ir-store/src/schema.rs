//! Arrow schema definitions for artifact tables.
//!
//! Tables defined:
//! - `cycles`: per-event cycle assignment (the persisted intermediate
//!   artifact; re-aggregation starts here, not from raw data)
//! - `segment_rates`: the published per-segment output table

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, Date32Array, Float64Array, RecordBatch, StringArray, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use chrono::NaiveDate;

use crate::writer::StoreError;

/// Days between CE epoch handling is avoided by anchoring on the Unix epoch.
const UNIX_EPOCH_YMD: (i32, u32, u32) = (1970, 1, 1);

fn unix_epoch() -> NaiveDate {
    // Constant is always a valid calendar date.
    NaiveDate::from_ymd_opt(UNIX_EPOCH_YMD.0, UNIX_EPOCH_YMD.1, UNIX_EPOCH_YMD.2)
        .unwrap_or(NaiveDate::MIN)
}

/// Convert a date to Arrow Date32 (days since Unix epoch).
pub fn date_to_days(date: NaiveDate) -> i32 {
    date.signed_duration_since(unix_epoch()).num_days() as i32
}

/// Convert Arrow Date32 days back to a date.
pub fn days_to_date(days: i32) -> NaiveDate {
    unix_epoch() + chrono::Duration::days(days as i64)
}

/// Table names for artifact storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableName {
    Cycles,
    SegmentRates,
}

impl TableName {
    /// Get the string name for file layout.
    pub fn as_str(&self) -> &'static str {
        match self {
            TableName::Cycles => "cycles",
            TableName::SegmentRates => "segment_rates",
        }
    }

    /// Get the default row group size for this table.
    pub fn row_group_size(&self) -> usize {
        match self {
            TableName::Cycles => 1024 * 1024,       // 1MB
            TableName::SegmentRates => 256 * 1024,  // 256KB
        }
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Container for all artifact schemas.
pub struct ArtifactSchema {
    pub cycles: Arc<Schema>,
    pub segment_rates: Arc<Schema>,
}

impl ArtifactSchema {
    /// Create all schemas.
    pub fn new() -> Self {
        ArtifactSchema {
            cycles: Arc::new(cycles_schema()),
            segment_rates: Arc::new(segment_rates_schema()),
        }
    }

    /// Get schema by table name.
    pub fn get(&self, table: TableName) -> Arc<Schema> {
        match table {
            TableName::Cycles => self.cycles.clone(),
            TableName::SegmentRates => self.segment_rates.clone(),
        }
    }
}

impl Default for ArtifactSchema {
    fn default() -> Self {
        Self::new()
    }
}

/// Schema for the persisted cycle table.
pub fn cycles_schema() -> Schema {
    Schema::new(vec![
        Field::new("vehicle_id", DataType::UInt64, false),
        Field::new("test_date", DataType::Date32, false),
        Field::new("cycle_id", DataType::UInt64, false),
        Field::new("cycle_first", DataType::Boolean, false),
        Field::new("outcome", DataType::Utf8, false),
    ])
}

/// Schema for the published segment-rate table.
pub fn segment_rates_schema() -> Schema {
    Schema::new(vec![
        Field::new("category", DataType::Utf8, false),
        Field::new("age_band", DataType::Utf8, false),
        Field::new("mileage_band", DataType::Utf8, false),
        Field::new("regime", DataType::Utf8, true),
        Field::new("powertrain", DataType::Utf8, true),
        Field::new("make", DataType::Utf8, true),
        Field::new("model", DataType::Utf8, true),
        Field::new("trials", DataType::UInt64, false),
        Field::new("failures", DataType::UInt64, false),
        Field::new("smoothed_rate", DataType::Float64, false),
    ])
}

/// One row of the cycle table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleRow {
    pub vehicle_id: u64,
    pub test_date: NaiveDate,
    pub cycle_id: u64,
    pub cycle_first: bool,
    pub outcome: String,
}

/// One row of the segment-rate table.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRateRow {
    pub category: String,
    pub age_band: String,
    pub mileage_band: String,
    pub regime: Option<String>,
    pub powertrain: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub trials: u64,
    pub failures: u64,
    pub smoothed_rate: f64,
}

/// Build a RecordBatch from cycle rows.
pub fn cycle_batch(rows: &[CycleRow]) -> Result<RecordBatch, StoreError> {
    let schema = Arc::new(cycles_schema());
    let vehicle_ids: UInt64Array = rows.iter().map(|r| Some(r.vehicle_id)).collect();
    let dates: Date32Array = rows.iter().map(|r| Some(date_to_days(r.test_date))).collect();
    let cycle_ids: UInt64Array = rows.iter().map(|r| Some(r.cycle_id)).collect();
    let firsts: BooleanArray = rows.iter().map(|r| Some(r.cycle_first)).collect();
    let outcomes: StringArray = rows.iter().map(|r| Some(r.outcome.as_str())).collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(vehicle_ids),
        Arc::new(dates),
        Arc::new(cycle_ids),
        Arc::new(firsts),
        Arc::new(outcomes),
    ];
    RecordBatch::try_new(schema, columns).map_err(StoreError::from)
}

/// Build a RecordBatch from segment-rate rows.
pub fn segment_rate_batch(rows: &[SegmentRateRow]) -> Result<RecordBatch, StoreError> {
    let schema = Arc::new(segment_rates_schema());
    let categories: StringArray = rows.iter().map(|r| Some(r.category.as_str())).collect();
    let age_bands: StringArray = rows.iter().map(|r| Some(r.age_band.as_str())).collect();
    let mileage_bands: StringArray = rows.iter().map(|r| Some(r.mileage_band.as_str())).collect();
    let regimes: StringArray = rows.iter().map(|r| r.regime.as_deref()).collect();
    let powertrains: StringArray = rows.iter().map(|r| r.powertrain.as_deref()).collect();
    let makes: StringArray = rows.iter().map(|r| r.make.as_deref()).collect();
    let models: StringArray = rows.iter().map(|r| r.model.as_deref()).collect();
    let trials: UInt64Array = rows.iter().map(|r| Some(r.trials)).collect();
    let failures: UInt64Array = rows.iter().map(|r| Some(r.failures)).collect();
    let rates: Float64Array = rows.iter().map(|r| Some(r.smoothed_rate)).collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(categories),
        Arc::new(age_bands),
        Arc::new(mileage_bands),
        Arc::new(regimes),
        Arc::new(powertrains),
        Arc::new(makes),
        Arc::new(models),
        Arc::new(trials),
        Arc::new(failures),
        Arc::new(rates),
    ];
    RecordBatch::try_new(schema, columns).map_err(StoreError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date32_conversion_roundtrips() {
        let d = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        assert_eq!(days_to_date(date_to_days(d)), d);
        assert_eq!(date_to_days(unix_epoch()), 0);
    }

    #[test]
    fn cycles_schema_shape() {
        let schema = cycles_schema();
        assert_eq!(schema.fields().len(), 5);
        assert_eq!(schema.field(0).name(), "vehicle_id");
        assert_eq!(schema.field(3).name(), "cycle_first");
    }

    #[test]
    fn cycle_batch_builds() {
        let rows = vec![CycleRow {
            vehicle_id: 123,
            test_date: NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
            cycle_id: 1,
            cycle_first: true,
            outcome: "fail".to_string(),
        }];
        let batch = cycle_batch(&rows).unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(batch.num_columns(), 5);
    }

    #[test]
    fn segment_rate_batch_handles_nullable_keys() {
        let rows = vec![SegmentRateRow {
            category: "car".to_string(),
            age_band: "5-8y".to_string(),
            mileage_band: "30k-60k".to_string(),
            regime: None,
            powertrain: None,
            make: Some("ACME".to_string()),
            model: None,
            trials: 40,
            failures: 9,
            smoothed_rate: 0.21,
        }];
        let batch = segment_rate_batch(&rows).unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(batch.num_columns(), 10);
    }
}
