//! Canonical test-event type produced by normalization.
//!
//! A `TestEvent` is parsed once from a raw source row and is immutable from
//! then on; after aggregation the event stream is discarded.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use ir_common::{TestOutcome, VehicleId};

/// One canonical safety-test event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestEvent {
    /// Validated vehicle identifier.
    pub vehicle_id: VehicleId,

    /// Source record id, used for deterministic same-day tie-breaking.
    pub source_record_id: u64,

    /// Date the test was performed.
    pub test_date: NaiveDate,

    /// Test outcome after alias normalization.
    pub outcome: TestOutcome,

    /// Vehicle category (test class), e.g. "car", "van".
    pub category: String,

    /// Odometer reading at test time, if present and numeric.
    pub mileage: Option<u32>,

    /// First registration date, if present and parseable.
    pub first_registration: Option<NaiveDate>,

    /// Inspection regime, where the source records one.
    pub regime: Option<String>,

    /// Powertrain kind (petrol/diesel/electric/...), where recorded.
    pub powertrain: Option<String>,

    pub make: Option<String>,
    pub model: Option<String>,

    /// Defect categories touched by this test.
    pub defect_categories: Vec<String>,
}

impl TestEvent {
    /// Vehicle age in years at test time, if the registration date is known.
    ///
    /// Returns `None` for missing or nonsensical (future) registrations.
    pub fn age_years(&self) -> Option<f64> {
        let reg = self.first_registration?;
        let days = self.test_date.signed_duration_since(reg).num_days();
        if days < 0 {
            return None;
        }
        Some(days as f64 / 365.25)
    }
}
