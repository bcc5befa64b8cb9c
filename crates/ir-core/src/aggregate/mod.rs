//! Aggregation of cycle-first observations into segment counts.
//!
//! Only cycle-first events enter the counts: everything after the first
//! test of a repair cycle is a dependent retest, not a fresh observation
//! of the vehicle's condition.
//!
//! Aggregates merge by plain summation, which is associative and
//! commutative, so independent chunks can be aggregated concurrently and
//! merged in any order with bit-identical results. Nothing here keeps a
//! running average.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use ir_config::BucketDef;

use crate::cycle::CycleEvent;

/// Finest grouping key for rate estimation.
///
/// Band labels come from the configured bucket definitions; optional
/// attributes stay `None` when a source did not record them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentKey {
    pub category: String,
    pub age_band: String,
    pub mileage_band: String,
    pub regime: Option<String>,
    pub powertrain: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
}

/// Raw counts for one segment. Invariant: trials >= failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentCounts {
    pub trials: u64,
    pub failures: u64,
}

impl SegmentCounts {
    /// Observed failure rate, if any trials were seen.
    pub fn raw_rate(&self) -> Option<f64> {
        ir_math::raw_rate(self.failures, self.trials)
    }
}

/// Counters describing one aggregation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationStats {
    pub observations: u64,
    pub skipped_retest: u64,
    pub skipped_no_mileage: u64,
    pub skipped_no_age: u64,
    pub skipped_out_of_band: u64,
    pub clamped_counts: u64,
}

impl AggregationStats {
    fn merge(&mut self, other: &AggregationStats) {
        self.observations += other.observations;
        self.skipped_retest += other.skipped_retest;
        self.skipped_no_mileage += other.skipped_no_mileage;
        self.skipped_no_age += other.skipped_no_age;
        self.skipped_out_of_band += other.skipped_out_of_band;
        self.clamped_counts += other.clamped_counts;
    }
}

/// Find the configured band containing `v`.
pub fn band_for(buckets: &[BucketDef], v: f64) -> Option<&BucketDef> {
    buckets.iter().find(|b| b.contains(v))
}

/// Segment count accumulator.
///
/// Backed by an ordered map so iteration order (and everything derived
/// from it) is deterministic.
#[derive(Debug, Clone, Default)]
pub struct Aggregates {
    counts: BTreeMap<SegmentKey, SegmentCounts>,
    stats: AggregationStats,
}

impl Aggregates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one cycle event.
    ///
    /// Non-cycle-first events and events that cannot be banded (missing
    /// mileage or age, or values outside every configured band) are
    /// skipped and counted, never errors.
    pub fn record(
        &mut self,
        ce: &CycleEvent,
        mileage_buckets: &[BucketDef],
        age_buckets: &[BucketDef],
    ) {
        if !ce.cycle_first {
            self.stats.skipped_retest += 1;
            return;
        }
        let event = &ce.event;

        let mileage = match event.mileage {
            Some(m) => m as f64,
            None => {
                self.stats.skipped_no_mileage += 1;
                return;
            }
        };
        let age = match event.age_years() {
            Some(a) => a,
            None => {
                self.stats.skipped_no_age += 1;
                return;
            }
        };

        let (mileage_band, age_band) =
            match (band_for(mileage_buckets, mileage), band_for(age_buckets, age)) {
                (Some(m), Some(a)) => (m.label.clone(), a.label.clone()),
                _ => {
                    self.stats.skipped_out_of_band += 1;
                    return;
                }
            };

        let key = SegmentKey {
            category: event.category.clone(),
            age_band,
            mileage_band,
            regime: event.regime.clone(),
            powertrain: event.powertrain.clone(),
            make: event.make.clone(),
            model: event.model.clone(),
        };

        let entry = self.counts.entry(key).or_default();
        entry.trials += 1;
        if event.outcome.is_failure() {
            entry.failures += 1;
        }
        self.stats.observations += 1;
    }

    /// Merge another partial aggregate into this one.
    ///
    /// Sum-only, so `a.merge(b)` equals `b.merge(a)` regardless of which
    /// chunks produced the partials.
    pub fn merge(&mut self, other: &Aggregates) {
        for (key, counts) in &other.counts {
            let entry = self.counts.entry(key.clone()).or_default();
            entry.trials += counts.trials;
            entry.failures += counts.failures;
        }
        self.stats.merge(&other.stats);
    }

    /// Sanitize counts: failures above trials clamp down to trials.
    ///
    /// Partial joins upstream can legitimately produce inconsistent counts;
    /// they are repaired here rather than raised.
    pub fn sanitize(&mut self) {
        for counts in self.counts.values_mut() {
            if counts.failures > counts.trials {
                counts.failures = counts.trials;
                self.stats.clamped_counts += 1;
            }
        }
    }

    /// Iterate segments in deterministic key order.
    pub fn iter(&self) -> impl Iterator<Item = (&SegmentKey, &SegmentCounts)> {
        self.counts.iter()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn get(&self, key: &SegmentKey) -> Option<&SegmentCounts> {
        self.counts.get(key)
    }

    pub fn stats(&self) -> AggregationStats {
        self.stats
    }

    /// Total trials across all segments.
    pub fn total_trials(&self) -> u64 {
        self.counts.values().map(|c| c.trials).sum()
    }

    /// Total failures across all segments.
    pub fn total_failures(&self) -> u64 {
        self.counts.values().map(|c| c.failures).sum()
    }

    /// Absorb pre-aggregated counts for a key (artifact rehydration).
    pub fn absorb_counts(&mut self, key: SegmentKey, trials: u64, failures: u64) {
        let entry = self.counts.entry(key).or_default();
        entry.trials += trials;
        entry.failures += failures;
        self.stats.observations += trials;
    }

    #[cfg(test)]
    pub(crate) fn insert_raw(&mut self, key: SegmentKey, counts: SegmentCounts) {
        self.counts.insert(key, counts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ir_common::{TestOutcome, VehicleId};
    use ir_config::EstimatorConfig;

    use crate::event::TestEvent;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn cycle_event(outcome: TestOutcome, mileage: Option<u32>, cycle_first: bool) -> CycleEvent {
        CycleEvent {
            event: TestEvent {
                vehicle_id: VehicleId(1),
                source_record_id: 1,
                test_date: d(2023, 6, 1),
                outcome,
                category: "car".to_string(),
                mileage,
                first_registration: Some(d(2017, 6, 1)),
                regime: None,
                powertrain: Some("petrol".to_string()),
                make: Some("ACME".to_string()),
                model: None,
                defect_categories: Vec::new(),
            },
            cycle_id: 0,
            cycle_first,
        }
    }

    fn config() -> EstimatorConfig {
        EstimatorConfig::default()
    }

    #[test]
    fn cycle_first_failures_count() {
        let cfg = config();
        let mut agg = Aggregates::new();
        agg.record(
            &cycle_event(TestOutcome::Fail, Some(45_000), true),
            &cfg.mileage_buckets,
            &cfg.age_buckets,
        );
        agg.record(
            &cycle_event(TestOutcome::Pass, Some(46_000), true),
            &cfg.mileage_buckets,
            &cfg.age_buckets,
        );
        assert_eq!(agg.len(), 1);
        let (_, counts) = agg.iter().next().unwrap();
        assert_eq!(counts.trials, 2);
        assert_eq!(counts.failures, 1);
    }

    #[test]
    fn retests_are_excluded() {
        let cfg = config();
        let mut agg = Aggregates::new();
        agg.record(
            &cycle_event(TestOutcome::Pass, Some(45_000), false),
            &cfg.mileage_buckets,
            &cfg.age_buckets,
        );
        assert!(agg.is_empty());
        assert_eq!(agg.stats().skipped_retest, 1);
    }

    #[test]
    fn unbandable_events_are_skipped_and_counted() {
        let cfg = config();
        let mut agg = Aggregates::new();
        agg.record(
            &cycle_event(TestOutcome::Fail, None, true),
            &cfg.mileage_buckets,
            &cfg.age_buckets,
        );
        assert_eq!(agg.stats().skipped_no_mileage, 1);

        // Age below the first configured band.
        let mut young = cycle_event(TestOutcome::Fail, Some(10_000), true);
        young.event.first_registration = Some(d(2023, 1, 1));
        agg.record(&young, &cfg.mileage_buckets, &cfg.age_buckets);
        assert_eq!(agg.stats().skipped_out_of_band, 1);
        assert!(agg.is_empty());
    }

    #[test]
    fn merge_order_never_affects_totals() {
        let cfg = config();
        let ev_fail = cycle_event(TestOutcome::Fail, Some(45_000), true);
        let ev_pass = cycle_event(TestOutcome::Pass, Some(78_000), true);

        let mut a = Aggregates::new();
        a.record(&ev_fail, &cfg.mileage_buckets, &cfg.age_buckets);
        let mut b = Aggregates::new();
        b.record(&ev_pass, &cfg.mileage_buckets, &cfg.age_buckets);
        b.record(&ev_fail, &cfg.mileage_buckets, &cfg.age_buckets);

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);

        let lhs: Vec<_> = ab.iter().map(|(k, c)| (k.clone(), *c)).collect();
        let rhs: Vec<_> = ba.iter().map(|(k, c)| (k.clone(), *c)).collect();
        assert_eq!(lhs, rhs);
        assert_eq!(ab.total_trials(), 3);
        assert_eq!(ab.total_failures(), 2);
    }

    #[test]
    fn sanitize_clamps_inconsistent_counts() {
        let mut agg = Aggregates::new();
        agg.insert_raw(
            SegmentKey {
                category: "car".to_string(),
                age_band: "5-8y".to_string(),
                mileage_band: "30k-60k".to_string(),
                regime: None,
                powertrain: None,
                make: None,
                model: None,
            },
            SegmentCounts {
                trials: 4,
                failures: 9,
            },
        );
        agg.sanitize();
        let (_, counts) = agg.iter().next().unwrap();
        assert_eq!(counts.failures, 4);
        assert_eq!(agg.stats().clamped_counts, 1);
    }

    #[test]
    fn band_lookup_is_half_open() {
        let cfg = config();
        assert_eq!(
            band_for(&cfg.mileage_buckets, 59_999.0).map(|b| b.label.as_str()),
            Some("30k-60k")
        );
        assert_eq!(
            band_for(&cfg.mileage_buckets, 60_000.0).map(|b| b.label.as_str()),
            Some("60k-100k")
        );
        assert!(band_for(&cfg.mileage_buckets, -1.0).is_none());
    }
}
