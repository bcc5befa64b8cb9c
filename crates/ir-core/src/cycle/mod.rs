//! Temporal deduplication and repair-cycle segmentation.
//!
//! A vehicle's raw history contains near-duplicate retest events: the same
//! test reported by overlapping sources, and retests a day or two after a
//! failed test. Counting those as independent observations biases failure
//! rates upward, so each vehicle's history is reduced to one independent
//! observation per repair cycle.
//!
//! Stages, per vehicle:
//! 1. **Same-day collapse**: for any (vehicle, date) with more than one
//!    event, exactly one survives: highest outcome severity wins, ties
//!    broken by smallest source record id. Idempotent.
//! 2. **Cycle boundaries**: over the date-sorted deduplicated stream, the
//!    first event always starts a cycle; a later event starts a new cycle
//!    iff the previous outcome was a pass and the gap reached the minimum,
//!    or the gap exceeded the maximum regardless of outcome.
//!
//! Vehicles are independent, so vehicle-level sharding is the safe
//! parallelization boundary. Within a vehicle the scan is a single linear
//! pass over the sorted events.

use serde::{Deserialize, Serialize};

use ir_common::{Error, Result};
use ir_config::CycleGapPolicy;
use ir_store::CycleRow;

use crate::event::TestEvent;

/// One event annotated with its cycle assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleEvent {
    pub event: TestEvent,
    /// Globally monotonic cycle id.
    pub cycle_id: u64,
    /// Exactly one event per cycle carries this flag.
    pub cycle_first: bool,
}

impl CycleEvent {
    /// Project to the persisted columnar row.
    pub fn to_row(&self) -> CycleRow {
        CycleRow {
            vehicle_id: self.event.vehicle_id.0,
            test_date: self.event.test_date,
            cycle_id: self.cycle_id,
            cycle_first: self.cycle_first,
            outcome: self.event.outcome.as_str().to_string(),
        }
    }
}

/// Collapse duplicate same-day events in place.
///
/// Keeps exactly one event per (vehicle, date): highest severity first,
/// then smallest source record id. The result is sorted by date. Running
/// the collapse twice yields the same output as running it once.
pub fn collapse_same_day(events: &mut Vec<TestEvent>) {
    if events.len() < 2 {
        events.sort_by_key(|e| e.test_date);
        return;
    }
    events.sort_by(|a, b| {
        a.test_date
            .cmp(&b.test_date)
            .then_with(|| b.outcome.severity().cmp(&a.outcome.severity()))
            .then_with(|| a.source_record_id.cmp(&b.source_record_id))
    });
    events.dedup_by_key(|e| e.test_date);
}

/// Whether `cur` opens a new cycle after `prev`.
///
/// The minimum gap distinguishes an annual retest from a same-cycle retest
/// shortly after a pass; the maximum gap closes a cycle regardless of the
/// previous outcome.
fn starts_new_cycle(prev: &TestEvent, cur: &TestEvent, policy: &CycleGapPolicy) -> bool {
    let gap_days = cur
        .test_date
        .signed_duration_since(prev.test_date)
        .num_days();
    if gap_days > policy.max_gap_days {
        return true;
    }
    prev.outcome.is_pass() && gap_days >= policy.min_gap_days
}

/// Counters describing one segmentation run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SegmentationStats {
    pub vehicles: u64,
    pub events_in: u64,
    pub events_deduped: u64,
    pub cycles: u64,
}

/// Streaming cycle segmenter.
///
/// Consumes one vehicle's events at a time (vehicles may arrive in any
/// order; events within a vehicle need not be pre-sorted) and hands out
/// globally monotonic cycle ids. Memory is bounded by the largest single
/// vehicle history, which is what makes 1e8-event corpora tractable in
/// chunked runs.
#[derive(Debug)]
pub struct CycleSegmenter {
    policy: CycleGapPolicy,
    next_cycle_id: u64,
    stats: SegmentationStats,
}

impl CycleSegmenter {
    pub fn new(policy: CycleGapPolicy) -> Self {
        CycleSegmenter {
            policy,
            next_cycle_id: 0,
            stats: SegmentationStats::default(),
        }
    }

    /// Segment one vehicle's events into cycles.
    ///
    /// All events must belong to the same vehicle; mixing vehicles in one
    /// call is a caller bug and is surfaced as a structural error.
    pub fn segment_vehicle(&mut self, mut events: Vec<TestEvent>) -> Result<Vec<CycleEvent>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        let vehicle_id = events[0].vehicle_id;
        if events.iter().any(|e| e.vehicle_id != vehicle_id) {
            return Err(Error::Segmentation(format!(
                "segment_vehicle called with mixed vehicle ids (first: {})",
                vehicle_id
            )));
        }

        self.stats.vehicles += 1;
        self.stats.events_in += events.len() as u64;

        collapse_same_day(&mut events);
        self.stats.events_deduped += events.len() as u64;

        let mut out = Vec::with_capacity(events.len());
        let mut prev: Option<&TestEvent> = None;
        let mut current_cycle = 0u64;

        // Single forward pass; the boundary test only looks at the previous
        // event, never scans back.
        for event in &events {
            let new_cycle = match prev {
                None => true,
                Some(p) => starts_new_cycle(p, event, &self.policy),
            };
            if new_cycle {
                current_cycle = self.next_cycle_id;
                self.next_cycle_id += 1;
                self.stats.cycles += 1;
            }
            out.push(CycleEvent {
                event: event.clone(),
                cycle_id: current_cycle,
                cycle_first: new_cycle,
            });
            prev = Some(event);
        }

        Ok(out)
    }

    /// Stats accumulated across all vehicles segmented so far.
    pub fn stats(&self) -> SegmentationStats {
        self.stats
    }
}
