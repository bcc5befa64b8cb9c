//! Snapshot assembly and the query surface.
//!
//! A batch run publishes one immutable `RiskSnapshot`: the segment table
//! with counts and smoothed rates, the bucket axes, and the fitted rate
//! model for ancestor fallback. Downstream readers hold the snapshot by
//! reference until the next run replaces it wholesale; there is no shared
//! mutable state between runs.
//!
//! Every probability leaving this module is clamped into [0, 1], whatever
//! upstream arithmetic produced it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ir_common::RunId;
use ir_config::{BucketDef, ConfigSnapshot, EstimatorConfig};
use ir_math::clamp_unit;
use ir_store::SegmentRateRow;

use crate::aggregate::SegmentKey;
use crate::confidence::{segment_confidence, ConfidenceLabel, SegmentConfidence};
use crate::hierarchy::RateModel;
use crate::interpolate::{interpolate, BandRate};

/// Band containing `v`, or the nearest edge band for off-axis values.
///
/// Axes are validated non-empty and contiguous at config load.
fn band_or_edge(buckets: &[BucketDef], v: f64) -> &BucketDef {
    buckets
        .iter()
        .find(|b| b.contains(v))
        .unwrap_or_else(|| {
            if v < buckets[0].lower {
                &buckets[0]
            } else {
                &buckets[buckets.len() - 1]
            }
        })
}

/// Continuous axis selector for interpolation passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Mileage,
    Age,
}

/// Published estimate for one segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentEstimate {
    pub trials: u64,
    pub failures: u64,
    pub smoothed_rate: f64,
}

/// One batch run's published output.
#[derive(Debug, Clone)]
pub struct RiskSnapshot {
    pub run_id: RunId,
    pub created_at: DateTime<Utc>,
    pub config: ConfigSnapshot,
    mileage_axis: Vec<BucketDef>,
    age_axis: Vec<BucketDef>,
    labels: ir_config::LabelCutoffs,
    confidence_level: f64,
    min_trials: u64,
    segments: BTreeMap<SegmentKey, SegmentEstimate>,
    model: RateModel,
}

/// A continuous-query request from the query layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskQuery {
    pub category: String,
    pub mileage: f64,
    pub age_years: f64,
    #[serde(default)]
    pub regime: Option<String>,
    #[serde(default)]
    pub powertrain: Option<String>,
    #[serde(default)]
    pub make: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Result of resolving a query against a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// The category is entirely unknown to this snapshot.
    NotFound,
    /// A value was resolved, possibly via fallback; the confidence label
    /// lets consumers caveat sparse answers.
    Estimate(RiskEstimate),
}

/// A resolved continuous estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskEstimate {
    /// Failure probability at the queried mileage, interpolated across
    /// mileage bands where neighbors exist.
    pub rate: f64,
    /// Independent interpolation along the age axis (mileage band fixed).
    /// The two axes are never combined in one pass.
    pub age_adjusted_rate: Option<f64>,
    /// Trials behind the anchor segment (0 when resolved via fallback).
    pub trials: u64,
    pub confidence: SegmentConfidence,
    /// Whether the exact anchor segment was fitted (vs ancestor fallback).
    pub exact: bool,
}

impl RiskSnapshot {
    /// Assemble the snapshot from the fitted model.
    pub fn build(
        run_id: RunId,
        config: &EstimatorConfig,
        config_snapshot: ConfigSnapshot,
        model: RateModel,
    ) -> Self {
        let mut segments = BTreeMap::new();
        for (key, node) in model.segments() {
            segments.insert(
                key.clone(),
                SegmentEstimate {
                    trials: node.trials,
                    failures: node.failures,
                    // Final publication boundary: clamp whatever upstream
                    // arithmetic produced.
                    smoothed_rate: clamp_unit(node.smoothed_rate),
                },
            );
        }

        RiskSnapshot {
            run_id,
            created_at: Utc::now(),
            config: config_snapshot,
            mileage_axis: config.mileage_buckets.clone(),
            age_axis: config.age_buckets.clone(),
            labels: config.labels,
            confidence_level: config.display.confidence_level,
            min_trials: config.display.min_trials,
            segments,
            model,
        }
    }

    /// Rebuild a queryable snapshot from a persisted segment-rate artifact.
    ///
    /// Counts come from the artifact; the shrinkage cascade is refitted
    /// with the given configuration so ancestor fallback works for keys
    /// the artifact never saw. Published rates are identical to the
    /// original run's when the configuration matches.
    pub fn from_rows(
        run_id: RunId,
        config: &EstimatorConfig,
        config_snapshot: ConfigSnapshot,
        rows: &[SegmentRateRow],
        mode: crate::hierarchy::HierarchyMode,
    ) -> Self {
        let mut aggregates = crate::aggregate::Aggregates::new();
        for row in rows {
            aggregates.absorb_counts(
                SegmentKey {
                    category: row.category.clone(),
                    age_band: row.age_band.clone(),
                    mileage_band: row.mileage_band.clone(),
                    regime: row.regime.clone(),
                    powertrain: row.powertrain.clone(),
                    make: row.make.clone(),
                    model: row.model.clone(),
                },
                row.trials,
                row.failures,
            );
        }
        aggregates.sanitize();
        let model = RateModel::fit(&aggregates, &config.shrinkage, mode);
        RiskSnapshot::build(run_id, config, config_snapshot, model)
    }

    /// Number of published segments.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Iterate published segments in deterministic key order.
    pub fn segments(&self) -> impl Iterator<Item = (&SegmentKey, &SegmentEstimate)> {
        self.segments.iter()
    }

    /// On-demand confidence for a published segment.
    pub fn confidence_for(&self, key: &SegmentKey) -> Option<SegmentConfidence> {
        self.segments.get(key).map(|est| {
            segment_confidence(
                est.failures,
                est.trials,
                self.confidence_level,
                &self.labels,
            )
        })
    }

    /// All rows for the columnar artifact.
    pub fn to_rows(&self) -> Vec<SegmentRateRow> {
        self.segments
            .iter()
            .map(|(key, est)| SegmentRateRow {
                category: key.category.clone(),
                age_band: key.age_band.clone(),
                mileage_band: key.mileage_band.clone(),
                regime: key.regime.clone(),
                powertrain: key.powertrain.clone(),
                make: key.make.clone(),
                model: key.model.clone(),
                trials: est.trials,
                failures: est.failures,
                smoothed_rate: est.smoothed_rate,
            })
            .collect()
    }

    /// Rows surviving the minimum-trial display threshold.
    pub fn display_rows(&self) -> Vec<SegmentRateRow> {
        self.to_rows()
            .into_iter()
            .filter(|r| r.trials >= self.min_trials)
            .collect()
    }

    /// Resolve a continuous query.
    ///
    /// An entirely unknown category is `NotFound`; everything resolvable
    /// returns an estimate, sparse ones tagged by their confidence label.
    pub fn query(&self, query: &RiskQuery) -> QueryOutcome {
        if !self.segments.keys().any(|k| k.category == query.category) {
            return QueryOutcome::NotFound;
        }

        // Off-axis query values clamp to the edge band; only an unknown
        // category is a miss.
        let age_band = band_or_edge(&self.age_axis, query.age_years).label.clone();
        let mileage_band = band_or_edge(&self.mileage_axis, query.mileage).label.clone();

        let anchor = SegmentKey {
            category: query.category.clone(),
            age_band: age_band.clone(),
            mileage_band: mileage_band.clone(),
            regime: query.regime.clone(),
            powertrain: query.powertrain.clone(),
            make: query.make.clone(),
            model: query.model.clone(),
        };

        let lookup = self.model.lookup(&anchor);
        let exact = lookup.is_exact();

        // Mileage is the primary interpolation axis: walk the mileage
        // bands with every other key attribute fixed.
        let mileage_rate = self
            .interpolate_axis_rate(&anchor, Axis::Mileage, query.mileage)
            .unwrap_or_else(|| lookup.rate());

        // Age is interpolated independently; never folded into the
        // mileage pass.
        let age_adjusted_rate = self
            .interpolate_axis_rate(&anchor, Axis::Age, query.age_years)
            .map(clamp_unit);

        let (trials, failures) = match self.segments.get(&anchor) {
            Some(est) => (est.trials, est.failures),
            None => (0, 0),
        };

        QueryOutcome::Estimate(RiskEstimate {
            rate: clamp_unit(mileage_rate),
            age_adjusted_rate,
            trials,
            confidence: segment_confidence(failures, trials, self.confidence_level, &self.labels),
            exact,
        })
    }

    /// Populated bands along one axis for a fixed anchor key, in axis order.
    fn axis_bands(&self, anchor: &SegmentKey, axis: Axis) -> Vec<BandRate> {
        let defs = match axis {
            Axis::Mileage => &self.mileage_axis,
            Axis::Age => &self.age_axis,
        };
        defs.iter()
            .filter_map(|def| {
                let mut key = anchor.clone();
                match axis {
                    Axis::Mileage => key.mileage_band = def.label.clone(),
                    Axis::Age => key.age_band = def.label.clone(),
                }
                self.segments
                    .get(&key)
                    .map(|est| BandRate::new(def, est.smoothed_rate))
            })
            .collect()
    }

    fn interpolate_axis_rate(&self, anchor: &SegmentKey, axis: Axis, v: f64) -> Option<f64> {
        let bands = self.axis_bands(anchor, axis);
        interpolate(&bands, v)
    }

    /// Whether a segment would be suppressed for display.
    pub fn is_suppressed(&self, key: &SegmentKey) -> bool {
        match self.segments.get(key) {
            Some(est) => {
                est.trials < self.min_trials
                    || ConfidenceLabel::classify(est.trials, &self.labels)
                        == ConfidenceLabel::VeryLow
            }
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{Aggregates, SegmentCounts};
    use crate::hierarchy::HierarchyMode;
    use ir_config::ShrinkageConstants;
    use ir_math::approx_eq;

    fn key(band: &str, age: &str) -> SegmentKey {
        SegmentKey {
            category: "car".to_string(),
            age_band: age.to_string(),
            mileage_band: band.to_string(),
            regime: None,
            powertrain: None,
            make: Some("ACME".to_string()),
            model: None,
        }
    }

    fn snapshot(entries: &[(SegmentKey, u64, u64)]) -> RiskSnapshot {
        let mut agg = Aggregates::new();
        for (k, trials, failures) in entries {
            agg.insert_raw(
                k.clone(),
                SegmentCounts {
                    trials: *trials,
                    failures: *failures,
                },
            );
        }
        let config = EstimatorConfig::default();
        let model = RateModel::fit(&agg, &ShrinkageConstants::default(), HierarchyMode::Full);
        let config_snapshot =
            ConfigSnapshot::new(&config, &ir_config::resolve::ConfigPaths::default(), None);
        RiskSnapshot::build(RunId::new(), &config, config_snapshot, model)
    }

    #[test]
    fn unknown_category_is_not_found() {
        let snap = snapshot(&[(key("30k-60k", "5-8y"), 1000, 180)]);
        let out = snap.query(&RiskQuery {
            category: "hovercraft".to_string(),
            mileage: 45_000.0,
            age_years: 6.0,
            regime: None,
            powertrain: None,
            make: Some("ACME".to_string()),
            model: None,
        });
        assert!(matches!(out, QueryOutcome::NotFound));
    }

    #[test]
    fn query_interpolates_between_band_centers() {
        // Large, equal-sized bands so shrinkage barely moves the raw rates.
        let snap = snapshot(&[
            (key("30k-60k", "5-8y"), 100_000, 18_000),
            (key("60k-100k", "5-8y"), 100_000, 25_000),
        ]);

        let q = |mileage: f64| -> RiskEstimate {
            match snap.query(&RiskQuery {
                category: "car".to_string(),
                mileage,
                age_years: 6.0,
                regime: None,
                powertrain: None,
                make: Some("ACME".to_string()),
                model: None,
            }) {
                QueryOutcome::Estimate(e) => e,
                QueryOutcome::NotFound => panic!("expected estimate"),
            }
        };

        let below = q(59_999.0);
        let above = q(60_001.0);
        assert!(
            (below.rate - above.rate).abs() < 0.001 * below.rate.max(above.rate),
            "discontinuity at band boundary: {} vs {}",
            below.rate,
            above.rate
        );
        for e in [&below, &above] {
            assert!(e.rate > 0.179 && e.rate < 0.251, "rate = {}", e.rate);
        }
        assert!(below.exact);
        assert_eq!(below.trials, 100_000);
    }

    #[test]
    fn sparse_segment_returns_value_with_low_label() {
        let snap = snapshot(&[
            (key("30k-60k", "5-8y"), 25, 5),
            (key("60k-100k", "5-8y"), 120_000, 12_000),
        ]);
        match snap.query(&RiskQuery {
            category: "car".to_string(),
            mileage: 45_000.0,
            age_years: 6.0,
            regime: None,
            powertrain: None,
            make: Some("ACME".to_string()),
            model: None,
        }) {
            QueryOutcome::Estimate(e) => {
                assert!((0.0..=1.0).contains(&e.rate));
                assert_eq!(e.confidence.label, ConfidenceLabel::Low);
            }
            QueryOutcome::NotFound => panic!("sparse queries still resolve"),
        }
    }

    #[test]
    fn unseen_segment_resolves_via_fallback() {
        // Only one age band is populated; a query in another age band has
        // no exact segment but the same make answers.
        let snap = snapshot(&[(key("30k-60k", "5-8y"), 5_000, 900)]);
        match snap.query(&RiskQuery {
            category: "car".to_string(),
            mileage: 45_000.0,
            age_years: 10.0,
            regime: None,
            powertrain: None,
            make: Some("ACME".to_string()),
            model: None,
        }) {
            QueryOutcome::Estimate(e) => {
                assert!(!e.exact);
                assert_eq!(e.trials, 0);
                assert_eq!(e.confidence.label, ConfidenceLabel::VeryLow);
                assert!((0.0..=1.0).contains(&e.rate));
            }
            QueryOutcome::NotFound => panic!("fallback must resolve"),
        }
    }

    #[test]
    fn off_axis_query_clamps_to_edge_band() {
        let snap = snapshot(&[(key("30k-60k", "12-20y"), 4_000, 1_200)]);
        match snap.query(&RiskQuery {
            category: "car".to_string(),
            mileage: 45_000.0,
            age_years: 31.0,
            regime: None,
            powertrain: None,
            make: Some("ACME".to_string()),
            model: None,
        }) {
            QueryOutcome::Estimate(e) => {
                // Clamped into the oldest band, which is populated.
                assert!(e.exact);
                assert_eq!(e.trials, 4_000);
            }
            QueryOutcome::NotFound => panic!("off-axis age must clamp, not miss"),
        }
    }

    #[test]
    fn published_rates_are_clamped() {
        let snap = snapshot(&[(key("30k-60k", "5-8y"), 50, 50)]);
        for (_, est) in snap.segments() {
            assert!((0.0..=1.0).contains(&est.smoothed_rate));
        }
    }

    #[test]
    fn display_rows_apply_min_trials() {
        let snap = snapshot(&[
            (key("30k-60k", "5-8y"), 5, 1),
            (key("60k-100k", "5-8y"), 5_000, 800),
        ]);
        assert_eq!(snap.to_rows().len(), 2);
        let display = snap.display_rows();
        assert_eq!(display.len(), 1);
        assert_eq!(display[0].mileage_band, "60k-100k");
    }

    #[test]
    fn age_adjustment_is_computed_independently() {
        let snap = snapshot(&[
            (key("30k-60k", "5-8y"), 80_000, 12_000),
            (key("30k-60k", "8-12y"), 80_000, 20_000),
        ]);
        match snap.query(&RiskQuery {
            category: "car".to_string(),
            mileage: 45_000.0,
            age_years: 7.9,
            regime: None,
            powertrain: None,
            make: Some("ACME".to_string()),
            model: None,
        }) {
            QueryOutcome::Estimate(e) => {
                let age_rate = e.age_adjusted_rate.expect("two age bands populated");
                // Near the 8-12y boundary the age-axis value sits between
                // the two band rates.
                assert!(age_rate > 0.15 && age_rate < 0.25, "age rate {}", age_rate);
                // The mileage-axis rate only sees the single populated
                // mileage band for this age band.
                assert!(approx_eq(e.rate, snap.segments().next().unwrap().1.smoothed_rate, 1e-9));
            }
            QueryOutcome::NotFound => panic!("expected estimate"),
        }
    }
}
