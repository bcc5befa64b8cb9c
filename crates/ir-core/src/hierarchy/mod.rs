//! Hierarchical shrinkage estimation across nested grouping levels.
//!
//! Fine-grained segments rarely have enough trials to estimate a failure
//! rate directly, so each level borrows strength from its parent:
//!
//! `smoothed = (failures + K * parent_smoothed) / (trials + K)`
//!
//! computed level by level from the root down: global → regime →
//! powertrain → make → segment. The global level's parent is the
//! unconditional global rate (itself), so the cascade is closed-form and
//! deterministic: the whole model is recomputed wholesale per batch run
//! and never mutated incrementally.
//!
//! Lookups for unseen keys walk up to the nearest ancestor with a known
//! rate, terminating at global. The walk returns a tagged variant, not a
//! sentinel, so missing-data paths are exhaustively checkable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use ir_config::ShrinkageConstants;
use ir_math::{raw_rate, shrink_toward};

use crate::aggregate::{Aggregates, SegmentKey};

/// Attribute value used to group events whose source omitted the field.
const UNKEYED: &str = "unknown";

fn attr(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or(UNKEYED)
}

/// Hierarchy levels, coarsest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Global,
    Regime,
    Powertrain,
    Make,
    Segment,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Global => write!(f, "global"),
            Level::Regime => write!(f, "regime"),
            Level::Powertrain => write!(f, "powertrain"),
            Level::Make => write!(f, "make"),
            Level::Segment => write!(f, "segment"),
        }
    }
}

/// Hierarchy depth selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyMode {
    /// global → regime → powertrain → make → segment.
    #[default]
    Full,
    /// global → segment. Same formula and fallback semantics, no
    /// intermediate levels.
    TwoLevel,
}

/// One fitted node: counts, shrinkage constant, and the blended rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub trials: u64,
    pub failures: u64,
    /// Observed rate; `None` when the node had no trials.
    pub raw_rate: Option<f64>,
    /// Shrinkage constant applied at this node.
    pub k: f64,
    /// Blend of the raw rate and the parent's smoothed rate.
    pub smoothed_rate: f64,
}

impl HierarchyNode {
    fn fit(trials: u64, failures: u64, k: f64, parent_rate: f64) -> Self {
        HierarchyNode {
            trials,
            failures,
            raw_rate: raw_rate(failures, trials),
            k,
            smoothed_rate: shrink_toward(failures, trials, k, parent_rate),
        }
    }
}

/// Result of a rate lookup, tagged with where the rate was found.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum RateLookup {
    /// The exact segment was fitted.
    Exact { rate: f64 },
    /// The segment was unseen; the nearest fitted ancestor answered.
    Ancestor { level: Level, rate: f64 },
    /// Nothing below the root matched.
    Global { rate: f64 },
}

impl RateLookup {
    /// The resolved rate, whatever level supplied it.
    pub fn rate(&self) -> f64 {
        match self {
            RateLookup::Exact { rate }
            | RateLookup::Ancestor { rate, .. }
            | RateLookup::Global { rate } => *rate,
        }
    }

    /// Whether the exact segment answered.
    pub fn is_exact(&self) -> bool {
        matches!(self, RateLookup::Exact { .. })
    }
}

/// The fitted rate model for one batch run.
///
/// Owned, immutable once fitted, and passed by reference to consumers;
/// concurrent runs cannot interact through hidden state.
#[derive(Debug, Clone)]
pub struct RateModel {
    pub mode: HierarchyMode,
    pub global: HierarchyNode,
    regime: BTreeMap<String, HierarchyNode>,
    powertrain: BTreeMap<(String, String), HierarchyNode>,
    make: BTreeMap<(String, String, String), HierarchyNode>,
    segment: BTreeMap<SegmentKey, HierarchyNode>,
}

impl RateModel {
    /// Fit the cascade from sanitized aggregates.
    ///
    /// With no data at all, every level smooths to a zero global rate;
    /// callers guard against empty corpora before fitting.
    pub fn fit(aggregates: &Aggregates, constants: &ShrinkageConstants, mode: HierarchyMode) -> Self {
        let total_trials = aggregates.total_trials();
        let total_failures = aggregates.total_failures();
        let global_raw = raw_rate(total_failures, total_trials).unwrap_or(0.0);
        // The root's parent is the unconditional global rate itself.
        let global = HierarchyNode {
            trials: total_trials,
            failures: total_failures,
            raw_rate: raw_rate(total_failures, total_trials),
            k: 0.0,
            smoothed_rate: global_raw,
        };

        let mut model = RateModel {
            mode,
            global,
            regime: BTreeMap::new(),
            powertrain: BTreeMap::new(),
            make: BTreeMap::new(),
            segment: BTreeMap::new(),
        };

        if mode == HierarchyMode::Full {
            model.fit_intermediate_levels(aggregates, constants);
        }
        model.fit_segments(aggregates, constants);

        tracing::debug!(
            mode = ?mode,
            segments = model.segment.len(),
            makes = model.make.len(),
            global_rate = model.global.smoothed_rate,
            "rate model fitted"
        );

        model
    }

    fn fit_intermediate_levels(&mut self, aggregates: &Aggregates, constants: &ShrinkageConstants) {
        let mut regime_counts: BTreeMap<String, (u64, u64)> = BTreeMap::new();
        let mut powertrain_counts: BTreeMap<(String, String), (u64, u64)> = BTreeMap::new();
        let mut make_counts: BTreeMap<(String, String, String), (u64, u64)> = BTreeMap::new();

        for (key, counts) in aggregates.iter() {
            let regime = attr(&key.regime).to_string();
            let powertrain = attr(&key.powertrain).to_string();
            let make = attr(&key.make).to_string();

            let e = regime_counts.entry(regime.clone()).or_default();
            e.0 += counts.trials;
            e.1 += counts.failures;

            let e = powertrain_counts
                .entry((regime.clone(), powertrain.clone()))
                .or_default();
            e.0 += counts.trials;
            e.1 += counts.failures;

            let e = make_counts.entry((regime, powertrain, make)).or_default();
            e.0 += counts.trials;
            e.1 += counts.failures;
        }

        for (key, (trials, failures)) in regime_counts {
            self.regime.insert(
                key,
                HierarchyNode::fit(trials, failures, constants.regime, self.global.smoothed_rate),
            );
        }

        for (key, (trials, failures)) in powertrain_counts {
            let parent = self
                .regime
                .get(&key.0)
                .map(|n| n.smoothed_rate)
                .unwrap_or(self.global.smoothed_rate);
            self.powertrain.insert(
                key,
                HierarchyNode::fit(trials, failures, constants.powertrain, parent),
            );
        }

        for (key, (trials, failures)) in make_counts {
            let parent = self
                .powertrain
                .get(&(key.0.clone(), key.1.clone()))
                .map(|n| n.smoothed_rate)
                .unwrap_or(self.global.smoothed_rate);
            self.make
                .insert(key, HierarchyNode::fit(trials, failures, constants.make, parent));
        }
    }

    fn fit_segments(&mut self, aggregates: &Aggregates, constants: &ShrinkageConstants) {
        for (key, counts) in aggregates.iter() {
            let parent = self.parent_rate_for(key);
            self.segment.insert(
                key.clone(),
                HierarchyNode::fit(counts.trials, counts.failures, constants.segment, parent),
            );
        }
    }

    /// The smoothed rate a segment shrinks toward.
    fn parent_rate_for(&self, key: &SegmentKey) -> f64 {
        if self.mode == HierarchyMode::TwoLevel {
            return self.global.smoothed_rate;
        }
        let make_key = (
            attr(&key.regime).to_string(),
            attr(&key.powertrain).to_string(),
            attr(&key.make).to_string(),
        );
        if let Some(node) = self.make.get(&make_key) {
            return node.smoothed_rate;
        }
        self.global.smoothed_rate
    }

    /// Resolve a rate for any key, walking up on misses.
    ///
    /// Never fails to return a value: the walk terminates at global.
    pub fn lookup(&self, key: &SegmentKey) -> RateLookup {
        if let Some(node) = self.segment.get(key) {
            return RateLookup::Exact {
                rate: node.smoothed_rate,
            };
        }

        if self.mode == HierarchyMode::Full {
            let regime = attr(&key.regime).to_string();
            let powertrain = attr(&key.powertrain).to_string();
            let make = attr(&key.make).to_string();

            if let Some(node) = self.make.get(&(regime.clone(), powertrain.clone(), make)) {
                return RateLookup::Ancestor {
                    level: Level::Make,
                    rate: node.smoothed_rate,
                };
            }
            if let Some(node) = self.powertrain.get(&(regime.clone(), powertrain)) {
                return RateLookup::Ancestor {
                    level: Level::Powertrain,
                    rate: node.smoothed_rate,
                };
            }
            if let Some(node) = self.regime.get(&regime) {
                return RateLookup::Ancestor {
                    level: Level::Regime,
                    rate: node.smoothed_rate,
                };
            }
        }

        RateLookup::Global {
            rate: self.global.smoothed_rate,
        }
    }

    /// Fitted segment nodes in deterministic key order.
    pub fn segments(&self) -> impl Iterator<Item = (&SegmentKey, &HierarchyNode)> {
        self.segment.iter()
    }

    /// Fitted node for an exact segment key.
    pub fn segment_node(&self, key: &SegmentKey) -> Option<&HierarchyNode> {
        self.segment.get(key)
    }

    /// Number of fitted segments.
    pub fn segment_count(&self) -> usize {
        self.segment.len()
    }
}
