//! Confidence quantification for segment estimates.
//!
//! Two independent signals are published alongside a point estimate:
//! - a Wilson score interval on the observed proportion
//! - a qualitative sample-size label used downstream to decide whether a
//!   segment should be suppressed

use serde::{Deserialize, Serialize};

use ir_config::LabelCutoffs;
use ir_math::{wilson_interval, ConfidenceLevel, WilsonInterval};

/// Qualitative trust label derived from the trial count alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLabel {
    VeryLow,
    Low,
    Medium,
    High,
}

impl ConfidenceLabel {
    /// Classify a trial count against configured cut points.
    pub fn classify(trials: u64, cutoffs: &LabelCutoffs) -> Self {
        if trials >= cutoffs.high {
            ConfidenceLabel::High
        } else if trials >= cutoffs.medium {
            ConfidenceLabel::Medium
        } else if trials >= cutoffs.low {
            ConfidenceLabel::Low
        } else {
            ConfidenceLabel::VeryLow
        }
    }
}

impl std::fmt::Display for ConfidenceLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfidenceLabel::VeryLow => write!(f, "very_low"),
            ConfidenceLabel::Low => write!(f, "low"),
            ConfidenceLabel::Medium => write!(f, "medium"),
            ConfidenceLabel::High => write!(f, "high"),
        }
    }
}

/// Interval plus label for one segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentConfidence {
    pub interval: WilsonInterval,
    pub label: ConfidenceLabel,
}

/// Compute interval and label for observed counts.
///
/// `level` is resolved to a supported confidence level (unmatched values
/// default to 95%); degenerate counts are handled by the interval itself.
pub fn segment_confidence(
    failures: u64,
    trials: u64,
    level: f64,
    cutoffs: &LabelCutoffs,
) -> SegmentConfidence {
    SegmentConfidence {
        interval: wilson_interval(failures, trials, ConfidenceLevel::from_level(level)),
        label: ConfidenceLabel::classify(trials, cutoffs),
    }
}
