//! Estimator configuration types.
//!
//! These types match the estimator.json file consumed at batch start. The
//! whole object is versioned and loaded once per run; nothing in the engine
//! reads a tuning constant from anywhere else.

use serde::{Deserialize, Serialize};

/// Complete estimator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    pub schema_version: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub updated_at: Option<String>,

    /// Cycle segmentation gap thresholds.
    #[serde(default)]
    pub cycle: CycleGapPolicy,

    /// Per-level shrinkage constants.
    #[serde(default)]
    pub shrinkage: ShrinkageConstants,

    /// Mileage bands with empirical mass centers.
    #[serde(default = "BucketDef::default_mileage")]
    pub mileage_buckets: Vec<BucketDef>,

    /// Vehicle-age bands (years) with empirical mass centers.
    #[serde(default = "BucketDef::default_age")]
    pub age_buckets: Vec<BucketDef>,

    /// Publication thresholds.
    #[serde(default)]
    pub display: DisplayThresholds,

    /// Sample-size label cut points.
    #[serde(default)]
    pub labels: LabelCutoffs,
}

/// Gap thresholds for cycle boundary detection.
///
/// Tuned for an annual inspection regime; a different regulatory cadence
/// overrides these in estimator.json.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CycleGapPolicy {
    /// Minimum gap (days) after a pass before a new cycle can start.
    pub min_gap_days: i64,
    /// Gap (days) beyond which a new cycle starts regardless of outcome.
    pub max_gap_days: i64,
}

impl Default for CycleGapPolicy {
    fn default() -> Self {
        CycleGapPolicy {
            min_gap_days: 2,
            max_gap_days: 120,
        }
    }
}

/// Shrinkage constant K per hierarchy level.
///
/// Each K is the virtual sample size drawn from the level's parent; larger
/// values pull harder toward the parent rate. Typical range 5-20.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShrinkageConstants {
    pub regime: f64,
    pub powertrain: f64,
    pub make: f64,
    pub segment: f64,
}

impl Default for ShrinkageConstants {
    fn default() -> Self {
        ShrinkageConstants {
            regime: 20.0,
            powertrain: 15.0,
            make: 10.0,
            segment: 5.0,
        }
    }
}

/// One contiguous band of a continuous axis.
///
/// `mass_center` is the empirical mean of the axis variable within the band,
/// refreshed periodically from new data. It is NOT the geometric midpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketDef {
    /// Stable band label used as part of segment keys, e.g. "30k-60k".
    pub label: String,
    /// Inclusive lower bound.
    pub lower: f64,
    /// Exclusive upper bound.
    pub upper: f64,
    /// Empirical mean of observations inside the band.
    pub mass_center: f64,
}

impl BucketDef {
    /// Builtin mileage bands (miles).
    pub fn default_mileage() -> Vec<BucketDef> {
        vec![
            BucketDef {
                label: "0-30k".to_string(),
                lower: 0.0,
                upper: 30_000.0,
                mass_center: 16_000.0,
            },
            BucketDef {
                label: "30k-60k".to_string(),
                lower: 30_000.0,
                upper: 60_000.0,
                mass_center: 45_000.0,
            },
            BucketDef {
                label: "60k-100k".to_string(),
                lower: 60_000.0,
                upper: 100_000.0,
                mass_center: 78_000.0,
            },
            BucketDef {
                label: "100k-150k".to_string(),
                lower: 100_000.0,
                upper: 150_000.0,
                mass_center: 118_000.0,
            },
            BucketDef {
                label: "150k+".to_string(),
                lower: 150_000.0,
                upper: 1_000_000.0,
                mass_center: 172_000.0,
            },
        ]
    }

    /// Builtin vehicle-age bands (years).
    pub fn default_age() -> Vec<BucketDef> {
        vec![
            BucketDef {
                label: "3-5y".to_string(),
                lower: 3.0,
                upper: 5.0,
                mass_center: 3.8,
            },
            BucketDef {
                label: "5-8y".to_string(),
                lower: 5.0,
                upper: 8.0,
                mass_center: 6.3,
            },
            BucketDef {
                label: "8-12y".to_string(),
                lower: 8.0,
                upper: 12.0,
                mass_center: 9.7,
            },
            BucketDef {
                label: "12-20y".to_string(),
                lower: 12.0,
                upper: 20.0,
                mass_center: 14.6,
            },
        ]
    }

    /// Whether a value falls inside this band.
    pub fn contains(&self, v: f64) -> bool {
        v >= self.lower && v < self.upper
    }
}

/// Thresholds applied at publication.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DisplayThresholds {
    /// Segments below this trial count are suppressed from display output.
    pub min_trials: u64,
    /// Confidence level for on-demand intervals (0.90 / 0.95 / 0.99).
    pub confidence_level: f64,
}

impl Default for DisplayThresholds {
    fn default() -> Self {
        DisplayThresholds {
            min_trials: 20,
            confidence_level: 0.95,
        }
    }
}

/// Sample-size cut points for qualitative confidence labels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LabelCutoffs {
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

impl Default for LabelCutoffs {
    fn default() -> Self {
        LabelCutoffs {
            high: 1000,
            medium: 100,
            low: 20,
        }
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig {
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            description: None,
            updated_at: None,
            cycle: CycleGapPolicy::default(),
            shrinkage: ShrinkageConstants::default(),
            mileage_buckets: BucketDef::default_mileage(),
            age_buckets: BucketDef::default_age(),
            display: DisplayThresholds::default(),
            labels: LabelCutoffs::default(),
        }
    }
}

impl EstimatorConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, crate::validate::ValidationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::validate::ValidationError::IoError(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, crate::validate::ValidationError> {
        serde_json::from_str(json).map_err(|e| {
            crate::validate::ValidationError::ParseError(format!("Invalid JSON: {}", e))
        })
    }
}
