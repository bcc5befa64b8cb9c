//! Configuration snapshots for batch-run reproducibility.
//!
//! A snapshot captures the exact configuration state at the start of a batch
//! run, allowing published estimates to be audited and reproduced later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::model::EstimatorConfig;
use crate::resolve::ConfigPaths;

/// A frozen snapshot of configuration state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// Schema version of the configuration.
    pub schema_version: String,

    /// SHA-256 hash of the estimator JSON content.
    pub config_hash: String,

    /// Path the config was loaded from (None for builtin defaults).
    #[serde(default)]
    pub config_path: Option<String>,

    /// Source of the configuration.
    pub config_source: String,

    /// Key configuration values for quick reference.
    pub summary: ConfigSummary,
}

/// Summary of key configuration values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub min_gap_days: i64,
    pub max_gap_days: i64,
    pub shrinkage_regime: f64,
    pub shrinkage_powertrain: f64,
    pub shrinkage_make: f64,
    pub shrinkage_segment: f64,
    pub mileage_bucket_count: usize,
    pub age_bucket_count: usize,
    pub min_trials: u64,
    pub confidence_level: f64,
}

impl ConfigSnapshot {
    /// Create a new snapshot from loaded configuration.
    ///
    /// `config_json` is the raw file content when one was loaded; builtin
    /// defaults hash their canonical serialization so default-vs-default
    /// comparisons still match.
    pub fn new(config: &EstimatorConfig, paths: &ConfigPaths, config_json: Option<&str>) -> Self {
        let canonical;
        let hashed = match config_json {
            Some(raw) => raw,
            None => {
                canonical = serde_json::to_string(config).unwrap_or_default();
                &canonical
            }
        };

        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: config.schema_version.clone(),
            config_hash: hash_content(hashed),
            config_path: paths.estimator.as_ref().map(|p| p.display().to_string()),
            config_source: paths.estimator_source.to_string(),
            summary: ConfigSummary::from_config(config),
        }
    }

    /// Serialize snapshot to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize snapshot from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check if this snapshot matches another (same config content).
    pub fn matches(&self, other: &ConfigSnapshot) -> bool {
        self.config_hash == other.config_hash
    }

    /// Short identifier for this snapshot (first 12 chars of hash).
    pub fn short_id(&self) -> &str {
        &self.config_hash[..12.min(self.config_hash.len())]
    }
}

impl ConfigSummary {
    fn from_config(config: &EstimatorConfig) -> Self {
        ConfigSummary {
            min_gap_days: config.cycle.min_gap_days,
            max_gap_days: config.cycle.max_gap_days,
            shrinkage_regime: config.shrinkage.regime,
            shrinkage_powertrain: config.shrinkage.powertrain,
            shrinkage_make: config.shrinkage.make,
            shrinkage_segment: config.shrinkage.segment,
            mileage_bucket_count: config.mileage_buckets.len(),
            age_bucket_count: config.age_buckets.len(),
            min_trials: config.display.min_trials,
            confidence_level: config.display.confidence_level,
        }
    }
}

/// Hash content with SHA-256 and return hex string.
fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_snapshot_is_stable() {
        let cfg = EstimatorConfig::default();
        let paths = ConfigPaths::default();
        let s1 = ConfigSnapshot::new(&cfg, &paths, None);
        let s2 = ConfigSnapshot::new(&cfg, &paths, None);
        assert!(s1.matches(&s2));
        assert_eq!(s1.short_id().len(), 12);
    }

    #[test]
    fn different_content_differs() {
        let cfg = EstimatorConfig::default();
        let paths = ConfigPaths::default();
        let s1 = ConfigSnapshot::new(&cfg, &paths, Some(r#"{"a":1}"#));
        let s2 = ConfigSnapshot::new(&cfg, &paths, Some(r#"{"a":2}"#));
        assert!(!s1.matches(&s2));
    }

    #[test]
    fn snapshot_json_roundtrip() {
        let cfg = EstimatorConfig::default();
        let snapshot = ConfigSnapshot::new(&cfg, &ConfigPaths::default(), None);
        let json = snapshot.to_json().unwrap();
        let restored = ConfigSnapshot::from_json(&json).unwrap();
        assert!(snapshot.matches(&restored));
        assert_eq!(restored.summary.max_gap_days, 120);
    }

    #[test]
    fn hash_is_sha256_hex() {
        assert_eq!(hash_content("test").len(), 64);
        assert_eq!(hash_content("test"), hash_content("test"));
    }
}
