//! Inspection Risk estimator configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for estimator.json
//! - Config resolution (CLI → env → XDG → system → defaults)
//! - Semantic validation
//! - Config snapshots for batch-run reproducibility
//!
//! Shrinkage constants, cycle-gap thresholds, bucket boundaries and mass
//! centers, and display thresholds all live here so a different inspection
//! regime is a config change, never a code change. Mass centers are expected
//! to be refreshed periodically from new data.

pub mod model;
pub mod resolve;
pub mod snapshot;
pub mod validate;

pub use model::{
    BucketDef, CycleGapPolicy, DisplayThresholds, EstimatorConfig, LabelCutoffs,
    ShrinkageConstants,
};
pub use resolve::{resolve_config, ConfigPaths, ConfigSource};
pub use snapshot::ConfigSnapshot;
pub use validate::{validate_config, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
