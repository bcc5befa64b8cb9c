//! Configuration validation errors and semantic validation.

use thiserror::Error;

use crate::model::{BucketDef, EstimatorConfig};

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 61,
            ValidationError::SemanticError(_) => 62,
            ValidationError::InvalidValue { .. } => 63,
            ValidationError::VersionMismatch { .. } => 64,
        }
    }
}

/// Validate estimator configuration semantically.
pub fn validate_config(config: &EstimatorConfig) -> ValidationResult<()> {
    if config.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    if config.cycle.min_gap_days < 1 {
        return Err(ValidationError::InvalidValue {
            field: "cycle.min_gap_days".to_string(),
            message: format!("Must be >= 1, got {}", config.cycle.min_gap_days),
        });
    }
    if config.cycle.max_gap_days <= config.cycle.min_gap_days {
        return Err(ValidationError::InvalidValue {
            field: "cycle.max_gap_days".to_string(),
            message: format!(
                "Must exceed min_gap_days ({}), got {}",
                config.cycle.min_gap_days, config.cycle.max_gap_days
            ),
        });
    }

    for (name, k) in [
        ("shrinkage.regime", config.shrinkage.regime),
        ("shrinkage.powertrain", config.shrinkage.powertrain),
        ("shrinkage.make", config.shrinkage.make),
        ("shrinkage.segment", config.shrinkage.segment),
    ] {
        if !k.is_finite() || k < 0.0 {
            return Err(ValidationError::InvalidValue {
                field: name.to_string(),
                message: format!("Must be finite and >= 0, got {}", k),
            });
        }
    }

    validate_buckets("mileage_buckets", &config.mileage_buckets)?;
    validate_buckets("age_buckets", &config.age_buckets)?;

    if config.labels.high <= config.labels.medium || config.labels.medium <= config.labels.low {
        return Err(ValidationError::SemanticError(format!(
            "Label cutoffs must be strictly decreasing: high={} medium={} low={}",
            config.labels.high, config.labels.medium, config.labels.low
        )));
    }

    let level = config.display.confidence_level;
    if !(0.0..1.0).contains(&level) {
        return Err(ValidationError::InvalidValue {
            field: "display.confidence_level".to_string(),
            message: format!("Must be in (0, 1), got {}", level),
        });
    }

    Ok(())
}

/// Validate that buckets are ordered, contiguous, non-overlapping, and carry
/// a mass center inside their own bounds.
fn validate_buckets(field: &str, buckets: &[BucketDef]) -> ValidationResult<()> {
    if buckets.is_empty() {
        return Err(ValidationError::SemanticError(format!(
            "{} must define at least one band",
            field
        )));
    }

    for (i, b) in buckets.iter().enumerate() {
        if b.upper <= b.lower {
            return Err(ValidationError::InvalidValue {
                field: format!("{}[{}]", field, i),
                message: format!("Empty band: lower={} upper={}", b.lower, b.upper),
            });
        }
        if b.mass_center <= b.lower || b.mass_center >= b.upper {
            return Err(ValidationError::InvalidValue {
                field: format!("{}[{}].mass_center", field, i),
                message: format!(
                    "Mass center {} outside band ({}, {})",
                    b.mass_center, b.lower, b.upper
                ),
            });
        }
        if i > 0 && (buckets[i - 1].upper - b.lower).abs() > f64::EPSILON {
            return Err(ValidationError::SemanticError(format!(
                "{}: bands must be contiguous; '{}' ends at {} but '{}' starts at {}",
                field,
                buckets[i - 1].label,
                buckets[i - 1].upper,
                b.label,
                b.lower
            )));
        }
    }

    // Mass centers must increase with the bands so interpolation anchors
    // form a strictly ordered axis.
    for w in buckets.windows(2) {
        if w[1].mass_center <= w[0].mass_center {
            return Err(ValidationError::SemanticError(format!(
                "{}: mass centers must be strictly increasing ('{}'={} vs '{}'={})",
                field, w[0].label, w[0].mass_center, w[1].label, w[1].mass_center
            )));
        }
    }

    Ok(())
}
