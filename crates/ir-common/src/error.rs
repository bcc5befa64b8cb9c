//! Error types for Inspection Risk.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for automation
//!
//! Individual malformed records are never errors; they are dropped and
//! counted by the ingest layer. Errors here are structural: a source that
//! violates its schema contract, a config file that fails validation, an
//! artifact that cannot be written.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for Inspection Risk operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration file errors (estimator config, buckets, thresholds).
    Config,
    /// Source ingestion and schema-contract errors.
    Ingest,
    /// Cycle segmentation errors.
    Segmentation,
    /// Estimation and numerical errors.
    Estimation,
    /// Columnar artifact read/write errors.
    Store,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Ingest => write!(f, "ingest"),
            ErrorCategory::Segmentation => write!(f, "segmentation"),
            ErrorCategory::Estimation => write!(f, "estimation"),
            ErrorCategory::Store => write!(f, "store"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for Inspection Risk.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid estimator config: {0}")]
    InvalidEstimatorConfig(String),

    // Ingest errors (20-29)
    #[error("source '{source_name}' violates schema contract: {reason}")]
    SourceSchema { source_name: String, reason: String },

    #[error("no input found: {0}")]
    NoInput(String),

    #[error("required field '{field}' entirely absent in source '{source_name}'")]
    MissingField { source_name: String, field: String },

    // Segmentation errors (30-39)
    #[error("cycle segmentation failed: {0}")]
    Segmentation(String),

    // Estimation errors (40-49)
    #[error("estimation failed: {0}")]
    Estimation(String),

    #[error("numerical instability detected: {0}")]
    NumericalInstability(String),

    // Store errors (50-59)
    #[error("artifact store error: {0}")]
    Store(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the stable error code for this error type.
    ///
    /// Error codes are grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Ingest errors
    /// - 30-39: Segmentation errors
    /// - 40-49: Estimation errors
    /// - 50-59: Store errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidEstimatorConfig(_) => 11,
            Error::SourceSchema { .. } => 20,
            Error::NoInput(_) => 21,
            Error::MissingField { .. } => 22,
            Error::Segmentation(_) => 30,
            Error::Estimation(_) => 40,
            Error::NumericalInstability(_) => 41,
            Error::Store(_) => 50,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the category this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidEstimatorConfig(_) => ErrorCategory::Config,
            Error::SourceSchema { .. } | Error::NoInput(_) | Error::MissingField { .. } => {
                ErrorCategory::Ingest
            }
            Error::Segmentation(_) => ErrorCategory::Segmentation,
            Error::Estimation(_) | Error::NumericalInstability(_) => ErrorCategory::Estimation,
            Error::Store(_) => ErrorCategory::Store,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Whether the operator can plausibly recover by fixing inputs or config.
    ///
    /// Structural source errors are recoverable (fix or exclude the source
    /// and re-run); numerical instability is not.
    pub fn recoverable(&self) -> bool {
        !matches!(self, Error::NumericalInstability(_))
    }

    /// Serialize to a structured JSON value for agent-facing output.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.code(),
            "category": self.category(),
            "message": self.to_string(),
            "recoverable": self.recoverable(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_grouped_by_category() {
        let e = Error::SourceSchema {
            source_name: "vintage-2019.psv".to_string(),
            reason: "missing outcome column".to_string(),
        };
        assert_eq!(e.code(), 20);
        assert_eq!(e.category(), ErrorCategory::Ingest);

        let e = Error::InvalidEstimatorConfig("negative shrinkage".to_string());
        assert_eq!(e.code(), 11);
        assert_eq!(e.category(), ErrorCategory::Config);
    }

    #[test]
    fn structural_errors_are_recoverable() {
        let e = Error::NoInput("no files matched".to_string());
        assert!(e.recoverable());

        let e = Error::NumericalInstability("NaN in smoothed rate".to_string());
        assert!(!e.recoverable());
    }

    #[test]
    fn error_json_has_stable_shape() {
        let e = Error::Config("bad".to_string());
        let v = e.to_json();
        assert_eq!(v["code"], 10);
        assert_eq!(v["category"], "config");
        assert_eq!(v["recoverable"], true);
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e: Error = io.into();
        assert_eq!(e.code(), 60);
    }
}
