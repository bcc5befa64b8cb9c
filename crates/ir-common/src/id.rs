//! Vehicle and run identity types.
//!
//! A vehicle is identified by a numeric registry identifier that is stable
//! across test events and sources. Rows with unparseable identifiers are
//! dropped at ingest, so a constructed `VehicleId` is always valid.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Validated vehicle identifier.
///
/// Wraps the registry's numeric vehicle id. Zero is reserved as "no vehicle"
/// in several source vintages and is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(pub u64);

impl VehicleId {
    /// Parse and validate a vehicle id from a raw source field.
    ///
    /// Accepts decimal digits with surrounding whitespace. Returns `None`
    /// for empty, non-numeric, or zero identifiers; callers drop such rows.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.parse::<u64>() {
            Ok(0) => None,
            Ok(id) => Some(VehicleId(id)),
            Err(_) => None,
        }
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for VehicleId {
    fn from(id: u64) -> Self {
        VehicleId(id)
    }
}

/// Run ID correlating one batch run across logs and artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new run id.
    pub fn new() -> Self {
        RunId(format!("ir-{}", uuid::Uuid::new_v4()))
    }

    /// Short form for log prefixes (first 8 hex chars of the UUID).
    pub fn short(&self) -> &str {
        let start = self.0.find('-').map(|i| i + 1).unwrap_or(0);
        let end = (start + 8).min(self.0.len());
        &self.0[start..end]
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
