//! Test outcome taxonomy and severity ordering.
//!
//! Source files encode outcomes with codes that drifted across vintages
//! ("F", "FAIL", "PRS", "ABA", ...). Parsing is alias-based and total:
//! every code maps to some `TestOutcome`, with unrecognized codes mapping
//! to `Unknown` so they never displace a real outcome during same-day
//! collapse.
//!
//! Severity order (highest wins when collapsing duplicates):
//! Fail > PartialFail > Abandoned > Pass > Unknown.

use serde::{Deserialize, Serialize};

/// Outcome of a single safety-test event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    /// Test failed outright.
    Fail,
    /// Test failed with defects pending repair (retest expected shortly).
    PartialFail,
    /// Test abandoned or aborted before completion.
    Abandoned,
    /// Test passed.
    Pass,
    /// Unrecognized source code; lowest collapse priority.
    Unknown,
}

impl TestOutcome {
    /// Parse a raw source outcome code.
    ///
    /// Total: never fails. Codes outside the alias set parse to `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "F" | "FAIL" | "FAILED" => TestOutcome::Fail,
            "PF" | "PRS" | "PARTIAL" | "PARTIAL_FAIL" | "FAIL_PENDING_REPAIR" => {
                TestOutcome::PartialFail
            }
            "A" | "ABA" | "ABR" | "ABANDONED" | "ABORTED" => TestOutcome::Abandoned,
            "P" | "PASS" | "PASSED" => TestOutcome::Pass,
            _ => TestOutcome::Unknown,
        }
    }

    /// Collapse priority; higher wins when deduplicating same-day events.
    pub fn severity(self) -> u8 {
        match self {
            TestOutcome::Fail => 4,
            TestOutcome::PartialFail => 3,
            TestOutcome::Abandoned => 2,
            TestOutcome::Pass => 1,
            TestOutcome::Unknown => 0,
        }
    }

    /// Whether this outcome counts as a failure for rate estimation.
    ///
    /// Partial fails count: the vehicle did not pass its first attempt.
    pub fn is_failure(self) -> bool {
        matches!(self, TestOutcome::Fail | TestOutcome::PartialFail)
    }

    /// Whether this outcome closes a repair cycle (a clean pass).
    pub fn is_pass(self) -> bool {
        matches!(self, TestOutcome::Pass)
    }

    /// Stable string name for columnar storage.
    pub fn as_str(self) -> &'static str {
        match self {
            TestOutcome::Fail => "fail",
            TestOutcome::PartialFail => "partial_fail",
            TestOutcome::Abandoned => "abandoned",
            TestOutcome::Pass => "pass",
            TestOutcome::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
