//! Wilson score interval for a binomial proportion.
//!
//! The Wilson interval is used instead of the normal approximation because
//! it stays inside [0, 1] and behaves sensibly at small n and at extreme
//! observed proportions, both of which are common in sparse vehicle
//! segments.
//!
//! Degenerate inputs are sanitized rather than raised: zero trials yields
//! the vacuous interval [0, 1], and successes exceeding trials are clamped
//! to trials (partial joins upstream can legitimately produce them).

use serde::{Deserialize, Serialize};

/// Supported confidence levels with exact z-scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    /// 90% two-sided.
    P90,
    /// 95% two-sided (default).
    #[default]
    P95,
    /// 99% two-sided.
    P99,
}

impl ConfidenceLevel {
    /// Resolve a numeric level to a supported one.
    ///
    /// Accepts fractions (0.90) or percentages (90.0). Any unmatched value
    /// resolves to 95%.
    pub fn from_level(level: f64) -> Self {
        let frac = if level > 1.0 { level / 100.0 } else { level };
        if (frac - 0.90).abs() < 1e-9 {
            ConfidenceLevel::P90
        } else if (frac - 0.99).abs() < 1e-9 {
            ConfidenceLevel::P99
        } else {
            ConfidenceLevel::P95
        }
    }

    /// Two-sided z-score for this level.
    pub fn z(self) -> f64 {
        match self {
            ConfidenceLevel::P90 => 1.644_853_626_951_472_2,
            ConfidenceLevel::P95 => 1.959_963_984_540_054,
            ConfidenceLevel::P99 => 2.575_829_303_548_900_4,
        }
    }
}

/// A two-sided confidence interval on a proportion, bounded in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WilsonInterval {
    pub lower: f64,
    pub upper: f64,
}

impl WilsonInterval {
    /// Interval width.
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    /// The vacuous interval covering all proportions.
    pub fn vacuous() -> Self {
        WilsonInterval {
            lower: 0.0,
            upper: 1.0,
        }
    }
}

/// Compute the Wilson score interval for `successes` out of `trials`.
///
/// `successes > trials` is clamped to `trials`; `trials == 0` returns the
/// vacuous interval [0, 1].
pub fn wilson_interval(successes: u64, trials: u64, level: ConfidenceLevel) -> WilsonInterval {
    if trials == 0 {
        return WilsonInterval::vacuous();
    }
    let k = successes.min(trials) as f64;
    let n = trials as f64;
    let z = level.z();
    let z2 = z * z;

    let p_hat = k / n;
    let denom = 1.0 + z2 / n;
    let center = (p_hat + z2 / (2.0 * n)) / denom;
    let half = (z / denom) * (p_hat * (1.0 - p_hat) / n + z2 / (4.0 * n * n)).sqrt();

    WilsonInterval {
        lower: (center - half).max(0.0),
        upper: (center + half).min(1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::stable::approx_eq;
    use proptest::prelude::*;

    #[test]
    fn zero_trials_is_vacuous() {
        let iv = wilson_interval(0, 0, ConfidenceLevel::P95);
        assert_eq!(iv.lower, 0.0);
        assert_eq!(iv.upper, 1.0);
    }

    #[test]
    fn successes_above_trials_clamp() {
        let clamped = wilson_interval(10, 4, ConfidenceLevel::P95);
        let exact = wilson_interval(4, 4, ConfidenceLevel::P95);
        assert!(approx_eq(clamped.lower, exact.lower, 1e-12));
        assert!(approx_eq(clamped.upper, exact.upper, 1e-12));
    }

    #[test]
    fn zero_successes_large_n() {
        // wilson_interval(0, 100) → lower = 0.0, upper < 0.05
        let iv = wilson_interval(0, 100, ConfidenceLevel::P95);
        assert_eq!(iv.lower, 0.0);
        assert!(iv.upper < 0.05, "upper = {}", iv.upper);
    }

    #[test]
    fn all_successes_large_n() {
        // wilson_interval(100, 100) → upper ≈ 1.0, lower > 0.9
        let iv = wilson_interval(100, 100, ConfidenceLevel::P95);
        assert!(iv.upper > 0.99, "upper = {}", iv.upper);
        assert!(iv.lower > 0.9, "lower = {}", iv.lower);
    }

    #[test]
    fn known_value_half_split() {
        // 50/100 at 95%: textbook Wilson gives (0.4038, 0.5962).
        let iv = wilson_interval(50, 100, ConfidenceLevel::P95);
        assert!(approx_eq(iv.lower, 0.4038, 5e-4), "lower = {}", iv.lower);
        assert!(approx_eq(iv.upper, 0.5962, 5e-4), "upper = {}", iv.upper);
    }

    #[test]
    fn wider_levels_nest() {
        let iv90 = wilson_interval(20, 80, ConfidenceLevel::P90);
        let iv95 = wilson_interval(20, 80, ConfidenceLevel::P95);
        let iv99 = wilson_interval(20, 80, ConfidenceLevel::P99);
        assert!(iv90.width() < iv95.width());
        assert!(iv95.width() < iv99.width());
        assert!(iv99.lower <= iv95.lower && iv95.upper <= iv99.upper);
    }

    #[test]
    fn unmatched_level_defaults_to_95() {
        assert_eq!(ConfidenceLevel::from_level(0.42), ConfidenceLevel::P95);
        assert_eq!(ConfidenceLevel::from_level(90.0), ConfidenceLevel::P90);
        assert_eq!(ConfidenceLevel::from_level(0.99), ConfidenceLevel::P99);
    }

    proptest! {
        #[test]
        fn interval_is_ordered_and_bounded(k in 0u64..5000, extra in 0u64..5000) {
            let n = k + extra;
            prop_assume!(n > 0);
            let iv = wilson_interval(k, n, ConfidenceLevel::P95);
            prop_assert!(0.0 <= iv.lower);
            prop_assert!(iv.lower <= iv.upper);
            prop_assert!(iv.upper <= 1.0);
        }

        #[test]
        fn width_shrinks_as_trials_grow(k in 1u64..50, scale in 2u64..20) {
            // Same observed rate k/n at n and scale*n.
            let n = k * 10;
            let small = wilson_interval(k, n, ConfidenceLevel::P95);
            let large = wilson_interval(k * scale, n * scale, ConfidenceLevel::P95);
            prop_assert!(large.width() < small.width());
        }

        #[test]
        fn interval_contains_observed_rate(k in 0u64..1000, extra in 0u64..1000) {
            let n = k + extra;
            prop_assume!(n > 0);
            let iv = wilson_interval(k, n, ConfidenceLevel::P95);
            let p_hat = k as f64 / n as f64;
            prop_assert!(iv.lower <= p_hat + 1e-12);
            prop_assert!(p_hat <= iv.upper + 1e-12);
        }
    }
}
