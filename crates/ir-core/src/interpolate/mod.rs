//! Mass-center bucket interpolation for continuous queries.
//!
//! Discrete per-band rates create cliffs at band boundaries: 59,999 miles
//! and 60,001 miles would receive very different estimates from adjacent
//! bands. This module removes the cliff by interpolating linearly between
//! the bands' mass centers (empirical within-band means, not geometric
//! midpoints).
//!
//! For a query value v in a band with center c:
//! - v <= c interpolates from the previous band's rate toward this band's
//!   rate with t = (v - prev_center) / (c - prev_center), clamped to [0,1]
//! - v > c interpolates symmetrically toward the next band
//! - edge bands with no relevant neighbor return their own rate
//!
//! One axis per pass: mileage and age are interpolated independently and
//! never combined into a single bilinear pass.

use ir_config::BucketDef;
use ir_math::{clamp_t, lerp};

/// One populated band on a continuous axis: definition plus its rate.
#[derive(Debug, Clone, PartialEq)]
pub struct BandRate {
    pub label: String,
    pub lower: f64,
    pub upper: f64,
    pub center: f64,
    pub rate: f64,
}

impl BandRate {
    /// Pair a configured band with the rate estimated for it.
    pub fn new(def: &BucketDef, rate: f64) -> Self {
        BandRate {
            label: def.label.clone(),
            lower: def.lower,
            upper: def.upper,
            center: def.mass_center,
            rate,
        }
    }
}

/// Index of the band a query value falls in, clamping to the edges.
///
/// Bands are ordered and contiguous (validated at config load), so a value
/// below the first band resolves to the first and a value at or above the
/// last band's upper bound resolves to the last.
fn band_index(bands: &[BandRate], v: f64) -> usize {
    for (i, band) in bands.iter().enumerate() {
        if v < band.upper {
            return i;
        }
    }
    bands.len() - 1
}

/// Interpolate a rate for query value `v` over populated bands.
///
/// `bands` must be ordered by axis position and hold only bands that have
/// an estimate. Returns `None` when no band is populated; a single band
/// returns its own rate unmodified (no extrapolation).
pub fn interpolate(bands: &[BandRate], v: f64) -> Option<f64> {
    if bands.is_empty() {
        return None;
    }
    if bands.len() == 1 {
        return Some(bands[0].rate);
    }

    let idx = band_index(bands, v);
    let band = &bands[idx];

    if v <= band.center {
        // Toward the previous band's center.
        if idx == 0 {
            return Some(band.rate);
        }
        let prev = &bands[idx - 1];
        let t = clamp_t((v - prev.center) / (band.center - prev.center));
        Some(lerp(prev.rate, band.rate, t))
    } else {
        // Toward the next band's center.
        if idx == bands.len() - 1 {
            return Some(band.rate);
        }
        let next = &bands[idx + 1];
        let t = clamp_t((v - band.center) / (next.center - band.center));
        Some(lerp(band.rate, next.rate, t))
    }
}
