//! Statistics helpers shared by the completeness model
//!
//! These mirror the numerical building blocks the model needs: Gaussian
//! kernel density estimation in one and three dimensions, the two-sample
//! Kolmogorov-Smirnov statistic, flat-kernel mean-shift clustering, and
//! convex hull volumes in reciprocal space.

pub mod hull;
pub mod kde;
pub mod ks;
pub mod mean_shift;

pub use hull::convex_hull_volume;
pub use kde::{Kde1, Kde3};
pub use ks::ks_statistic;
pub use mean_shift::{mean_shift, MeanShiftParams};

/// Linearly interpolated quantile of `values` at `q` in [0, 1]
/// (matching the default numpy/pandas definition).
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        Some(sorted[lo])
    } else {
        let frac = pos - lo as f64;
        Some(sorted[lo] * (1.0 - frac) + sorted[hi] * frac)
    }
}

/// Min-max scale `values` into [0, 1]. A constant input maps to all zeros.
pub fn min_max_normalize(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    if !span.is_finite() || span <= 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - min) / span).collect()
}
