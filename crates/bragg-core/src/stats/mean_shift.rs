//! Flat-kernel mean-shift clustering over 3-D points
//!
//! Every input point seeds its own shift trajectory; converged modes
//! closer than half a bandwidth are merged. Seeds are visited in input
//! order and modes are labelled in first-seen order, so the labelling is
//! deterministic for a fixed input ordering. (The ordering itself is part
//! of the contract: reordering the input can permute label numbers.)

use serde::{Deserialize, Serialize};

/// Mean-shift tuning parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MeanShiftParams {
    /// Flat kernel radius in reciprocal-space units
    pub bandwidth: f64,
    /// Hard cap on shift iterations per seed
    pub max_iterations: usize,
    /// Convergence threshold on the shift displacement
    pub tolerance: f64,
}

impl Default for MeanShiftParams {
    fn default() -> Self {
        Self {
            bandwidth: 0.05,
            max_iterations: 300,
            tolerance: 1e-7,
        }
    }
}

fn dist_sq(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

fn shift_once(seed: [f64; 3], points: &[[f64; 3]], radius_sq: f64) -> ([f64; 3], usize) {
    let mut sum = [0.0; 3];
    let mut count = 0;
    for p in points {
        if dist_sq(seed, *p) <= radius_sq {
            sum[0] += p[0];
            sum[1] += p[1];
            sum[2] += p[2];
            count += 1;
        }
    }
    if count == 0 {
        (seed, 0)
    } else {
        let n = count as f64;
        ([sum[0] / n, sum[1] / n, sum[2] / n], count)
    }
}

/// Cluster `points` with a flat kernel of the given bandwidth and return
/// one label per point. Labels are dense integers starting at 0.
pub fn mean_shift(points: &[[f64; 3]], params: &MeanShiftParams) -> Vec<usize> {
    if points.is_empty() {
        return Vec::new();
    }
    let radius_sq = params.bandwidth * params.bandwidth;
    let tol_sq = params.tolerance * params.tolerance;

    // Run every seed to convergence
    let mut modes: Vec<[f64; 3]> = Vec::with_capacity(points.len());
    for &start in points {
        let mut current = start;
        for _ in 0..params.max_iterations {
            let (next, count) = shift_once(current, points, radius_sq);
            if count == 0 || dist_sq(next, current) <= tol_sq {
                current = next;
                break;
            }
            current = next;
        }
        modes.push(current);
    }

    // Merge modes within half a bandwidth, first seen wins the label
    let merge_sq = radius_sq / 4.0;
    let mut centers: Vec<[f64; 3]> = Vec::new();
    let mut labels = Vec::with_capacity(points.len());
    for mode in modes {
        let found = centers
            .iter()
            .position(|center| dist_sq(*center, mode) <= merge_sq);
        match found {
            Some(label) => labels.push(label),
            None => {
                centers.push(mode);
                labels.push(centers.len() - 1);
            }
        }
    }
    labels
}
