//! Gaussian kernel density estimation
//!
//! One-dimensional estimates are used for the resolution axis; the
//! three-dimensional estimate runs over reciprocal-space Cartesian
//! coordinates with per-sample weights. Bandwidths default to Scott's
//! rule computed from the (weighted) sample, with the effective sample
//! size `(sum w)^2 / sum w^2` standing in for n when weights are present.

use ndarray::{Array1, Array2, ArrayView1};

use crate::error::{Error, Result};

const SQRT_2PI: f64 = 2.5066282746310002;

fn weighted_mean_std(values: ArrayView1<'_, f64>, weights: ArrayView1<'_, f64>) -> (f64, f64) {
    let wsum: f64 = weights.sum();
    let mean = values
        .iter()
        .zip(weights.iter())
        .map(|(v, w)| v * w)
        .sum::<f64>()
        / wsum;
    let var = values
        .iter()
        .zip(weights.iter())
        .map(|(v, w)| w * (v - mean) * (v - mean))
        .sum::<f64>()
        / wsum;
    (mean, var.sqrt())
}

fn effective_sample_size(weights: ArrayView1<'_, f64>) -> f64 {
    let wsum: f64 = weights.sum();
    let wsq: f64 = weights.iter().map(|w| w * w).sum();
    wsum * wsum / wsq
}

/// Scott's rule factor for `n` effective samples in `dims` dimensions
fn scott_factor(n_eff: f64, dims: usize) -> f64 {
    n_eff.powf(-1.0 / (dims as f64 + 4.0))
}

/// Guard against zero-variance samples: a degenerate axis still needs a
/// positive bandwidth for the kernel to be defined.
fn positive(bandwidth: f64) -> f64 {
    if bandwidth.is_finite() && bandwidth > 0.0 {
        bandwidth
    } else {
        1e-6
    }
}

/// One-dimensional weighted Gaussian KDE
#[derive(Debug, Clone)]
pub struct Kde1 {
    points: Array1<f64>,
    weights: Array1<f64>,
    bandwidth: f64,
}

impl Kde1 {
    /// Fit a 1-D estimate. `bandwidth = None` selects Scott's rule.
    pub fn fit(values: &[f64], weights: Option<&[f64]>, bandwidth: Option<f64>) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::empty_data("cannot fit a KDE to zero samples"));
        }
        let points = Array1::from_vec(values.to_vec());
        let weights = match weights {
            Some(w) => {
                if w.len() != values.len() {
                    return Err(Error::empty_data(format!(
                        "{} weights for {} samples",
                        w.len(),
                        values.len()
                    )));
                }
                Array1::from_vec(w.to_vec())
            }
            None => Array1::ones(values.len()),
        };
        let bandwidth = positive(bandwidth.unwrap_or_else(|| {
            let (_, std) = weighted_mean_std(points.view(), weights.view());
            scott_factor(effective_sample_size(weights.view()), 1) * std
        }));
        Ok(Self {
            points,
            weights,
            bandwidth,
        })
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    /// Evaluate the density at each of `xs`
    pub fn evaluate(&self, xs: &[f64]) -> Vec<f64> {
        let wsum: f64 = self.weights.sum();
        let norm = wsum * self.bandwidth * SQRT_2PI;
        xs.iter()
            .map(|x| {
                let acc: f64 = self
                    .points
                    .iter()
                    .zip(self.weights.iter())
                    .map(|(p, w)| {
                        let z = (x - p) / self.bandwidth;
                        w * (-0.5 * z * z).exp()
                    })
                    .sum();
                acc / norm
            })
            .collect()
    }
}

/// Three-dimensional weighted Gaussian KDE with a diagonal bandwidth
#[derive(Debug, Clone)]
pub struct Kde3 {
    points: Array2<f64>,
    weights: Array1<f64>,
    bandwidths: [f64; 3],
}

impl Kde3 {
    /// Fit a 3-D estimate over `points` (one `[x, y, z]` per sample).
    /// `bandwidth = None` selects Scott's rule independently per axis;
    /// `Some(h)` uses the same bandwidth on all three axes.
    pub fn fit(points: &[[f64; 3]], weights: Option<&[f64]>, bandwidth: Option<f64>) -> Result<Self> {
        if points.is_empty() {
            return Err(Error::empty_data("cannot fit a KDE to zero samples"));
        }
        let n = points.len();
        let mut data = Array2::zeros((n, 3));
        for (i, p) in points.iter().enumerate() {
            data[[i, 0]] = p[0];
            data[[i, 1]] = p[1];
            data[[i, 2]] = p[2];
        }
        let weights = match weights {
            Some(w) => {
                if w.len() != n {
                    return Err(Error::empty_data(format!(
                        "{} weights for {} samples",
                        w.len(),
                        n
                    )));
                }
                Array1::from_vec(w.to_vec())
            }
            None => Array1::ones(n),
        };
        let bandwidths = match bandwidth {
            Some(h) => [positive(h); 3],
            None => {
                let factor = scott_factor(effective_sample_size(weights.view()), 3);
                let mut hs = [0.0; 3];
                for (axis, h) in hs.iter_mut().enumerate() {
                    let (_, std) = weighted_mean_std(data.column(axis), weights.view());
                    *h = positive(factor * std);
                }
                hs
            }
        };
        Ok(Self {
            points: data,
            weights,
            bandwidths,
        })
    }

    pub fn bandwidths(&self) -> [f64; 3] {
        self.bandwidths
    }

    /// Evaluate the density at each query point
    pub fn evaluate(&self, queries: &[[f64; 3]]) -> Vec<f64> {
        let wsum: f64 = self.weights.sum();
        let norm = wsum
            * self.bandwidths.iter().product::<f64>()
            * SQRT_2PI.powi(3);
        queries
            .iter()
            .map(|q| {
                let mut acc = 0.0;
                for (row, w) in self.points.rows().into_iter().zip(self.weights.iter()) {
                    let mut exponent = 0.0;
                    for axis in 0..3 {
                        let z = (q[axis] - row[axis]) / self.bandwidths[axis];
                        exponent += z * z;
                    }
                    acc += w * (-0.5 * exponent).exp();
                }
                acc / norm
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kde1_density_is_positive_and_peaks_at_the_mode() {
        let values: Vec<f64> = (0..50).map(|i| (i as f64 * 0.1).sin()).collect();
        let kde = Kde1::fit(&values, None, None).unwrap();
        let densities = kde.evaluate(&values);
        assert_eq!(densities.len(), values.len());
        assert!(densities.iter().all(|d| *d > 0.0));
    }

    #[test]
    fn kde1_integrates_to_about_one() {
        let values = vec![-1.0, -0.5, 0.0, 0.5, 1.0, 0.2, -0.2, 0.7];
        let kde = Kde1::fit(&values, None, None).unwrap();
        let step = 0.01;
        let grid: Vec<f64> = (-1000..1000).map(|i| i as f64 * step).collect();
        let total: f64 = kde.evaluate(&grid).iter().sum::<f64>() * step;
        assert!((total - 1.0).abs() < 0.01, "integral was {}", total);
    }

    #[test]
    fn kde1_weights_shift_the_density() {
        let values = vec![0.0, 10.0];
        let weights = vec![10.0, 1.0];
        let kde = Kde1::fit(&values, Some(&weights), Some(1.0)).unwrap();
        let d = kde.evaluate(&[0.0, 10.0]);
        assert!(d[0] > d[1]);
    }

    #[test]
    fn kde3_distinguishes_dense_from_sparse_regions() {
        let mut points = Vec::new();
        for i in 0..20 {
            let t = i as f64 * 0.01;
            points.push([t, t, t]); // tight blob near the origin
        }
        points.push([5.0, 5.0, 5.0]); // far outlier
        let kde = Kde3::fit(&points, None, None).unwrap();
        let d = kde.evaluate(&[[0.1, 0.1, 0.1], [5.0, 5.0, 5.0]]);
        assert!(d[0] > d[1]);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(Kde1::fit(&[], None, None).is_err());
        assert!(Kde3::fit(&[], None, None).is_err());
    }

    #[test]
    fn zero_variance_sample_still_fits() {
        let kde = Kde1::fit(&[3.0, 3.0, 3.0], None, None).unwrap();
        let d = kde.evaluate(&[3.0]);
        assert!(d[0].is_finite() && d[0] > 0.0);
    }
}
