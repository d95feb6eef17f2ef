//! Configuration for the completeness model
//!
//! Bandwidths and thresholds are deliberately configuration rather than
//! constants: the defaults below reproduce the values the model was
//! originally tuned with, but nothing in the pipeline assumes them.

use bragg_core::stats::MeanShiftParams;
use serde::{Deserialize, Serialize};

/// Kernel density estimation settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct DensityConfig {
    /// 1-D bandwidth over the resolution axis; `None` = Scott's rule
    pub resolution_bandwidth: Option<f64>,
    /// 3-D bandwidth over reciprocal-space coordinates; `None` = Scott's rule
    pub coordinate_bandwidth: Option<f64>,
}

/// Main completeness model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletenessConfig {
    /// Expand the observed and complete sets to P1 (no symmetry)
    pub expand_to_p1: bool,
    /// Kernel density settings
    pub density: DensityConfig,
    /// Mean-shift clustering of high-density missing regions
    pub mean_shift: MeanShiftParams,
    /// Quantile of missing-row weighted density above which rows are
    /// candidates for cluster labelling
    pub threshold_quantile: f64,
    /// Normalised-density thresholds reported in the summary
    pub ratio_thresholds: Vec<f64>,
}

impl Default for CompletenessConfig {
    fn default() -> Self {
        Self {
            expand_to_p1: true,
            density: DensityConfig::default(),
            mean_shift: MeanShiftParams::default(),
            threshold_quantile: 0.75,
            ratio_thresholds: vec![0.3, 0.6, 0.9],
        }
    }
}

/// Which spherical coordinate a removal strategy slices along
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngularCoord {
    R,
    Theta,
    Phi,
}

/// Simulated systematic-loss strategies. The three variants model
/// distinct failure modes and are kept separate on purpose: uniform
/// random loss, a single contiguous angular wedge, and several disjoint
/// angular chunks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemovalStrategy {
    /// Remove a uniformly random fraction of the unique reflections
    Random { fraction: f64 },
    /// Remove the unique reflections below the fraction-quantile of a
    /// spherical coordinate (one contiguous angular wedge)
    Range { fraction: f64, coord: AngularCoord },
    /// Remove `n_chunks` contiguous runs, one from each equal segment of
    /// the coordinate-sorted unique reflections
    Chunks {
        fraction: f64,
        coord: AngularCoord,
        n_chunks: usize,
    },
}
