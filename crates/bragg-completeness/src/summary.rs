//! Per-dataset completeness statistics
//!
//! Every statistic is optional: a value that could not be computed
//! (no missing rows, degenerate hull, stage not run) is serialised as
//! null rather than a fabricated number.

use serde::{Deserialize, Serialize};

/// Bumped whenever the summary layout changes incompatibly
pub const SUMMARY_SCHEMA_VERSION: u32 = 1;

/// Fraction of missing rows above one density threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRatio {
    pub threshold: f64,
    pub ratio: Option<f64>,
}

/// The end product of one completeness analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletenessSummary {
    pub schema_version: u32,
    pub expand_to_p1: bool,
    pub n_total: usize,
    pub n_observed: usize,
    pub symmetry_level: Option<f64>,
    pub ksd_r: Option<f64>,
    pub ksd_theta: Option<f64>,
    pub ksd_phi: Option<f64>,
    pub ksd_res_cumulative: Option<f64>,
    pub n_missing_clusters: usize,
    pub high_density_missing: Vec<ThresholdRatio>,
    pub missing_volume_ratio: Option<f64>,
}

impl CompletenessSummary {
    /// Plain completeness, observed over total
    pub fn completeness(&self) -> Option<f64> {
        if self.n_total == 0 {
            return None;
        }
        Some(self.n_observed as f64 / self.n_total as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_statistics_stay_null_through_json() {
        let summary = CompletenessSummary {
            schema_version: SUMMARY_SCHEMA_VERSION,
            expand_to_p1: true,
            n_total: 100,
            n_observed: 100,
            symmetry_level: Some(4.0),
            ksd_r: Some(0.0),
            ksd_theta: Some(0.0),
            ksd_phi: Some(0.0),
            ksd_res_cumulative: Some(0.0),
            n_missing_clusters: 0,
            high_density_missing: vec![ThresholdRatio {
                threshold: 0.3,
                ratio: None,
            }],
            missing_volume_ratio: None,
        };
        let text = serde_json::to_string(&summary).unwrap();
        assert!(text.contains("\"ratio\":null"));
        let back: CompletenessSummary = serde_json::from_str(&text).unwrap();
        assert_eq!(back, summary);
    }

    #[test]
    fn completeness_fraction() {
        let mut summary = CompletenessSummary {
            schema_version: SUMMARY_SCHEMA_VERSION,
            expand_to_p1: false,
            n_total: 200,
            n_observed: 150,
            symmetry_level: None,
            ksd_r: None,
            ksd_theta: None,
            ksd_phi: None,
            ksd_res_cumulative: None,
            n_missing_clusters: 0,
            high_density_missing: vec![],
            missing_volume_ratio: None,
        };
        assert_eq!(summary.completeness(), Some(0.75));
        summary.n_total = 0;
        assert_eq!(summary.completeness(), None);
    }
}
