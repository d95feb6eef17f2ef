//! Per-cluster post-processing pipeline
//!
//! Stages run in a fixed order: resolution estimation, scaling with
//! deltaCC½ filtering, an optional re-scale when the scale log suggests
//! a better resolution limit, merging, and free-reflection flagging.
//! A stage failure is recorded against its stage and aborts only this
//! cluster; sibling clusters keep running.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use bragg_core::{Error, Result};

#[cfg(test)]
use mockall::automock;

/// Pipeline stage names, as persisted in outcome records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Resolution,
    Scale,
    Rescale,
    Merge,
    FreeFlag,
}

/// Scaling inputs that vary between the first pass and a re-scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleRequest {
    pub d_min: Option<f64>,
}

/// Figures pulled from a scaling log. Anything the log does not state
/// stays `None` or empty; numbers are never invented.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScaleLogSummary {
    /// CC½ mean per filtering cycle
    pub cchalf_mean: Vec<f64>,
    /// Mean deltaCC½ per filtering cycle
    pub mean_delta_cchalf: Vec<f64>,
    /// Stddev of deltaCC½ per filtering cycle
    pub std_delta_cchalf: Vec<f64>,
    /// Datasets removed by deltaCC½ filtering, summed over cycles
    pub n_removed_datasets: usize,
    /// Resolution limit the CC½ fit suggests, if any
    pub suggested_resolution: Option<f64>,
}

/// Parse a scaling log. Unparseable numbers on a recognised line are an
/// error; unrecognised lines are ignored.
pub fn parse_scale_log(log: &str) -> Result<ScaleLogSummary> {
    let mut summary = ScaleLogSummary::default();
    for line in log.lines() {
        if line.contains("CC 1/2 mean:") {
            summary.cchalf_mean.push(parse_last_number(line)?);
        } else if line.contains("mean delta_cc_half") {
            summary.mean_delta_cchalf.push(parse_last_number(line)?);
        } else if line.contains("stddev delta_cc_half") {
            summary.std_delta_cchalf.push(parse_last_number(line)?);
        } else if line.contains("Removed datasets:") {
            let payload = line.rsplit(':').next().unwrap_or("").trim();
            let removed: Vec<serde_json::Value> = serde_json::from_str(payload)?;
            summary.n_removed_datasets += removed.len();
        } else if line.contains("Resolution limit suggested from CC\u{00bd} fit") {
            summary.suggested_resolution = Some(parse_last_number(line)?);
        }
    }
    Ok(summary)
}

/// "Resolution cc_half: X" from a resolution-estimation log
pub fn parse_resolution_log(log: &str) -> Option<f64> {
    log.lines()
        .filter(|line| line.contains("Resolution cc_half:"))
        .filter_map(|line| line.split_whitespace().last()?.parse().ok())
        .next_back()
}

fn parse_last_number(line: &str) -> Result<f64> {
    line.split_whitespace()
        .last()
        .and_then(|token| token.parse().ok())
        .ok_or_else(|| Error::engine(format!("no trailing number in log line: {line:?}")))
}

/// Estimate a high-resolution cutoff for the symmetrized data
#[cfg_attr(test, automock)]
pub trait ResolutionEngine {
    fn estimate(&self, workdir: &Path) -> Result<Option<f64>>;
}

/// Scale the symmetrized data, filtering datasets by deltaCC½
#[cfg_attr(test, automock)]
pub trait ScaleEngine {
    fn scale(&self, workdir: &Path, request: ScaleRequest) -> Result<ScaleLogSummary>;
}

/// Merge the scaled data into a single intensity set
#[cfg_attr(test, automock)]
pub trait MergeEngine {
    fn merge(&self, workdir: &Path) -> Result<()>;
}

/// Add free-reflection flags to the merged output
#[cfg_attr(test, automock)]
pub trait FreeFlagEngine {
    fn flag(&self, workdir: &Path) -> Result<()>;
}

/// How one cluster's pipeline ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClusterOutcome {
    Completed {
        resolution: Option<f64>,
        scale: ScaleLogSummary,
    },
    Failed {
        stage: PipelineStage,
        reason: String,
    },
}

impl ClusterOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// The ordered stage runner for one cluster
pub struct ClusterPipeline<R, S, M, F> {
    pub resolution: R,
    pub scale: S,
    pub merge: M,
    pub free_flag: F,
}

impl<R, S, M, F> ClusterPipeline<R, S, M, F>
where
    R: ResolutionEngine,
    S: ScaleEngine,
    M: MergeEngine,
    F: FreeFlagEngine,
{
    /// Run every stage in order. Failures are data, not errors: the
    /// returned outcome says which stage gave up and why.
    pub fn run(&self, workdir: &Path) -> ClusterOutcome {
        let fail = |stage: PipelineStage, e: Error| {
            warn!(?stage, error = %e, "cluster pipeline stage failed");
            ClusterOutcome::Failed {
                stage,
                reason: e.to_string(),
            }
        };

        let resolution = match self.resolution.estimate(workdir) {
            Ok(r) => r,
            Err(e) => return fail(PipelineStage::Resolution, e),
        };
        let mut scale = match self.scale.scale(workdir, ScaleRequest { d_min: resolution }) {
            Ok(s) => s,
            Err(e) => return fail(PipelineStage::Scale, e),
        };

        // One re-scale when the CC½ fit suggests a limit above the one
        // the first pass used
        if let Some(suggested) = scale.suggested_resolution {
            if resolution.map_or(true, |d_min| suggested > d_min) {
                info!(suggested, "re-scaling at the suggested resolution limit");
                scale = match self.scale.scale(
                    workdir,
                    ScaleRequest {
                        d_min: Some(suggested),
                    },
                ) {
                    Ok(s) => s,
                    Err(e) => return fail(PipelineStage::Rescale, e),
                };
            }
        }

        if let Err(e) = self.merge.merge(workdir) {
            return fail(PipelineStage::Merge, e);
        }
        if let Err(e) = self.free_flag.flag(workdir) {
            return fail(PipelineStage::FreeFlag, e);
        }
        ClusterOutcome::Completed { resolution, scale }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCALE_LOG: &str = "\
 some preamble
   CC 1/2 mean: 0.912
 cycle 1 mean delta_cc_half 0.004
 cycle 1 stddev delta_cc_half 0.002
 Removed datasets: [\"3\", \"7\"]
   CC 1/2 mean: 0.934
 cycle 2 mean delta_cc_half 0.001
 cycle 2 stddev delta_cc_half 0.001
 Removed datasets: [\"9\"]
 Resolution limit suggested from CC\u{00bd} fit (limit CC\u{00bd}=0.3): 1.84
";

    #[test]
    fn scale_log_figures_are_collected_per_cycle() {
        let summary = parse_scale_log(SCALE_LOG).unwrap();
        assert_eq!(summary.cchalf_mean, vec![0.912, 0.934]);
        assert_eq!(summary.mean_delta_cchalf, vec![0.004, 0.001]);
        assert_eq!(summary.std_delta_cchalf, vec![0.002, 0.001]);
        assert_eq!(summary.n_removed_datasets, 3);
        assert_eq!(summary.suggested_resolution, Some(1.84));
    }

    #[test]
    fn absent_figures_stay_absent() {
        let summary = parse_scale_log("nothing relevant\n").unwrap();
        assert!(summary.cchalf_mean.is_empty());
        assert_eq!(summary.n_removed_datasets, 0);
        assert_eq!(summary.suggested_resolution, None);
    }

    #[test]
    fn garbled_removed_datasets_line_is_an_error() {
        assert!(parse_scale_log("Removed datasets: not json\n").is_err());
    }

    #[test]
    fn resolution_log_takes_the_last_estimate() {
        let log = "Resolution cc_half: 2.10\nResolution cc_half: 1.95\n";
        assert_eq!(parse_resolution_log(log), Some(1.95));
        assert_eq!(parse_resolution_log(""), None);
    }

    fn happy_engines(
        suggested: Option<f64>,
    ) -> ClusterPipeline<MockResolutionEngine, MockScaleEngine, MockMergeEngine, MockFreeFlagEngine>
    {
        let mut resolution = MockResolutionEngine::new();
        resolution.expect_estimate().returning(|_| Ok(Some(2.0)));

        let mut scale = MockScaleEngine::new();
        scale.expect_scale().returning(move |_, request| {
            Ok(ScaleLogSummary {
                cchalf_mean: vec![0.9],
                // Only the first pass carries a suggestion, so the
                // re-scale cannot recurse
                suggested_resolution: suggested.filter(|_| request.d_min == Some(2.0)),
                ..ScaleLogSummary::default()
            })
        });

        let mut merge = MockMergeEngine::new();
        merge.expect_merge().returning(|_| Ok(()));
        let mut free_flag = MockFreeFlagEngine::new();
        free_flag.expect_flag().returning(|_| Ok(()));

        ClusterPipeline {
            resolution,
            scale,
            merge,
            free_flag,
        }
    }

    #[test]
    fn all_stages_passing_completes_the_cluster() {
        let outcome = happy_engines(None).run(Path::new("/work"));
        assert!(matches!(
            outcome,
            ClusterOutcome::Completed {
                resolution: Some(r),
                ..
            } if r == 2.0
        ));
    }

    #[test]
    fn coarser_suggested_limit_triggers_exactly_one_rescale() {
        let pipeline = happy_engines(Some(2.4));
        let outcome = pipeline.run(Path::new("/work"));
        match outcome {
            ClusterOutcome::Completed { scale, .. } => {
                assert_eq!(scale.suggested_resolution, None);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn suggestion_at_or_below_the_first_pass_limit_is_not_rescaled() {
        let mut resolution = MockResolutionEngine::new();
        resolution.expect_estimate().returning(|_| Ok(Some(2.0)));
        let mut scale = MockScaleEngine::new();
        scale.expect_scale().times(1).returning(|_, _| {
            Ok(ScaleLogSummary {
                suggested_resolution: Some(1.8),
                ..ScaleLogSummary::default()
            })
        });
        let mut merge = MockMergeEngine::new();
        merge.expect_merge().returning(|_| Ok(()));
        let mut free_flag = MockFreeFlagEngine::new();
        free_flag.expect_flag().returning(|_| Ok(()));

        let pipeline = ClusterPipeline {
            resolution,
            scale,
            merge,
            free_flag,
        };
        match pipeline.run(Path::new("/work")) {
            ClusterOutcome::Completed { scale, .. } => {
                assert_eq!(scale.suggested_resolution, Some(1.8));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn scale_failure_is_attributed_to_the_scale_stage() {
        let mut resolution = MockResolutionEngine::new();
        resolution.expect_estimate().returning(|_| Ok(None));
        let mut scale = MockScaleEngine::new();
        scale
            .expect_scale()
            .returning(|_, _| Err(Error::engine("scaling diverged")));

        let pipeline = ClusterPipeline {
            resolution,
            scale,
            merge: MockMergeEngine::new(),
            free_flag: MockFreeFlagEngine::new(),
        };
        match pipeline.run(Path::new("/work")) {
            ClusterOutcome::Failed { stage, reason } => {
                assert_eq!(stage, PipelineStage::Scale);
                assert!(reason.contains("scaling diverged"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
