//! File-backed pipeline engines shelling out to the DIALS and CCP4
//! command-line programs
//!
//! Each engine builds a `CommandSpec`, spawns it in the cluster
//! workdir, checks the exit status, and parses the program's log for
//! the figures the pipeline needs. Log locations and argument layouts
//! follow the upstream programs.

use std::fs;
use std::path::Path;

use tracing::info;

use bragg_core::{Error, Result};

use crate::engine::CommandSpec;
use crate::pipeline::{
    parse_resolution_log, parse_scale_log, FreeFlagEngine, MergeEngine, ResolutionEngine,
    ScaleEngine, ScaleLogSummary, ScaleRequest,
};

fn run_checked(spec: &CommandSpec) -> Result<()> {
    info!(program = %spec.program, workdir = %spec.workdir.display(), "running pipeline stage");
    let status = spec.render().status()?;
    if !status.success() {
        return Err(Error::engine(format!(
            "{} exited with {}",
            spec.program, status
        )));
    }
    Ok(())
}

fn require_output(workdir: &Path, name: &str) -> Result<()> {
    if !workdir.join(name).is_file() {
        return Err(Error::engine(format!("expected output {name} was not produced")));
    }
    Ok(())
}

/// `dials.estimate_resolution` over the symmetrized data
#[derive(Debug, Clone, Copy, Default)]
pub struct DialsResolution;

impl ResolutionEngine for DialsResolution {
    fn estimate(&self, workdir: &Path) -> Result<Option<f64>> {
        let spec = CommandSpec::new("dials.estimate_resolution", workdir)
            .arg("symmetrized.expt")
            .arg("symmetrized.refl");
        run_checked(&spec)?;
        let log = fs::read_to_string(workdir.join("dials.estimate_resolution.log"))?;
        Ok(parse_resolution_log(&log))
    }
}

/// `dials.scale` with deltaCC½ dataset filtering
#[derive(Debug, Clone, Copy)]
pub struct DialsScale {
    pub nprocs: usize,
    pub stdcutoff: f64,
    pub max_cycles: usize,
}

impl Default for DialsScale {
    fn default() -> Self {
        Self {
            nprocs: 1,
            stdcutoff: 3.0,
            max_cycles: 10,
        }
    }
}

impl DialsScale {
    fn command(&self, workdir: &Path, request: ScaleRequest) -> CommandSpec {
        let mut spec = CommandSpec::new("dials.scale", workdir)
            .arg("symmetrized.expt")
            .arg("symmetrized.refl");
        if let Some(d_min) = request.d_min {
            spec = spec.arg(format!("d_min={d_min}"));
        }
        spec.arg(format!("scaling_options.nproc={}", self.nprocs))
            .arg("filtering.method=deltacchalf")
            .arg("deltacchalf.mode=dataset")
            .arg(format!("deltacchalf.stdcutoff={}", self.stdcutoff))
            .arg(format!("deltacchalf.max_cycles={}", self.max_cycles))
    }
}

impl ScaleEngine for DialsScale {
    fn scale(&self, workdir: &Path, request: ScaleRequest) -> Result<ScaleLogSummary> {
        run_checked(&self.command(workdir, request))?;
        require_output(workdir, "scaled.expt")?;
        let log = fs::read_to_string(workdir.join("dials.scale.log"))?;
        parse_scale_log(&log)
    }
}

/// `dials.merge` of the scaled data
#[derive(Debug, Clone, Copy, Default)]
pub struct DialsMerge;

impl MergeEngine for DialsMerge {
    fn merge(&self, workdir: &Path) -> Result<()> {
        let spec = CommandSpec::new("dials.merge", workdir)
            .arg("scaled.expt")
            .arg("scaled.refl");
        run_checked(&spec)?;
        require_output(workdir, "merged.mtz")
    }
}

/// CCP4 `freerflag` over the merged intensities
#[derive(Debug, Clone, Copy, Default)]
pub struct FreeFlag;

impl FreeFlagEngine for FreeFlag {
    fn flag(&self, workdir: &Path) -> Result<()> {
        let spec = CommandSpec::new("freerflag", workdir)
            .arg("hklin")
            .arg("merged.mtz")
            .arg("hklout")
            .arg("merged_FREE.mtz");
        run_checked(&spec)?;
        require_output(workdir, "merged_FREE.mtz")
    }
}
