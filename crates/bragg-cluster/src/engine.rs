//! The clustering engine contract and the file-backed cosym engine
//!
//! External programs are described by a structured `CommandSpec` that is
//! rendered into a `std::process::Command` only at the spawn boundary;
//! a command line is never assembled as a string and re-parsed.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use bragg_core::{Error, Result};

use crate::sweep::Sweep;

#[cfg(test)]
use mockall::automock;

/// A fully structured external invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: workdir.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Render into a spawnable command
    pub fn render(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).current_dir(&self.workdir);
        command
    }
}

/// What one engine invocation produced: the identifiers it grouped into
/// the dominant cluster and how many clusters it saw in total
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineClustering {
    pub member_identifiers: Vec<String>,
    pub n_clusters: usize,
}

/// Partition candidate sweeps by similarity
#[cfg_attr(test, automock)]
pub trait ClusteringEngine {
    fn cluster(&self, candidates: &[Sweep], workdir: &Path) -> Result<EngineClustering>;
}

/// File-backed engine that shells out to `dials.cosym` and reads the
/// resulting experiment identifiers back from its JSON output
#[derive(Debug, Clone)]
pub struct CosymLogEngine {
    pub clustering_threshold: f64,
    pub nprocs: usize,
}

impl Default for CosymLogEngine {
    fn default() -> Self {
        Self {
            clustering_threshold: 5000.0,
            nprocs: 1,
        }
    }
}

impl CosymLogEngine {
    const OUTPUT_EXPERIMENTS: &'static str = "symmetrized.expt";
    const LOGFILE: &'static str = "dials.cosym.log";

    fn command(&self, candidates: &[Sweep], workdir: &Path) -> CommandSpec {
        let mut spec = CommandSpec::new("dials.cosym", workdir);
        for sweep in candidates {
            spec = spec
                .arg(sweep.experiments_path.display().to_string())
                .arg(sweep.reflections_path.display().to_string());
        }
        spec.arg(format!(
            "unit_cell_clustering.threshold={}",
            self.clustering_threshold
        ))
        .arg(format!("nproc={}", self.nprocs))
    }
}

impl ClusteringEngine for CosymLogEngine {
    fn cluster(&self, candidates: &[Sweep], workdir: &Path) -> Result<EngineClustering> {
        fs::create_dir_all(workdir)?;
        let spec = self.command(candidates, workdir);
        info!(program = %spec.program, workdir = %workdir.display(), "running clustering engine");

        let status = spec.render().status()?;
        if !status.success() {
            return Err(Error::engine(format!(
                "{} exited with {}",
                spec.program, status
            )));
        }

        let member_identifiers =
            parse_experiment_identifiers(&workdir.join(Self::OUTPUT_EXPERIMENTS))?;
        let n_clusters = match fs::read_to_string(workdir.join(Self::LOGFILE)) {
            Ok(log) => parse_cluster_count(&log).unwrap_or(usize::from(!member_identifiers.is_empty())),
            Err(e) => {
                warn!(error = %e, "clustering log unreadable, assuming one cluster");
                usize::from(!member_identifiers.is_empty())
            }
        };
        Ok(EngineClustering {
            member_identifiers,
            n_clusters,
        })
    }
}

/// Pull the experiment identifiers out of a DIALS experiment list file
/// (JSON with an "experiment" array whose entries carry "identifier")
pub fn parse_experiment_identifiers(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&text)?;
    let experiments = value
        .get("experiment")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            Error::engine(format!("{} holds no experiment list", path.display()))
        })?;
    Ok(experiments
        .iter()
        .filter_map(|e| e.get("identifier").and_then(|i| i.as_str()))
        .map(str::to_owned)
        .collect())
}

/// "Number of clusters: N" from the engine log, if present
pub fn parse_cluster_count(log: &str) -> Option<usize> {
    log.lines()
        .filter(|line| line.contains("Number of clusters:"))
        .filter_map(|line| line.split_whitespace().last()?.parse().ok())
        .next_back()
}
