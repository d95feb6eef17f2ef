//! Campaign-level aggregation of finished sequences
//!
//! Every sequence persists one versioned JSON record. Aggregation
//! reloads whatever subset of a campaign survived: a missing record is
//! skipped silently, a sequence that failed outright is filtered before
//! the joined view, and a campaign with nothing loadable is an error.

use std::fs::File;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use bragg_core::{Error, Result};

use crate::pipeline::ClusterOutcome;
use crate::sequence::{ClusterAssignment, RoundOutcome, SequenceReport};

/// Bumped whenever the record layout changes incompatibly
pub const SEQUENCE_SCHEMA_VERSION: u32 = 1;

/// One sequence's durable record: the report plus the pipeline outcome
/// of each clustered round, in round order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceRecord {
    pub schema_version: u32,
    pub report: SequenceReport,
    pub cluster_outcomes: Vec<ClusterOutcome>,
}

impl SequenceRecord {
    pub fn new(report: SequenceReport, cluster_outcomes: Vec<ClusterOutcome>) -> Self {
        Self {
            schema_version: SEQUENCE_SCHEMA_VERSION,
            report,
            cluster_outcomes,
        }
    }

    /// A record joins the aggregate view only when at least one round
    /// clustered and no engine failure cut the sequence short
    pub fn is_usable(&self) -> bool {
        let failed = self
            .report
            .rounds
            .iter()
            .any(|r| matches!(r, RoundOutcome::EngineFailed { .. }));
        !failed && self.report.assignments().next().is_some()
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn read_json(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let record: Self = serde_json::from_reader(file)?;
        if record.schema_version != SEQUENCE_SCHEMA_VERSION {
            return Err(Error::SchemaVersion(record.schema_version));
        }
        Ok(record)
    }
}

/// Load every record that exists among `paths`, in parallel, keeping
/// only usable sequences. Zero loadable records is an error.
pub fn load_records(paths: &[impl AsRef<Path> + Sync]) -> Result<Vec<SequenceRecord>> {
    let loaded: Vec<SequenceRecord> = paths
        .par_iter()
        .map(|path| {
            let path = path.as_ref();
            if !path.exists() {
                warn!(path = %path.display(), "sequence record missing, skipping");
                return Ok(None);
            }
            SequenceRecord::read_json(path).map(Some)
        })
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect();
    let usable: Vec<SequenceRecord> = loaded
        .into_iter()
        .filter(SequenceRecord::is_usable)
        .collect();
    if usable.is_empty() {
        return Err(Error::no_data("no sequence records could be loaded"));
    }
    Ok(usable)
}

/// The joined assignment table: (sequence identifier, assignment) for
/// every clustered round of every usable record
pub fn joined_assignments(records: &[SequenceRecord]) -> Vec<(String, ClusterAssignment)> {
    records
        .iter()
        .flat_map(|record| {
            record
                .report
                .assignments()
                .map(|a| (record.report.identifier.clone(), a.clone()))
        })
        .collect()
}
