//! Durable, self-describing snapshots of tables and summaries
//!
//! Tables persist as CSV with the canonical column headers; summaries
//! persist as JSON carrying an explicit schema version that is checked
//! on every load. Batch loads skip absent files silently so that a
//! partially failed campaign still aggregates, but refuse to return an
//! entirely empty result.

use std::fs::File;
use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, warn};

use bragg_core::{Error, Result};

use crate::record::ReflectionRecord;
use crate::summary::{CompletenessSummary, SUMMARY_SCHEMA_VERSION};
use crate::table::ReflectionTable;

/// Write the full table, one CSV row per reflection
pub fn write_table_csv(table: &ReflectionTable, path: impl AsRef<Path>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    for record in table.records() {
        writer.serialize(record)?;
    }
    writer.flush()?;
    debug!(path = %path.as_ref().display(), rows = table.len(), "wrote table snapshot");
    Ok(())
}

/// Reload a table snapshot. The P1-expansion flag is not a column, so
/// the caller must supply the value the table was built with.
pub fn read_table_csv(path: impl AsRef<Path>, expand_to_p1: bool) -> Result<ReflectionTable> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;
    let mut records = Vec::new();
    for row in reader.deserialize::<ReflectionRecord>() {
        records.push(row?);
    }
    if records.is_empty() {
        return Err(Error::snapshot(format!(
            "table snapshot {} holds no rows",
            path.as_ref().display()
        )));
    }
    Ok(ReflectionTable::from_records(records, expand_to_p1))
}

/// Write a summary as pretty JSON
pub fn write_summary(summary: &CompletenessSummary, path: impl AsRef<Path>) -> Result<()> {
    let file = File::create(path.as_ref())?;
    serde_json::to_writer_pretty(file, summary)?;
    Ok(())
}

/// Load one summary, rejecting any schema version we do not understand
pub fn read_summary(path: impl AsRef<Path>) -> Result<CompletenessSummary> {
    let file = File::open(path.as_ref())?;
    let summary: CompletenessSummary = serde_json::from_reader(file)?;
    if summary.schema_version != SUMMARY_SCHEMA_VERSION {
        return Err(Error::SchemaVersion(summary.schema_version));
    }
    Ok(summary)
}

/// Load every summary that exists among `paths`, in parallel. Absent
/// files are skipped with a warning; an unreadable present file is an
/// error; zero loadable summaries is an error.
pub fn load_summaries(paths: &[impl AsRef<Path> + Sync]) -> Result<Vec<CompletenessSummary>> {
    let loaded: Vec<CompletenessSummary> = paths
        .par_iter()
        .map(|path| {
            let path = path.as_ref();
            if !path.exists() {
                warn!(path = %path.display(), "summary missing, skipping");
                return Ok(None);
            }
            read_summary(path).map(Some)
        })
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect();
    if loaded.is_empty() {
        return Err(Error::no_data("no completeness summaries could be loaded"));
    }
    Ok(loaded)
}
