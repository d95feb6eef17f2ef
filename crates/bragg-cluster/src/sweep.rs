//! Integrated sweeps as opaque clustering units

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use bragg_core::Result;

/// One integrated sweep: an experiment identifier plus the file pair the
/// clustering engine consumes. The identifier is assigned upstream by
/// integration and is never interpreted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sweep {
    pub identifier: String,
    pub directory: PathBuf,
    pub experiments_path: PathBuf,
    pub reflections_path: PathBuf,
}

impl Sweep {
    pub fn new(identifier: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        let directory = directory.into();
        Self {
            identifier: identifier.into(),
            experiments_path: directory.join("integrated.expt"),
            reflections_path: directory.join("integrated.refl"),
            directory,
        }
    }

    /// Scan a directory of sweep subdirectories. A subdirectory counts
    /// as a sweep when it holds an integrated experiment file; its name
    /// doubles as the identifier.
    pub fn discover(sweeps_dir: impl AsRef<Path>) -> Result<Vec<Self>> {
        let mut sweeps = Vec::new();
        for entry in fs::read_dir(sweeps_dir.as_ref())? {
            let path = entry?.path();
            if !path.is_dir() || !path.join("integrated.expt").is_file() {
                continue;
            }
            let identifier = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            sweeps.push(Self::new(identifier, path));
        }
        sweeps.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        debug!(n_sweeps = sweeps.len(), "discovered integrated sweeps");
        Ok(sweeps)
    }
}

/// Identifier-to-directory lookup. The engine reports member
/// identifiers; exclusion operates on whole sweep directories.
pub fn directory_map(sweeps: &[Sweep]) -> HashMap<&str, &Path> {
    sweeps
        .iter()
        .map(|s| (s.identifier.as_str(), s.directory.as_path()))
        .collect()
}
