//! Error types shared across the bragg crates

use thiserror::Error;

/// Result type alias for bragg operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the completeness model and the clustering controller
#[derive(Debug, Error)]
pub enum Error {
    /// The unit cell cannot produce a valid metric tensor
    #[error("Geometry error: {0}")]
    Geometry(String),

    /// An operation requires a non-empty measured reflection set
    #[error("Empty data: {0}")]
    EmptyData(String),

    /// A derived column is required but its producing stage has not run
    #[error("Missing derived column '{0}'")]
    MissingColumn(&'static str),

    /// External clustering/scaling engine failure
    #[error("Engine error: {0}")]
    Engine(String),

    /// Snapshot content is malformed or inconsistent
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Snapshot was written by an unknown schema revision
    #[error("Unsupported snapshot schema version: {0}")]
    SchemaVersion(u32),

    /// Aggregation found nothing to aggregate
    #[error("No data: {0}")]
    NoData(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Create a geometry error
    pub fn geometry(message: impl Into<String>) -> Self {
        Self::Geometry(message.into())
    }

    /// Create an empty-data error
    pub fn empty_data(message: impl Into<String>) -> Self {
        Self::EmptyData(message.into())
    }

    /// Create an engine error
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine(message.into())
    }

    /// Create a snapshot error
    pub fn snapshot(message: impl Into<String>) -> Self {
        Self::Snapshot(message.into())
    }

    /// Create a no-data error
    pub fn no_data(message: impl Into<String>) -> Self {
        Self::NoData(message.into())
    }
}
