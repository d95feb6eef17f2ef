//! bragg-cluster: divisive clustering of integrated sweeps
//!
//! A clustering engine partitions candidate sweeps by similarity; the
//! sequence controller calls it round after round, excluding everything
//! already assigned, until no further clusters emerge or every sweep is
//! placed. Each completed cluster then runs a fixed post-processing
//! pipeline whose failures are contained to that cluster. Aggregation
//! reloads the per-sequence snapshots that survived a campaign.

pub mod array;
pub mod engine;
pub mod pipeline;
pub mod sequence;
pub mod sweep;
pub mod wrappers;

pub use array::SequenceRecord;
pub use engine::{ClusteringEngine, CommandSpec, CosymLogEngine, EngineClustering};
pub use pipeline::{
    ClusterOutcome, ClusterPipeline, PipelineStage, ScaleLogSummary, ScaleRequest,
};
pub use sequence::{
    ClusterAssignment, ClusterSequence, RoundOutcome, SequenceReport, Termination,
};
pub use sweep::Sweep;
