//! bragg-completeness: reflection completeness modelling
//!
//! Builds the theoretically complete reciprocal-lattice table for a
//! measured dataset, derives spherical coordinates and kernel density
//! estimates over it, flags systematically missing regions by mean-shift
//! clustering, and condenses everything into a `CompletenessSummary`.
//! Subset-removal strategies simulate systematic data loss for
//! sensitivity studies.

pub mod config;
pub mod measured;
pub mod model;
pub mod record;
pub mod snapshot;
pub mod summary;
pub mod table;

pub use config::{AngularCoord, CompletenessConfig, DensityConfig, RemovalStrategy};
pub use measured::MeasuredSet;
pub use model::CompletenessModel;
pub use record::ReflectionRecord;
pub use summary::{CompletenessSummary, ThresholdRatio, SUMMARY_SCHEMA_VERSION};
pub use table::{DistanceField, ReflectionTable, WeightColumn};
