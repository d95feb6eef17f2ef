//! bragg-core: shared primitives for diffraction data analysis
//!
//! This crate provides the building blocks used by the completeness model
//! and the sweep clustering controller: Miller indices, unit-cell geometry,
//! space-group symmetry operations, and the statistics helpers (kernel
//! density estimation, Kolmogorov-Smirnov distances, mean-shift clustering,
//! convex hull volumes) that the higher-level crates compose.

pub mod error;
pub mod geometry;
pub mod stats;
pub mod symmetry;

pub use error::{Error, Result};
pub use geometry::{Hkl, UnitCell};
pub use symmetry::SpaceGroup;
