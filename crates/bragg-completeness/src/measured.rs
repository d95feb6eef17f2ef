//! The measured reflection set and its experiment geometry
//!
//! This is the in-process stand-in for the external diffraction reader:
//! a unit cell, a space group, and the list of measured Miller indices.
//! The subset-removal strategies mutate it through `delete_indices`; the
//! table then recomputes OBSERVED from scratch against the result.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use bragg_core::{Error, Hkl, Result, SpaceGroup, UnitCell};

/// Measured reflections plus the geometry needed to interpret them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasuredSet {
    pub unit_cell: UnitCell,
    pub space_group: SpaceGroup,
    indices: Vec<Hkl>,
}

impl MeasuredSet {
    pub fn new(unit_cell: UnitCell, space_group: SpaceGroup, indices: Vec<Hkl>) -> Self {
        Self {
            unit_cell,
            space_group,
            indices,
        }
    }

    /// Read a measured set from its JSON description
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let set: Self = serde_json::from_str(&text)?;
        // Deserialization bypasses the UnitCell constructor, so re-validate
        let c = set.unit_cell;
        UnitCell::new(c.a, c.b, c.c, c.alpha, c.beta, c.gamma)?;
        Ok(set)
    }

    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), text)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> &[Hkl] {
        &self.indices
    }

    /// Highest resolution (smallest d-spacing) among the measured
    /// reflections; errors on an empty set.
    pub fn d_min(&self) -> Result<f64> {
        self.indices
            .iter()
            .filter(|hkl| !hkl.is_origin())
            .map(|hkl| self.unit_cell.d_spacing(*hkl))
            .min_by(|a, b| a.total_cmp(b))
            .ok_or_else(|| Error::empty_data("measured set has no reflections"))
    }

    /// The measured set reduced to unique asymmetric-unit representatives
    /// (Friedel mates merged), in deterministic sorted order.
    pub fn unique_asu_indices(&self) -> Vec<Hkl> {
        let set: BTreeSet<Hkl> = self
            .indices
            .iter()
            .filter(|hkl| !hkl.is_origin())
            .map(|hkl| self.space_group.map_to_asu(*hkl, false))
            .collect();
        set.into_iter().collect()
    }

    /// Membership set used to mark OBSERVED in the reflection table.
    /// With `expand_to_p1` the unique representatives are expanded to all
    /// symmetry equivalents and Friedel mates; otherwise the set holds
    /// the representatives themselves.
    pub fn observed_membership(&self, expand_to_p1: bool) -> HashSet<Hkl> {
        let unique = self.unique_asu_indices();
        if expand_to_p1 {
            unique
                .iter()
                .flat_map(|hkl| self.space_group.equivalents_with_mates(*hkl))
                .collect()
        } else {
            unique.into_iter().collect()
        }
    }

    /// Delete every measured reflection whose index is in `selection`.
    /// Returns the number of entries removed.
    pub fn delete_indices(&mut self, selection: &HashSet<Hkl>) -> usize {
        let before = self.indices.len();
        self.indices.retain(|hkl| !selection.contains(hkl));
        before - self.indices.len()
    }
}
