//! The completeness model: measured set, derived table, and the
//! simulated-loss machinery that drives completeness studies
//!
//! A model owns one measured set and the table built from it. Analysis
//! stages run in a fixed order; simulated removal mutates the measured
//! set (expanding every selected unique reflection to its full
//! symmetry orbit) and then recomputes OBSERVED from scratch.

use std::collections::HashSet;

use rand::seq::index::sample;
use rand::Rng;
use tracing::info;

use bragg_core::{Error, Hkl, Result};

use crate::config::{AngularCoord, CompletenessConfig, RemovalStrategy};
use crate::measured::MeasuredSet;
use crate::record::ReflectionRecord;
use crate::summary::{CompletenessSummary, ThresholdRatio, SUMMARY_SCHEMA_VERSION};
use crate::table::{DistanceField, ReflectionTable, WeightColumn};

/// One measured dataset together with its derived reflection table
#[derive(Debug, Clone)]
pub struct CompletenessModel {
    measured: MeasuredSet,
    table: ReflectionTable,
    config: CompletenessConfig,
    n_missing_clusters: usize,
}

impl CompletenessModel {
    pub fn new(measured: MeasuredSet, config: CompletenessConfig) -> Result<Self> {
        let table = ReflectionTable::build(&measured, config.expand_to_p1)?;
        Ok(Self {
            measured,
            table,
            config,
            n_missing_clusters: 0,
        })
    }

    pub fn table(&self) -> &ReflectionTable {
        &self.table
    }

    pub fn measured(&self) -> &MeasuredSet {
        &self.measured
    }

    pub fn config(&self) -> &CompletenessConfig {
        &self.config
    }

    /// Run every analysis stage in order: unique-reflection flags,
    /// resolution density, cumulative-weighted 3-D density, and
    /// missing-region cluster labels.
    pub fn analyse(&mut self) -> Result<()> {
        self.table.flag_unique_reflections(&self.measured.space_group);
        self.table.resolution_density(&self.config.density)?;
        self.table
            .weighted_density(WeightColumn::ResCumsum, &self.config.density)?;
        self.n_missing_clusters = self
            .table
            .label_missing_clusters(&self.config.mean_shift, self.config.threshold_quantile)?;
        Ok(())
    }

    /// Simulate systematic data loss. The selection is drawn from the
    /// unique reflections only, expanded to full symmetry orbits
    /// (Friedel mates included), removed from the measured set, and the
    /// table's OBSERVED column recomputed. Returns the number of
    /// measured indices actually deleted.
    pub fn apply_removal<R: Rng>(
        &mut self,
        strategy: &RemovalStrategy,
        rng: &mut R,
    ) -> Result<usize> {
        let unique = self.table.unique_rows();
        if unique.is_empty() {
            return Err(Error::empty_data(
                "removal requires unique-reflection flags; run analyse first",
            ));
        }
        let selected = match *strategy {
            RemovalStrategy::Random { fraction } => select_random(&unique, fraction, rng),
            RemovalStrategy::Range { fraction, coord } => {
                select_range(self.table.records(), &unique, fraction, coord)
            }
            RemovalStrategy::Chunks {
                fraction,
                coord,
                n_chunks,
            } => select_chunks(self.table.records(), &unique, fraction, coord, n_chunks, rng),
        };

        let mut expanded: HashSet<Hkl> = HashSet::new();
        for &row in &selected {
            let hkl = self.table.records()[row].hkl();
            expanded.extend(self.measured.space_group.equivalents_with_mates(hkl));
        }
        let deleted = self.measured.delete_indices(&expanded);
        self.table.recompute_observed(&self.measured);
        info!(
            strategy = ?strategy,
            unique_selected = selected.len(),
            deleted,
            "applied simulated removal"
        );
        Ok(deleted)
    }

    /// Collect every summary statistic. Safe to call at any point;
    /// statistics whose stage has not run come out as None.
    pub fn summary(&self) -> CompletenessSummary {
        let high_density_missing = self
            .config
            .ratio_thresholds
            .iter()
            .map(|&threshold| ThresholdRatio {
                threshold,
                ratio: self.table.ratio_high_density_missing(threshold),
            })
            .collect();
        CompletenessSummary {
            schema_version: SUMMARY_SCHEMA_VERSION,
            expand_to_p1: self.config.expand_to_p1,
            n_total: self.table.len(),
            n_observed: self.table.n_observed(),
            symmetry_level: self.table.symmetry_level(),
            ksd_r: self.table.distributional_distance(DistanceField::R),
            ksd_theta: self.table.distributional_distance(DistanceField::Theta),
            ksd_phi: self.table.distributional_distance(DistanceField::Phi),
            ksd_res_cumulative: self
                .table
                .distributional_distance(DistanceField::CumulativeResolution),
            n_missing_clusters: self.n_missing_clusters,
            high_density_missing,
            missing_volume_ratio: self.table.missing_volume_ratio(),
        }
    }
}

fn removal_count(n_unique: usize, fraction: f64) -> usize {
    (n_unique as f64 * fraction).round() as usize
}

fn coord_value(record: &ReflectionRecord, coord: AngularCoord) -> f64 {
    match coord {
        AngularCoord::R => record.r,
        AngularCoord::Theta => record.theta,
        AngularCoord::Phi => record.phi,
    }
}

/// Uniformly random unique rows
fn select_random<R: Rng>(unique: &[usize], fraction: f64, rng: &mut R) -> Vec<usize> {
    let n = removal_count(unique.len(), fraction).min(unique.len());
    sample(rng, unique.len(), n)
        .into_iter()
        .map(|i| unique[i])
        .collect()
}

fn sorted_by_coord(
    records: &[ReflectionRecord],
    unique: &[usize],
    coord: AngularCoord,
) -> Vec<usize> {
    let mut rows = unique.to_vec();
    rows.sort_by(|&i, &j| coord_value(&records[i], coord).total_cmp(&coord_value(&records[j], coord)));
    rows
}

/// One contiguous wedge: the lowest `fraction` of the coordinate
fn select_range(
    records: &[ReflectionRecord],
    unique: &[usize],
    fraction: f64,
    coord: AngularCoord,
) -> Vec<usize> {
    let sorted = sorted_by_coord(records, unique, coord);
    let n = removal_count(sorted.len(), fraction).min(sorted.len());
    sorted[..n].to_vec()
}

/// `n_chunks` contiguous runs, one at a random offset within each equal
/// segment of the coordinate-sorted unique rows
fn select_chunks<R: Rng>(
    records: &[ReflectionRecord],
    unique: &[usize],
    fraction: f64,
    coord: AngularCoord,
    n_chunks: usize,
    rng: &mut R,
) -> Vec<usize> {
    if n_chunks == 0 {
        return Vec::new();
    }
    let sorted = sorted_by_coord(records, unique, coord);
    let chunk_size = removal_count(sorted.len(), fraction / n_chunks as f64);
    let segment = (sorted.len() as f64 / n_chunks as f64).ceil() as usize;

    let mut selected = Vec::new();
    for chunk in 0..n_chunks {
        let start = chunk * segment;
        if start >= sorted.len() {
            break;
        }
        let stop = ((chunk + 1) * segment).min(sorted.len());
        let seg = &sorted[start..stop];
        if seg.len() <= chunk_size {
            selected.extend_from_slice(seg);
        } else {
            let offset = rng.gen_range(0..=seg.len() - chunk_size);
            selected.extend_from_slice(&seg[offset..offset + chunk_size]);
        }
    }
    selected
}
