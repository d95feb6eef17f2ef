//! The reflection table and its derived statistics
//!
//! The table is built once from the measured set and the experiment
//! geometry; every later stage only adds or overwrites derived columns.
//! Rows are never deleted: simulated data loss mutates the measured set
//! and OBSERVED is then recomputed for all rows by set membership.

use std::collections::HashMap;

use tracing::info;

use bragg_core::stats::{
    self, convex_hull_volume, ks_statistic, mean_shift, Kde1, Kde3, MeanShiftParams,
};
use bragg_core::{Error, Hkl, Result, SpaceGroup};

use crate::config::DensityConfig;
use crate::measured::MeasuredSet;
use crate::record::ReflectionRecord;

/// Which derived column weights the 3-D density estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightColumn {
    ResDensity,
    ResCumsum,
}

/// Marginal distribution compared between the full population and the
/// observed subset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceField {
    R,
    Theta,
    Phi,
    CumulativeResolution,
}

/// The complete reciprocal-lattice table for one dataset
#[derive(Debug, Clone)]
pub struct ReflectionTable {
    records: Vec<ReflectionRecord>,
    expand_to_p1: bool,
}

impl ReflectionTable {
    /// Build the complete set for the measured data. The enumeration
    /// covers every index within the measured resolution limit, expanded
    /// to P1 or reduced to asymmetric-unit representatives, sorted
    /// descending by resolution (stable, so enumeration order breaks
    /// ties).
    pub fn build(measured: &MeasuredSet, expand_to_p1: bool) -> Result<Self> {
        if measured.is_empty() {
            return Err(Error::empty_data(
                "cannot build a reflection table from an empty measured set",
            ));
        }
        let d_min = measured.d_min()?;
        let observed = measured.observed_membership(expand_to_p1);
        let cell = &measured.unit_cell;
        let sg = &measured.space_group;
        let (h_max, k_max, l_max) = cell.index_limits(d_min);
        let d_cutoff = d_min * (1.0 - 1e-9);

        let mut records = Vec::new();
        for h in -h_max..=h_max {
            for k in -k_max..=k_max {
                for l in -l_max..=l_max {
                    let hkl = Hkl::new(h, k, l);
                    if hkl.is_origin() {
                        continue;
                    }
                    let res = cell.d_spacing(hkl);
                    if res < d_cutoff {
                        continue;
                    }
                    if !expand_to_p1 && sg.map_to_asu(hkl, false) != hkl {
                        continue;
                    }
                    let rlp = cell.reciprocal_vector(hkl);
                    records.push(ReflectionRecord::new(
                        hkl,
                        rlp,
                        res,
                        observed.contains(&hkl),
                    ));
                }
            }
        }
        // Stable sort keeps enumeration order as the tie-break
        records.sort_by(|x, y| y.res.total_cmp(&x.res));
        info!(
            rows = records.len(),
            observed = records.iter().filter(|r| r.observed).count(),
            expand_to_p1,
            "built reflection table"
        );
        Ok(Self {
            records,
            expand_to_p1,
        })
    }

    /// Assemble a table directly from records (snapshot reload, tests)
    pub fn from_records(records: Vec<ReflectionRecord>, expand_to_p1: bool) -> Self {
        Self {
            records,
            expand_to_p1,
        }
    }

    pub fn records(&self) -> &[ReflectionRecord] {
        &self.records
    }

    pub fn expand_to_p1(&self) -> bool {
        self.expand_to_p1
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn n_observed(&self) -> usize {
        self.records.iter().filter(|r| r.observed).count()
    }

    pub fn n_missing(&self) -> usize {
        self.records.iter().filter(|r| !r.observed).count()
    }

    /// Recompute OBSERVED for every row from fresh set membership
    /// against the (possibly mutated) measured set. Never toggles rows
    /// incrementally.
    pub fn recompute_observed(&mut self, measured: &MeasuredSet) {
        let observed = measured.observed_membership(self.expand_to_p1);
        for record in &mut self.records {
            record.observed = observed.contains(&record.hkl());
        }
    }

    /// RES_DENSITY: 1-D kernel density over the resolution values.
    /// RES_CUMSUM: the density prefix sums in descending-RES order,
    /// assigned in reverse, so the largest-RES row carries the full
    /// density sum and values shrink towards the high-resolution end.
    /// Rows with tied RES share one value.
    pub fn resolution_density(&mut self, config: &DensityConfig) -> Result<()> {
        let res: Vec<f64> = self.records.iter().map(|r| r.res).collect();
        let kde = Kde1::fit(&res, None, config.resolution_bandwidth)?;
        let density = kde.evaluate(&res);

        let n = res.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&i, &j| res[j].total_cmp(&res[i]));
        let mut prefix = Vec::with_capacity(n);
        let mut acc = 0.0;
        for &idx in &order {
            acc += density[idx];
            prefix.push(acc);
        }
        // The row at descending rank k takes the prefix sum of length
        // n - k; a tie group takes the value at its first rank
        let mut cumsum = vec![0.0; n];
        let mut start = 0;
        while start < n {
            let mut end = start + 1;
            while end < n && res[order[end]] == res[order[start]] {
                end += 1;
            }
            for &idx in &order[start..end] {
                cumsum[idx] = prefix[n - 1 - start];
            }
            start = end;
        }

        for (record, (d, c)) in self
            .records
            .iter_mut()
            .zip(density.into_iter().zip(cumsum.into_iter()))
        {
            record.res_density = Some(d);
            record.res_cumsum = Some(c);
        }
        Ok(())
    }

    fn weight_values(&self, column: WeightColumn) -> Result<Vec<f64>> {
        self.records
            .iter()
            .map(|r| match column {
                WeightColumn::ResDensity => {
                    r.res_density.ok_or(Error::MissingColumn("RES_DENSITY"))
                }
                WeightColumn::ResCumsum => r.res_cumsum.ok_or(Error::MissingColumn("RES_CUMSUM")),
            })
            .collect()
    }

    /// WEIGHTED_DENSITY: two independent 3-D density estimates, one over
    /// observed rows and one over missing rows, each weighted by the
    /// selected column and evaluated at its own rows. Every row receives
    /// exactly one value. NORM_WEIGHTED_DENSITY min-max scales the
    /// result across the whole table.
    pub fn weighted_density(&mut self, weight: WeightColumn, config: &DensityConfig) -> Result<()> {
        let weights = self.weight_values(weight)?;
        for observed in [true, false] {
            let rows: Vec<usize> = (0..self.records.len())
                .filter(|&i| self.records[i].observed == observed)
                .collect();
            if rows.is_empty() {
                continue;
            }
            let points: Vec<[f64; 3]> = rows.iter().map(|&i| self.records[i].coords()).collect();
            let row_weights: Vec<f64> = rows.iter().map(|&i| weights[i]).collect();
            let kde = Kde3::fit(&points, Some(&row_weights), config.coordinate_bandwidth)?;
            let density = kde.evaluate(&points);
            for (&i, d) in rows.iter().zip(density) {
                self.records[i].weighted_density = Some(d);
            }
        }

        let raw: Vec<f64> = self
            .records
            .iter()
            .map(|r| r.weighted_density.unwrap_or(0.0))
            .collect();
        let normalised = stats::min_max_normalize(&raw);
        for (record, n) in self.records.iter_mut().zip(normalised) {
            record.norm_weighted_density = Some(n);
        }
        Ok(())
    }

    /// Label spatially contiguous high-density missing regions. Missing
    /// rows above the weighted-density quantile threshold are clustered
    /// by mean shift on their (A, B, C) coordinates; everything else
    /// keeps a null label. Returns the number of clusters found.
    pub fn label_missing_clusters(
        &mut self,
        params: &MeanShiftParams,
        threshold_quantile: f64,
    ) -> Result<usize> {
        for record in &mut self.records {
            record.meanshift_label = None;
        }

        let missing_density: Vec<f64> = self
            .records
            .iter()
            .filter(|r| !r.observed)
            .map(|r| {
                r.weighted_density
                    .ok_or(Error::MissingColumn("WEIGHTED_DENSITY"))
            })
            .collect::<Result<_>>()?;
        let Some(threshold) = stats::quantile(&missing_density, threshold_quantile) else {
            return Ok(0); // no missing rows, nothing to label
        };

        let candidates: Vec<usize> = (0..self.records.len())
            .filter(|&i| {
                let r = &self.records[i];
                !r.observed && r.weighted_density.is_some_and(|d| d > threshold)
            })
            .collect();
        if candidates.is_empty() {
            return Ok(0);
        }

        let points: Vec<[f64; 3]> = candidates
            .iter()
            .map(|&i| self.records[i].coords())
            .collect();
        let labels = mean_shift(&points, params);
        let n_clusters = labels.iter().copied().max().map_or(0, |m| m + 1);
        for (&i, label) in candidates.iter().zip(labels) {
            self.records[i].meanshift_label = Some(label as u32);
        }
        info!(
            candidates = candidates.len(),
            n_clusters, "labelled missing-region clusters"
        );
        Ok(n_clusters)
    }

    /// Fraction of missing rows whose normalised weighted density
    /// exceeds `threshold`. Undefined (None) when there are no missing
    /// rows or the density stage has not run.
    pub fn ratio_high_density_missing(&self, threshold: f64) -> Option<f64> {
        let missing: Vec<&ReflectionRecord> =
            self.records.iter().filter(|r| !r.observed).collect();
        if missing.is_empty() {
            return None;
        }
        let mut above = 0usize;
        for record in &missing {
            match record.norm_weighted_density {
                Some(d) if d > threshold => above += 1,
                Some(_) => {}
                None => return None,
            }
        }
        Some(above as f64 / missing.len() as f64)
    }

    /// Ratio of the summed convex-hull volumes of the labelled missing
    /// clusters to the hull volume of the whole table. Degenerate
    /// cluster subsets contribute zero. None when the total hull itself
    /// is degenerate.
    pub fn missing_volume_ratio(&self) -> Option<f64> {
        let all: Vec<[f64; 3]> = self.records.iter().map(|r| r.coords()).collect();
        let total = convex_hull_volume(&all);
        if total <= 0.0 {
            return None;
        }

        let mut labels: Vec<u32> = self
            .records
            .iter()
            .filter_map(|r| r.meanshift_label)
            .collect();
        labels.sort_unstable();
        labels.dedup();

        let mut missing_volume = 0.0;
        for label in labels {
            let cluster: Vec<[f64; 3]> = self
                .records
                .iter()
                .filter(|r| r.meanshift_label == Some(label))
                .map(|r| r.coords())
                .collect();
            missing_volume += convex_hull_volume(&cluster);
        }
        Some((missing_volume / total).min(1.0))
    }

    /// Two-sample KS statistic between the full population and the
    /// observed subset of a marginal distribution. None when the
    /// observed subset is empty.
    pub fn distributional_distance(&self, field: DistanceField) -> Option<f64> {
        match field {
            DistanceField::R => self.marginal_distance(|r| r.r),
            DistanceField::Theta => self.marginal_distance(|r| r.theta),
            DistanceField::Phi => self.marginal_distance(|r| r.phi),
            DistanceField::CumulativeResolution => {
                let full = cumulative_sorted(self.records.iter().map(|r| r.res));
                let observed = cumulative_sorted(
                    self.records.iter().filter(|r| r.observed).map(|r| r.res),
                );
                ks_statistic(&full, &observed)
            }
        }
    }

    fn marginal_distance(&self, value: impl Fn(&ReflectionRecord) -> f64) -> Option<f64> {
        let full: Vec<f64> = self.records.iter().map(&value).collect();
        let observed: Vec<f64> = self
            .records
            .iter()
            .filter(|r| r.observed)
            .map(&value)
            .collect();
        ks_statistic(&full, &observed)
    }

    /// IS_UNIQUE / IS_BIJVOET / UNIQUE_ID: mark the asymmetric-unit
    /// representatives and point every row at the row index of its
    /// merged-orbit representative.
    pub fn flag_unique_reflections(&mut self, space_group: &SpaceGroup) {
        let reps: Vec<Hkl> = self
            .records
            .iter()
            .map(|r| space_group.map_to_asu(r.hkl(), false))
            .collect();
        let mut rep_rows: HashMap<Hkl, usize> = HashMap::new();
        for (i, record) in self.records.iter().enumerate() {
            if record.hkl() == reps[i] {
                rep_rows.insert(reps[i], i);
            }
        }
        for (i, record) in self.records.iter_mut().enumerate() {
            let hkl = record.hkl();
            record.is_unique = Some(hkl == reps[i]);
            record.is_bijvoet = Some(hkl == space_group.map_to_asu(hkl, true));
            record.unique_id = Some(rep_rows.get(&reps[i]).copied().unwrap_or(i));
        }
    }

    /// Total rows over unique rows, the effective symmetry multiplicity.
    /// None before `flag_unique_reflections` has run.
    pub fn symmetry_level(&self) -> Option<f64> {
        let unique = self
            .records
            .iter()
            .map(|r| r.is_unique)
            .try_fold(0usize, |acc, u| u.map(|flag| acc + flag as usize))?;
        if unique == 0 {
            return None;
        }
        Some(self.records.len() as f64 / unique as f64)
    }

    /// Row indices of the unique representatives, in table order
    pub fn unique_rows(&self) -> Vec<usize> {
        (0..self.records.len())
            .filter(|&i| self.records[i].is_unique == Some(true))
            .collect()
    }
}

/// Running cumulative sum of values after sorting ascending
fn cumulative_sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mut acc = 0.0;
    sorted
        .iter()
        .map(|v| {
            acc += v;
            acc
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bragg_core::{SpaceGroup, UnitCell};

    fn small_measured() -> MeasuredSet {
        let cell = UnitCell::orthorhombic(10.0, 12.0, 14.0).unwrap();
        let indices = vec![
            Hkl::new(1, 0, 0),
            Hkl::new(0, 1, 0),
            Hkl::new(0, 0, 1),
            Hkl::new(1, 1, 0),
            Hkl::new(1, 0, 1),
            Hkl::new(0, 1, 1),
            Hkl::new(1, 1, 1),
            Hkl::new(2, 1, 0),
        ];
        MeasuredSet::new(cell, SpaceGroup::p222(), indices)
    }

    #[test]
    fn empty_measured_set_is_fatal() {
        let cell = UnitCell::orthorhombic(10.0, 10.0, 10.0).unwrap();
        let measured = MeasuredSet::new(cell, SpaceGroup::p1(), vec![]);
        assert!(matches!(
            ReflectionTable::build(&measured, true),
            Err(Error::EmptyData(_))
        ));
    }

    #[test]
    fn observed_count_matches_expanded_measured_set() {
        let measured = small_measured();
        let table = ReflectionTable::build(&measured, true).unwrap();
        let membership = measured.observed_membership(true);
        // Every member of the expanded measured set is within the
        // resolution cutoff here, so the counts must agree exactly
        assert_eq!(table.n_observed(), membership.len());
        assert!(table.n_missing() > 0);
    }

    #[test]
    fn asu_table_has_one_row_per_unique_reflection() {
        let measured = small_measured();
        let table = ReflectionTable::build(&measured, false).unwrap();
        let sg = SpaceGroup::p222();
        for record in table.records() {
            assert_eq!(sg.map_to_asu(record.hkl(), false), record.hkl());
        }
        assert_eq!(table.n_observed(), measured.unique_asu_indices().len());
    }

    #[test]
    fn table_is_sorted_descending_by_resolution() {
        let table = ReflectionTable::build(&small_measured(), true).unwrap();
        for pair in table.records().windows(2) {
            assert!(pair[0].res >= pair[1].res);
        }
    }

    #[test]
    fn recompute_observed_reflects_deletions() {
        let mut measured = small_measured();
        let mut table = ReflectionTable::build(&measured, true).unwrap();
        let before = table.n_observed();

        let target = Hkl::new(1, 1, 1);
        let orbit: std::collections::HashSet<Hkl> = measured
            .space_group
            .equivalents_with_mates(target)
            .into_iter()
            .collect();
        let orbit_len = orbit.len();
        measured.delete_indices(&orbit);
        table.recompute_observed(&measured);

        assert_eq!(table.n_observed(), before - orbit_len);
    }

    #[test]
    fn res_cumsum_peaks_at_the_largest_d_spacing() {
        let mut table = ReflectionTable::build(&small_measured(), true).unwrap();
        table.resolution_density(&DensityConfig::default()).unwrap();
        let cumsums: Vec<f64> = table
            .records()
            .iter()
            .map(|r| r.res_cumsum.unwrap())
            .collect();

        // The largest-RES row carries the full density sum
        let total: f64 = table.records().iter().map(|r| r.res_density.unwrap()).sum();
        assert!((cumsums[0] - total).abs() < 1e-9 * total);

        // Values never grow down the descending-RES table, and tied RES
        // rows share one value
        for (pair, rows) in cumsums.windows(2).zip(table.records().windows(2)) {
            assert!(pair[0] >= pair[1] - 1e-12);
            if rows[0].res == rows[1].res {
                assert_eq!(pair[0], pair[1]);
            }
        }
    }

    #[test]
    fn weighted_density_covers_every_row() {
        let mut table = ReflectionTable::build(&small_measured(), true).unwrap();
        table.resolution_density(&DensityConfig::default()).unwrap();
        table
            .weighted_density(WeightColumn::ResCumsum, &DensityConfig::default())
            .unwrap();
        for record in table.records() {
            assert!(record.weighted_density.is_some());
            let n = record.norm_weighted_density.unwrap();
            assert!((0.0..=1.0).contains(&n));
        }
    }

    #[test]
    fn weighted_density_without_res_density_is_an_error() {
        let mut table = ReflectionTable::build(&small_measured(), true).unwrap();
        assert!(matches!(
            table.weighted_density(WeightColumn::ResCumsum, &DensityConfig::default()),
            Err(Error::MissingColumn("RES_CUMSUM"))
        ));
    }

    #[test]
    fn ratio_is_undefined_without_missing_rows() {
        let measured = small_measured();
        let mut table = ReflectionTable::build(&measured, true).unwrap();
        for record in &mut table.records {
            record.observed = true;
            record.norm_weighted_density = Some(0.5);
        }
        assert_eq!(table.ratio_high_density_missing(0.3), None);
    }

    #[test]
    fn distributional_distance_is_zero_when_everything_is_observed() {
        let mut table = ReflectionTable::build(&small_measured(), true).unwrap();
        for record in &mut table.records {
            record.observed = true;
        }
        for field in [
            DistanceField::R,
            DistanceField::Theta,
            DistanceField::Phi,
            DistanceField::CumulativeResolution,
        ] {
            assert_eq!(table.distributional_distance(field), Some(0.0));
        }
    }

    #[test]
    fn unique_flags_and_symmetry_level() {
        let measured = small_measured();
        let mut table = ReflectionTable::build(&measured, true).unwrap();
        assert_eq!(table.symmetry_level(), None);

        table.flag_unique_reflections(&measured.space_group);
        let level = table.symmetry_level().unwrap();
        assert!(level >= 1.0);
        for record in table.records() {
            let id = record.unique_id.unwrap();
            assert!(table.records()[id].is_unique.unwrap());
        }
    }
}
