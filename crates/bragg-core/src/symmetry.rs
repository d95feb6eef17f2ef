//! Space-group symmetry acting on Miller indices
//!
//! Only the rotational parts of the symmetry operations matter in
//! reciprocal space, so a space group is represented here by the set of
//! 3x3 integer matrices mapping one Miller index onto its equivalents.
//! Translations (screw axes, glides) are irrelevant for index equivalence
//! and are not stored.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::geometry::Hkl;

/// A rotation operation as an integer matrix applied to (h, k, l)
pub type RotOp = [[i32; 3]; 3];

const IDENTITY: RotOp = [[1, 0, 0], [0, 1, 0], [0, 0, 1]];

/// A space group reduced to its reciprocal-space rotation operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceGroup {
    symbol: String,
    ops: Vec<RotOp>,
}

impl SpaceGroup {
    /// Build a space group from rotation operations. The identity is
    /// prepended if absent; duplicate operations are removed.
    pub fn from_ops(symbol: impl Into<String>, ops: impl IntoIterator<Item = RotOp>) -> Self {
        let mut seen = BTreeSet::new();
        let mut unique = vec![IDENTITY];
        seen.insert(IDENTITY);
        for op in ops {
            if seen.insert(op) {
                unique.push(op);
            }
        }
        Self {
            symbol: symbol.into(),
            ops: unique,
        }
    }

    /// Triclinic P1: identity only
    pub fn p1() -> Self {
        Self::from_ops("P 1", [])
    }

    /// Monoclinic P2 (b unique): two-fold along b
    pub fn p2() -> Self {
        Self::from_ops("P 2", [[[-1, 0, 0], [0, 1, 0], [0, 0, -1]]])
    }

    /// Orthorhombic 222 point symmetry (covers P222 and its screw-axis
    /// variants, which share the same reciprocal-space equivalence)
    pub fn p222() -> Self {
        Self::from_ops(
            "P 2 2 2",
            [
                [[-1, 0, 0], [0, -1, 0], [0, 0, 1]],
                [[-1, 0, 0], [0, 1, 0], [0, 0, -1]],
                [[1, 0, 0], [0, -1, 0], [0, 0, -1]],
            ],
        )
    }

    /// Tetragonal P4: four-fold along c
    pub fn p4() -> Self {
        Self::from_ops(
            "P 4",
            [
                [[0, -1, 0], [1, 0, 0], [0, 0, 1]],
                [[-1, 0, 0], [0, -1, 0], [0, 0, 1]],
                [[0, 1, 0], [-1, 0, 0], [0, 0, 1]],
            ],
        )
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn n_ops(&self) -> usize {
        self.ops.len()
    }

    fn apply(op: &RotOp, hkl: Hkl) -> Hkl {
        Hkl::new(
            op[0][0] * hkl.h + op[0][1] * hkl.k + op[0][2] * hkl.l,
            op[1][0] * hkl.h + op[1][1] * hkl.k + op[1][2] * hkl.l,
            op[2][0] * hkl.h + op[2][1] * hkl.k + op[2][2] * hkl.l,
        )
    }

    /// Symmetry-equivalent indices of `hkl` (rotations only, no Friedel
    /// mates), deduplicated, in operation order.
    pub fn equivalents(&self, hkl: Hkl) -> Vec<Hkl> {
        let mut seen = BTreeSet::new();
        let mut result = Vec::with_capacity(self.ops.len());
        for op in &self.ops {
            let mate = Self::apply(op, hkl);
            if seen.insert(mate) {
                result.push(mate);
            }
        }
        result
    }

    /// Symmetry equivalents together with the Friedel mate of each, the
    /// full orbit used when anomalous pairs are merged.
    pub fn equivalents_with_mates(&self, hkl: Hkl) -> Vec<Hkl> {
        let mut seen = BTreeSet::new();
        let mut result = Vec::with_capacity(2 * self.ops.len());
        for op in &self.ops {
            let mate = Self::apply(op, hkl);
            if seen.insert(mate) {
                result.push(mate);
            }
            let friedel = mate.friedel_mate();
            if seen.insert(friedel) {
                result.push(friedel);
            }
        }
        result
    }

    /// Map `hkl` to its asymmetric-unit representative: the
    /// lexicographically greatest member of the orbit. With
    /// `anomalous = false` Friedel mates belong to the same orbit.
    pub fn map_to_asu(&self, hkl: Hkl, anomalous: bool) -> Hkl {
        let orbit = if anomalous {
            self.equivalents(hkl)
        } else {
            self.equivalents_with_mates(hkl)
        };
        orbit.into_iter().max().unwrap_or(hkl)
    }

    /// Number of distinct indices in the merged orbit of `hkl`
    pub fn multiplicity(&self, hkl: Hkl) -> usize {
        self.equivalents_with_mates(hkl).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p1_orbit_is_a_friedel_pair() {
        let sg = SpaceGroup::p1();
        let hkl = Hkl::new(1, 2, 3);
        assert_eq!(sg.equivalents(hkl), vec![hkl]);
        assert_eq!(
            sg.equivalents_with_mates(hkl),
            vec![hkl, Hkl::new(-1, -2, -3)]
        );
        assert_eq!(sg.multiplicity(hkl), 2);
    }

    #[test]
    fn p222_general_orbit_has_eight_members() {
        let sg = SpaceGroup::p222();
        assert_eq!(sg.multiplicity(Hkl::new(1, 2, 3)), 8);
        // An axial reflection has a smaller orbit
        assert_eq!(sg.multiplicity(Hkl::new(1, 0, 0)), 2);
    }

    #[test]
    fn asu_mapping_is_idempotent_and_orbit_invariant() {
        let sg = SpaceGroup::p222();
        let hkl = Hkl::new(-1, 2, -3);
        let asu = sg.map_to_asu(hkl, false);
        assert_eq!(sg.map_to_asu(asu, false), asu);
        for mate in sg.equivalents_with_mates(hkl) {
            assert_eq!(sg.map_to_asu(mate, false), asu);
        }
    }

    #[test]
    fn anomalous_asu_separates_friedel_mates() {
        let sg = SpaceGroup::p1();
        let hkl = Hkl::new(1, 2, 3);
        assert_eq!(sg.map_to_asu(hkl, true), hkl);
        assert_eq!(sg.map_to_asu(hkl.friedel_mate(), true), hkl.friedel_mate());
        // Merged mapping collapses the pair onto one representative
        assert_eq!(sg.map_to_asu(hkl.friedel_mate(), false), hkl);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn any_hkl() -> impl Strategy<Value = Hkl> {
            (-8i32..=8, -8i32..=8, -8i32..=8)
                .prop_map(|(h, k, l)| Hkl::new(h, k, l))
                .prop_filter("origin has no orbit", |hkl| !hkl.is_origin())
        }

        proptest! {
            #[test]
            fn asu_mapping_is_canonical_across_the_orbit(hkl in any_hkl()) {
                for sg in [SpaceGroup::p1(), SpaceGroup::p2(), SpaceGroup::p222(), SpaceGroup::p4()] {
                    let asu = sg.map_to_asu(hkl, false);
                    prop_assert_eq!(sg.map_to_asu(asu, false), asu);
                    for mate in sg.equivalents_with_mates(hkl) {
                        prop_assert_eq!(sg.map_to_asu(mate, false), asu);
                    }
                }
            }

            #[test]
            fn orbit_size_divides_twice_the_op_count(hkl in any_hkl()) {
                let sg = SpaceGroup::p222();
                let orbit = sg.equivalents_with_mates(hkl).len();
                prop_assert!(orbit >= 1);
                prop_assert_eq!((2 * sg.n_ops()) % orbit, 0);
            }
        }
    }
}
