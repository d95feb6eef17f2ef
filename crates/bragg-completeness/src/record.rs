//! One row of the reflection table
//!
//! Column names follow the persisted CSV snapshot layout; derived
//! columns are optional until their producing stage has run.

use serde::{Deserialize, Serialize};

use bragg_core::Hkl;

/// One theoretically possible reciprocal-lattice point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionRecord {
    #[serde(rename = "H")]
    pub h: i32,
    #[serde(rename = "K")]
    pub k: i32,
    #[serde(rename = "L")]
    pub l: i32,

    /// Reciprocal-space Cartesian coordinates
    #[serde(rename = "A")]
    pub a: f64,
    #[serde(rename = "B")]
    pub b: f64,
    #[serde(rename = "C")]
    pub c: f64,

    /// Resolution (d-spacing) in Angstrom
    #[serde(rename = "RES")]
    pub res: f64,

    /// Present in the measured set
    #[serde(rename = "OBSERVED")]
    pub observed: bool,

    /// Spherical coordinates of (A, B, C)
    pub r: f64,
    pub theta: f64,
    pub phi: f64,

    #[serde(rename = "IS_UNIQUE")]
    pub is_unique: Option<bool>,
    #[serde(rename = "IS_BIJVOET")]
    pub is_bijvoet: Option<bool>,
    /// Row index of this reflection's symmetry-unique representative
    #[serde(rename = "UNIQUE_ID")]
    pub unique_id: Option<usize>,

    #[serde(rename = "RES_DENSITY")]
    pub res_density: Option<f64>,
    #[serde(rename = "RES_CUMSUM")]
    pub res_cumsum: Option<f64>,
    #[serde(rename = "WEIGHTED_DENSITY")]
    pub weighted_density: Option<f64>,
    #[serde(rename = "NORM_WEIGHTED_DENSITY")]
    pub norm_weighted_density: Option<f64>,
    /// Missing-region cluster label, absent outside labelled clusters
    #[serde(rename = "MEANSHIFT_LABELS")]
    pub meanshift_label: Option<u32>,
}

impl ReflectionRecord {
    /// Create a base record with all derived columns unset
    pub fn new(hkl: Hkl, rlp: [f64; 3], res: f64, observed: bool) -> Self {
        let (r, theta, phi) = spherical_coordinates(rlp);
        Self {
            h: hkl.h,
            k: hkl.k,
            l: hkl.l,
            a: rlp[0],
            b: rlp[1],
            c: rlp[2],
            res,
            observed,
            r,
            theta,
            phi,
            is_unique: None,
            is_bijvoet: None,
            unique_id: None,
            res_density: None,
            res_cumsum: None,
            weighted_density: None,
            norm_weighted_density: None,
            meanshift_label: None,
        }
    }

    pub fn hkl(&self) -> Hkl {
        Hkl::new(self.h, self.k, self.l)
    }

    pub fn coords(&self) -> [f64; 3] {
        [self.a, self.b, self.c]
    }
}

/// Spherical coordinates of a reciprocal-space point: r is the radial
/// distance, theta the polar angle from the C axis, phi the azimuth.
/// Defined everywhere except the origin, which reflection sets exclude
/// by construction.
pub fn spherical_coordinates(rlp: [f64; 3]) -> (f64, f64, f64) {
    let [a, b, c] = rlp;
    let xy = a * a + b * b;
    let r = (xy + c * c).sqrt();
    let theta = xy.sqrt().atan2(c);
    let phi = b.atan2(a);
    (r, theta, phi)
}
