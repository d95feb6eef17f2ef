//! Miller indices and unit-cell geometry
//!
//! The unit cell is stored as the six real-space parameters and converted
//! to a Cartesian basis (a along x, b in the xy plane) from which the
//! reciprocal basis vectors are derived. Reciprocal-lattice point
//! coordinates and d-spacings come from that reciprocal basis.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A Miller index triple (H, K, L)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct Hkl {
    pub h: i32,
    pub k: i32,
    pub l: i32,
}

impl Hkl {
    pub fn new(h: i32, k: i32, l: i32) -> Self {
        Self { h, k, l }
    }

    /// The Friedel mate (-h, -k, -l)
    pub fn friedel_mate(&self) -> Self {
        Self::new(-self.h, -self.k, -self.l)
    }

    /// True for (0, 0, 0), which is excluded from reflection sets
    pub fn is_origin(&self) -> bool {
        self.h == 0 && self.k == 0 && self.l == 0
    }
}

impl std::fmt::Display for Hkl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.h, self.k, self.l)
    }
}

/// Unit cell defined by lengths in Angstrom and angles in degrees
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UnitCell {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl UnitCell {
    /// Create a unit cell, validating that it spans a non-degenerate volume
    pub fn new(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Result<Self> {
        let cell = Self {
            a,
            b,
            c,
            alpha,
            beta,
            gamma,
        };
        cell.validate()?;
        Ok(cell)
    }

    /// Orthorhombic/cubic shortcut with all angles at 90 degrees
    pub fn orthorhombic(a: f64, b: f64, c: f64) -> Result<Self> {
        Self::new(a, b, c, 90.0, 90.0, 90.0)
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [("a", self.a), ("b", self.b), ("c", self.c)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::geometry(format!(
                    "cell length {} = {} is not positive",
                    name, value
                )));
            }
        }
        for (name, value) in [
            ("alpha", self.alpha),
            ("beta", self.beta),
            ("gamma", self.gamma),
        ] {
            if !value.is_finite() || value <= 0.0 || value >= 180.0 {
                return Err(Error::geometry(format!(
                    "cell angle {} = {} is outside (0, 180)",
                    name, value
                )));
            }
        }
        let v = self.triple_product_factor();
        if !v.is_finite() || v <= f64::EPSILON {
            return Err(Error::geometry(format!(
                "cell {:?} has a singular metric tensor",
                self
            )));
        }
        Ok(())
    }

    /// sqrt(1 - cos^2A - cos^2B - cos^2G + 2 cosA cosB cosG)
    fn triple_product_factor(&self) -> f64 {
        let ca = self.alpha.to_radians().cos();
        let cb = self.beta.to_radians().cos();
        let cg = self.gamma.to_radians().cos();
        (1.0 - ca * ca - cb * cb - cg * cg + 2.0 * ca * cb * cg).sqrt()
    }

    /// Unit cell volume in cubic Angstrom
    pub fn volume(&self) -> f64 {
        self.a * self.b * self.c * self.triple_product_factor()
    }

    /// Direct-space basis vectors in the standard Cartesian frame
    /// (a along x, b in the xy plane)
    fn direct_basis(&self) -> [[f64; 3]; 3] {
        let ca = self.alpha.to_radians().cos();
        let cb = self.beta.to_radians().cos();
        let cg = self.gamma.to_radians().cos();
        let sg = self.gamma.to_radians().sin();
        let v = self.triple_product_factor();

        let a_vec = [self.a, 0.0, 0.0];
        let b_vec = [self.b * cg, self.b * sg, 0.0];
        let c_vec = [
            self.c * cb,
            self.c * (ca - cb * cg) / sg,
            self.c * v / sg,
        ];
        [a_vec, b_vec, c_vec]
    }

    /// Reciprocal-space basis vectors a*, b*, c*
    pub fn reciprocal_basis(&self) -> [[f64; 3]; 3] {
        let [a_vec, b_vec, c_vec] = self.direct_basis();
        let vol = self.volume();
        [
            scale(cross(b_vec, c_vec), 1.0 / vol),
            scale(cross(c_vec, a_vec), 1.0 / vol),
            scale(cross(a_vec, b_vec), 1.0 / vol),
        ]
    }

    /// Cartesian coordinates of the reciprocal-lattice point for `hkl`
    pub fn reciprocal_vector(&self, hkl: Hkl) -> [f64; 3] {
        let [astar, bstar, cstar] = self.reciprocal_basis();
        let (h, k, l) = (hkl.h as f64, hkl.k as f64, hkl.l as f64);
        [
            h * astar[0] + k * bstar[0] + l * cstar[0],
            h * astar[1] + k * bstar[1] + l * cstar[1],
            h * astar[2] + k * bstar[2] + l * cstar[2],
        ]
    }

    /// Resolution (d-spacing) of `hkl` in Angstrom
    pub fn d_spacing(&self, hkl: Hkl) -> f64 {
        let rlp = self.reciprocal_vector(hkl);
        let r = (rlp[0] * rlp[0] + rlp[1] * rlp[1] + rlp[2] * rlp[2]).sqrt();
        1.0 / r
    }

    /// Largest index along each axis compatible with the given resolution
    /// limit. Used to bound the complete-set enumeration grid.
    pub fn index_limits(&self, d_min: f64) -> (i32, i32, i32) {
        let clamp = |len: f64| (len / d_min).ceil() as i32 + 1;
        (clamp(self.a), clamp(self.b), clamp(self.c))
    }
}

fn cross(u: [f64; 3], v: [f64; 3]) -> [f64; 3] {
    [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ]
}

fn scale(u: [f64; 3], s: f64) -> [f64; 3] {
    [u[0] * s, u[1] * s, u[2] * s]
}
