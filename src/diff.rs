use std::f64::consts::PI;

use num_complex::Complex64;

use crate::config;
use crate::vector::{complexify, CVector3, Vec3};


/// Per-triangle physical-optics operators.
///
/// Stores the first vertex and the two edge vectors leaving it, so that every
/// evaluation in the accumulation loop starts from precomputed geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Facet {
    pub v1: Vec3,
    /// `V2 - V1`
    pub v2: Vec3,
    /// `V3 - V1`
    pub v3: Vec3,
    /// `|v2 x v3|`, twice the facet area.
    pub c: f64,
    normal: Vec3,
}

impl Facet {
    pub fn new(verts: [Vec3; 3]) -> Self {
        let v2 = verts[1] - verts[0];
        let v3 = verts[2] - verts[0];
        let cross = v2.cross(&v3);
        let c = cross.norm();
        let normal = if c > config::DEGENERATE_AREA {
            cross / c
        } else {
            Vec3::zeros()
        };
        Self {
            v1: verts[0],
            v2,
            v3,
            c,
            normal,
        }
    }

    /// Unit normal `(V2 - V1) x (V3 - V1)`, or zero for a degenerate facet.
    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    pub fn area(&self) -> f64 {
        0.5 * self.c
    }

    pub fn is_degenerate(&self) -> bool {
        self.c <= config::DEGENERATE_AREA
    }

    /// Phase exponents `a = k (Nin - Nout) . v3` and `b = k (Nin - Nout) . v2`.
    pub fn exponents(&self, nin: &Vec3, nout: &Vec3, k: f64) -> (f64, f64) {
        let q = nin - nout;
        (k * q.dot(&self.v3), k * q.dot(&self.v2))
    }

    /// Closed-form facet diffraction integral.
    ///
    /// The five branches are limits of the same integral as `a`, `b` or
    /// `a - b` vanish; each predicate picks the form whose denominators stay
    /// away from zero.
    pub fn diffraction(&self, nin: &Vec3, nout: &Vec3, k: f64) -> Complex64 {
        if self.is_degenerate() {
            return Complex64::new(0.0, 0.0);
        }

        let (a, b) = self.exponents(nin, nout, k);
        let c = self.c;
        let eps = config::DIFF_EPSILON;
        let i = Complex64::i();
        let phase = Complex64::new(0.0, k * (nin - nout).dot(&self.v1)).exp() * (k / (2.0 * PI));
        let eia = Complex64::new(0.0, a).exp();
        let eib = Complex64::new(0.0, b).exp();

        let small_a = a.abs() <= eps;
        let small_b = b.abs() <= eps;
        let small_ab = (a - b).abs() <= eps;

        let integral = if small_a && small_b && small_ab {
            Complex64::from(0.5 * c * (1.0 + 0.5 * (a + b)))
        } else if !small_a && !small_b && small_ab {
            (eib * (1.0 - i * b) - 1.0) * (c / (a * b))
        } else if !small_a && small_b {
            (1.0 - eia + i * a) * (c / ((a - b) * a))
        } else if small_a && !small_b {
            (eib - i * b - 1.0) * (c / ((a - b) * b))
        } else {
            ((eib * a - eia * b) / (a - b) - 1.0) * (c / (a * b))
        };

        phase * integral
    }

    /// Projection of the incident field `p0` into the scattered field
    /// direction for outgoing direction `nout`.
    pub fn polarization(&self, _nin: &Vec3, nout: &Vec3, p0: &Vec3) -> Vec3 {
        let magnitude = p0.norm();
        if magnitude <= config::VEC_LENGTH_THRESHOLD {
            return Vec3::zeros();
        }
        let s0 = p0 / magnitude;
        let ey = self.normal;
        let de = s0 * nout.dot(p0);
        let dh = nout.cross(&s0);
        (ey.cross(&dh) - nout * ey.dot(&de)) * magnitude
    }

    pub fn polar_diffraction(&self, nin: &Vec3, nout: &Vec3, p0: &Vec3, k: f64) -> CVector3 {
        complexify(&self.polarization(nin, nout, p0)) * self.diffraction(nin, nout, k)
    }
}
