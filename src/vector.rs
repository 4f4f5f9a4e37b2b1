//! Real and complex 3-vector primitives.
//!
//! The engine works in double precision throughout: a radar wavenumber at
//! Ka band is close to 800 rad/m, so phases over a metre-sized object run
//! into the thousands of radians and single precision loses them.
//!
//! - [`Vec3`]: real 3-vector (positions, directions, polarization vectors)
//! - [`CVector3`]: complex 3-vector (scattered field samples)
//! - [`Rot3`]: 3x3 rotation

use nalgebra::{Rotation3, Unit, Vector3};
use num_complex::Complex64;

use crate::config;

pub type Vec3 = Vector3<f64>;
pub type CVector3 = Vector3<Complex64>;
pub type Rot3 = Rotation3<f64>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_maps_direction_onto_y() {
        let nin = Vec3::new(1.0, 1.0, -1.0).normalize();
        let rot = rotation_onto_y(&nin);
        let mapped = rot * nin;
        assert!((mapped - Vec3::y()).norm() < 1e-12, "mapped: {}", mapped);
        let back = rot.inverse() * Vec3::y();
        assert!((back - nin).norm() < 1e-12);
    }

    #[test]
    fn rotation_handles_parallel_directions() {
        assert!((rotation_onto_y(&Vec3::y()) * Vec3::y() - Vec3::y()).norm() < 1e-12);
        let rot = rotation_onto_y(&-Vec3::y());
        assert!((rot * -Vec3::y() - Vec3::y()).norm() < 1e-12);
    }

    #[test]
    fn complex_projection_removes_component() {
        let axis = Vec3::x();
        let field = CVector3::new(
            Complex64::new(1.0, 2.0),
            Complex64::new(0.5, 0.0),
            Complex64::new(0.0, -1.0),
        );
        let cross = reject(&field, &axis);
        assert_eq!(cross.x, Complex64::new(0.0, 0.0));
        assert_eq!(cross.y, field.y);
        assert!((norm_sqr(&field) - (5.0 + 0.25 + 1.0)).abs() < 1e-12);
    }
}

/// Lifts a real vector into the complex field.
pub fn complexify(v: &Vec3) -> CVector3 {
    v.map(Complex64::from)
}

/// Sum of the squared moduli of the components.
pub fn norm_sqr(v: &CVector3) -> f64 {
    v.iter().map(|c| c.norm_sqr()).sum()
}

/// Euclidean norm of a complex vector.
pub fn norm(v: &CVector3) -> f64 {
    norm_sqr(v).sqrt()
}

/// Projection of a complex field onto a real unit axis, `(E . r) r`.
pub fn project(v: &CVector3, axis: &Vec3) -> CVector3 {
    let along: Complex64 = v
        .iter()
        .zip(axis.iter())
        .map(|(c, r)| *c * *r)
        .sum();
    complexify(axis) * along
}

/// Removes the component of `v` along the real unit axis.
pub fn reject(v: &CVector3, axis: &Vec3) -> CVector3 {
    v - project(v, axis)
}

/// Mirrors a direction in the z = 0 ground plane.
pub fn mirror_z(v: &Vec3) -> Vec3 {
    Vec3::new(v.x, v.y, -v.z)
}

/// Normalises `v`, or returns `None` if it is too short to carry a direction.
pub fn try_unit(v: &Vec3) -> Option<Vec3> {
    if !v.iter().all(|c| c.is_finite()) {
        return None;
    }
    v.try_normalize(config::VEC_LENGTH_THRESHOLD)
}

/// Rotation about `nin x y` by `acos(nin . y)`, which carries `nin` onto the y axis.
/// The inverse takes the local broadside frame (y forward) back into world space.
pub fn rotation_onto_y(nin: &Vec3) -> Rot3 {
    let y = Vec3::y();
    let cos_angle = nin.dot(&y).clamp(-1.0, 1.0);
    let axis = nin.cross(&y);
    match Unit::try_new(axis, config::VEC_LENGTH_THRESHOLD) {
        Some(axis) => Rot3::from_axis_angle(&axis, cos_angle.acos()),
        None if cos_angle > 0.0 => Rot3::identity(),
        None => Rot3::from_axis_angle(&Vec3::x_axis(), std::f64::consts::PI),
    }
}
