//! Radix-2 fast Fourier transforms over scalar and vector samples.
//!
//! The imaging pipeline transforms a grid of complex 3-vectors, so the
//! transform is written once against the [`FftElement`] trait and works for
//! both [`Complex64`] and [`CVector3`] samples.
//!
//! Both directions share a `1/sqrt(N)` normalisation (a unitary transform),
//! so a forward pass followed by an inverse pass reproduces the input. The
//! direction only selects the sign of the twiddle rotation.
//!
//! Multi-dimensional transforms are separable: every lane along an axis is
//! copied into a contiguous buffer, transformed, and written back.

use std::f64::consts::PI;
use std::ops::{Add, Sub};

use ndarray::{Array, Array2, Array3, Axis, Dimension};
use num_complex::Complex64;

use crate::error::FftError;
use crate::vector::CVector3;

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;
    use rand::Rng;

    fn assert_close(a: Complex64, b: Complex64) {
        assert!((a - b).norm() < 1e-9, "a: {}, b: {}", a, b);
    }

    #[test]
    fn pad2_is_smallest_power_of_two() {
        assert_eq!(pad2(0), Some(1));
        assert_eq!(pad2(1), Some(1));
        assert_eq!(pad2(3), Some(4));
        assert_eq!(pad2(64), Some(64));
        assert_eq!(pad2(65), Some(128));
        for n in 1..2000 {
            let p = pad2(n).unwrap();
            assert!(p.is_power_of_two() && p >= n && p / 2 < n);
            assert_eq!(pad2(p), Some(p));
        }
        assert_eq!(pad2(usize::MAX), None);
        assert_eq!(pad2((1 << (usize::BITS - 1)) + 1), None);
    }

    #[test]
    fn round_trip_restores_input() {
        let mut rng = rand::rng();
        for &n in &[1usize, 2, 8, 64, 256] {
            let input: Vec<Complex64> = (0..n)
                .map(|_| Complex64::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0)))
                .collect();
            let mut data = input.clone();
            fft(&mut data, Direction::Forward).unwrap();
            fft(&mut data, Direction::Inverse).unwrap();
            for (a, b) in data.iter().zip(input.iter()) {
                assert_close(*a, *b);
            }
        }
    }

    #[test]
    fn impulse_spreads_evenly() {
        let mut data = vec![Complex64::new(0.0, 0.0); 16];
        data[0] = Complex64::new(1.0, 0.0);
        fft(&mut data, Direction::Forward).unwrap();
        for value in data {
            assert_close(value, Complex64::new(0.25, 0.0));
        }
    }

    #[test]
    fn forward_matches_direct_sum() {
        let n = 8;
        let input: Vec<Complex64> = (0..n)
            .map(|i| Complex64::new(i as f64, (i * i) as f64 * 0.1))
            .collect();
        let mut data = input.clone();
        fft(&mut data, Direction::Forward).unwrap();
        for (k, value) in data.iter().enumerate() {
            let expected: Complex64 = input
                .iter()
                .enumerate()
                .map(|(j, x)| x * Complex64::from_polar(1.0, -2.0 * PI * (j * k) as f64 / n as f64))
                .sum::<Complex64>()
                / (n as f64).sqrt();
            assert_close(*value, expected);
        }
    }

    #[test]
    fn rejects_non_power_of_two() {
        let mut data = vec![Complex64::new(1.0, 0.0); 6];
        assert!(matches!(
            fft(&mut data, Direction::Forward),
            Err(FftError::NotPowerOfTwo(6))
        ));
    }

    #[test]
    fn vector_transform_acts_per_component() {
        let mut rng = rand::rng();
        let scalars: Vec<Complex64> = (0..32)
            .map(|_| Complex64::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0)))
            .collect();
        let mut vectors: Vec<CVector3> = scalars
            .iter()
            .map(|&s| CVector3::new(s, s * 2.0, Complex64::new(0.0, 0.0)))
            .collect();
        let mut expected = scalars.clone();
        fft(&mut expected, Direction::Forward).unwrap();
        fft(&mut vectors, Direction::Forward).unwrap();
        for (v, e) in vectors.iter().zip(expected.iter()) {
            assert_close(v.x, *e);
            assert_close(v.y, *e * 2.0);
            assert_close(v.z, Complex64::new(0.0, 0.0));
        }
    }

    #[test]
    fn reorder_swaps_halves_and_is_an_involution() {
        let original = Array1::from_iter((0..8).map(|i| Complex64::new(i as f64, 0.0)));
        let mut data = original.clone();
        reorder_axis(&mut data, Axis(0));
        assert_eq!(data[0], Complex64::new(4.0, 0.0));
        assert_eq!(data[4], Complex64::new(0.0, 0.0));
        reorder_axis(&mut data, Axis(0));
        assert_eq!(data, original);
    }

    #[test]
    fn separable_3d_round_trip() {
        let mut rng = rand::rng();
        let original = Array3::from_shape_fn((4, 8, 2), |_| {
            CVector3::new(
                Complex64::new(rng.random_range(-1.0..1.0), 0.0),
                Complex64::new(0.0, rng.random_range(-1.0..1.0)),
                Complex64::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0)),
            )
        });
        let mut grid = original.clone();
        fft3(&mut grid, Direction::Forward).unwrap();
        fft3(&mut grid, Direction::Inverse).unwrap();
        for (a, b) in grid.iter().zip(original.iter()) {
            for i in 0..3 {
                assert_close(a[i], b[i]);
            }
        }
    }

    #[test]
    fn separable_2d_constant_concentrates_at_origin() {
        let mut grid = Array2::from_elem((4, 4), Complex64::new(1.0, 0.0));
        fft2(&mut grid, Direction::Forward).unwrap();
        assert_close(grid[[0, 0]], Complex64::new(4.0, 0.0));
        assert_close(grid[[1, 2]], Complex64::new(0.0, 0.0));
        reorder2(&mut grid);
        assert_close(grid[[2, 2]], Complex64::new(4.0, 0.0));
    }
}

/// Transform direction. Selects the sign of the twiddle exponent only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Inverse,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Forward => -1.0,
            Direction::Inverse => 1.0,
        }
    }
}

/// Sample type the transform can operate on.
pub trait FftElement: Copy + Add<Output = Self> + Sub<Output = Self> {
    fn zero() -> Self;
    /// Multiplies the sample by a complex twiddle factor.
    fn rotate(self, twiddle: Complex64) -> Self;
    fn scale(self, factor: f64) -> Self;
}

impl FftElement for Complex64 {
    fn zero() -> Self {
        Complex64::new(0.0, 0.0)
    }

    fn rotate(self, twiddle: Complex64) -> Self {
        self * twiddle
    }

    fn scale(self, factor: f64) -> Self {
        self * factor
    }
}

impl FftElement for CVector3 {
    fn zero() -> Self {
        CVector3::from_element(Complex64::new(0.0, 0.0))
    }

    fn rotate(self, twiddle: Complex64) -> Self {
        self * twiddle
    }

    fn scale(self, factor: f64) -> Self {
        self * Complex64::from(factor)
    }
}

/// Smallest power of two not less than `n`. `pad2(0)` is 1, and `None`
/// when the result does not fit in a `usize`.
pub fn pad2(n: usize) -> Option<usize> {
    n.max(1).checked_next_power_of_two()
}

/// In-place iterative radix-2 transform with `1/sqrt(N)` scaling.
pub fn fft<T: FftElement>(data: &mut [T], direction: Direction) -> Result<(), FftError> {
    let n = data.len();
    if n == 0 || !n.is_power_of_two() {
        return Err(FftError::NotPowerOfTwo(n));
    }
    if n == 1 {
        return Ok(());
    }

    bit_reverse(data);

    let sign = direction.sign();
    let mut len = 2;
    while len <= n {
        let step = Complex64::from_polar(1.0, sign * 2.0 * PI / len as f64);
        for start in (0..n).step_by(len) {
            let mut w = Complex64::new(1.0, 0.0);
            for j in 0..len / 2 {
                let even = data[start + j];
                let odd = data[start + j + len / 2].rotate(w);
                data[start + j] = even + odd;
                data[start + j + len / 2] = even - odd;
                w *= step;
            }
        }
        len <<= 1;
    }

    let norm = 1.0 / (n as f64).sqrt();
    for value in data.iter_mut() {
        *value = value.scale(norm);
    }
    Ok(())
}

fn bit_reverse<T>(data: &mut [T]) {
    let n = data.len();
    let mut j = 0;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            data.swap(i, j);
        }
    }
}

/// Transforms every lane of `array` along `axis`.
pub fn fft_axis<T, D>(
    array: &mut Array<T, D>,
    axis: Axis,
    direction: Direction,
) -> Result<(), FftError>
where
    T: FftElement,
    D: Dimension,
{
    let len = array.len_of(axis);
    if len <= 1 {
        return Ok(());
    }
    let mut buffer = vec![T::zero(); len];
    for mut lane in array.lanes_mut(axis) {
        for (b, v) in buffer.iter_mut().zip(lane.iter()) {
            *b = *v;
        }
        fft(&mut buffer, direction)?;
        for (v, b) in lane.iter_mut().zip(buffer.iter()) {
            *v = *b;
        }
    }
    Ok(())
}

pub fn fft2<T: FftElement>(array: &mut Array2<T>, direction: Direction) -> Result<(), FftError> {
    for axis in 0..2 {
        fft_axis(array, Axis(axis), direction)?;
    }
    Ok(())
}

pub fn fft3<T: FftElement>(array: &mut Array3<T>, direction: Direction) -> Result<(), FftError> {
    for axis in 0..3 {
        fft_axis(array, Axis(axis), direction)?;
    }
    Ok(())
}

/// Cyclic half-swap of every lane along `axis`, moving the zero-order term to the centre.
pub fn reorder_axis<T, D>(array: &mut Array<T, D>, axis: Axis)
where
    T: FftElement,
    D: Dimension,
{
    let len = array.len_of(axis);
    if len <= 1 {
        return;
    }
    let mut buffer = vec![T::zero(); len];
    for mut lane in array.lanes_mut(axis) {
        for (b, v) in buffer.iter_mut().zip(lane.iter()) {
            *b = *v;
        }
        buffer.rotate_left(len / 2);
        for (v, b) in lane.iter_mut().zip(buffer.iter()) {
            *v = *b;
        }
    }
}

pub fn reorder2<T: FftElement>(array: &mut Array2<T>) {
    for axis in 0..2 {
        reorder_axis(array, Axis(axis));
    }
}

pub fn reorder3<T: FftElement>(array: &mut Array3<T>) {
    for axis in 0..3 {
        reorder_axis(array, Axis(axis));
    }
}
