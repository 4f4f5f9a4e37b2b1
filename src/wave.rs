//! Radar wave parameters.
//!
//! A [`RadarWave`] is derived from one of six fixed frequency bands. The
//! band fixes the centre wavelength and the nominal range and cross-range
//! resolutions; [`RadarWave::set_polarization`] then fixes the incident
//! field direction for a given look direction.

use std::f64::consts::{FRAC_PI_2, PI};
use std::fmt;

use serde::Serialize;

use crate::config;
use crate::error::BuildError;
use crate::vector::Vec3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ka_band_table() {
        let wave = RadarWave::new(Band::try_from(5).unwrap());
        let expected = config::SPEED_OF_LIGHT / ((36.5e9 + 38.5e9) / 2.0);
        assert!((wave.wavelength - expected).abs() < 1e-15);
        assert_eq!(wave.steps, [0.125, 0.25, 0.125]);
        assert!((wave.wavenumber() - 2.0 * PI / expected).abs() < 1e-9);
    }

    #[test]
    fn band_codes_out_of_range() {
        assert!(Band::try_from(-1).is_err());
        assert_eq!(Band::try_from(6), Err(BuildError::InvalidFrequencyBand(6)));
        assert_eq!(Band::try_from(0), Ok(Band::P));
    }

    #[test]
    fn basis_is_orthonormal_and_transverse() {
        for nin in [
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::new(1.0, 2.0, -0.5).normalize(),
            Vec3::new(0.0, 1.0, 0.0),
        ] {
            let (einv, eing) = polarization_basis(&nin);
            assert!((einv.norm() - 1.0).abs() < 1e-12);
            assert!((eing.norm() - 1.0).abs() < 1e-12);
            assert!(einv.dot(&nin).abs() < 1e-12);
            assert!(eing.dot(&nin).abs() < 1e-12);
            assert!(einv.dot(&eing).abs() < 1e-12);
        }
    }

    #[test]
    fn polarization_selects_basis_vector() {
        let nin = Vec3::new(1.0, 0.0, -1.0).normalize();
        let (einv, eing) = polarization_basis(&nin);

        let mut wave = RadarWave::new(Band::X);
        wave.set_polarization(0, 1, &nin).unwrap();
        assert!((wave.ein - einv).norm() < 1e-12);
        assert!((wave.erx - eing).norm() < 1e-12);
        assert!(wave.is_cross_polarized());

        wave.set_polarization(1, 1, &nin).unwrap();
        assert!((wave.ein - eing).norm() < 1e-12);
        assert!(!wave.is_cross_polarized());
    }

    #[test]
    fn circular_polarization_is_rejected() {
        let mut wave = RadarWave::new(Band::C);
        let nin = Vec3::new(0.0, 0.0, -1.0);
        assert_eq!(
            wave.set_polarization(2, 0, &nin),
            Err(BuildError::InvalidPolarization(2))
        );
        assert_eq!(
            wave.set_polarization(0, 7, &nin),
            Err(BuildError::InvalidPolarization(7))
        );
    }
}

/// Frequency bands in request order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Band {
    P,
    L,
    S,
    C,
    X,
    Ka,
}

/// Frequency limits (Hz) and nominal resolutions (m) of a band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandSpec {
    pub f_min: f64,
    pub f_max: f64,
    pub range_step: f64,
    pub cross_step: f64,
}

const BAND_TABLE: [BandSpec; config::NUM_BANDS] = [
    BandSpec {
        f_min: 0.42e9,
        f_max: 0.45e9,
        range_step: 8.0,
        cross_step: 4.0,
    },
    BandSpec {
        f_min: 1.2e9,
        f_max: 1.4e9,
        range_step: 4.0,
        cross_step: 2.0,
    },
    BandSpec {
        f_min: 2.7e9,
        f_max: 3.1e9,
        range_step: 2.0,
        cross_step: 1.0,
    },
    BandSpec {
        f_min: 5.25e9,
        f_max: 5.75e9,
        range_step: 1.0,
        cross_step: 0.5,
    },
    BandSpec {
        f_min: 9.0e9,
        f_max: 10.0e9,
        range_step: 0.5,
        cross_step: 0.25,
    },
    BandSpec {
        f_min: 36.5e9,
        f_max: 38.5e9,
        range_step: 0.25,
        cross_step: 0.125,
    },
];

impl Band {
    pub fn spec(self) -> &'static BandSpec {
        &BAND_TABLE[self as usize]
    }
}

impl TryFrom<i64> for Band {
    type Error = BuildError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Band::P),
            1 => Ok(Band::L),
            2 => Ok(Band::S),
            3 => Ok(Band::C),
            4 => Ok(Band::X),
            5 => Ok(Band::Ka),
            _ => Err(BuildError::InvalidFrequencyBand(code)),
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let spec = self.spec();
        write!(
            f,
            "{:?} ({:.2}-{:.2} GHz)",
            self,
            spec.f_min / 1e9,
            spec.f_max / 1e9
        )
    }
}

/// Linear polarization of the transmitted or received wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Polarization {
    Vertical,
    Horizontal,
}

impl TryFrom<i64> for Polarization {
    type Error = BuildError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Polarization::Vertical),
            1 => Ok(Polarization::Horizontal),
            // 2 is circular, which the facet model cannot represent
            _ => Err(BuildError::InvalidPolarization(code)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RadarWave {
    pub band: Band,
    /// Centre wavelength in metres.
    pub wavelength: f64,
    /// Resolution along azimuth (x), range (y) and elevation (z).
    pub steps: [f64; 3],
    /// Unit incident polarization vector.
    pub ein: Vec3,
    /// Unit receive polarization vector.
    pub erx: Vec3,
    pub tx: Polarization,
    pub rx: Polarization,
}

impl RadarWave {
    /// Creates the wave for a band. The polarization is vertical on both
    /// ends with zero field vectors until [`set_polarization`](Self::set_polarization) runs.
    pub fn new(band: Band) -> Self {
        let spec = band.spec();
        let f_centre = 0.5 * (spec.f_min + spec.f_max);
        Self {
            band,
            wavelength: config::SPEED_OF_LIGHT / f_centre,
            steps: [spec.cross_step, spec.range_step, spec.cross_step],
            ein: Vec3::zeros(),
            erx: Vec3::zeros(),
            tx: Polarization::Vertical,
            rx: Polarization::Vertical,
        }
    }

    pub fn wavenumber(&self) -> f64 {
        2.0 * PI / self.wavelength
    }

    /// Selects the incident and receive field vectors for look direction `nin`.
    pub fn set_polarization(
        &mut self,
        tx_code: i64,
        rx_code: i64,
        nin: &Vec3,
    ) -> Result<(), BuildError> {
        let tx = Polarization::try_from(tx_code)?;
        let rx = Polarization::try_from(rx_code)?;
        let (einv, eing) = polarization_basis(nin);

        let select = |p: Polarization| match p {
            Polarization::Vertical => einv,
            Polarization::Horizontal => eing,
        };
        let ein = select(tx)
            .try_normalize(config::VEC_LENGTH_THRESHOLD)
            .ok_or(BuildError::InvalidPolarization(tx_code))?;
        let erx = select(rx)
            .try_normalize(config::VEC_LENGTH_THRESHOLD)
            .ok_or(BuildError::InvalidPolarization(rx_code))?;

        self.tx = tx;
        self.rx = rx;
        self.ein = ein;
        self.erx = erx;
        Ok(())
    }

    pub fn is_cross_polarized(&self) -> bool {
        self.tx != self.rx
    }
}

/// Vertical and horizontal transverse unit vectors for look direction `nin`.
///
/// The vertical vector points at polar angle `theta + pi/2` on the azimuth of
/// `nin`; the horizontal one completes the right-handed triad with `nin`.
pub fn polarization_basis(nin: &Vec3) -> (Vec3, Vec3) {
    let theta = nin.z.clamp(-1.0, 1.0).acos();
    let phi = nin.y.atan2(nin.x);
    let theta_v = theta + FRAC_PI_2;
    let einv = Vec3::new(
        theta_v.sin() * phi.cos(),
        theta_v.sin() * phi.sin(),
        theta_v.cos(),
    );
    let eing = nin.cross(&einv).normalize();
    (einv, eing)
}
