//! Scattered field accumulation and image synthesis.
//!
//! **Context**: A portrait is the Fourier image of the far field scattered
//! by the visible facets, sampled over a small cone of look angles around
//! broadside and a band of wavenumbers around the centre frequency.
//!
//! **How it Works**: [`GridSpec`] sizes the sample grid from the object
//! extent and the band resolutions. [`Problem::accumulate`] visits every
//! cell, turns its indices into an outgoing direction and a wavenumber,
//! and sums the polarized diffraction of every visible facet (four times
//! with a ground plane, once per mirrored path). [`synthesize`] transforms
//! the grid into the image domain.

use std::f64::consts::PI;

use indicatif::{ProgressBar, ProgressStyle};
use itertools::iproduct;
use ndarray::Array3;
use rayon::prelude::*;

use crate::diff::Facet;
use crate::error::SolveError;
use crate::fft::{fft3, pad2, reorder3, Direction, FftElement};
use crate::geom::Model;
use crate::config;
use crate::vector::{mirror_z, rotation_onto_y, CVector3, Rot3, Vec3};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ModelBuilder;
    use crate::geom::PortraitAxes;
    use crate::vector::norm;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn square(half: f64) -> Vec<f64> {
        vec![
            -half, -half, 0.0, half, -half, 0.0, half, half, 0.0, //
            -half, -half, 0.0, half, half, 0.0, -half, half, 0.0,
        ]
    }

    fn model(axes: PortraitAxes, ground_plane: bool) -> Model {
        ModelBuilder::new()
            .coordinates(square(0.5))
            .visibility(vec![true, true])
            .direction(Vec3::new(0.0, 0.0, -1.0))
            .band(5)
            .polarization(0, 0)
            .axes(axes)
            .ground_plane(ground_plane)
            .build()
            .unwrap()
    }

    const RANGE_AZIMUTH: PortraitAxes = PortraitAxes {
        azimuth: true,
        range: true,
        elevation: false,
    };

    #[test]
    fn grid_sizes_are_padded_powers_of_two() {
        let model = model(RANGE_AZIMUTH, false);
        // l_max = sqrt(2), Ka steps 0.125 and 0.25
        let grid = GridSpec::new(&model, usize::MAX).unwrap();
        assert_eq!(grid.counts, [32, 16, 1]);
        assert_eq!(grid.total(), 512);
        assert!((grid.step_w - 6.0 / (16.0 * 0.25)).abs() < 1e-12);
        assert_eq!(grid.delta[2], 0.0);
        assert_eq!(grid.centres, [16.0, 8.0, 0.0]);
    }

    #[test]
    fn grid_ceiling_is_resource_exhaustion() {
        let model = model(RANGE_AZIMUTH, false);
        match GridSpec::new(&model, 100) {
            Err(SolveError::ResourceExhausted { cells }) => assert_eq!(cells, 512),
            other => panic!("unexpected: {:?}", other.map(|g| g.counts)),
        }
    }

    #[test]
    fn oversized_extent_is_resource_exhaustion() {
        let huge = ModelBuilder::new()
            .coordinates(vec![0.0, 0.0, 0.0, 1e19, 0.0, 0.0, 0.0, 1e19, 0.0])
            .visibility(vec![true])
            .direction(Vec3::new(0.0, 0.0, -1.0))
            .band(5)
            .polarization(0, 0)
            .axes(PortraitAxes {
                azimuth: false,
                range: true,
                elevation: false,
            })
            .build()
            .unwrap();
        for max_cells in [1 << 23, usize::MAX] {
            assert!(matches!(
                Problem::new(huge.clone(), max_cells),
                Err(SolveError::ResourceExhausted { .. })
            ));
        }
    }

    #[test]
    fn axis_count_rejects_unrepresentable_extents() {
        assert_eq!(axis_count(11.3, 1 << 23), Some(16));
        assert_eq!(axis_count(0.0, 1 << 23), Some(1));
        assert_eq!(axis_count(f64::INFINITY, usize::MAX), None);
        assert_eq!(axis_count(f64::NAN, usize::MAX), None);
        assert_eq!(axis_count(1e19, usize::MAX), None);
        assert_eq!(axis_count(1e30, usize::MAX), None);
        assert_eq!(axis_count(200.0, 100), None);
    }

    #[test]
    fn centre_cell_looks_back_along_incidence() {
        let model = model(RANGE_AZIMUTH, false);
        let problem = Problem::new(model, usize::MAX).unwrap();
        let (nout, k) = problem.cell_geometry(16, 8, 0);
        assert!((nout - Vec3::new(0.0, 0.0, 1.0)).norm() < 1e-12);
        assert!((k - problem.model.wave.wavenumber()).abs() < 1e-9);
        let (_, k_below) = problem.cell_geometry(16, 9, 0);
        assert!((k - k_below - problem.grid.step_w).abs() < 1e-9);
    }

    #[test]
    fn accumulated_field_peaks_at_broadside() {
        let problem = Problem::new(model(RANGE_AZIMUTH, false), usize::MAX).unwrap();
        let field = problem.accumulate(&NoMonitor).unwrap();
        assert_eq!(field.dim(), (32, 16, 1));
        let centre = norm(&field[[16, 8, 0]]);
        let edge = norm(&field[[0, 8, 0]]);
        assert!(centre > 0.0);
        assert!(centre > edge, "centre {} edge {}", centre, edge);
    }

    #[test]
    fn ground_plane_adds_mirrored_paths() {
        let plain = Problem::new(model(RANGE_AZIMUTH, false), usize::MAX).unwrap();
        let mirrored = Problem::new(model(RANGE_AZIMUTH, true), usize::MAX).unwrap();
        let a = plain.accumulate(&NoMonitor).unwrap();
        let b = mirrored.accumulate(&NoMonitor).unwrap();
        assert_ne!(a, b);
    }

    struct CancelAt(usize, AtomicBool);

    impl Monitor for CancelAt {
        fn checkpoint(&self, cell: usize, _total: usize) -> Result<(), SolveError> {
            if cell >= self.0 {
                self.1.store(true, Ordering::SeqCst);
            }
            if self.is_cancelled() {
                return Err(SolveError::Stopped);
            }
            Ok(())
        }

        fn is_cancelled(&self) -> bool {
            self.1.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn cancellation_stops_accumulation() {
        let problem = Problem::new(model(RANGE_AZIMUTH, false), usize::MAX).unwrap();
        let monitor = CancelAt(10, AtomicBool::new(false));
        assert!(matches!(problem.accumulate(&monitor), Err(SolveError::Stopped)));
    }

    #[test]
    fn synthesis_scales_and_centres() {
        let mut field = Array3::from_elem((4, 4, 1), CVector3::zero());
        field[[0, 0, 0]] = CVector3::new(
            num_complex::Complex64::new(1.0, 0.0),
            num_complex::Complex64::new(0.0, 0.0),
            num_complex::Complex64::new(0.0, 0.0),
        );
        let image = synthesize(field).unwrap();
        // impulse spreads flat over 16 cells with 1/4 from the transform
        let expected = 0.25 * (4.0 * PI / 4.0).sqrt();
        for value in image.iter() {
            assert!((value.x.norm() - expected).abs() < 1e-12);
        }
    }
}

/// Sampling grid of one portrait.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    /// Cells along azimuth (x), range (y) and elevation (z).
    pub counts: [usize; 3],
    /// Index of the zero-offset cell on each axis.
    pub centres: [f64; 3],
    /// Wavenumber step along y.
    pub step_w: f64,
    /// Angular step along x and z; zero on y and on disabled axes.
    pub delta: [f64; 3],
}

/// Padded cell count for an axis spanning `extent` steps, or `None` when it
/// cannot be sized within `max_cells`.
fn axis_count(extent: f64, max_cells: usize) -> Option<usize> {
    if !extent.is_finite() || extent > max_cells as f64 {
        return None;
    }
    pad2(extent.ceil().max(1.0) as usize)
}

impl GridSpec {
    pub fn new(model: &Model, max_cells: usize) -> Result<Self, SolveError> {
        let k = model.wave.wavenumber();
        let mut counts = [1usize; 3];
        for (count, step) in counts.iter_mut().zip(model.steps) {
            if let Some(step) = step {
                *count = axis_count(2.0 * model.l_max / step, max_cells)
                    .ok_or(SolveError::ResourceExhausted { cells: usize::MAX })?;
            }
        }

        let total = counts
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
            .unwrap_or(usize::MAX);
        if total > max_cells {
            return Err(SolveError::ResourceExhausted { cells: total });
        }

        let angular = |axis: usize| match model.steps[axis] {
            Some(step) => config::SAMPLING_FACTOR / (k * step * counts[axis] as f64),
            None => 0.0,
        };
        let step_w = match model.steps[1] {
            Some(step) => config::SAMPLING_FACTOR / (counts[1] as f64 * step),
            None => 0.0,
        };

        Ok(Self {
            counts,
            centres: counts.map(|n| (n / 2) as f64),
            step_w,
            delta: [angular(0), 0.0, angular(2)],
        })
    }

    pub fn total(&self) -> usize {
        self.counts.iter().product()
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.counts[0], self.counts[1], self.counts[2])
    }
}

/// Observer of a running accumulation.
///
/// `checkpoint` runs once before each cell and may block (pause) or end the
/// run with [`SolveError::Stopped`]. `is_cancelled` is polled once per
/// facet term.
pub trait Monitor: Sync {
    fn checkpoint(&self, cell: usize, total: usize) -> Result<(), SolveError>;
    fn is_cancelled(&self) -> bool;
}

/// Monitor that never interrupts.
pub struct NoMonitor;

impl Monitor for NoMonitor {
    fn checkpoint(&self, _cell: usize, _total: usize) -> Result<(), SolveError> {
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Terminal progress bar for offline solves.
pub struct BarMonitor {
    bar: ProgressBar,
}

impl BarMonitor {
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {bar:40.green/blue} {pos:>7}/{len:7} {msg} ETA: {eta_precise}",
        ) {
            bar.set_style(style.progress_chars("█▇▆▅▄▃▂▁"));
        }
        bar.set_message("cells");
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_with_message("done");
    }
}

impl Monitor for BarMonitor {
    fn checkpoint(&self, cell: usize, _total: usize) -> Result<(), SolveError> {
        self.bar.set_position(cell as u64);
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// One portrait computation: the model, its grid and the precomputed facets.
#[derive(Debug, Clone)]
pub struct Problem {
    pub model: Model,
    pub grid: GridSpec,
    facets: Vec<Facet>,
    /// Local broadside frame to world.
    to_world: Rot3,
}

impl Problem {
    pub fn new(model: Model, max_cells: usize) -> Result<Self, SolveError> {
        let grid = GridSpec::new(&model, max_cells)?;
        let facets = model
            .visible_facets()
            .into_iter()
            .filter(|f| !f.is_degenerate())
            .collect();
        let to_world = rotation_onto_y(&model.nin).inverse();
        Ok(Self {
            model,
            grid,
            facets,
            to_world,
        })
    }

    pub fn num_facets(&self) -> usize {
        self.facets.len()
    }

    /// Outgoing direction and wavenumber of cell `(ix, iy, iz)`.
    pub fn cell_geometry(&self, ix: usize, iy: usize, iz: usize) -> (Vec3, f64) {
        let grid = &self.grid;
        let ax = (ix as f64 - grid.centres[0]) * grid.delta[0];
        let az = (iz as f64 - grid.centres[2]) * grid.delta[2];
        let local = Vec3::new(ax.sin() * az.cos(), ax.cos() * az.cos(), az.sin());
        let nout = -(self.to_world * local);
        let k = self.model.wave.wavenumber() - (iy as f64 - grid.centres[1]) * grid.step_w;
        (nout, k)
    }

    /// Field of one facet for one cell, including ground-plane images.
    fn facet_field(&self, facet: &Facet, nout: &Vec3, k: f64) -> CVector3 {
        let nin = &self.model.nin;
        let ein = &self.model.wave.ein;
        let mut field = facet.polar_diffraction(nin, nout, ein, k);
        if self.model.ground_plane {
            let nin_ref = &self.model.nin_ref;
            let nout_ref = mirror_z(nout);
            field += facet.polar_diffraction(nin, &nout_ref, ein, k);
            field += facet.polar_diffraction(nin_ref, nout, ein, k);
            field += facet.polar_diffraction(nin_ref, &nout_ref, ein, k);
        }
        field
    }

    /// Sums the scattered field of all visible facets over every grid cell.
    pub fn accumulate(&self, monitor: &dyn Monitor) -> Result<Array3<CVector3>, SolveError> {
        let total = self.grid.total();
        let mut cells: Vec<CVector3> = Vec::new();
        cells
            .try_reserve_exact(total)
            .map_err(|_| SolveError::ResourceExhausted { cells: total })?;

        let (nx, ny, nz) = self.grid.shape();
        for (cell, (ix, iy, iz)) in iproduct!(0..nx, 0..ny, 0..nz).enumerate() {
            monitor.checkpoint(cell, total)?;
            let (nout, k) = self.cell_geometry(ix, iy, iz);
            let sum = self
                .facets
                .par_iter()
                .try_fold(CVector3::zero, |acc, facet| {
                    if monitor.is_cancelled() {
                        return Err(SolveError::Stopped);
                    }
                    Ok(acc + self.facet_field(facet, &nout, k))
                })
                .try_reduce(CVector3::zero, |a, b| Ok(a + b))?;
            cells.push(sum);
        }

        Ok(Array3::from_shape_vec(self.grid.shape(), cells)?)
    }

    /// Accumulates and synthesizes in one go.
    pub fn solve(&self, monitor: &dyn Monitor) -> Result<Array3<CVector3>, SolveError> {
        let field = self.accumulate(monitor)?;
        synthesize(field)
    }
}

/// Forward 3D transform, centring half-swap and `sqrt(4 pi / ny)` scaling.
pub fn synthesize(mut field: Array3<CVector3>) -> Result<Array3<CVector3>, SolveError> {
    fft3(&mut field, Direction::Forward)?;
    reorder3(&mut field);
    let ny = field.len_of(ndarray::Axis(1)).max(1);
    let factor = (4.0 * PI / ny as f64).sqrt();
    field.mapv_inplace(|v| FftElement::scale(v, factor));
    Ok(field)
}
