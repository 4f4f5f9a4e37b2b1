//! Error types for the simulation engine.

use thiserror::Error;

/// Reasons a request cannot be turned into a geometric model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("triangle coordinates are missing or not a multiple of 9")]
    MissingCoordinates,

    #[error("triangle visibility list is missing or does not match the triangle count")]
    MissingVisibility,

    #[error("incident direction vector is missing")]
    MissingDirection,

    #[error("frequency band {0} is outside 0..=5")]
    InvalidFrequencyBand(i64),

    #[error("polarization code {0} is not supported (0 = vertical, 1 = horizontal)")]
    InvalidPolarization(i64),

    #[error("no portrait axis selected")]
    NoPortraitAxisSelected,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FftError {
    #[error("transform length {0} is not a power of two")]
    NotPowerOfTwo(usize),
}

/// Reasons a simulation run ends without an image.
#[derive(Debug, Error)]
pub enum SolveError {
    /// Cooperative cancellation. Not a failure.
    #[error("stopped")]
    Stopped,

    #[error("grid of {cells} cells cannot be allocated")]
    ResourceExhausted { cells: usize },

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Fft(#[from] FftError),

    #[error("grid shape mismatch: {0}")]
    Shape(#[from] ndarray::ShapeError),
}
