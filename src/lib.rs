//! Synthetic radar portraits of triangle meshes.
//!
//! A portrait is computed with the physical-optics approximation: every
//! visible facet contributes a closed-form diffraction integral over a grid
//! of look angles and wavenumbers, and a 3D Fourier transform turns the
//! summed far field into an image. The crate runs either as a TCP server
//! with one cancellable job per client, or as a one-shot solver.

pub mod builder;
pub mod config;
pub mod control;
pub mod diff;
pub mod error;
pub mod fft;
pub mod geom;
pub mod job;
pub mod logging;
pub mod manager;
pub mod output;
pub mod problem;
pub mod protocol;
pub mod result;
pub mod server;
pub mod settings;
pub mod vector;
pub mod wave;
