/// Speed of light in vacuum, in metres per second.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;
/// Tolerance on the diffraction exponents `a`, `b` and `a - b` below which
/// the limiting form is used.
pub const DIFF_EPSILON: f64 = 1e-3;
/// Minimum doubled facet area for a triangle to contribute to the scattered field.
pub const DEGENERATE_AREA: f64 = 1e-12;
/// Minimum length for a vector to be treated as a direction.
pub const VEC_LENGTH_THRESHOLD: f64 = 1e-9;
/// Numerator of the angular and frequency sampling steps, `6 / (k * step * count)`.
pub const SAMPLING_FACTOR: f64 = 6.0;
/// Number of frequency bands in the band table.
pub const NUM_BANDS: usize = 6;
/// Content tag carried by every result message.
pub const RESULT_CONTENT: &str = "radioportrait";
