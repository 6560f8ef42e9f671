//! Synthetic data for tests and benchmarks
//!
//! Generators return plain arrays rather than `light-curve-detrend` types, so the crate can be
//! a dev-dependency of `light-curve-detrend` without a dependency cycle.

pub use light_curve::{BoxTransit, SyntheticLightCurve};
pub use pixel_cube::SyntheticCube;

mod light_curve;
mod pixel_cube;

use ndarray::Array1;

/// Time, flux and flux uncertainty
pub type TripleArray<T> = (Array1<T>, Array1<T>, Array1<T>);
