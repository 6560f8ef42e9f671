use crate::light_curve::BoxTransit;

use ndarray::{Array1, Array3};
use rand::prelude::*;
use rand_distr::Normal;
use std::f64::consts::PI;

/// Stack of images with a single Gaussian star in the middle
///
/// The star wobbles around the image centre, the sky background is the same for every pixel
/// and varies slowly in time, every pixel has independent Gaussian noise.
#[derive(Clone, Debug)]
pub struct SyntheticCube {
    /// Days
    pub baseline: f64,
    /// Days
    pub cadence: f64,
    /// Rows and columns
    pub shape: (usize, usize),
    /// Total flux of the star out of transit
    pub star_flux: f64,
    /// Pixels
    pub psf_sigma: f64,
    pub background_level: f64,
    pub background_amplitude: f64,
    /// Pixels
    pub jitter_amplitude: f64,
    pub transit: Option<BoxTransit>,
    /// Standard deviation of the per-pixel noise, also used as the uncertainty
    pub noise: f64,
    pub seed: u64,
}

impl Default for SyntheticCube {
    fn default() -> Self {
        Self {
            baseline: 27.0,
            cadence: 30.0 / 1440.0,
            shape: (11, 11),
            star_flux: 1e4,
            psf_sigma: 1.0,
            background_level: 5.0,
            background_amplitude: 0.5,
            jitter_amplitude: 0.05,
            transit: None,
            noise: 2.0,
            seed: 0,
        }
    }
}

impl SyntheticCube {
    /// Time, flux cube and flux uncertainty cube, cubes have `(time, row, column)` shape
    pub fn generate(&self) -> (Array1<f64>, Array3<f64>, Array3<f64>) {
        let n = (self.baseline / self.cadence).round() as usize;
        let time = Array1::from_shape_fn(n, |i| i as f64 * self.cadence);
        let (n_row, n_col) = self.shape;
        let center = ((n_row as f64 - 1.0) / 2.0, (n_col as f64 - 1.0) / 2.0);
        let norm = self.star_flux / (2.0 * PI * self.psf_sigma.powi(2));

        let mut rng = StdRng::seed_from_u64(self.seed);
        let noise = Normal::new(0.0, self.noise).unwrap();
        let mut flux = Array3::zeros((n, n_row, n_col));
        for (i, mut image) in flux.outer_iter_mut().enumerate() {
            let t = time[i];
            let background = self.background_level
                + self.background_amplitude * ((2.0 * PI * t / 7.0).sin() + t / self.baseline);
            let row0 = center.0 + self.jitter_amplitude * (2.0 * PI * t / 1.3).sin();
            let col0 = center.1 + self.jitter_amplitude * (2.0 * PI * t / 2.1).cos();
            let transit = self.transit.map_or(1.0, |transit| transit.relative_flux(t));
            for ((r, c), pixel) in image.indexed_iter_mut() {
                let d2 = (r as f64 - row0).powi(2) + (c as f64 - col0).powi(2);
                let star = transit * norm * (-0.5 * d2 / self.psf_sigma.powi(2)).exp();
                *pixel = star + background + noise.sample(&mut rng);
            }
        }
        let err = if self.noise > 0.0 { self.noise } else { 1.0 };
        let flux_err = Array3::from_elem(flux.raw_dim(), err);
        (time, flux, flux_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_is_in_the_middle() {
        let (time, flux, _) = SyntheticCube {
            noise: 0.0,
            ..Default::default()
        }
        .generate();
        assert_eq!(flux.dim(), (time.len(), 11, 11));
        let image = flux.index_axis(ndarray::Axis(0), 0);
        assert!(image[[5, 5]] > 100.0 * image[[0, 0]]);
    }
}
