use crate::TripleArray;

use ndarray::Array1;
use rand::prelude::*;
use rand_distr::Normal;
use std::f64::consts::PI;

/// Periodic box-shaped dimming
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxTransit {
    pub period: f64,
    pub epoch: f64,
    pub duration: f64,
    /// Fractional flux decrease
    pub depth: f64,
}

impl BoxTransit {
    pub fn is_in_transit(&self, t: f64) -> bool {
        let half_period = 0.5 * self.period;
        let phase = (t - self.epoch + half_period).rem_euclid(self.period) - half_period;
        phase.abs() <= 0.5 * self.duration
    }

    /// Unity out of transit, `1 - depth` in transit
    pub fn relative_flux(&self, t: f64) -> f64 {
        if self.is_in_transit(t) {
            1.0 - self.depth
        } else {
            1.0
        }
    }
}

/// Evenly sampled light curve: constant level, sinusoidal trend, box transit and white noise
#[derive(Clone, Debug)]
pub struct SyntheticLightCurve {
    /// Days
    pub baseline: f64,
    /// Days
    pub cadence: f64,
    pub level: f64,
    pub trend_amplitude: f64,
    /// Days
    pub trend_period: f64,
    pub transit: Option<BoxTransit>,
    /// Standard deviation of the noise, also used as the flux uncertainty if positive
    pub noise: f64,
    pub seed: u64,
}

impl Default for SyntheticLightCurve {
    fn default() -> Self {
        Self {
            baseline: 27.0,
            cadence: 30.0 / 1440.0,
            level: 1.0,
            trend_amplitude: 0.0,
            trend_period: 10.0,
            transit: None,
            noise: 0.0,
            seed: 0,
        }
    }
}

impl SyntheticLightCurve {
    pub fn time(&self) -> Array1<f64> {
        let n = (self.baseline / self.cadence).round() as usize;
        Array1::from_shape_fn(n, |i| i as f64 * self.cadence)
    }

    pub fn generate(&self) -> TripleArray<f64> {
        let t = self.time();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let noise = Normal::new(0.0, self.noise).unwrap();
        let flux = t.mapv(|t| {
            let trend = self.trend_amplitude * (2.0 * PI * t / self.trend_period).sin();
            let transit = self.transit.map_or(1.0, |transit| transit.relative_flux(t));
            (self.level + trend) * transit + noise.sample(&mut rng)
        });
        let err = if self.noise > 0.0 { self.noise } else { 1.0 };
        let flux_err = Array1::from_elem(t.len(), err);
        (t, flux, flux_err)
    }
}
