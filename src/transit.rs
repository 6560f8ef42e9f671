//! Box-shaped transit geometry: phase folding, in-transit masks and transit statistics

use crate::data::TimeSeries;
use crate::error::TransitModelError;
use crate::float_trait::Float;

use ndarray::{Array1, ArrayView1, Zip};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Periodic box transit: period, reference mid-transit time and full duration
///
/// All functions are pure. Phase of time $t$ is
/// $$
/// \phi = \left((t - t_0 + P/2) \bmod P\right) - P/2,
/// $$
/// and a sample is in transit if $|\phi| \le D / 2$.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(
    bound = "T: Float",
    try_from = "TransitModelParameters<T>",
    into = "TransitModelParameters<T>"
)]
pub struct TransitModel<T> {
    period: T,
    epoch: T,
    duration: T,
}

impl<T> TransitModel<T>
where
    T: Float,
{
    pub fn new(period: T, epoch: T, duration: T) -> Result<Self, TransitModelError> {
        let as_f64 = |x: T| x.to_f64().unwrap_or(f64::NAN);
        if !period.is_finite() || period <= T::zero() {
            return Err(TransitModelError::InvalidPeriod(as_f64(period)));
        }
        if !duration.is_finite() || duration <= T::zero() {
            return Err(TransitModelError::InvalidDuration(as_f64(duration)));
        }
        if duration >= period {
            return Err(TransitModelError::DurationNotShorterThanPeriod {
                duration: as_f64(duration),
                period: as_f64(period),
            });
        }
        if !epoch.is_finite() {
            return Err(TransitModelError::InvalidEpoch(as_f64(epoch)));
        }
        Ok(Self {
            period,
            epoch,
            duration,
        })
    }

    #[inline]
    pub fn period(&self) -> T {
        self.period
    }

    #[inline]
    pub fn epoch(&self) -> T {
        self.epoch
    }

    #[inline]
    pub fn duration(&self) -> T {
        self.duration
    }

    /// The same transit shifted by a fraction of the period, e.g. `0.5` for a secondary eclipse
    pub fn with_phase_offset(&self, fraction: T) -> Self {
        Self {
            epoch: self.epoch + fraction * self.period,
            ..*self
        }
    }

    /// Phase in time units, in $[-P/2, P/2)$
    pub fn phase(&self, t: T) -> T {
        let half_period = T::half() * self.period;
        let x = (t - self.epoch + half_period) % self.period;
        let x = if x < T::zero() { x + self.period } else { x };
        x - half_period
    }

    #[inline]
    pub fn is_in_transit(&self, t: T) -> bool {
        T::abs(self.phase(t)) <= T::half() * self.duration
    }

    pub fn fold(&self, t: ArrayView1<T>) -> Array1<T> {
        t.mapv(|t| self.phase(t))
    }

    /// In-transit membership of every time stamp
    pub fn mask(&self, t: ArrayView1<T>) -> Array1<bool> {
        t.mapv(|t| self.is_in_transit(t))
    }

    /// Mid-transit times inside the closed interval `[t_min, t_max]`
    pub fn transit_times(&self, t_min: T, t_max: T) -> Vec<T> {
        if !(t_min <= t_max) {
            return vec![];
        }
        let first = ((t_min - self.epoch) / self.period).ceil();
        let last = ((t_max - self.epoch) / self.period).floor();
        let mut times = vec![];
        let mut n = first;
        while n <= last {
            times.push(self.epoch + n * self.period);
            n += T::one();
        }
        times
    }

    /// Inverse-variance weighted in- and out-of-transit flux levels of the valid samples
    ///
    /// Returns `None` if either side has no valid samples
    pub fn statistics(&self, ts: &TimeSeries<T>) -> Option<TransitStatistics<T>> {
        let mask = self.mask(ts.t.sample.view());
        let mut acc = [(T::zero(), T::zero(), 0_usize); 2];
        Zip::from(&ts.flux.sample)
            .and(&ts.flux_err.sample)
            .and(&mask)
            .and(ts.valid())
            .for_each(|&f, &e, &in_transit, &valid| {
                if valid {
                    let w = e.powi(-2);
                    let (sum, weight, count) = &mut acc[usize::from(in_transit)];
                    *sum += w * f;
                    *weight += w;
                    *count += 1;
                }
            });
        let [(out_sum, out_weight, n_out), (in_sum, in_weight, n_in)] = acc;
        if n_in == 0 || n_out == 0 {
            return None;
        }

        let (t_min, t_max) = ts
            .valid_t()
            .iter()
            .fold((T::infinity(), T::neg_infinity()), |(min, max), &t| {
                (min.min(t), max.max(t))
            });
        let valid_in_transit: Vec<T> = Zip::from(&ts.t.sample)
            .and(&mask)
            .and(ts.valid())
            .fold(vec![], |mut v, &t, &m, &valid| {
                if m && valid {
                    v.push(t);
                }
                v
            });
        let half_duration = T::half() * self.duration;
        let transits_observed = self
            .transit_times(t_min - half_duration, t_max + half_duration)
            .into_iter()
            .filter(|&center| {
                valid_in_transit
                    .iter()
                    .any(|&t| T::abs(t - center) <= half_duration)
            })
            .count();

        let flux_in = in_sum / in_weight;
        let flux_out = out_sum / out_weight;
        Some(TransitStatistics {
            flux_in,
            flux_out,
            depth: flux_out - flux_in,
            depth_err: T::sqrt(in_weight.recip() + out_weight.recip()),
            n_in,
            n_out,
            transits_observed,
        })
    }
}

/// Flux levels inside and outside of transit windows, see [TransitModel::statistics]
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(bound = "T: Float")]
pub struct TransitStatistics<T> {
    pub flux_in: T,
    pub flux_out: T,
    pub depth: T,
    pub depth_err: T,
    pub n_in: usize,
    pub n_out: usize,
    /// Number of individual transits having at least one valid sample
    pub transits_observed: usize,
}

#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(rename = "TransitModel")]
struct TransitModelParameters<T> {
    period: T,
    epoch: T,
    duration: T,
}

impl<T> From<TransitModel<T>> for TransitModelParameters<T> {
    fn from(model: TransitModel<T>) -> Self {
        Self {
            period: model.period,
            epoch: model.epoch,
            duration: model.duration,
        }
    }
}

impl<T: Float> TryFrom<TransitModelParameters<T>> for TransitModel<T> {
    type Error = TransitModelError;

    fn try_from(p: TransitModelParameters<T>) -> Result<Self, Self::Error> {
        Self::new(p.period, p.epoch, p.duration)
    }
}
