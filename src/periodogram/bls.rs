use crate::data::TimeSeries;
use crate::error::{PeriodogramError, TransitModelError};
use crate::float_trait::Float;
use crate::periodogram::grid::{PeriodGrid, PeriodGridStrategy, PeriodGridTrait};
use crate::periodogram::objective::{BlsObjective, BlsObjectiveTrait};
use crate::sorted_array::SortedArray;
use crate::transit::TransitModel;

use macro_const::macro_const;
use ndarray::Array1;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

macro_const! {
    const DOC: &str = r#"
Box least squares periodogram

For every trial period $P$ and duration $D$ the time series is phase-folded and the flux is
modelled by two levels: $y_\mathrm{in}$ inside a box of width $D$ and $y_\mathrm{out}$ outside.
Both levels are inverse-variance weighted means with weights $w_i = \sigma_i^{-2}$, the depth is
$$
\delta = y_\mathrm{out} - y_\mathrm{in},
\quad \sigma_\delta^{-2} = \frac{W_\mathrm{in} W_\mathrm{out}}{W_\mathrm{in} + W_\mathrm{out}},
$$
and the box is scored by the [BlsObjective]: log-likelihood gain $\delta^2 / (2\sigma_\delta^2)$
or signal-to-noise ratio $\delta / \sigma_\delta$. Only dimming boxes, $\delta > 0$, are
considered.

Phase is binned with a bin width of `min(durations) / oversample`, and box start positions step
through the bins, wrapping around phase zero. A box with fewer than `min_transit_samples` valid
samples is unreliable and is skipped; a period without any reliable box has NaN power.

Power of a period is the best score over durations and box positions. The search is sequential
and deterministic: for equal powers the first period of the grid wins.
"#;
}

#[doc = DOC!()]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(
    bound = "T: Float",
    try_from = "BoxLeastSquaresParameters<T>",
    into = "BoxLeastSquaresParameters<T>"
)]
pub struct BoxLeastSquares<T: Float> {
    durations: SortedArray<T>,
    period_grid: PeriodGridStrategy<T>,
    objective: BlsObjective,
    oversample: usize,
    min_transit_samples: usize,
}

impl<T> BoxLeastSquares<T>
where
    T: Float,
{
    /// New box periodogram with a dynamic period grid and default parameters
    pub fn new(durations: &[T]) -> Result<Self, PeriodogramError> {
        Self::from_parameters(BoxLeastSquaresParameters {
            durations: durations.to_vec(),
            period_grid: PeriodGridStrategy::default(),
            objective: BlsObjective::default(),
            oversample: Self::default_oversample(),
            min_transit_samples: Self::default_min_transit_samples(),
        })
    }

    fn from_parameters(p: BoxLeastSquaresParameters<T>) -> Result<Self, PeriodogramError> {
        if p.durations.is_empty() {
            return Err(PeriodogramError::EmptyDurationGrid);
        }
        if let Some(&d) = p
            .durations
            .iter()
            .find(|d| !d.is_finite() || **d <= T::zero())
        {
            return Err(PeriodogramError::InvalidDuration(
                d.to_f64().unwrap_or(f64::NAN),
            ));
        }
        if p.oversample == 0 {
            return Err(PeriodogramError::InvalidOversample);
        }
        let durations: SortedArray<T> = p.durations.into();
        if let PeriodGridStrategy::Fixed(grid) = &p.period_grid {
            check_durations(grid, &durations)?;
        }
        Ok(Self {
            durations,
            period_grid: p.period_grid,
            objective: p.objective,
            oversample: p.oversample,
            min_transit_samples: p.min_transit_samples.max(1),
        })
    }

    /// One to six hours, in days
    pub fn default_durations() -> Vec<T> {
        [1, 2, 3, 4, 6]
            .into_iter()
            .map(|hours| T::from_count(hours) / T::from_count(24))
            .collect()
    }

    #[inline]
    pub fn default_oversample() -> usize {
        10
    }

    #[inline]
    pub fn default_min_transit_samples() -> usize {
        3
    }

    pub fn with_period_grid(
        self,
        period_grid: impl Into<PeriodGridStrategy<T>>,
    ) -> Result<Self, PeriodogramError> {
        let mut p: BoxLeastSquaresParameters<T> = self.into();
        p.period_grid = period_grid.into();
        Self::from_parameters(p)
    }

    pub fn with_objective(mut self, objective: BlsObjective) -> Self {
        self.objective = objective;
        self
    }

    pub fn with_oversample(mut self, oversample: usize) -> Result<Self, PeriodogramError> {
        if oversample == 0 {
            return Err(PeriodogramError::InvalidOversample);
        }
        self.oversample = oversample;
        Ok(self)
    }

    /// Minimum number of valid in-transit samples for a box to be scored, at least one
    pub fn with_min_transit_samples(mut self, min_transit_samples: usize) -> Self {
        self.min_transit_samples = min_transit_samples.max(1);
        self
    }

    pub fn durations(&self) -> &[T] {
        &self.durations
    }

    pub fn period_grid(&self) -> &PeriodGridStrategy<T> {
        &self.period_grid
    }

    pub fn objective(&self) -> BlsObjective {
        self.objective
    }

    pub fn doc() -> &'static str {
        DOC
    }

    /// Evaluate the periodogram on valid samples of the time series
    pub fn power(&self, ts: &TimeSeries<T>) -> Result<BlsResult<T>, PeriodogramError> {
        let minimum = self.min_transit_samples + 1;
        if ts.valid_count() < minimum {
            return Err(PeriodogramError::ShortTimeSeries {
                actual: ts.valid_count(),
                minimum,
            });
        }
        let t = ts.valid_t().to_vec();
        let grid = self.period_grid.period_grid(&t, &self.durations)?;
        check_durations(&grid, &self.durations)?;

        let t_ref = t[0];
        if t[t.len() - 1] <= t_ref {
            return Err(PeriodogramError::ZeroBaseline);
        }
        let weights = ts.valid_flux_err().mapv(|e| (e * e).recip());
        let total_weight = weights.sum();
        let flux = ts.valid_flux();
        let mean = flux.dot(&weights) / total_weight;
        let dy = flux.mapv(|y| y - mean);
        let samples = BinnedSamples {
            t: &t,
            dy: &dy,
            weights: &weights,
            t_ref,
            total_weight,
        };

        log::debug!(
            "box least squares: {} periods, {} durations, {} valid samples",
            grid.size(),
            self.durations.len(),
            t.len()
        );

        let bin_width = self.durations.minimum() / T::from_count(self.oversample);
        let mut result = BlsResult::with_capacity(grid.size());
        for i in 0..grid.size() {
            let period = grid.get(i);
            let best = self.best_box(&samples, period, bin_width);
            result.push(period, best);
        }
        Ok(result.finish())
    }

    fn best_box(&self, samples: &BinnedSamples<T>, period: T, bin_width: T) -> Option<BoxFit<T>> {
        let n_bins = (period / bin_width)
            .ceil()
            .to_usize()
            .unwrap_or(1)
            .max(1);
        let bin = period / T::from_count(n_bins);
        let bins = samples.fold(period, bin, n_bins);

        let mut best: Option<BoxFit<T>> = None;
        for &duration in self.durations.iter() {
            let width = (duration / bin).round().to_usize().unwrap_or(1).max(1);
            if width >= n_bins {
                continue;
            }
            for start in 0..n_bins {
                let (w_in, wy_in, n_in) = bins.window(start, width);
                if n_in < self.min_transit_samples {
                    continue;
                }
                let w_out = samples.total_weight - w_in;
                if w_in <= T::zero() || w_out <= T::zero() {
                    continue;
                }
                let y_in = wy_in / w_in;
                // Weighted mean of dy over all samples is zero
                let y_out = -wy_in / w_out;
                let depth = y_out - y_in;
                if !(depth > T::zero()) {
                    continue;
                }
                let depth_ivar = w_in * w_out / samples.total_weight;
                let power = self.objective.score(depth, depth_ivar);
                if best.as_ref().is_some_and(|b| b.power >= power) {
                    continue;
                }
                let mut transit_time = samples.t_ref
                    + (T::from_count(start) + T::half() * T::from_count(width)) * bin;
                if transit_time >= samples.t_ref + period {
                    transit_time -= period;
                }
                best = Some(BoxFit {
                    power,
                    duration,
                    transit_time,
                    depth,
                    depth_err: depth_ivar.sqrt().recip(),
                    log_likelihood: T::half() * depth.powi(2) * depth_ivar,
                    n_in,
                });
            }
        }
        best
    }
}

impl<T: Float> Default for BoxLeastSquares<T> {
    fn default() -> Self {
        Self {
            durations: Self::default_durations().into(),
            period_grid: PeriodGridStrategy::default(),
            objective: BlsObjective::default(),
            oversample: Self::default_oversample(),
            min_transit_samples: Self::default_min_transit_samples(),
        }
    }
}

fn check_durations<T: Float>(
    grid: &PeriodGrid<T>,
    durations: &SortedArray<T>,
) -> Result<(), PeriodogramError> {
    let period = grid.minimum();
    let duration = durations.maximum();
    if duration >= period {
        return Err(PeriodogramError::DurationNotShorterThanPeriod {
            duration: duration.to_f64().unwrap_or(f64::NAN),
            period: period.to_f64().unwrap_or(f64::NAN),
        });
    }
    Ok(())
}

struct BinnedSamples<'a, T> {
    t: &'a [T],
    dy: &'a Array1<T>,
    weights: &'a Array1<T>,
    t_ref: T,
    total_weight: T,
}

impl<T: Float> BinnedSamples<'_, T> {
    fn fold(&self, period: T, bin: T, n_bins: usize) -> PhaseBins<T> {
        let mut w = vec![T::zero(); n_bins];
        let mut wy = vec![T::zero(); n_bins];
        let mut n = vec![0_usize; n_bins];
        for ((&t, &dy), &weight) in self.t.iter().zip(self.dy.iter()).zip(self.weights.iter()) {
            let phase = (t - self.t_ref) % period;
            let i = (phase / bin)
                .floor()
                .to_usize()
                .unwrap_or(0)
                .min(n_bins - 1);
            w[i] += weight;
            wy[i] += weight * dy;
            n[i] += 1;
        }
        PhaseBins::from_bins(&w, &wy, &n)
    }
}

/// Cumulative sums of phase bins, doubled to handle boxes wrapping around phase zero
struct PhaseBins<T> {
    w: Vec<T>,
    wy: Vec<T>,
    n: Vec<usize>,
}

impl<T: Float> PhaseBins<T> {
    fn from_bins(w: &[T], wy: &[T], n: &[usize]) -> Self {
        let size = 2 * w.len() + 1;
        let mut cum = Self {
            w: Vec::with_capacity(size),
            wy: Vec::with_capacity(size),
            n: Vec::with_capacity(size),
        };
        cum.w.push(T::zero());
        cum.wy.push(T::zero());
        cum.n.push(0);
        for i in 0..2 * w.len() {
            let j = i % w.len();
            cum.w.push(cum.w[i] + w[j]);
            cum.wy.push(cum.wy[i] + wy[j]);
            cum.n.push(cum.n[i] + n[j]);
        }
        cum
    }

    fn window(&self, start: usize, width: usize) -> (T, T, usize) {
        let end = start + width;
        (
            self.w[end] - self.w[start],
            self.wy[end] - self.wy[start],
            self.n[end] - self.n[start],
        )
    }
}

struct BoxFit<T> {
    power: T,
    duration: T,
    transit_time: T,
    depth: T,
    depth_err: T,
    log_likelihood: T,
    n_in: usize,
}

/// Box periodogram output: the best box for every trial period
///
/// Arrays are aligned with `periods`, all values are NaN for periods without a reliable box,
/// `n_in_transit` is zero for them
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(bound = "T: Float")]
pub struct BlsResult<T: Float> {
    pub periods: Array1<T>,
    pub power: Array1<T>,
    pub durations: Array1<T>,
    pub transit_times: Array1<T>,
    pub depths: Array1<T>,
    pub depth_errs: Array1<T>,
    pub log_likelihoods: Array1<T>,
    pub n_in_transit: Array1<usize>,
}

/// Best period of the box periodogram, see [BlsResult::best]
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(bound = "T: Float")]
pub struct BlsPeak<T> {
    pub index: usize,
    pub period: T,
    pub power: T,
    pub duration: T,
    pub transit_time: T,
    pub depth: T,
    pub depth_err: T,
    pub depth_snr: T,
    pub log_likelihood: T,
    pub n_in_transit: usize,
}

impl<T: Float> BlsPeak<T> {
    pub fn transit_model(&self) -> Result<TransitModel<T>, TransitModelError> {
        TransitModel::new(self.period, self.transit_time, self.duration)
    }
}

struct BlsResultBuilder<T> {
    periods: Vec<T>,
    power: Vec<T>,
    durations: Vec<T>,
    transit_times: Vec<T>,
    depths: Vec<T>,
    depth_errs: Vec<T>,
    log_likelihoods: Vec<T>,
    n_in_transit: Vec<usize>,
}

impl<T: Float> BlsResultBuilder<T> {
    fn push(&mut self, period: T, fit: Option<BoxFit<T>>) {
        self.periods.push(period);
        match fit {
            Some(fit) => {
                self.power.push(fit.power);
                self.durations.push(fit.duration);
                self.transit_times.push(fit.transit_time);
                self.depths.push(fit.depth);
                self.depth_errs.push(fit.depth_err);
                self.log_likelihoods.push(fit.log_likelihood);
                self.n_in_transit.push(fit.n_in);
            }
            None => {
                self.power.push(T::nan());
                self.durations.push(T::nan());
                self.transit_times.push(T::nan());
                self.depths.push(T::nan());
                self.depth_errs.push(T::nan());
                self.log_likelihoods.push(T::nan());
                self.n_in_transit.push(0);
            }
        }
    }

    fn finish(self) -> BlsResult<T> {
        BlsResult {
            periods: self.periods.into(),
            power: self.power.into(),
            durations: self.durations.into(),
            transit_times: self.transit_times.into(),
            depths: self.depths.into(),
            depth_errs: self.depth_errs.into(),
            log_likelihoods: self.log_likelihoods.into(),
            n_in_transit: self.n_in_transit.into(),
        }
    }
}

impl<T: Float> BlsResult<T> {
    fn with_capacity(capacity: usize) -> BlsResultBuilder<T> {
        BlsResultBuilder {
            periods: Vec::with_capacity(capacity),
            power: Vec::with_capacity(capacity),
            durations: Vec::with_capacity(capacity),
            transit_times: Vec::with_capacity(capacity),
            depths: Vec::with_capacity(capacity),
            depth_errs: Vec::with_capacity(capacity),
            log_likelihoods: Vec::with_capacity(capacity),
            n_in_transit: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// Index of the highest finite power, the first one for ties
    pub fn argmax(&self) -> Option<usize> {
        self.power
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_finite())
            .fold(None, |best: Option<(usize, T)>, (i, &p)| match best {
                Some((_, best_power)) if best_power >= p => best,
                _ => Some((i, p)),
            })
            .map(|(i, _)| i)
    }

    pub fn peak(&self, index: usize) -> BlsPeak<T> {
        BlsPeak {
            index,
            period: self.periods[index],
            power: self.power[index],
            duration: self.durations[index],
            transit_time: self.transit_times[index],
            depth: self.depths[index],
            depth_err: self.depth_errs[index],
            depth_snr: self.depths[index] / self.depth_errs[index],
            log_likelihood: self.log_likelihoods[index],
            n_in_transit: self.n_in_transit[index],
        }
    }

    pub fn best(&self) -> Result<BlsPeak<T>, PeriodogramError> {
        let index = self.argmax().ok_or(PeriodogramError::NoReliablePeriod)?;
        Ok(self.peak(index))
    }
}

#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(rename = "BoxLeastSquares", bound = "T: Float")]
struct BoxLeastSquaresParameters<T: Float> {
    durations: Vec<T>,
    period_grid: PeriodGridStrategy<T>,
    objective: BlsObjective,
    oversample: usize,
    min_transit_samples: usize,
}

impl<T: Float> From<BoxLeastSquares<T>> for BoxLeastSquaresParameters<T> {
    fn from(bls: BoxLeastSquares<T>) -> Self {
        Self {
            durations: bls.durations.to_vec(),
            period_grid: bls.period_grid,
            objective: bls.objective,
            oversample: bls.oversample,
            min_transit_samples: bls.min_transit_samples,
        }
    }
}

impl<T: Float> TryFrom<BoxLeastSquaresParameters<T>> for BoxLeastSquares<T> {
    type Error = PeriodogramError;

    fn try_from(p: BoxLeastSquaresParameters<T>) -> Result<Self, Self::Error> {
        Self::from_parameters(p)
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    use crate::data::QualityBitmask;
    use crate::periodogram::grid::DynamicPeriodGridParams;

    use approx::assert_abs_diff_eq;
    use ndarray::Array1;
    use rand::prelude::*;
    use rand_distr::Normal;

    const PERIOD: f64 = 4.0;
    const EPOCH: f64 = 1.0;
    const DURATION: f64 = 0.2;
    const DEPTH: f64 = 0.01;

    fn injected_transit(noise: f64) -> TimeSeries<'static, f64> {
        let model = TransitModel::new(PERIOD, EPOCH, DURATION).unwrap();
        let t: Array1<f64> = (0..27 * 48).map(|i| i as f64 / 48.0).collect();
        let mut rng = StdRng::seed_from_u64(0);
        let normal = Normal::new(0.0, noise).unwrap();
        let flux = t.mapv(|t| {
            let dip = if model.is_in_transit(t) { DEPTH } else { 0.0 };
            1.0 - dip + normal.sample(&mut rng)
        });
        let flux_err = Array1::from_elem(t.len(), noise);
        TimeSeries::new(t, flux, flux_err).unwrap()
    }

    fn bls() -> BoxLeastSquares<f64> {
        BoxLeastSquares::new(&[0.1, 0.2, 0.3])
            .unwrap()
            .with_period_grid(PeriodGrid::linear(3.5, 0.005, 201).unwrap())
            .unwrap()
    }

    fn check_recovery(bls: &BoxLeastSquares<f64>) {
        let ts = injected_transit(1e-3);
        let result = bls.power(&ts).unwrap();
        assert_eq!(result.len(), 201);
        let best = result.best().unwrap();
        assert!(
            (best.period - PERIOD).abs() <= 0.0051,
            "period {}",
            best.period
        );
        assert_eq!(best.duration, DURATION);
        let model = best.transit_model().unwrap();
        assert!(model.phase(EPOCH).abs() <= 0.02, "epoch {}", best.transit_time);
        assert_abs_diff_eq!(best.depth, DEPTH, epsilon = 0.1 * DEPTH);
        assert!(best.depth_snr > 10.0);
    }

    #[test]
    fn recovers_injected_transit() {
        check_recovery(&bls());
    }

    #[test]
    fn recovers_injected_transit_snr() {
        check_recovery(&bls().with_objective(BlsObjective::snr()));
    }

    #[test]
    fn recovers_transit_through_gap_and_invalid_samples() {
        let ts = injected_transit(1e-3);
        let mut flux = ts.flux.sample.to_owned();
        let mut quality = Array1::<u32>::zeros(ts.lenu());
        for (i, &t) in ts.t.sample.iter().enumerate() {
            if (t > 13.0 && t < 14.5) || i % 17 == 0 {
                flux[i] = f64::NAN;
            }
            // corrupted transit at t = 5
            if (t - 5.0).abs() <= DURATION {
                flux[i] = 100.0;
                quality[i] = QualityBitmask::DESAT;
            }
        }
        let ts = TimeSeries::new(ts.t.sample.to_owned(), flux, ts.flux_err.sample.to_owned())
            .unwrap()
            .with_quality(quality)
            .unwrap()
            .apply_quality_bitmask(QualityBitmask::default_bitmask())
            .unwrap();

        let best = bls().power(&ts).unwrap().best().unwrap();
        assert!(
            (best.period - PERIOD).abs() <= 0.0051,
            "period {}",
            best.period
        );
        let model = best.transit_model().unwrap();
        assert!(model.phase(EPOCH).abs() <= 0.02, "epoch {}", best.transit_time);
        assert_abs_diff_eq!(best.depth, DEPTH, epsilon = 0.1 * DEPTH);

        // box edges are aligned to phase bins of 0.01 days
        let valid_t = ts.valid_t();
        let in_transit = |duration: f64| {
            TransitModel::new(best.period, best.transit_time, duration)
                .unwrap()
                .mask(valid_t.view())
                .iter()
                .filter(|&&m| m)
                .count()
        };
        assert!(best.n_in_transit >= in_transit(best.duration - 0.03));
        assert!(best.n_in_transit <= in_transit(best.duration + 0.03));
    }

    #[test]
    fn deterministic() {
        let ts = injected_transit(1e-3);
        let bls = bls();
        let a = bls.power(&ts).unwrap();
        let b = bls.power(&ts).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn dynamic_grid_recovers_period() {
        let ts = injected_transit(1e-3);
        let bls = BoxLeastSquares::new(&[0.1, 0.2, 0.3])
            .unwrap()
            .with_period_grid(DynamicPeriodGridParams::new(Some(3.0), Some(5.0), 2.0).unwrap())
            .unwrap();
        let best = bls.power(&ts).unwrap().best().unwrap();
        assert_abs_diff_eq!(best.period, PERIOD, epsilon = 0.01);
    }

    #[test]
    fn unreliable_periods_have_nan_power() {
        let t: Array1<f64> = (0..96).map(|i| i as f64 / 48.0).collect();
        let flux = Array1::ones(t.len());
        let ts = TimeSeries::new_without_errors(t, flux).unwrap();
        let bls = BoxLeastSquares::new(&[0.01])
            .unwrap()
            .with_period_grid(PeriodGrid::try_from_sorted_array(vec![3.0, 4.0, 5.0]).unwrap())
            .unwrap();
        let result = bls.power(&ts).unwrap();
        assert!(result.power.iter().all(|p| p.is_nan()));
        assert_eq!(result.best(), Err(PeriodogramError::NoReliablePeriod));
    }

    #[test]
    fn argmax_skips_nan_and_prefers_first() {
        let mut result = BlsResult::with_capacity(0).finish();
        result.power = ndarray::array![f64::NAN, 1.0, 3.0, f64::NAN, 3.0];
        assert_eq!(result.argmax(), Some(2));
    }

    #[test]
    fn duration_must_be_shorter_than_periods() {
        let err = BoxLeastSquares::new(&[0.1, 1.5])
            .unwrap()
            .with_period_grid(PeriodGrid::linear(1.0, 0.1, 10).unwrap())
            .unwrap_err();
        assert_eq!(
            err,
            PeriodogramError::DurationNotShorterThanPeriod {
                duration: 1.5,
                period: 1.0
            }
        );
    }

    #[test]
    fn invalid_parameters() {
        assert_eq!(
            BoxLeastSquares::<f64>::new(&[]),
            Err(PeriodogramError::EmptyDurationGrid)
        );
        assert_eq!(
            BoxLeastSquares::new(&[0.1, -0.1]),
            Err(PeriodogramError::InvalidDuration(-0.1))
        );
        assert_eq!(
            BoxLeastSquares::new(&[0.1]).unwrap().with_oversample(0),
            Err(PeriodogramError::InvalidOversample)
        );
    }

    #[test]
    fn short_time_series() {
        let ts = TimeSeries::new_without_errors(vec![0.0, 1.0, 2.0], vec![1.0; 3]).unwrap();
        assert_eq!(
            bls().power(&ts),
            Err(PeriodogramError::ShortTimeSeries {
                actual: 3,
                minimum: 4
            })
        );
    }

    #[test]
    fn serialization_validates() {
        let bls = bls();
        let json = serde_json::to_string(&bls).unwrap();
        let restored: BoxLeastSquares<f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, bls);

        let invalid = json.replace("\"oversample\":10", "\"oversample\":0");
        assert!(serde_json::from_str::<BoxLeastSquares<f64>>(&invalid).is_err());
    }
}
