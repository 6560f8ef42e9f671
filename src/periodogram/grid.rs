use crate::error::{PeriodogramError, SortedArrayError};
use crate::float_trait::Float;
use crate::sorted_array::SortedArray;

use enum_dispatch::enum_dispatch;
use itertools::Itertools;
use ndarray::Array1;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt::Debug;

/// Ascending grid of trial periods
#[enum_dispatch]
pub trait PeriodGridTrait<T>: Send + Sync + Clone + Debug {
    fn size(&self) -> usize;
    fn get(&self, i: usize) -> T;
    fn minimum(&self) -> T;
    fn maximum(&self) -> T;
}

#[enum_dispatch(PeriodGridTrait<T>)]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(bound = "T: Float")]
#[non_exhaustive]
pub enum PeriodGrid<T: Float> {
    Arbitrary(SortedArray<T>),
    Linear(LinearPeriodGrid<T>),
    UniformFrequency(UniformFrequencyPeriodGrid<T>),
}

impl<T: Float> PeriodGrid<T> {
    /// Construct from an explicit array of periods
    ///
    /// Periods must be positive, finite and strictly ascending
    pub fn try_from_sorted_array(
        sorted_array: impl Into<Array1<T>>,
    ) -> Result<Self, PeriodogramError> {
        let periods = SortedArray::from_sorted(sorted_array)?;
        if periods.is_empty() {
            return Err(PeriodogramError::EmptyPeriodGrid);
        }
        if periods.iter().tuple_windows().any(|(a, b)| a == b) {
            return Err(SortedArrayError::Unsorted.into());
        }
        check_period(periods.minimum())?;
        check_period(periods.maximum())?;
        Ok(Self::Arbitrary(periods))
    }

    /// Periods `start + i * step` for `i` in `0..size`
    pub fn linear(start: T, step: T, size: usize) -> Result<Self, PeriodogramError> {
        Ok(Self::Linear(LinearPeriodGrid::new(start, step, size)?))
    }

    /// `size` periods between `min_period` and `max_period` evenly spaced in frequency
    pub fn uniform_frequency(
        min_period: T,
        max_period: T,
        size: usize,
    ) -> Result<Self, PeriodogramError> {
        Ok(Self::UniformFrequency(UniformFrequencyPeriodGrid::new(
            min_period, max_period, size,
        )?))
    }

    pub fn to_array(&self) -> Array1<T> {
        (0..self.size()).map(|i| self.get(i)).collect()
    }
}

fn check_period<T: Float>(period: T) -> Result<(), PeriodogramError> {
    if period.is_finite() && period > T::zero() {
        Ok(())
    } else {
        Err(PeriodogramError::InvalidPeriod(
            period.to_f64().unwrap_or(f64::NAN),
        ))
    }
}

impl<T: Float> PeriodGridTrait<T> for SortedArray<T> {
    fn size(&self) -> usize {
        self.len()
    }

    fn get(&self, i: usize) -> T {
        self[i]
    }

    fn minimum(&self) -> T {
        self[0]
    }

    fn maximum(&self) -> T {
        self[self.len() - 1]
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(bound = "T: Float")]
pub struct LinearPeriodGrid<T: Float> {
    start: T,
    step: T,
    size: usize,
}

impl<T: Float> LinearPeriodGrid<T> {
    pub fn new(start: T, step: T, size: usize) -> Result<Self, PeriodogramError> {
        check_period(start)?;
        if size == 0 {
            return Err(PeriodogramError::EmptyPeriodGrid);
        }
        if size > 1 && !(step.is_finite() && step > T::zero()) {
            return Err(SortedArrayError::Unsorted.into());
        }
        Ok(Self { start, step, size })
    }

    pub fn step(&self) -> T {
        self.step
    }
}

impl<T: Float> PeriodGridTrait<T> for LinearPeriodGrid<T> {
    fn size(&self) -> usize {
        self.size
    }

    fn get(&self, i: usize) -> T {
        self.start + self.step * T::from_count(i)
    }

    fn minimum(&self) -> T {
        self.start
    }

    fn maximum(&self) -> T {
        self.get(self.size - 1)
    }
}

/// Periods $P_i = 1 / (f_\mathrm{max} - i\,\Delta f)$
///
/// Transit signals have a width in phase proportional to $1/P$, so a grid uniform in frequency
/// samples short and long periods with the same phase resolution
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(bound = "T: Float")]
pub struct UniformFrequencyPeriodGrid<T: Float> {
    max_freq: T,
    freq_step: T,
    size: usize,
}

impl<T: Float> UniformFrequencyPeriodGrid<T> {
    pub fn new(min_period: T, max_period: T, size: usize) -> Result<Self, PeriodogramError> {
        check_period(min_period)?;
        check_period(max_period)?;
        if size == 0 {
            return Err(PeriodogramError::EmptyPeriodGrid);
        }
        if max_period < min_period || (size > 1 && max_period == min_period) {
            return Err(SortedArrayError::Unsorted.into());
        }
        let max_freq = min_period.recip();
        let freq_step = if size > 1 {
            (max_freq - max_period.recip()) / T::from_count(size - 1)
        } else {
            T::zero()
        };
        Ok(Self {
            max_freq,
            freq_step,
            size,
        })
    }
}

impl<T: Float> PeriodGridTrait<T> for UniformFrequencyPeriodGrid<T> {
    fn size(&self) -> usize {
        self.size
    }

    fn get(&self, i: usize) -> T {
        (self.max_freq - self.freq_step * T::from_count(i)).recip()
    }

    fn minimum(&self) -> T {
        self.get(0)
    }

    fn maximum(&self) -> T {
        self.get(self.size - 1)
    }
}

/// Parameters of a period grid derived from the time series
///
/// Frequency step is $\Delta f = \mathrm{frequency\\_factor} \cdot D_\mathrm{min} / T^2$, where
/// $D_\mathrm{min}$ is the shortest trial duration and $T$ is the time baseline: the phase of the
/// last observation shifts by a fraction of the transit duration between neighbouring periods.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(
    try_from = "DynamicPeriodGridParameters",
    into = "DynamicPeriodGridParameters"
)]
pub struct DynamicPeriodGridParams {
    min_period: Option<f64>,
    max_period: Option<f64>,
    frequency_factor: f64,
}

impl DynamicPeriodGridParams {
    /// `min_period` defaults to twice the longest duration, `max_period` to half of the time
    /// baseline. Smaller `frequency_factor` gives a denser grid.
    pub fn new(
        min_period: Option<f64>,
        max_period: Option<f64>,
        frequency_factor: f64,
    ) -> Result<Self, PeriodogramError> {
        if !(frequency_factor.is_finite() && frequency_factor > 0.0) {
            return Err(PeriodogramError::InvalidFrequencyFactor(frequency_factor));
        }
        if let Some(p) = min_period {
            check_period(p)?;
        }
        if let Some(p) = max_period {
            check_period(p)?;
        }
        if let (Some(min), Some(max)) = (min_period, max_period) {
            if max < min {
                return Err(PeriodogramError::EmptyPeriodGrid);
            }
        }
        Ok(Self {
            min_period,
            max_period,
            frequency_factor,
        })
    }

    pub fn min_period(&self) -> Option<f64> {
        self.min_period
    }

    pub fn max_period(&self) -> Option<f64> {
        self.max_period
    }

    pub fn frequency_factor(&self) -> f64 {
        self.frequency_factor
    }

    #[inline]
    pub fn default_frequency_factor() -> f64 {
        1.0
    }

    pub fn period_grid<T: Float>(
        &self,
        t: &[T],
        durations: &[T],
    ) -> Result<PeriodGrid<T>, PeriodogramError> {
        let to_t = |x: f64| T::from_f64(x).ok_or(PeriodogramError::InvalidPeriod(x));
        let baseline = match (t.first(), t.last()) {
            (Some(&first), Some(&last)) if last > first => last - first,
            _ => return Err(PeriodogramError::ZeroBaseline),
        };
        let (min_duration, max_duration) = durations
            .iter()
            .fold((T::infinity(), T::neg_infinity()), |(min, max), &d| {
                (min.min(d), max.max(d))
            });
        if !min_duration.is_finite() {
            return Err(PeriodogramError::EmptyDurationGrid);
        }
        let min_period = match self.min_period {
            Some(p) => to_t(p)?,
            None => T::two() * max_duration,
        };
        let max_period = match self.max_period {
            Some(p) => to_t(p)?,
            None => T::half() * baseline,
        };
        check_period(min_period)?;
        check_period(max_period)?;
        if max_period < min_period {
            return Err(PeriodogramError::EmptyPeriodGrid);
        }

        let freq_step = to_t(self.frequency_factor)? * min_duration / baseline.powi(2);
        let freq_range = min_period.recip() - max_period.recip();
        let size = (freq_range / freq_step)
            .floor()
            .to_usize()
            .ok_or(PeriodogramError::EmptyPeriodGrid)?
            + 1;
        log::debug!(
            "dynamic period grid: {size} periods from {min_period} to {max_period}, baseline {baseline}"
        );
        if size == 1 {
            return PeriodGrid::try_from_sorted_array(vec![min_period]);
        }
        Ok(PeriodGrid::UniformFrequency(UniformFrequencyPeriodGrid {
            max_freq: min_period.recip(),
            freq_step,
            size,
        }))
    }
}

impl Default for DynamicPeriodGridParams {
    fn default() -> Self {
        Self {
            min_period: None,
            max_period: None,
            frequency_factor: Self::default_frequency_factor(),
        }
    }
}

#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(rename = "DynamicPeriodGridParams")]
struct DynamicPeriodGridParameters {
    min_period: Option<f64>,
    max_period: Option<f64>,
    frequency_factor: f64,
}

impl TryFrom<DynamicPeriodGridParameters> for DynamicPeriodGridParams {
    type Error = PeriodogramError;

    fn try_from(p: DynamicPeriodGridParameters) -> Result<Self, Self::Error> {
        Self::new(p.min_period, p.max_period, p.frequency_factor)
    }
}

impl From<DynamicPeriodGridParams> for DynamicPeriodGridParameters {
    fn from(p: DynamicPeriodGridParams) -> Self {
        Self {
            min_period: p.min_period,
            max_period: p.max_period,
            frequency_factor: p.frequency_factor,
        }
    }
}

/// Defines a strategy of [PeriodGrid] selection
///
/// It is either a fixed grid, or a grid defined dynamically for each input time series
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(bound = "T: Float")]
pub enum PeriodGridStrategy<T: Float> {
    Fixed(PeriodGrid<T>),
    Dynamic(DynamicPeriodGridParams),
}

impl<T: Float> PeriodGridStrategy<T> {
    pub fn period_grid(
        &self,
        t: &[T],
        durations: &[T],
    ) -> Result<Cow<'_, PeriodGrid<T>>, PeriodogramError> {
        match self {
            Self::Fixed(grid) => Ok(Cow::Borrowed(grid)),
            Self::Dynamic(params) => Ok(Cow::Owned(params.period_grid(t, durations)?)),
        }
    }
}

impl<T: Float> Default for PeriodGridStrategy<T> {
    fn default() -> Self {
        Self::Dynamic(DynamicPeriodGridParams::default())
    }
}

impl<T: Float> From<PeriodGrid<T>> for PeriodGridStrategy<T> {
    fn from(grid: PeriodGrid<T>) -> Self {
        Self::Fixed(grid)
    }
}

impl<T: Float> From<DynamicPeriodGridParams> for PeriodGridStrategy<T> {
    fn from(params: DynamicPeriodGridParams) -> Self {
        Self::Dynamic(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use light_curve_common::linspace;

    #[test]
    fn linear_vs_arbitrary() {
        let linear = PeriodGrid::linear(0.5, 0.25, 9).unwrap();
        let arbitrary =
            PeriodGrid::try_from_sorted_array(linspace(0.5_f64, 2.5, 9)).unwrap();
        assert_eq!(linear.size(), arbitrary.size());
        for i in 0..linear.size() {
            assert_relative_eq!(linear.get(i), arbitrary.get(i), max_relative = 1e-12);
        }
        assert_eq!(linear.maximum(), 2.5);
    }

    #[test]
    fn uniform_frequency_ends() {
        let grid = PeriodGrid::uniform_frequency(1.0_f64, 10.0, 11).unwrap();
        assert_relative_eq!(grid.minimum(), 1.0);
        assert_relative_eq!(grid.maximum(), 10.0, max_relative = 1e-12);
        let periods = grid.to_array();
        assert!(periods.windows(2).into_iter().all(|w| w[0] < w[1]));
    }

    #[test]
    fn invalid_grids() {
        assert_eq!(
            PeriodGrid::try_from_sorted_array(vec![-1.0_f64, 2.0]),
            Err(PeriodogramError::InvalidPeriod(-1.0))
        );
        assert_eq!(
            PeriodGrid::try_from_sorted_array(vec![2.0_f64, 1.0]),
            Err(PeriodogramError::PeriodGrid(SortedArrayError::Unsorted))
        );
        assert_eq!(
            PeriodGrid::try_from_sorted_array(vec![1.0_f64, 1.0]),
            Err(PeriodogramError::PeriodGrid(SortedArrayError::Unsorted))
        );
        assert_eq!(
            PeriodGrid::try_from_sorted_array(Vec::<f64>::new()),
            Err(PeriodogramError::EmptyPeriodGrid)
        );
        assert!(PeriodGrid::linear(1.0_f64, 0.0, 2).is_err());
    }

    #[test]
    fn dynamic_grid_covers_requested_range() {
        let t = linspace(0.0_f64, 27.0, 1000);
        let params = DynamicPeriodGridParams::new(Some(3.0), Some(5.0), 1.0).unwrap();
        let grid = params.period_grid(&t, &[0.1, 0.2]).unwrap();
        assert_relative_eq!(grid.minimum(), 3.0);
        assert!(grid.maximum() <= 5.0 + 1e-12);
        // frequency step is 0.1 / 27^2
        let expected_size = (1.0 / 3.0 - 1.0 / 5.0) * 27.0 * 27.0 / 0.1 + 1.0;
        assert!((grid.size() as f64 - expected_size).abs() <= 1.0);
    }

    #[test]
    fn dynamic_grid_defaults() {
        let t = linspace(0.0_f64, 20.0, 100);
        let grid = DynamicPeriodGridParams::default()
            .period_grid(&t, &[0.1, 0.25])
            .unwrap();
        assert_relative_eq!(grid.minimum(), 0.5);
        assert!(grid.maximum() <= 10.0 + 1e-12);
        assert!(grid.maximum() > 9.0);
    }

    #[test]
    fn dynamic_grid_needs_baseline() {
        let t = [1.0_f64; 10];
        assert_eq!(
            DynamicPeriodGridParams::default().period_grid(&t, &[0.1]),
            Err(PeriodogramError::ZeroBaseline)
        );
    }

    #[test]
    fn dynamic_grid_parameters_are_validated() {
        assert_eq!(
            DynamicPeriodGridParams::new(None, None, 0.0),
            Err(PeriodogramError::InvalidFrequencyFactor(0.0))
        );
        assert_eq!(
            DynamicPeriodGridParams::new(Some(-1.0), None, 1.0),
            Err(PeriodogramError::InvalidPeriod(-1.0))
        );
        assert_eq!(
            DynamicPeriodGridParams::new(Some(5.0), Some(3.0), 1.0),
            Err(PeriodogramError::EmptyPeriodGrid)
        );
    }

    #[test]
    fn dynamic_grid_deserialization_validates() {
        let params = DynamicPeriodGridParams::new(Some(3.0), None, 0.5).unwrap();
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(
            json,
            r#"{"min_period":3.0,"max_period":null,"frequency_factor":0.5}"#
        );
        let restored: DynamicPeriodGridParams = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, params);

        let zero = json.replace("0.5", "0.0");
        assert!(serde_json::from_str::<DynamicPeriodGridParams>(&zero).is_err());
    }
}
