use crate::data::data_sample::DataSample;
use crate::data::meta::LightCurveMeta;
use crate::data::quality::QualityBitmask;
use crate::error::TimeSeriesError;
use crate::float_trait::Float;
use crate::sorted_array::SortedArray;

use itertools::Itertools;
use ndarray::{Array1, ArrayView1, Zip};

/// Photometric time series: time, flux, flux uncertainty, quality flags and validity
///
/// A sample is valid if its time, flux and uncertainty are finite, the uncertainty is positive,
/// and its quality flags were not rejected by a [QualityBitmask]. Invalid samples are kept in the
/// series, so it stays aligned with the data product it came from, but they never enter a fit
/// or a summary statistic.
///
/// Transformations never mutate the series, they return a new one. Cached statistics are the
/// only mutable state, that's why getters require a mutable reference.
#[derive(Clone, Debug)]
pub struct TimeSeries<'a, T>
where
    T: Float,
{
    pub t: DataSample<'a, T>,
    pub flux: DataSample<'a, T>,
    pub flux_err: DataSample<'a, T>,
    quality: Array1<u32>,
    valid: Array1<bool>,
    pub meta: LightCurveMeta,
    flux_mean: Option<T>,
    flux_median: Option<T>,
    flux_std: Option<T>,
    flux_weighted_mean: Option<T>,
}

macro_rules! time_series_getter {
    ($attr: ident, $getter: ident, $func: expr) => {
        // This lint is false-positive in macros
        // https://github.com/rust-lang/rust-clippy/issues/1553
        #[allow(clippy::redundant_closure_call)]
        pub fn $getter(&mut self) -> T {
            match self.$attr {
                Some(x) => x,
                None => {
                    let value = $func(self);
                    self.$attr = Some(value);
                    value
                }
            }
        }
    };
}

impl<'a, T> TimeSeries<'a, T>
where
    T: Float,
{
    /// Construct `TimeSeries` from array-like objects
    ///
    /// All arrays must have the same length and `t` must not decrease. Input arrays could be
    /// [`ndarray::Array1`], [`ndarray::ArrayView1`], 1-D [`ndarray::CowArray`], `Vec<T>` or
    /// `&[T]`.
    pub fn new(
        t: impl Into<DataSample<'a, T>>,
        flux: impl Into<DataSample<'a, T>>,
        flux_err: impl Into<DataSample<'a, T>>,
    ) -> Result<Self, TimeSeriesError> {
        let t = t.into();
        let flux = flux.into();
        let flux_err = flux_err.into();

        check_length("flux", t.len(), flux.len())?;
        check_length("flux_err", t.len(), flux_err.len())?;
        // Non-finite times are skipped, finite ones must not decrease across them
        if let Some(((i, _), _)) = t
            .sample
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_finite())
            .tuple_windows()
            .find(|((_, a), (_, b))| a > b)
        {
            return Err(TimeSeriesError::Unsorted(i));
        }

        let valid = Zip::from(&t.sample)
            .and(&flux.sample)
            .and(&flux_err.sample)
            .map_collect(|&t, &f, &e| {
                t.is_finite() && f.is_finite() && e.is_finite() && e > T::zero()
            });
        let quality = Array1::zeros(t.len());

        Ok(Self::from_parts(
            t,
            flux,
            flux_err,
            quality,
            valid,
            LightCurveMeta::default(),
        ))
    }

    /// Construct [`TimeSeries`] from time and flux with unity uncertainties
    pub fn new_without_errors(
        t: impl Into<DataSample<'a, T>>,
        flux: impl Into<DataSample<'a, T>>,
    ) -> Result<Self, TimeSeriesError> {
        let t = t.into();
        let flux_err = Array1::from_elem(t.len(), T::one());
        Self::new(t, flux, flux_err)
    }

    fn from_parts(
        t: DataSample<'a, T>,
        flux: DataSample<'a, T>,
        flux_err: DataSample<'a, T>,
        quality: Array1<u32>,
        valid: Array1<bool>,
        meta: LightCurveMeta,
    ) -> Self {
        Self {
            t,
            flux,
            flux_err,
            quality,
            valid,
            meta,
            flux_mean: None,
            flux_median: None,
            flux_std: None,
            flux_weighted_mean: None,
        }
    }

    /// Attach per-sample quality flag words
    ///
    /// Flags don't change validity until [TimeSeries::apply_quality_bitmask] is called
    pub fn with_quality(
        mut self,
        quality: impl Into<Array1<u32>>,
    ) -> Result<Self, TimeSeriesError> {
        let quality = quality.into();
        check_length("quality", self.lenu(), quality.len())?;
        self.quality = quality;
        Ok(self)
    }

    pub fn with_meta(mut self, meta: LightCurveMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Time series length, including invalid samples
    #[inline]
    pub fn lenu(&self) -> usize {
        self.t.len()
    }

    /// Float approximating time series length
    pub fn lenf(&self) -> T {
        T::from_count(self.lenu())
    }

    pub fn quality(&self) -> ArrayView1<'_, u32> {
        self.quality.view()
    }

    /// Per-sample validity flags
    pub fn valid(&self) -> ArrayView1<'_, bool> {
        self.valid.view()
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    pub fn valid_indices(&self) -> Vec<usize> {
        self.valid
            .iter()
            .enumerate()
            .filter_map(|(i, &v)| v.then_some(i))
            .collect()
    }

    fn valid_values(&self, sample: &DataSample<'a, T>) -> Vec<T> {
        Zip::from(&sample.sample)
            .and(&self.valid)
            .fold(vec![], |mut v, &x, &valid| {
                if valid {
                    v.push(x);
                }
                v
            })
    }

    /// Valid time stamps
    pub fn valid_t(&self) -> Array1<T> {
        self.valid_values(&self.t).into()
    }

    /// Valid flux values
    pub fn valid_flux(&self) -> Array1<T> {
        self.valid_values(&self.flux).into()
    }

    /// Valid flux uncertainties
    pub fn valid_flux_err(&self) -> Array1<T> {
        self.valid_values(&self.flux_err).into()
    }

    time_series_getter!(flux_mean, get_flux_mean, |ts: &mut TimeSeries<T>| {
        let flux = ts.valid_flux();
        flux.mean().unwrap_or_else(T::nan)
    });

    time_series_getter!(flux_median, get_flux_median, |ts: &mut TimeSeries<T>| {
        ts.valid_flux_median()
    });

    time_series_getter!(flux_std, get_flux_std, |ts: &mut TimeSeries<T>| {
        let flux = ts.valid_flux();
        if flux.len() < 2 {
            T::nan()
        } else {
            flux.std(T::one())
        }
    });

    time_series_getter!(
        flux_weighted_mean,
        get_flux_weighted_mean,
        |ts: &mut TimeSeries<T>| {
            let (sum, weight_sum) = Zip::from(&ts.flux.sample)
                .and(&ts.flux_err.sample)
                .and(&ts.valid)
                .fold((T::zero(), T::zero()), |(sum, weight_sum), &f, &e, &v| {
                    if v {
                        let w = e.powi(-2);
                        (sum + f * w, weight_sum + w)
                    } else {
                        (sum, weight_sum)
                    }
                });
            sum / weight_sum
        }
    );

    fn valid_flux_median(&self) -> T {
        let sorted: SortedArray<T> = self.valid_flux().to_vec().into();
        if sorted.is_empty() {
            T::nan()
        } else {
            sorted.median()
        }
    }

    /// New series with the samples where `keep` is true
    fn select(&self, keep: impl Fn(usize) -> bool) -> TimeSeries<'static, T> {
        let indices: Vec<_> = (0..self.lenu()).filter(|&i| keep(i)).collect();
        let pick = |a: &ArrayView1<T>| -> Array1<T> { indices.iter().map(|&i| a[i]).collect() };
        TimeSeries::from_parts(
            pick(&self.t.sample.view()).into(),
            pick(&self.flux.sample.view()).into(),
            pick(&self.flux_err.sample.view()).into(),
            indices.iter().map(|&i| self.quality[i]).collect(),
            indices.iter().map(|&i| self.valid[i]).collect(),
            self.meta.clone(),
        )
    }

    /// Samples inside the closed time window `[t_min, t_max]`
    pub fn crop(&self, t_min: T, t_max: T) -> Result<TimeSeries<'static, T>, TimeSeriesError> {
        let cropped = self.select(|i| {
            let t = self.t.sample[i];
            t >= t_min && t <= t_max
        });
        if cropped.valid_count() == 0 {
            return Err(TimeSeriesError::EmptyWindow {
                t_min: t_min.to_f64().unwrap_or(f64::NAN),
                t_max: t_max.to_f64().unwrap_or(f64::NAN),
            });
        }
        Ok(cropped.with_meta(self.meta.labeled("cropped")))
    }

    /// Drop invalid samples
    pub fn remove_invalid(&self) -> Result<TimeSeries<'static, T>, TimeSeriesError> {
        if self.valid_count() == 0 {
            return Err(TimeSeriesError::NoValidSamples);
        }
        Ok(self.select(|i| self.valid[i]))
    }

    /// Mark samples with flags rejected by `bitmask` as invalid
    pub fn apply_quality_bitmask(
        &self,
        bitmask: QualityBitmask,
    ) -> Result<TimeSeries<'static, T>, TimeSeriesError> {
        let exclude = self.quality.mapv(|q| bitmask.rejects(q));
        self.mask_samples(exclude.view())
    }

    /// Mark samples where `exclude` is true as invalid
    pub fn mask_samples(
        &self,
        exclude: ArrayView1<bool>,
    ) -> Result<TimeSeries<'static, T>, TimeSeriesError> {
        check_length("exclusion mask", self.lenu(), exclude.len())?;
        let mut masked = self.select(|_| true);
        Zip::from(&mut masked.valid)
            .and(&exclude)
            .for_each(|v, &e| *v &= !e);
        if masked.valid_count() == 0 {
            return Err(TimeSeriesError::NoValidSamples);
        }
        Ok(masked)
    }

    /// Divide flux and its uncertainty by the median of valid flux values
    pub fn normalize(&self) -> Result<TimeSeries<'static, T>, TimeSeriesError> {
        let median = self.flux_median.unwrap_or_else(|| self.valid_flux_median());
        if median.is_nan() || median <= T::zero() {
            return Err(TimeSeriesError::NonPositiveMedian(
                median.to_f64().unwrap_or(f64::NAN),
            ));
        }
        let mut normalized = self.select(|_| true);
        normalized.flux = self.flux.sample.mapv(|f| f / median).into();
        normalized.flux_err = self.flux_err.sample.mapv(|e| e / median).into();
        Ok(normalized.with_meta(self.meta.labeled("normalized")))
    }

    /// The same series with a replaced flux
    ///
    /// Samples which were invalid stay invalid, samples which get a non-finite flux become
    /// invalid
    pub fn with_flux(
        &self,
        flux: impl Into<Array1<T>>,
    ) -> Result<TimeSeries<'static, T>, TimeSeriesError> {
        let flux = flux.into();
        check_length("flux", self.lenu(), flux.len())?;
        let mut series = self.select(|_| true);
        Zip::from(&mut series.valid)
            .and(&flux)
            .for_each(|v, &f| *v &= f.is_finite());
        series.flux = flux.into();
        Ok(series)
    }
}

fn check_length(
    name: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), TimeSeriesError> {
    if expected == actual {
        Ok(())
    } else {
        Err(TimeSeriesError::LengthMismatch {
            name,
            expected,
            actual,
        })
    }
}
