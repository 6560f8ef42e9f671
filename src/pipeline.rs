//! Complete detrending flow from a pixel cube to the corrected light curve

use crate::basis::{BasisBuilder, PcaConfig, SplineConfig};
use crate::data::{Centroids, PixelCube, QualityBitmask, TimeSeries};
use crate::design_matrix::CompositeDesignMatrix;
use crate::error::DetrendError;
use crate::periodogram::{BlsResult, BoxLeastSquares};
use crate::regression::{LinearRegressor, RegressionResult, RegressorConfig};
use crate::transit::{TransitModel, TransitStatistics};

use ndarray::{Array1, Array2, ArrayView2};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How the transit enters the regression
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum TransitHandling {
    /// Fit a transit template block jointly with the systematics and keep it in the corrected
    /// flux
    #[default]
    Model,
    /// Exclude in-transit samples from the fit, systematics are still modelled for them
    Mask,
}

/// Every parameter of [DetrendPipeline]
///
/// A block of the model is built only if its configuration is set and its input is available:
/// background PCA needs background pixels, motion needs centroids.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct DetrendConfig {
    pub quality_bitmask: QualityBitmask,
    /// Threshold of [PixelCube::threshold_aperture], robust standard deviations
    pub aperture_threshold: f64,
    /// Divide flux by its median before the fit
    pub normalize: bool,
    pub periodogram: BoxLeastSquares<f64>,
    pub pca: Option<PcaConfig>,
    pub spline: Option<SplineConfig>,
    /// Prior standard deviation of the motion coefficients, no motion block if not set
    pub motion_prior_sigma: Option<f64>,
    /// Gaps longer than this, days, split motion and external blocks into segments
    pub gap_threshold: Option<f64>,
    pub transit_handling: TransitHandling,
    /// Phase offsets of transit template columns, see [BasisBuilder::transit_template]
    pub transit_phase_offsets: Vec<f64>,
    pub regressor: RegressorConfig,
}

impl DetrendConfig {
    #[inline]
    pub fn default_aperture_threshold() -> f64 {
        3.0
    }

    #[inline]
    pub fn default_gap_threshold() -> f64 {
        0.5
    }
}

impl Default for DetrendConfig {
    fn default() -> Self {
        Self {
            quality_bitmask: QualityBitmask::default_bitmask(),
            aperture_threshold: Self::default_aperture_threshold(),
            normalize: true,
            periodogram: BoxLeastSquares::default(),
            pca: Some(PcaConfig::default()),
            spline: Some(SplineConfig::default()),
            motion_prior_sigma: Some(1.0),
            gap_threshold: Some(Self::default_gap_threshold()),
            transit_handling: TransitHandling::default(),
            transit_phase_offsets: vec![0.0],
            regressor: RegressorConfig::default(),
        }
    }
}

/// Optional per-cadence regressors of a light curve
///
/// Arrays have a row either per sample of the series or per valid sample, see [BasisBuilder]
#[derive(Clone, Debug, Default)]
pub struct AuxiliaryData<'a> {
    /// (time × pixel) background pixel fluxes
    pub background: Option<ArrayView2<'a, f64>>,
    pub centroids: Option<&'a Centroids>,
    /// Named (time × vector) external regressors, e.g. cotrending basis vectors
    pub external: Vec<(String, ArrayView2<'a, f64>)>,
}

/// Regression of a single light curve
#[derive(Clone, Debug)]
pub struct Detrended {
    pub regression: RegressionResult,
    /// Valid samples with the systematics removed, median flux level is preserved
    pub corrected: TimeSeries<'static, f64>,
}

/// Output of [DetrendPipeline::run]
#[derive(Clone, Debug)]
pub struct DetrendOutput {
    /// Aperture photometry before quality masking
    pub raw: TimeSeries<'static, f64>,
    pub aperture: Array2<bool>,
    /// Quality-masked and optionally normalized series, the input of the periodogram and the fit
    pub series: TimeSeries<'static, f64>,
    /// Not computed if the transit was given
    pub periodogram: Option<BlsResult<f64>>,
    pub transit: TransitModel<f64>,
    pub regression: RegressionResult,
    pub corrected: TimeSeries<'static, f64>,
    /// Phase of every corrected sample, days
    pub phase: Array1<f64>,
    /// Transit depth measured on the corrected series
    pub statistics: Option<TransitStatistics<f64>>,
}

/// Detrending driven by a [DetrendConfig]
///
/// The flow is: threshold aperture, aperture photometry, quality mask, normalization, box
/// periodogram, basis construction, joint regression, corrected series and phase folding.
#[derive(Clone, Debug, Default)]
pub struct DetrendPipeline {
    config: DetrendConfig,
}

impl DetrendPipeline {
    pub fn new(config: DetrendConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetrendConfig {
        &self.config
    }

    /// Run everything including the transit search
    pub fn run(&self, cube: &PixelCube) -> Result<DetrendOutput, DetrendError> {
        self.run_impl(cube, None)
    }

    /// Run with a known transit, the periodogram is skipped
    pub fn run_with_transit(
        &self,
        cube: &PixelCube,
        transit: TransitModel<f64>,
    ) -> Result<DetrendOutput, DetrendError> {
        self.run_impl(cube, Some(transit))
    }

    fn run_impl(
        &self,
        cube: &PixelCube,
        transit: Option<TransitModel<f64>>,
    ) -> Result<DetrendOutput, DetrendError> {
        let aperture = cube.threshold_aperture(self.config.aperture_threshold);
        let raw = cube.to_time_series(aperture.view())?;
        log::debug!(
            "aperture of {} pixels, {} of {} cadences are valid",
            aperture.iter().filter(|&&a| a).count(),
            raw.valid_count(),
            raw.lenu()
        );
        let series = self.prepare(&raw)?;

        let (periodogram, transit) = match transit {
            Some(transit) => (None, transit),
            None => {
                let periodogram = self.config.periodogram.power(&series)?;
                let best = periodogram.best()?;
                log::debug!(
                    "best period {} with power {}, duration {}, depth {}",
                    best.period,
                    best.power,
                    best.duration,
                    best.depth
                );
                let transit = best.transit_model()?;
                (Some(periodogram), transit)
            }
        };

        let background = match self.config.pca {
            Some(_) => Some(cube.background_pixels(aperture.view())?),
            None => None,
        };
        let centroids = match self.config.motion_prior_sigma {
            Some(_) => Some(cube.centroids(aperture.view())?),
            None => None,
        };
        let aux = AuxiliaryData {
            background: background.as_ref().map(|b| b.view()),
            centroids: centroids.as_ref(),
            external: vec![],
        };
        let Detrended {
            regression,
            corrected,
        } = self.detrend(&series, &transit, &aux)?;

        let phase = transit.fold(corrected.t.sample.view());
        let statistics = transit.statistics(&corrected);
        Ok(DetrendOutput {
            raw,
            aperture,
            series,
            periodogram,
            transit,
            regression,
            corrected,
            phase,
            statistics,
        })
    }

    /// Quality mask and normalization
    pub fn prepare(
        &self,
        raw: &TimeSeries<f64>,
    ) -> Result<TimeSeries<'static, f64>, DetrendError> {
        let masked = raw.apply_quality_bitmask(self.config.quality_bitmask)?;
        if self.config.normalize {
            Ok(masked.normalize()?)
        } else {
            Ok(masked)
        }
    }

    /// Build the design matrix for a light curve and fit it
    pub fn detrend(
        &self,
        ts: &TimeSeries<f64>,
        transit: &TransitModel<f64>,
        aux: &AuxiliaryData,
    ) -> Result<Detrended, DetrendError> {
        let builder = BasisBuilder::new(ts)?;
        let breakpoints = self
            .config
            .gap_threshold
            .map(|gap| builder.gap_breakpoints(gap))
            .unwrap_or_default();

        let mut blocks = vec![];
        match &self.config.spline {
            Some(spline) => blocks.push(builder.spline(spline)?),
            // spline functions sum to unity, otherwise an intercept is needed
            None => blocks.push(builder.constant()?),
        }
        if let (Some(pca), Some(background)) = (&self.config.pca, aux.background) {
            blocks.push(builder.background_pca(background, pca)?);
        }
        if let (Some(sigma), Some(centroids)) = (self.config.motion_prior_sigma, aux.centroids) {
            blocks.push(builder.motion(
                centroids.column.view(),
                centroids.row.view(),
                sigma,
                &breakpoints,
            )?);
        }
        for (name, columns) in aux.external.iter() {
            blocks.push(builder.external(name.clone(), *columns)?.split(&breakpoints)?);
        }

        let (exclude, keep) = match self.config.transit_handling {
            TransitHandling::Model => {
                blocks.push(
                    builder.transit_template(transit, &self.config.transit_phase_offsets)?,
                );
                (None, vec!["transit"])
            }
            TransitHandling::Mask => (Some(transit.mask(ts.t.sample.view())), vec![]),
        };

        let design_matrix = CompositeDesignMatrix::new(blocks)?;
        log::debug!(
            "design matrix of {} rows and {} columns: {:?}",
            design_matrix.nrows(),
            design_matrix.ncols(),
            design_matrix
                .column_ranges()
                .map(|(name, _)| name)
                .collect::<Vec<_>>()
        );
        let regression = LinearRegressor::new(self.config.regressor).fit(
            ts,
            &design_matrix,
            exclude.as_ref().map(|e| e.view()),
        )?;
        let corrected = regression.corrected_preserving_median(&keep)?;
        Ok(Detrended {
            regression,
            corrected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::basis::KnotPlacement;
    use crate::periodogram::PeriodGrid;

    use approx::assert_abs_diff_eq;
    use light_curve_detrend_test_util::{BoxTransit, SyntheticCube, SyntheticLightCurve};

    const TRANSIT: BoxTransit = BoxTransit {
        period: 4.0,
        epoch: 1.0,
        duration: 1.0 / 12.0,
        depth: 0.01,
    };

    fn out_of_transit_std(ts: &TimeSeries<f64>, transit: &TransitModel<f64>) -> f64 {
        let mask = transit.mask(ts.t.sample.view());
        let flux: Array1<f64> = ts
            .flux
            .sample
            .iter()
            .zip(mask.iter())
            .zip(ts.valid().iter())
            .filter_map(|((&f, &in_transit), &valid)| (valid && !in_transit).then_some(f))
            .collect();
        flux.std(1.0)
    }

    #[test]
    fn removes_smooth_trend_and_keeps_transit() {
        let (t, flux, flux_err) = SyntheticLightCurve {
            cadence: 10.0 / 1440.0,
            trend_amplitude: 0.005,
            trend_period: 13.0,
            noise: 1e-4,
            transit: Some(TRANSIT),
            ..Default::default()
        }
        .generate();
        let ts = TimeSeries::new(t, flux, flux_err).unwrap();
        let transit = TransitModel::new(TRANSIT.period, TRANSIT.epoch, TRANSIT.duration).unwrap();

        let pipeline = DetrendPipeline::new(DetrendConfig {
            spline: Some(SplineConfig::new(10, 3, KnotPlacement::Uniform)),
            ..Default::default()
        });
        let Detrended {
            regression,
            corrected,
        } = pipeline
            .detrend(&ts, &transit, &AuxiliaryData::default())
            .unwrap();

        let depth = -regression.block_coefficients("transit").unwrap()[0];
        assert_abs_diff_eq!(depth, TRANSIT.depth, epsilon = 0.1 * TRANSIT.depth);
        assert!(out_of_transit_std(&corrected, &transit) < out_of_transit_std(&ts, &transit));

        let statistics = transit.statistics(&corrected).unwrap();
        assert_abs_diff_eq!(statistics.depth, TRANSIT.depth, epsilon = 0.1 * TRANSIT.depth);
        assert_abs_diff_eq!(statistics.flux_out, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn dense_spline_over_sector_gap() {
        let (t, mut flux, flux_err) = SyntheticLightCurve {
            cadence: 10.0 / 1440.0,
            trend_amplitude: 0.005,
            trend_period: 13.0,
            noise: 1e-4,
            transit: Some(TRANSIT),
            ..Default::default()
        }
        .generate();
        for (f, &t) in flux.iter_mut().zip(t.iter()) {
            if t > 13.0 && t < 14.5 {
                *f = f64::NAN;
            }
        }
        let ts = TimeSeries::new(t, flux, flux_err).unwrap();
        let transit = TransitModel::new(TRANSIT.period, TRANSIT.epoch, TRANSIT.duration).unwrap();

        let pipeline = DetrendPipeline::new(DetrendConfig {
            spline: Some(SplineConfig::new(120, 3, KnotPlacement::Uniform)),
            ..Default::default()
        });
        let Detrended {
            regression,
            corrected,
        } = pipeline
            .detrend(&ts, &transit, &AuxiliaryData::default())
            .unwrap();

        assert!(!regression.used_pseudo_inverse());
        let n_spline = regression.block_coefficients("spline").unwrap().len();
        assert!(n_spline < 124);
        assert_eq!(regression.rank(), n_spline + 1);
        let depth = -regression.block_coefficients("transit").unwrap()[0];
        assert_abs_diff_eq!(depth, TRANSIT.depth, epsilon = 0.1 * TRANSIT.depth);
        assert!(out_of_transit_std(&corrected, &transit) < out_of_transit_std(&ts, &transit));
    }

    #[test]
    fn masked_transit_is_not_fitted() {
        let (t, flux, flux_err) = SyntheticLightCurve {
            cadence: 10.0 / 1440.0,
            trend_amplitude: 0.005,
            trend_period: 13.0,
            noise: 1e-4,
            transit: Some(TRANSIT),
            ..Default::default()
        }
        .generate();
        let ts = TimeSeries::new(t, flux, flux_err).unwrap();
        let transit = TransitModel::new(TRANSIT.period, TRANSIT.epoch, TRANSIT.duration).unwrap();
        let pipeline = DetrendPipeline::new(DetrendConfig {
            transit_handling: TransitHandling::Mask,
            ..Default::default()
        });
        let detrended = pipeline
            .detrend(&ts, &transit, &AuxiliaryData::default())
            .unwrap();
        let in_transit = transit.mask(ts.t.sample.view());
        assert_eq!(
            detrended.regression.fit_mask().iter().filter(|&&m| !m).count(),
            in_transit.iter().filter(|&&m| m).count()
        );
        let statistics = transit.statistics(&detrended.corrected).unwrap();
        assert_abs_diff_eq!(statistics.depth, TRANSIT.depth, epsilon = 0.1 * TRANSIT.depth);
    }

    #[test]
    fn pixel_cube_end_to_end() {
        let (time, flux, flux_err) = SyntheticCube {
            transit: Some(BoxTransit {
                duration: 0.2,
                ..TRANSIT
            }),
            ..Default::default()
        }
        .generate();
        let cube = PixelCube::new(time, flux, Some(flux_err), None).unwrap();
        let periodogram = BoxLeastSquares::new(&[0.1, 0.2, 0.3])
            .unwrap()
            .with_period_grid(PeriodGrid::linear(3.5, 0.005, 201).unwrap())
            .unwrap();
        let pipeline = DetrendPipeline::new(DetrendConfig {
            periodogram,
            ..Default::default()
        });
        let output = pipeline.run(&cube).unwrap();

        assert!(output.periodogram.is_some());
        assert_abs_diff_eq!(output.transit.period(), TRANSIT.period, epsilon = 0.0051);
        assert!(output.transit.phase(TRANSIT.epoch).abs() < 0.05);
        assert!(output.aperture[[5, 5]]);
        assert!(!output.aperture[[0, 0]]);
        assert_eq!(output.phase.len(), output.corrected.lenu());
        assert!(
            out_of_transit_std(&output.corrected, &output.transit)
                < out_of_transit_std(&output.series, &output.transit)
        );
        let statistics = output.statistics.unwrap();
        assert_abs_diff_eq!(statistics.depth, TRANSIT.depth, epsilon = 0.2 * TRANSIT.depth);
    }

    #[test]
    fn known_transit_skips_periodogram() {
        let (time, flux, flux_err) = SyntheticCube::default().generate();
        let cube = PixelCube::new(time, flux, Some(flux_err), None).unwrap();
        let transit = TransitModel::new(4.0, 1.0, 0.2).unwrap();
        let output = DetrendPipeline::default()
            .run_with_transit(&cube, transit)
            .unwrap();
        assert!(output.periodogram.is_none());
        assert_eq!(output.transit, transit);
        assert!(output.regression.contribution("background").is_ok());
        assert!(output.regression.contribution("motion").is_ok());
    }

    #[test]
    fn config_round_trip() {
        let config = DetrendConfig {
            pca: None,
            transit_handling: TransitHandling::Mask,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let restored: DetrendConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }
}
