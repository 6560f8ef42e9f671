use crate::data::TimeSeries;
use crate::error::RegressionError;
use crate::sorted_array::SortedArray;

use itertools::Itertools;
use ndarray::{Array1, ArrayView1};
use std::ops::Range;

/// Modelled flux of one design matrix block, $X_\mathrm{block} \beta_\mathrm{block}$
#[derive(Clone, Debug, PartialEq)]
pub struct BlockContribution {
    pub name: String,
    /// Columns of the block in the composite design matrix
    pub columns: Range<usize>,
    pub values: Array1<f64>,
}

/// Output of [crate::LinearRegressor::fit]
///
/// All per-sample arrays are aligned with the valid samples of the fitted time series. The
/// result owns everything it needs, so it outlives the regressor and the design matrix.
#[derive(Clone, Debug)]
pub struct RegressionResult {
    pub(super) series: TimeSeries<'static, f64>,
    pub(super) column_names: Vec<String>,
    pub(super) coefficients: Array1<f64>,
    pub(super) coefficient_errors: Array1<f64>,
    pub(super) contributions: Vec<BlockContribution>,
    pub(super) model: Array1<f64>,
    pub(super) fit_mask: Array1<bool>,
    pub(super) iterations: usize,
    pub(super) rank: usize,
    pub(super) dropped_columns: Vec<String>,
    pub(super) pseudo_inverse: bool,
}

impl RegressionResult {
    /// Valid samples of the fitted series
    pub fn series(&self) -> &TimeSeries<'static, f64> {
        &self.series
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Fitted coefficients, zero for dropped columns
    pub fn coefficients(&self) -> ArrayView1<'_, f64> {
        self.coefficients.view()
    }

    /// Posterior standard deviations of the coefficients, NaN for dropped columns
    pub fn coefficient_errors(&self) -> ArrayView1<'_, f64> {
        self.coefficient_errors.view()
    }

    /// Coefficients of a single block
    pub fn block_coefficients(&self, name: &str) -> Result<ArrayView1<'_, f64>, RegressionError> {
        let columns = self.find(name)?.columns.clone();
        Ok(self.coefficients.slice(ndarray::s![columns]))
    }

    pub fn contributions(&self) -> &[BlockContribution] {
        &self.contributions
    }

    pub fn contribution(&self, name: &str) -> Result<ArrayView1<'_, f64>, RegressionError> {
        Ok(self.find(name)?.values.view())
    }

    fn find(&self, name: &str) -> Result<&BlockContribution, RegressionError> {
        self.contributions
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| RegressionError::UnknownBlock(name.to_owned()))
    }

    /// Sum of all block contributions
    pub fn model(&self) -> ArrayView1<'_, f64> {
        self.model.view()
    }

    pub fn residuals(&self) -> Array1<f64> {
        &self.series.flux.sample - &self.model
    }

    /// Samples used by the last fit iteration: not excluded by the caller and not clipped
    pub fn fit_mask(&self) -> ArrayView1<'_, bool> {
        self.fit_mask.view()
    }

    /// Number of fits, more than one if outliers were clipped
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Numerical rank of the normal matrix of the non-dropped columns
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Columns without any non-zero value in the fitted rows
    pub fn dropped_columns(&self) -> &[String] {
        &self.dropped_columns
    }

    /// Whether the rank-deficient system was solved with a pseudo-inverse
    pub fn used_pseudo_inverse(&self) -> bool {
        self.pseudo_inverse
    }

    fn removed_model(&self, keep: &[&str]) -> Result<Array1<f64>, RegressionError> {
        let mut removed = self.model.clone();
        // a block is kept once however many times it is named
        for &name in keep.iter().unique() {
            removed -= &self.find(name)?.values;
        }
        Ok(removed)
    }

    /// Observed flux minus every modelled contribution except the blocks in `keep`
    ///
    /// For example, keeping `"transit"` gives the systematics-corrected light curve with the
    /// transit signal left in it.
    pub fn corrected(&self, keep: &[&str]) -> Result<TimeSeries<'static, f64>, RegressionError> {
        let removed = self.removed_model(keep)?;
        self.with_flux(&self.series.flux.sample - &removed)
    }

    /// The same as [RegressionResult::corrected], but the median of the removed model is added
    /// back, so the corrected flux stays on the original flux level
    pub fn corrected_preserving_median(
        &self,
        keep: &[&str],
    ) -> Result<TimeSeries<'static, f64>, RegressionError> {
        let removed = self.removed_model(keep)?;
        let median = SortedArray::from_finite(removed.iter());
        let level = if median.is_empty() {
            0.0
        } else {
            median.median()
        };
        self.with_flux(&self.series.flux.sample - &removed + level)
    }

    fn with_flux(&self, flux: Array1<f64>) -> Result<TimeSeries<'static, f64>, RegressionError> {
        let series = self
            .series
            .with_flux(flux)
            .map_err(|_| RegressionError::NonFinite("corrected flux"))?;
        Ok(series.with_meta(self.series.meta.labeled("corrected")))
    }
}
