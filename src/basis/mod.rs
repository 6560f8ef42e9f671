//! Construction of regressor blocks aligned with the valid samples of a time series

use crate::data::TimeSeries;
use crate::design_matrix::DesignMatrixBlock;
use crate::error::DesignMatrixError;
use crate::float_trait::Float;
use crate::transit::TransitModel;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

mod pca;
pub use pca::PcaConfig;

mod spline;
pub use spline::{KnotPlacement, SplineConfig};

/// Factory of [DesignMatrixBlock]s for one time series
///
/// The builder remembers which samples of the series are valid, every block it produces has one
/// row per valid sample. Per-cadence inputs (background pixels, centroids, external vectors) may
/// be given either for all samples of the series, then invalid rows are dropped, or for the
/// valid samples only.
#[derive(Clone, Debug)]
pub struct BasisBuilder {
    n_samples: usize,
    valid_indices: Vec<usize>,
    t: Array1<f64>,
}

impl BasisBuilder {
    pub fn new<T: Float>(ts: &TimeSeries<T>) -> Result<Self, DesignMatrixError> {
        let valid_indices = ts.valid_indices();
        if valid_indices.is_empty() {
            return Err(DesignMatrixError::NoValidSamples);
        }
        let t = ts
            .valid_t()
            .mapv(|t| t.to_f64().unwrap_or(f64::NAN));
        Ok(Self {
            n_samples: ts.lenu(),
            valid_indices,
            t,
        })
    }

    /// Number of rows of every produced block
    pub fn nrows(&self) -> usize {
        self.valid_indices.len()
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn valid_indices(&self) -> &[usize] {
        &self.valid_indices
    }

    /// Time of the valid samples
    pub fn t(&self) -> ArrayView1<'_, f64> {
        self.t.view()
    }

    fn select_rows(
        &self,
        name: &'static str,
        values: ArrayView2<f64>,
    ) -> Result<Array2<f64>, DesignMatrixError> {
        match values.nrows() {
            n if n == self.nrows() => Ok(values.to_owned()),
            n if n == self.n_samples => Ok(values.select(Axis(0), &self.valid_indices)),
            actual => Err(DesignMatrixError::InputLength {
                name,
                expected: self.n_samples,
                actual,
            }),
        }
    }

    fn select_column(
        &self,
        name: &'static str,
        values: ArrayView1<f64>,
    ) -> Result<Array1<f64>, DesignMatrixError> {
        let column = values.insert_axis(Axis(1));
        Ok(self.select_rows(name, column)?.remove_axis(Axis(1)))
    }

    /// Leading principal components of the background pixels, block `"background"`
    ///
    /// `pixels` is a (time × pixel) matrix, non-finite values are replaced by zero
    pub fn background_pca(
        &self,
        pixels: ArrayView2<f64>,
        config: &PcaConfig,
    ) -> Result<DesignMatrixBlock, DesignMatrixError> {
        let pixels = self.select_rows("background pixels", pixels)?;
        let components = pca::principal_components(pixels.view(), config.n_components)?;
        DesignMatrixBlock::new("background", components)
    }

    /// Caller-supplied (time × vector) columns, e.g. cotrending basis vectors
    ///
    /// Priors set on the returned block with [DesignMatrixBlock::with_priors] are kept by
    /// [DesignMatrixBlock::split], so priors go first when both are needed.
    pub fn external(
        &self,
        name: impl Into<String>,
        columns: ArrayView2<f64>,
    ) -> Result<DesignMatrixBlock, DesignMatrixError> {
        let columns = self.select_rows("external vectors", columns)?;
        DesignMatrixBlock::new(name, columns)
    }

    /// B-spline basis over time, block `"spline"`
    ///
    /// Functions without enough samples in their support, typically the ones inside data gaps,
    /// are left out, see [spline::supported_functions]. Columns are named `spline_<j>` after the
    /// index `j` of the basis function.
    pub fn spline(&self, config: &SplineConfig) -> Result<DesignMatrixBlock, DesignMatrixError> {
        let t = self.t.to_vec();
        let basis = config.basis(&t)?;
        let supported = spline::supported_functions(basis.view(), &t);
        if supported.len() < basis.ncols() {
            log::warn!(
                "{} of {} spline functions have no data in their support and are left out",
                basis.ncols() - supported.len(),
                basis.ncols()
            );
        }
        let names = supported.iter().map(|j| format!("spline_{j}")).collect();
        DesignMatrixBlock::new("spline", basis.select(Axis(1), &supported))?
            .with_column_names(names)
    }

    /// In-transit indicator columns, block `"transit"`
    ///
    /// One column per phase offset: zero gives the primary transit, 0.5 the secondary eclipse.
    /// The fitted coefficient of a column is minus the transit depth.
    pub fn transit_template(
        &self,
        model: &TransitModel<f64>,
        phase_offsets: &[f64],
    ) -> Result<DesignMatrixBlock, DesignMatrixError> {
        let columns: Vec<Array1<f64>> = phase_offsets
            .iter()
            .map(|&offset| {
                model
                    .with_phase_offset(offset)
                    .mask(self.t.view())
                    .mapv(|in_transit| if in_transit { 1.0 } else { 0.0 })
            })
            .collect();
        let views: Vec<_> = columns.iter().map(|c| c.view()).collect();
        let block = DesignMatrixBlock::from_columns("transit", &views)?;
        let names = phase_offsets
            .iter()
            .map(|offset| format!("transit_{offset}"))
            .collect();
        block.with_column_names(names)
    }

    /// Centroid motion: column and row offsets and their product, block `"motion"`
    ///
    /// Offsets are measured from the mean position. Every column gets a zero-mean prior with
    /// `prior_sigma` (infinity for a flat prior), `breakpoints` split the block into segments,
    /// see [DesignMatrixBlock::split].
    pub fn motion(
        &self,
        column: ArrayView1<f64>,
        row: ArrayView1<f64>,
        prior_sigma: f64,
        breakpoints: &[usize],
    ) -> Result<DesignMatrixBlock, DesignMatrixError> {
        let center = |x: Array1<f64>| {
            let finite = x.iter().filter(|x| x.is_finite()).count().max(1);
            let mean = x.iter().filter(|x| x.is_finite()).sum::<f64>() / finite as f64;
            x - mean
        };
        let column = center(self.select_column("column centroids", column)?);
        let row = center(self.select_column("row centroids", row)?);
        let product = &column * &row;
        DesignMatrixBlock::from_columns("motion", &[column.view(), row.view(), product.view()])?
            .with_column_names(vec![
                "motion_column".into(),
                "motion_row".into(),
                "motion_column_row".into(),
            ])?
            .with_uniform_prior(0.0, prior_sigma)?
            .split(breakpoints)
    }

    /// Intercept, block `"constant"`
    pub fn constant(&self) -> Result<DesignMatrixBlock, DesignMatrixError> {
        DesignMatrixBlock::new("constant", Array2::ones((self.nrows(), 1)))
    }

    /// Row indices starting a new segment after a gap longer than `min_gap`
    ///
    /// The output is suitable as `breakpoints` of [DesignMatrixBlock::split], e.g. to fit
    /// orbits of a spacecraft independently.
    pub fn gap_breakpoints(&self, min_gap: f64) -> Vec<usize> {
        self.t
            .windows(2)
            .into_iter()
            .enumerate()
            .filter_map(|(i, w)| (w[1] - w[0] > min_gap).then_some(i + 1))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    use ndarray::array;

    fn series() -> TimeSeries<'static, f64> {
        let t = array![0.0, 1.0, 2.0, 3.0, 10.0, 11.0, 12.0];
        let flux = array![1.0, f64::NAN, 1.0, 1.0, 1.0, 1.0, 1.0];
        TimeSeries::new_without_errors(t, flux).unwrap()
    }

    #[test]
    fn rows_follow_valid_samples() {
        let builder = BasisBuilder::new(&series()).unwrap();
        assert_eq!(builder.nrows(), 6);
        assert_eq!(builder.valid_indices(), [0, 2, 3, 4, 5, 6]);

        let full = Array2::from_shape_fn((7, 2), |(i, j)| (10 * i + j) as f64);
        let block = builder.external("cbv", full.view()).unwrap();
        assert_eq!(block.values().column(0), array![0.0, 20.0, 30.0, 40.0, 50.0, 60.0]);

        let valid_only = Array2::<f64>::zeros((6, 2));
        assert_eq!(builder.external("cbv", valid_only.view()).unwrap().nrows(), 6);

        let wrong = Array2::<f64>::zeros((5, 2));
        assert_eq!(
            builder.external("cbv", wrong.view()),
            Err(DesignMatrixError::InputLength {
                name: "external vectors",
                expected: 7,
                actual: 5
            })
        );
    }

    #[test]
    fn gap_breakpoints() {
        let builder = BasisBuilder::new(&series()).unwrap();
        assert_eq!(builder.gap_breakpoints(0.5), [1, 2, 3, 4, 5]);
        assert_eq!(builder.gap_breakpoints(1.5), [1, 3]);
        assert!(builder.gap_breakpoints(10.0).is_empty());
    }

    #[test]
    fn transit_template() {
        let t = Array1::<f64>::linspace(0.0, 10.0, 101);
        let ts = TimeSeries::new_without_errors(t, Array1::ones(101)).unwrap();
        let builder = BasisBuilder::new(&ts).unwrap();
        let model = TransitModel::new(4.0, 1.0, 0.5).unwrap();
        let block = builder.transit_template(&model, &[0.0, 0.5]).unwrap();
        assert_eq!(block.ncols(), 2);
        assert_eq!(block.column_names(), ["transit_0", "transit_0.5"]);
        let primary = block.values().column(0).to_owned();
        let secondary = block.values().column(1).to_owned();
        assert_eq!(primary[10], 1.0);
        assert_eq!(primary[30], 0.0);
        assert_eq!(secondary[30], 1.0);
        assert_eq!((&primary * &secondary).sum(), 0.0);
    }

    #[test]
    fn motion_block() {
        let builder = BasisBuilder::new(&series()).unwrap();
        let column = array![1.0, 100.0, 2.0, 3.0, 1.0, 2.0, 3.0];
        let row = array![0.0, 100.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        let block = builder
            .motion(column.view(), row.view(), 0.5, &[3])
            .unwrap();
        assert_eq!(block.ncols(), 6);
        assert_eq!(block.column_names()[0], "motion_column_s0");
        assert!(block.prior_sigma().iter().all(|&s| s == 0.5));
        // invalid row is dropped before centring
        let column_offsets = block.values().column(0).to_owned() + block.values().column(3);
        assert_eq!(column_offsets, array![-1.0, 0.0, 1.0, -1.0, 0.0, 1.0]);
    }

    #[test]
    fn constant_and_spline_rows() {
        let builder = BasisBuilder::new(&series()).unwrap();
        assert_eq!(builder.constant().unwrap().values(), Array2::<f64>::ones((6, 1)));
        let spline = builder.spline(&SplineConfig::new(2, 3, KnotPlacement::Uniform)).unwrap();
        assert_eq!(spline.name(), "spline");
        assert_eq!(spline.values().dim(), (6, 6));
    }

    #[test]
    fn no_valid_samples() {
        let ts = TimeSeries::new_without_errors(vec![0.0, 1.0], vec![f64::NAN; 2]).unwrap();
        assert!(matches!(
            BasisBuilder::new(&ts),
            Err(DesignMatrixError::NoValidSamples)
        ));
    }
}
