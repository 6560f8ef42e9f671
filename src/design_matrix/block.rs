use crate::error::DesignMatrixError;

use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, s};

/// Named group of regressor columns, one row per valid sample of a time series
///
/// Every column has a Gaussian prior on its coefficient, the default prior is flat: zero mean
/// and infinite standard deviation. Non-finite values are replaced by zero on construction.
#[derive(Clone, Debug, PartialEq)]
pub struct DesignMatrixBlock {
    name: String,
    values: Array2<f64>,
    column_names: Vec<String>,
    prior_mu: Array1<f64>,
    prior_sigma: Array1<f64>,
}

impl DesignMatrixBlock {
    /// Block from a (rows × columns) matrix, columns are named `<name>_<i>`
    pub fn new(name: impl Into<String>, values: Array2<f64>) -> Result<Self, DesignMatrixError> {
        let name = name.into();
        if values.ncols() == 0 {
            return Err(DesignMatrixError::EmptyBlock(name));
        }
        let values = values.mapv_into(|x| if x.is_finite() { x } else { 0.0 });
        let n = values.ncols();
        Ok(Self {
            column_names: (0..n).map(|i| format!("{name}_{i}")).collect(),
            name,
            values,
            prior_mu: Array1::zeros(n),
            prior_sigma: Array1::from_elem(n, f64::INFINITY),
        })
    }

    /// Block from equally long columns
    pub fn from_columns(
        name: impl Into<String>,
        columns: &[ArrayView1<f64>],
    ) -> Result<Self, DesignMatrixError> {
        let name = name.into();
        let Some(rows) = columns.first().map(|c| c.len()) else {
            return Err(DesignMatrixError::EmptyBlock(name));
        };
        if let Some(c) = columns.iter().find(|c| c.len() != rows) {
            return Err(DesignMatrixError::RowMismatch {
                block: name,
                expected: rows,
                actual: c.len(),
            });
        }
        let mut values = Array2::zeros((rows, columns.len()));
        for (mut dst, src) in values.columns_mut().into_iter().zip(columns) {
            dst.assign(src);
        }
        Self::new(name, values)
    }

    /// Set Gaussian priors, infinite `sigma` gives a flat prior for the column
    pub fn with_priors(
        mut self,
        mu: impl Into<Array1<f64>>,
        sigma: impl Into<Array1<f64>>,
    ) -> Result<Self, DesignMatrixError> {
        let mu = mu.into();
        let sigma = sigma.into();
        self.check_column_parameter("prior mu", mu.len())?;
        self.check_column_parameter("prior sigma", sigma.len())?;
        if let Some(column) = mu
            .iter()
            .zip(sigma.iter())
            .position(|(&m, &s)| !m.is_finite() || s.is_nan() || s <= 0.0)
        {
            return Err(DesignMatrixError::InvalidPrior {
                block: self.name,
                column,
            });
        }
        self.prior_mu = mu;
        self.prior_sigma = sigma;
        Ok(self)
    }

    /// The same prior for every column
    pub fn with_uniform_prior(self, mu: f64, sigma: f64) -> Result<Self, DesignMatrixError> {
        let n = self.ncols();
        self.with_priors(Array1::from_elem(n, mu), Array1::from_elem(n, sigma))
    }

    pub fn with_column_names(mut self, names: Vec<String>) -> Result<Self, DesignMatrixError> {
        self.check_column_parameter("column names", names.len())?;
        self.column_names = names;
        Ok(self)
    }

    fn check_column_parameter(
        &self,
        name: &'static str,
        actual: usize,
    ) -> Result<(), DesignMatrixError> {
        if actual == self.ncols() {
            Ok(())
        } else {
            Err(DesignMatrixError::ColumnParameterLength {
                block: self.name.clone(),
                name,
                expected: self.ncols(),
                actual,
            })
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn prior_mu(&self) -> ArrayView1<'_, f64> {
        self.prior_mu.view()
    }

    pub fn prior_sigma(&self) -> ArrayView1<'_, f64> {
        self.prior_sigma.view()
    }

    /// Partition rows into contiguous segments with independent coefficients
    ///
    /// `breakpoints` are row indices where a new segment starts, they must strictly increase
    /// within `1..nrows`. Every column is repeated once per segment and set to zero outside of
    /// it; names get a `_s<k>` suffix and priors are repeated. The segment columns sum up to the
    /// original column.
    pub fn split(&self, breakpoints: &[usize]) -> Result<Self, DesignMatrixError> {
        if breakpoints.is_empty() {
            return Ok(self.clone());
        }
        let rows = self.nrows();
        let mut previous = 0;
        for &breakpoint in breakpoints {
            if breakpoint <= previous || breakpoint >= rows {
                return Err(DesignMatrixError::InvalidBreakpoint {
                    block: self.name.clone(),
                    breakpoint,
                    rows,
                });
            }
            previous = breakpoint;
        }

        let n_segments = breakpoints.len() + 1;
        let ncols = self.ncols();
        let mut values = Array2::zeros((rows, ncols * n_segments));
        let bounds = std::iter::once(0)
            .chain(breakpoints.iter().copied())
            .chain(std::iter::once(rows));
        for (k, (start, end)) in bounds.tuple_windows().enumerate() {
            values
                .slice_mut(s![start..end, k * ncols..(k + 1) * ncols])
                .assign(&self.values.slice(s![start..end, ..]));
        }
        let column_names = (0..n_segments)
            .flat_map(|k| self.column_names.iter().map(move |c| format!("{c}_s{k}")))
            .collect();
        let repeat = |a: &Array1<f64>| -> Array1<f64> {
            (0..n_segments).flat_map(|_| a.iter().copied()).collect()
        };
        Ok(Self {
            name: self.name.clone(),
            values,
            column_names,
            prior_mu: repeat(&self.prior_mu),
            prior_sigma: repeat(&self.prior_sigma),
        })
    }

    /// Shift every non-constant column to zero mean and scale it to unit standard deviation
    ///
    /// Constant columns are kept as is. Priors are not transformed.
    pub fn standardize(&self) -> Self {
        let mut standardized = self.clone();
        for mut column in standardized.values.axis_iter_mut(Axis(1)) {
            let mean = column.mean().unwrap_or(0.0);
            let std = column.std(0.0);
            if std > 0.0 {
                column.mapv_inplace(|x| (x - mean) / std);
            }
        }
        standardized
    }

    /// Copy with renamed block and columns, `<name>_<i>`
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            column_names: (0..self.ncols()).map(|i| format!("{name}_{i}")).collect(),
            name,
            ..self.clone()
        }
    }
}
