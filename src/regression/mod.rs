//! Joint linear least squares fit of design matrix blocks with Gaussian priors

use crate::data::TimeSeries;
use crate::design_matrix::CompositeDesignMatrix;
use crate::error::RegressionError;
use crate::sorted_array::SortedArray;

use macro_const::macro_const;
use nalgebra::{Cholesky, DMatrix, DVector};
use ndarray::{Array1, Array2, ArrayView1, Zip};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

mod result;
pub use result::{BlockContribution, RegressionResult};

/// Scaling between median absolute deviation and standard deviation of a normal distribution
const MAD_TO_STD: f64 = 1.4826;

macro_const! {
    const DOC: &str = r#"
Regularized weighted linear least squares

Flux of the valid samples $y$ is modelled as $X \beta$, where $X$ is a composite design matrix.
Coefficients maximize the posterior with Gaussian priors $\beta_j \sim \mathcal{N}(\mu_j,
\sigma_j^2)$:
$$
\left(X^T W X + \Sigma^{-1}\right) \beta = X^T W y + \Sigma^{-1} \mu,
$$
where $W = \mathrm{diag}(\delta_i^{-2})$ are inverse-variance weights of the flux uncertainties
(unity if `use_flux_errors` is off) and $\Sigma^{-1} = \mathrm{diag}(\sigma_j^{-2})$, which is
zero for flat priors.

Samples excluded by the caller are not fitted but still modelled. Columns vanishing on every
fitted sample carry no information and are dropped with a warning, their coefficient is zero.
If the normal matrix has a numerical rank lower than the number of columns, eigenvalues below
`rank_tolerance` times the largest one, the fit fails with a rank deficiency error, unless
`allow_pseudo_inverse` is set: then the minimum-norm pseudo-inverse solution is returned and
flagged in the result.

With `outlier_sigma` set, samples with residuals deviating from the median residual by more than
`outlier_sigma` robust standard deviations are clipped and the fit is repeated, at most
`max_iterations` times in total. Clipped samples never re-enter the fit.
"#;
}

#[doc = DOC!()]
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RegressorConfig {
    pub rank_tolerance: f64,
    pub allow_pseudo_inverse: bool,
    pub use_flux_errors: bool,
    pub outlier_sigma: Option<f64>,
    pub max_iterations: usize,
}

impl RegressorConfig {
    #[inline]
    pub fn default_rank_tolerance() -> f64 {
        1e-12
    }

    #[inline]
    pub fn default_max_iterations() -> usize {
        5
    }

    pub fn doc() -> &'static str {
        DOC
    }
}

impl Default for RegressorConfig {
    fn default() -> Self {
        Self {
            rank_tolerance: Self::default_rank_tolerance(),
            allow_pseudo_inverse: false,
            use_flux_errors: true,
            outlier_sigma: None,
            max_iterations: Self::default_max_iterations(),
        }
    }
}

/// Stateless solver, see [RegressorConfig] for the model
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct LinearRegressor {
    config: RegressorConfig,
}

struct Solution {
    coefficients: Array1<f64>,
    errors: Array1<f64>,
    rank: usize,
    pseudo_inverse: bool,
}

impl LinearRegressor {
    pub fn new(config: RegressorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RegressorConfig {
        &self.config
    }

    /// Fit the valid samples of `ts`
    ///
    /// `design_matrix` must have a row per valid sample. `exclude` marks samples not to be
    /// fitted, e.g. in-transit samples, it has either a value per sample of the series or a
    /// value per valid sample.
    pub fn fit(
        &self,
        ts: &TimeSeries<f64>,
        design_matrix: &CompositeDesignMatrix,
        exclude: Option<ArrayView1<bool>>,
    ) -> Result<RegressionResult, RegressionError> {
        let valid_indices = ts.valid_indices();
        let n = valid_indices.len();
        if design_matrix.nrows() != n {
            return Err(RegressionError::RowMismatch {
                series: n,
                matrix: design_matrix.nrows(),
            });
        }
        let mut fit_mask = match exclude {
            None => Array1::from_elem(n, true),
            Some(exclude) if exclude.len() == n => exclude.mapv(|e| !e),
            Some(exclude) if exclude.len() == ts.lenu() => {
                valid_indices.iter().map(|&i| !exclude[i]).collect()
            }
            Some(exclude) => {
                return Err(RegressionError::MaskLength {
                    expected: ts.lenu(),
                    actual: exclude.len(),
                });
            }
        };

        let series = ts
            .remove_invalid()
            .map_err(|_| RegressionError::NotEnoughSamples {
                samples: 0,
                columns: design_matrix.ncols(),
            })?;
        let y = series.flux.sample.to_owned();
        let weights = if self.config.use_flux_errors {
            series.flux_err.sample.mapv(|e| e.powi(-2))
        } else {
            Array1::ones(n)
        };
        let x = design_matrix.values();
        let mu = design_matrix.prior_mu();
        let inv_var = design_matrix.prior_sigma().mapv(|s| s.powi(-2));
        if !y.iter().chain(weights.iter()).all(|v| v.is_finite()) {
            return Err(RegressionError::NonFinite("flux"));
        }

        let column_names = design_matrix.column_names();
        let mut iterations = 0;
        loop {
            iterations += 1;
            let rows: Vec<usize> = (0..n).filter(|&i| fit_mask[i]).collect();
            let active: Vec<usize> = (0..x.ncols())
                .filter(|&j| rows.iter().any(|&i| x[[i, j]] != 0.0))
                .collect();
            let dropped: Vec<String> = (0..x.ncols())
                .filter(|j| !active.contains(j))
                .map(|j| column_names[j].clone())
                .collect();
            if !dropped.is_empty() {
                log::warn!("dropping columns vanishing on every fitted sample: {dropped:?}");
            }
            let flat = active.iter().filter(|&&j| inv_var[j] == 0.0).count();
            if rows.len() < flat || rows.is_empty() {
                return Err(RegressionError::NotEnoughSamples {
                    samples: rows.len(),
                    columns: flat,
                });
            }

            let solution = self.solve(&x, &y, &weights, &mu, &inv_var, &rows, &active)?;
            let model = x.dot(&solution.coefficients);
            log::debug!(
                "regression iteration {iterations}: {} samples, {} columns, rank {}",
                rows.len(),
                active.len(),
                solution.rank
            );

            let clipped = match self.config.outlier_sigma {
                Some(n_sigma) if iterations < self.config.max_iterations => {
                    self.outliers(&y, &model, &weights, &rows, n_sigma)
                }
                _ => vec![],
            };
            if clipped.is_empty() {
                let contributions = design_matrix
                    .column_ranges()
                    .map(|(name, columns)| {
                        let coefficients =
                            solution.coefficients.slice(ndarray::s![columns.clone()]);
                        let values = x.slice(ndarray::s![.., columns.clone()]).dot(&coefficients);
                        BlockContribution {
                            name: name.to_owned(),
                            columns,
                            values,
                        }
                    })
                    .collect();
                return Ok(RegressionResult {
                    series,
                    column_names,
                    coefficients: solution.coefficients,
                    coefficient_errors: solution.errors,
                    contributions,
                    model,
                    fit_mask,
                    iterations,
                    rank: solution.rank,
                    dropped_columns: dropped,
                    pseudo_inverse: solution.pseudo_inverse,
                });
            }
            log::warn!(
                "clipping {} outliers after iteration {iterations}",
                clipped.len()
            );
            for i in clipped {
                fit_mask[i] = false;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn solve(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        weights: &Array1<f64>,
        mu: &Array1<f64>,
        inv_var: &Array1<f64>,
        rows: &[usize],
        active: &[usize],
    ) -> Result<Solution, RegressionError> {
        let p = active.len();
        let sqrt_w: Vec<f64> = rows.iter().map(|&i| weights[i].sqrt()).collect();
        let xw = DMatrix::from_fn(rows.len(), p, |r, c| x[[rows[r], active[c]]] * sqrt_w[r]);
        let yw = DVector::from_fn(rows.len(), |r, _| y[rows[r]] * sqrt_w[r]);

        let mut normal = xw.tr_mul(&xw);
        let mut rhs = xw.tr_mul(&yw);
        for (c, &j) in active.iter().enumerate() {
            normal[(c, c)] += inv_var[j];
            rhs[c] += inv_var[j] * mu[j];
        }
        if !normal.iter().chain(rhs.iter()).all(|v| v.is_finite()) {
            return Err(RegressionError::NonFinite("normal equations"));
        }

        let eigen = normal.clone().symmetric_eigen();
        let max_eigenvalue = eigen.eigenvalues.iter().copied().fold(0.0, f64::max);
        let threshold = self.config.rank_tolerance * max_eigenvalue;
        let rank = eigen
            .eigenvalues
            .iter()
            .filter(|&&lambda| lambda > threshold)
            .count();

        let (beta, covariance, pseudo_inverse) = if rank < p {
            if !self.config.allow_pseudo_inverse {
                return Err(RegressionError::RankDeficient { rank, columns: p });
            }
            log::warn!("normal matrix has rank {rank} of {p}, using pseudo-inverse");
            let inv_eigenvalues = eigen.eigenvalues.map(|lambda| {
                if lambda > threshold {
                    lambda.recip()
                } else {
                    0.0
                }
            });
            let v = &eigen.eigenvectors;
            let pinv = v * DMatrix::from_diagonal(&inv_eigenvalues) * v.transpose();
            (&pinv * &rhs, pinv, true)
        } else {
            let cholesky = Cholesky::new(normal).ok_or(RegressionError::NotPositiveDefinite)?;
            (cholesky.solve(&rhs), cholesky.inverse(), false)
        };

        let n_columns = x.ncols();
        let mut coefficients = Array1::zeros(n_columns);
        let mut errors = Array1::from_elem(n_columns, f64::NAN);
        for (c, &j) in active.iter().enumerate() {
            coefficients[j] = beta[c];
            errors[j] = covariance[(c, c)].max(0.0).sqrt();
        }
        Ok(Solution {
            coefficients,
            errors,
            rank,
            pseudo_inverse,
        })
    }

    /// Fitted rows whose normalized residual deviates from the median by more than `n_sigma`
    /// robust standard deviations
    fn outliers(
        &self,
        y: &Array1<f64>,
        model: &Array1<f64>,
        weights: &Array1<f64>,
        rows: &[usize],
        n_sigma: f64,
    ) -> Vec<usize> {
        let chi: Array1<f64> = Zip::from(y)
            .and(model)
            .and(weights)
            .map_collect(|&y, &m, &w| (y - m) * w.sqrt());
        let sorted = SortedArray::from_finite(rows.iter().map(|&i| &chi[i]));
        if sorted.is_empty() {
            return vec![];
        }
        let median = sorted.median();
        let std = MAD_TO_STD * sorted.median_absolute_deviation();
        if !(std > 0.0) {
            return vec![];
        }
        rows.iter()
            .copied()
            .filter(|&i| (chi[i] - median).abs() > n_sigma * std)
            .collect()
    }
}
