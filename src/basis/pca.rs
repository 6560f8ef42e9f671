use crate::error::DesignMatrixError;

use nalgebra::DMatrix;
use ndarray::{Array2, ArrayView2, Axis};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Principal component analysis of background pixel light curves
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PcaConfig {
    /// Number of leading components to keep
    pub n_components: usize,
}

impl PcaConfig {
    pub fn new(n_components: usize) -> Self {
        Self { n_components }
    }

    #[inline]
    pub fn default_n_components() -> usize {
        3
    }
}

impl Default for PcaConfig {
    fn default() -> Self {
        Self::new(Self::default_n_components())
    }
}

/// Leading left singular vectors of the column-centred (time × pixel) matrix
///
/// Components are ordered by decreasing singular value, each one is a unit-norm time series.
/// Sign is fixed so that the element of the largest absolute value is positive.
pub(crate) fn principal_components(
    pixels: ArrayView2<f64>,
    n_components: usize,
) -> Result<Array2<f64>, DesignMatrixError> {
    let (n_time, n_pixels) = pixels.dim();
    let available = n_time.min(n_pixels);
    if n_components > available {
        return Err(DesignMatrixError::TooManyComponents {
            requested: n_components,
            available,
        });
    }

    let mut centered = pixels.mapv(|x| if x.is_finite() { x } else { 0.0 });
    let means = centered.mean_axis(Axis(0)).ok_or(DesignMatrixError::NoValidSamples)?;
    centered -= &means;

    let matrix = DMatrix::from_fn(n_time, n_pixels, |i, j| centered[[i, j]]);
    let svd = matrix.svd(true, false);
    let u = svd
        .u
        .expect("left singular vectors are requested from SVD");
    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]));

    let mut components = Array2::zeros((n_time, n_components));
    for (k, &j) in order.iter().take(n_components).enumerate() {
        let column = u.column(j);
        let sign = column
            .iter()
            .copied()
            .max_by(|a, b| a.abs().total_cmp(&b.abs()))
            .map_or(1.0, f64::signum);
        for i in 0..n_time {
            components[[i, k]] = sign * column[i];
        }
    }
    log::debug!(
        "background PCA: {n_components} of {available} components, leading singular values {:?}",
        order
            .iter()
            .take(n_components)
            .map(|&j| svd.singular_values[j])
            .collect::<Vec<_>>()
    );
    Ok(components)
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, array};
    use rand::prelude::*;
    use rand_distr::Normal;

    #[test]
    fn components_are_orthonormal() {
        let mut rng = StdRng::seed_from_u64(1);
        let pixels = Array2::from_shape_simple_fn((50, 8), || rng.random::<f64>());
        let pcs = principal_components(pixels.view(), 4).unwrap();
        let gram = pcs.t().dot(&pcs);
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(gram[[i, j]], expected, epsilon = 1e-10);
            }
        }
        // centred data gives zero-mean components
        for pc in pcs.columns() {
            assert_abs_diff_eq!(pc.sum(), 0.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn recovers_trend_subspace() {
        let n = 200;
        let t: Array1<f64> = Array1::linspace(0.0, 1.0, n);
        let trend_a = t.mapv(|t| (6.0 * t).sin());
        let trend_b = t.mapv(|t| t * t);
        let mut rng = StdRng::seed_from_u64(2);
        let noise = Normal::new(0.0, 1e-6).unwrap();
        let mut pixels = Array2::<f64>::zeros((n, 12));
        for (j, mut pixel) in pixels.columns_mut().into_iter().enumerate() {
            let (a, b) = (1.0 + j as f64, 3.0 - 0.5 * j as f64);
            for i in 0..n {
                pixel[i] = 100.0 + a * trend_a[i] + b * trend_b[i] + noise.sample(&mut rng);
            }
        }
        let pcs = principal_components(pixels.view(), 2).unwrap();
        for trend in [trend_a, trend_b] {
            let centered = &trend - trend.mean().unwrap();
            // orthonormal columns: projection is P P^T x
            let projection = pcs.dot(&pcs.t().dot(&centered));
            let residual = &centered - &projection;
            let relative = residual.dot(&residual).sqrt() / centered.dot(&centered).sqrt();
            assert!(relative < 1e-4, "relative residual {relative}");
        }
    }

    #[test]
    fn non_finite_pixels_are_zeroed() {
        let pixels = array![[1.0, f64::NAN], [2.0, 1.0], [3.0, 0.0], [4.0, 2.0]];
        let pcs = principal_components(pixels.view(), 2).unwrap();
        assert!(pcs.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn too_many_components() {
        let pixels = Array2::<f64>::ones((10, 3));
        assert_eq!(
            principal_components(pixels.view(), 4),
            Err(DesignMatrixError::TooManyComponents {
                requested: 4,
                available: 3
            })
        );
    }
}
