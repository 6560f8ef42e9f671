use crate::error::DesignMatrixError;
use crate::sorted_array::SortedArray;

use ndarray::{Array1, Array2, ArrayView2};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Smallest value of a basis function at a sample which counts the sample as supporting it
const MIN_SUPPORT_VALUE: f64 = 1e-3;

/// Position of interior spline knots
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum KnotPlacement {
    /// Evenly spaced in time
    #[default]
    Uniform,
    /// At quantiles of the sample times, denser where there are more observations
    Quantile,
}

/// Clamped B-spline basis over the time axis
///
/// The basis has `n_knots + degree + 1` functions, which are non-negative and sum to unity at
/// every time, so the block already contains an intercept.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct SplineConfig {
    /// Number of interior knots
    pub n_knots: usize,
    pub degree: usize,
    pub knot_placement: KnotPlacement,
}

impl SplineConfig {
    pub fn new(n_knots: usize, degree: usize, knot_placement: KnotPlacement) -> Self {
        Self {
            n_knots,
            degree,
            knot_placement,
        }
    }

    #[inline]
    pub fn default_n_knots() -> usize {
        10
    }

    #[inline]
    pub fn default_degree() -> usize {
        3
    }

    pub fn n_basis(&self) -> usize {
        self.n_knots + self.degree + 1
    }

    /// Full knot vector: `degree + 1` copies of each boundary around the interior knots
    pub fn knots(&self, t: &[f64]) -> Result<Array1<f64>, DesignMatrixError> {
        if self.degree == 0 || self.n_knots == 0 {
            return Err(DesignMatrixError::InvalidSpline);
        }
        let sorted: SortedArray<f64> = t.to_vec().into();
        if sorted.is_empty() || sorted.minimum() >= sorted.maximum() {
            return Err(DesignMatrixError::DegenerateTimeAxis);
        }
        let (t_min, t_max) = (sorted.minimum(), sorted.maximum());
        let step = 1.0 / (self.n_knots + 1) as f64;
        let interior = (1..=self.n_knots).map(|i| {
            let q = i as f64 * step;
            match self.knot_placement {
                KnotPlacement::Uniform => t_min + (t_max - t_min) * q,
                KnotPlacement::Quantile => sorted.ppf(q as f32),
            }
        });
        Ok(std::iter::repeat_n(t_min, self.degree + 1)
            .chain(interior)
            .chain(std::iter::repeat_n(t_max, self.degree + 1))
            .collect())
    }

    /// (samples × basis functions) matrix of B-spline values
    pub fn basis(&self, t: &[f64]) -> Result<Array2<f64>, DesignMatrixError> {
        let knots = self.knots(t)?;
        let n_basis = self.n_basis();
        let mut values = Array2::zeros((t.len(), n_basis));
        let mut row = vec![0.0; self.degree + 1];
        for (i, &x) in t.iter().enumerate() {
            let span = find_span(&knots, n_basis, x);
            basis_functions(&knots, span, self.degree, x, &mut row);
            for (r, &value) in row.iter().enumerate() {
                values[[i, span - self.degree + r]] = value;
            }
        }
        log::debug!(
            "spline basis: {n_basis} functions of degree {} over {} samples",
            self.degree,
            t.len()
        );
        Ok(values)
    }
}

impl Default for SplineConfig {
    fn default() -> Self {
        Self::new(
            Self::default_n_knots(),
            Self::default_degree(),
            KnotPlacement::default(),
        )
    }
}

/// Indices of basis functions supported by the samples
///
/// Every kept function is matched to its own sample, with strictly increasing times, where the
/// function exceeds [MIN_SUPPORT_VALUE] (Schoenberg-Whitney condition). Functions left without
/// a sample vanish or almost vanish on the data, e.g. inside a gap, and would make the basis
/// rank deficient. `t` must be sorted.
pub fn supported_functions(basis: ArrayView2<f64>, t: &[f64]) -> Vec<usize> {
    let mut supported = vec![];
    let mut next = 0;
    let mut last_t = f64::NEG_INFINITY;
    for (j, column) in basis.columns().into_iter().enumerate() {
        let matched = (next..t.len()).find(|&i| t[i] > last_t && column[i] > MIN_SUPPORT_VALUE);
        if let Some(i) = matched {
            supported.push(j);
            next = i + 1;
            last_t = t[i];
        }
    }
    supported
}

/// Index `i` of the knot interval $[u_i, u_{i+1})$ containing `x`, the last non-empty interval
/// for the right boundary
fn find_span(knots: &Array1<f64>, n_basis: usize, x: f64) -> usize {
    if x >= knots[n_basis] {
        return n_basis - 1;
    }
    let degree = knots.len() - n_basis - 1;
    knots
        .iter()
        .position(|&u| u > x)
        .map_or(n_basis - 1, |i| i - 1)
        .clamp(degree, n_basis - 1)
}

/// Cox-de Boor recursion for the `degree + 1` functions which are non-zero on the span
fn basis_functions(knots: &Array1<f64>, span: usize, degree: usize, x: f64, n: &mut [f64]) {
    let mut left = vec![0.0; degree + 1];
    let mut right = vec![0.0; degree + 1];
    n[0] = 1.0;
    for j in 1..=degree {
        left[j] = x - knots[span + 1 - j];
        right[j] = knots[span + j] - x;
        let mut saved = 0.0;
        for r in 0..j {
            let temp = n[r] / (right[r + 1] + left[j - r]);
            n[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        n[j] = saved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use light_curve_common::linspace;

    #[test]
    fn partition_of_unity() {
        let t = linspace(0.0, 27.0, 500);
        for placement in [KnotPlacement::Uniform, KnotPlacement::Quantile] {
            let config = SplineConfig::new(8, 3, placement);
            let basis = config.basis(&t).unwrap();
            assert_eq!(basis.ncols(), 12);
            for row in basis.rows() {
                assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-12);
                assert!(row.iter().all(|&x| x >= -1e-15));
            }
        }
    }

    #[test]
    fn clamped_ends() {
        let t = linspace(-1.0, 1.0, 11);
        let basis = SplineConfig::default().basis(&t).unwrap();
        assert_abs_diff_eq!(basis[[0, 0]], 1.0);
        assert_abs_diff_eq!(basis[[10, basis.ncols() - 1]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn linear_spline_interpolates() {
        // degree one B-splines are hat functions peaking at knots
        let config = SplineConfig::new(1, 1, KnotPlacement::Uniform);
        let basis = config.basis(&[0.0, 0.5, 1.0, 1.5, 2.0]).unwrap();
        assert_abs_diff_eq!(basis.row(2).to_owned(), ndarray::array![0.0, 1.0, 0.0]);
        assert_abs_diff_eq!(basis.row(1).to_owned(), ndarray::array![0.5, 0.5, 0.0]);
    }

    #[test]
    fn quantile_knots_follow_samples() {
        let mut t = linspace(0.0, 1.0, 90);
        t.extend(linspace(9.0, 10.0, 10));
        let knots = SplineConfig::new(3, 3, KnotPlacement::Quantile)
            .knots(&t)
            .unwrap();
        assert_eq!(knots.len(), 3 + 2 * 4);
        assert!(knots[4] < 1.0 && knots[6] < 1.0);
    }

    #[test]
    fn functions_inside_gap_are_unsupported() {
        let mut t = linspace(0.0, 13.0, 625);
        t.extend(linspace(14.5, 27.0, 601));
        let config = SplineConfig::new(120, 3, KnotPlacement::Uniform);
        let basis = config.basis(&t).unwrap();
        let supported = supported_functions(basis.view(), &t);
        assert!(supported.len() < basis.ncols());
        assert!(supported.len() > 110);
        // functions far from the gap are kept
        assert_eq!(&supported[..10], &(0..10).collect::<Vec<_>>()[..]);
        assert_eq!(supported.last(), Some(&(basis.ncols() - 1)));
        // knots are 0.223 days apart, functions spanning (13.2, 14.3) see no data
        let knots = config.knots(&t).unwrap();
        for j in (0..basis.ncols()).filter(|j| !supported.contains(j)) {
            assert!(knots[j] > 12.9 && knots[j + 4] < 14.6, "function {j}");
        }
    }

    #[test]
    fn dense_samples_support_every_function() {
        let t = linspace(0.0, 27.0, 1296);
        let basis = SplineConfig::new(50, 3, KnotPlacement::Quantile)
            .basis(&t)
            .unwrap();
        assert_eq!(
            supported_functions(basis.view(), &t),
            (0..basis.ncols()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn invalid_configuration() {
        let t = linspace(0.0, 1.0, 10);
        assert_eq!(
            SplineConfig::new(0, 3, KnotPlacement::Uniform).basis(&t),
            Err(DesignMatrixError::InvalidSpline)
        );
        assert_eq!(
            SplineConfig::default().basis(&[1.0, 1.0, 1.0]),
            Err(DesignMatrixError::DegenerateTimeAxis)
        );
    }
}
