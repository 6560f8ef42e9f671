use crate::data::meta::LightCurveMeta;
use crate::data::time_series::TimeSeries;
use crate::error::PixelCubeError;
use crate::sorted_array::SortedArray;

use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, Axis, Zip};
use std::collections::VecDeque;

/// Scaling between median absolute deviation and standard deviation of a normal distribution
const MAD_TO_STD: f64 = 1.4826;

/// Imaging data product: a stack of small images around the target
///
/// The flux cube has `(n_time, n_row, n_column)` shape. The cube provides everything the
/// detrending needs from the imaging path: aperture photometry, the background pixel matrix and
/// centroid motion.
#[derive(Clone, Debug)]
pub struct PixelCube {
    time: Array1<f64>,
    flux: Array3<f64>,
    flux_err: Option<Array3<f64>>,
    quality: Array1<u32>,
    pub meta: LightCurveMeta,
}

/// Flux-weighted centroid position per cadence, pixels
#[derive(Clone, Debug)]
pub struct Centroids {
    pub column: Array1<f64>,
    pub row: Array1<f64>,
}

impl PixelCube {
    pub fn new(
        time: impl Into<Array1<f64>>,
        flux: Array3<f64>,
        flux_err: Option<Array3<f64>>,
        quality: Option<Array1<u32>>,
    ) -> Result<Self, PixelCubeError> {
        let time = time.into();
        if flux.len_of(Axis(0)) != time.len() {
            return Err(PixelCubeError::ShapeMismatch {
                name: "flux",
                expected: vec![time.len(), flux.shape()[1], flux.shape()[2]],
                actual: flux.shape().to_vec(),
            });
        }
        if let Some(err) = &flux_err {
            if err.shape() != flux.shape() {
                return Err(PixelCubeError::ShapeMismatch {
                    name: "flux_err",
                    expected: flux.shape().to_vec(),
                    actual: err.shape().to_vec(),
                });
            }
        }
        let quality = match quality {
            Some(quality) if quality.len() != time.len() => {
                return Err(PixelCubeError::ShapeMismatch {
                    name: "quality",
                    expected: vec![time.len()],
                    actual: vec![quality.len()],
                });
            }
            Some(quality) => quality,
            None => Array1::zeros(time.len()),
        };
        Ok(Self {
            time,
            flux,
            flux_err,
            quality,
            meta: LightCurveMeta::default(),
        })
    }

    pub fn with_meta(mut self, meta: LightCurveMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn n_time(&self) -> usize {
        self.time.len()
    }

    /// `(n_row, n_column)`
    pub fn image_shape(&self) -> (usize, usize) {
        (self.flux.shape()[1], self.flux.shape()[2])
    }

    pub fn time(&self) -> ArrayView1<'_, f64> {
        self.time.view()
    }

    pub fn quality(&self) -> ArrayView1<'_, u32> {
        self.quality.view()
    }

    fn check_aperture(&self, aperture: &ArrayView2<bool>) -> Result<(), PixelCubeError> {
        let (n_row, n_col) = self.image_shape();
        if aperture.shape() != [n_row, n_col] {
            return Err(PixelCubeError::ShapeMismatch {
                name: "aperture",
                expected: vec![n_row, n_col],
                actual: aperture.shape().to_vec(),
            });
        }
        if !aperture.iter().any(|&a| a) {
            return Err(PixelCubeError::EmptyAperture);
        }
        Ok(())
    }

    /// Simple aperture photometry
    ///
    /// Flux is the sum of finite aperture pixels, uncertainties are added in quadrature (unity
    /// uncertainties are used if the cube has none). A cadence with no finite aperture pixel
    /// gets NaN flux and so becomes invalid.
    pub fn to_time_series(
        &self,
        aperture: ArrayView2<bool>,
    ) -> Result<TimeSeries<'static, f64>, PixelCubeError> {
        self.check_aperture(&aperture)?;
        let mut flux = Array1::zeros(self.n_time());
        let mut flux_err = Array1::zeros(self.n_time());
        for (i, image) in self.flux.outer_iter().enumerate() {
            let mut sum = 0.0;
            let mut var = 0.0;
            let mut n_finite = 0;
            Zip::indexed(&image)
                .and(&aperture)
                .for_each(|(row, col), &f, &inside| {
                    if inside && f.is_finite() {
                        sum += f;
                        var += match &self.flux_err {
                            Some(err) => err[[i, row, col]].powi(2),
                            None => 1.0,
                        };
                        n_finite += 1;
                    }
                });
            if n_finite == 0 {
                flux[i] = f64::NAN;
                flux_err[i] = f64::NAN;
            } else {
                flux[i] = sum;
                flux_err[i] = var.sqrt();
            }
        }
        let ts = TimeSeries::new(self.time.clone(), flux, flux_err)?
            .with_quality(self.quality.clone())?
            .with_meta(self.meta.labeled("aperture photometry"));
        Ok(ts)
    }

    /// `(n_time, n_background)` matrix of the pixels outside of the aperture
    pub fn background_pixels(
        &self,
        aperture: ArrayView2<bool>,
    ) -> Result<Array2<f64>, PixelCubeError> {
        self.check_aperture(&aperture)?;
        let outside: Vec<(usize, usize)> = aperture
            .indexed_iter()
            .filter_map(|(idx, &inside)| (!inside).then_some(idx))
            .collect();
        if outside.is_empty() {
            return Err(PixelCubeError::EmptyBackground);
        }
        Ok(Array2::from_shape_fn(
            (self.n_time(), outside.len()),
            |(i, j)| {
                let (row, col) = outside[j];
                self.flux[[i, row, col]]
            },
        ))
    }

    /// Flux-weighted centroids of the aperture pixels
    ///
    /// Cadences with non-positive total flux get NaN centroids
    pub fn centroids(&self, aperture: ArrayView2<bool>) -> Result<Centroids, PixelCubeError> {
        self.check_aperture(&aperture)?;
        let mut column = Array1::zeros(self.n_time());
        let mut row = Array1::zeros(self.n_time());
        for (i, image) in self.flux.outer_iter().enumerate() {
            let (total, sum_col, sum_row) = Zip::indexed(&image).and(&aperture).fold(
                (0.0, 0.0, 0.0),
                |(total, sum_col, sum_row), (r, c), &f, &inside| {
                    if inside && f.is_finite() {
                        (total + f, sum_col + f * c as f64, sum_row + f * r as f64)
                    } else {
                        (total, sum_col, sum_row)
                    }
                },
            );
            if total > 0.0 {
                column[i] = sum_col / total;
                row[i] = sum_row / total;
            } else {
                column[i] = f64::NAN;
                row[i] = f64::NAN;
            }
        }
        Ok(Centroids { column, row })
    }

    /// Per-pixel median image over time, NaNs ignored
    pub fn median_image(&self) -> Array2<f64> {
        let (n_row, n_col) = self.image_shape();
        Array2::from_shape_fn((n_row, n_col), |(r, c)| {
            let sorted = SortedArray::from_finite(self.flux.slice(ndarray::s![.., r, c]).iter());
            if sorted.is_empty() {
                f64::NAN
            } else {
                sorted.median()
            }
        })
    }

    /// Aperture of pixels brighter than the image median by `n_sigma` robust standard deviations
    ///
    /// Only the contiguous region closest to the image centre is kept. Returns an all-false
    /// aperture if no pixel passes the threshold.
    pub fn threshold_aperture(&self, n_sigma: f64) -> Array2<bool> {
        let median_image = self.median_image();
        let values = SortedArray::from_finite(median_image.iter());
        if values.is_empty() {
            return Array2::from_elem(median_image.raw_dim(), false);
        }
        let threshold = values.median() + n_sigma * MAD_TO_STD * values.median_absolute_deviation();
        let above = median_image.mapv(|f| f > threshold);

        let (n_row, n_col) = self.image_shape();
        let center = ((n_row as f64 - 1.0) / 2.0, (n_col as f64 - 1.0) / 2.0);
        let seed = above
            .indexed_iter()
            .filter(|&(_, &a)| a)
            .map(|((r, c), _)| {
                let d2 = (r as f64 - center.0).powi(2) + (c as f64 - center.1).powi(2);
                (d2, (r, c))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, idx)| idx);
        let mut aperture = Array2::from_elem((n_row, n_col), false);
        let Some(seed) = seed else {
            return aperture;
        };

        // 4-connected flood fill
        let mut queue = VecDeque::from([seed]);
        aperture[seed] = true;
        while let Some((r, c)) = queue.pop_front() {
            let neighbours = [
                (r.wrapping_sub(1), c),
                (r + 1, c),
                (r, c.wrapping_sub(1)),
                (r, c + 1),
            ];
            for (nr, nc) in neighbours {
                if nr < n_row && nc < n_col && above[[nr, nc]] && !aperture[[nr, nc]] {
                    aperture[[nr, nc]] = true;
                    queue.push_back((nr, nc));
                }
            }
        }
        aperture
    }
}
