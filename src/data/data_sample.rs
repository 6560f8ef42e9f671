use crate::float_trait::Float;
use crate::types::CowArray1;

use ndarray::{Array1, ArrayView1};

/// A [`TimeSeries`](crate::TimeSeries) component
///
/// Holds the values of every sample, valid or not. Statistics over valid samples live on
/// [`TimeSeries`](crate::TimeSeries), which knows the validity mask.
#[derive(Clone, Debug)]
pub struct DataSample<'a, T>
where
    T: Float,
{
    pub sample: CowArray1<'a, T>,
}

impl<'a, T> DataSample<'a, T>
where
    T: Float,
{
    pub fn new(sample: CowArray1<'a, T>) -> Self {
        Self { sample }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sample.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sample.is_empty()
    }
}

impl<'a, T, Slice: ?Sized> From<&'a Slice> for DataSample<'a, T>
where
    T: Float,
    Slice: AsRef<[T]>,
{
    fn from(s: &'a Slice) -> Self {
        ArrayView1::from(s.as_ref()).into()
    }
}

impl<T> From<Vec<T>> for DataSample<'_, T>
where
    T: Float,
{
    fn from(v: Vec<T>) -> Self {
        Array1::from(v).into()
    }
}

impl<'a, T> From<ArrayView1<'a, T>> for DataSample<'a, T>
where
    T: Float,
{
    fn from(a: ArrayView1<'a, T>) -> Self {
        Self::new(a.into())
    }
}

impl<T> From<Array1<T>> for DataSample<'_, T>
where
    T: Float,
{
    fn from(a: Array1<T>) -> Self {
        Self::new(a.into())
    }
}

impl<'a, T> From<CowArray1<'a, T>> for DataSample<'a, T>
where
    T: Float,
{
    fn from(a: CowArray1<'a, T>) -> Self {
        Self::new(a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn borrowed_slice_is_not_copied() {
        let x = [1.0_f64, f64::NAN, 3.0];
        let ds: DataSample<f64> = DataSample::from(&x);
        assert!(ds.sample.is_view());
        assert_eq!(ds.len(), 3);
    }

    #[test]
    fn owned_vector_keeps_every_value() {
        let ds: DataSample<f64> = vec![f64::NAN, 2.0].into();
        assert!(ds.sample.is_owned());
        assert!(ds.sample[0].is_nan());
        assert_eq!(ds.sample[1], 2.0);
        assert!(!ds.is_empty());
    }
}
