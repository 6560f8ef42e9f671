use crate::error::SortedArrayError;
use crate::float_trait::Float;

use conv::prelude::*;
use ndarray::{Array1, ArrayView1};
use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::ops::Deref;

// Underlying array is guaranteed to be sorted, contiguous and NaN-free
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SortedArray<T>(pub Array1<T>);

impl<T> SortedArray<T>
where
    T: Float,
{
    pub fn from_sorted(sorted_array: impl Into<Array1<T>>) -> Result<Self, SortedArrayError> {
        let sorted_array = sorted_array.into();
        let slice = sorted_array
            .as_slice()
            .ok_or(SortedArrayError::NonContiguous)?;
        if slice.iter().any(|x| x.is_nan()) || !slice.is_sorted() {
            return Err(SortedArrayError::Unsorted);
        }
        Ok(Self(sorted_array))
    }

    /// Sort finite values of an iterator, non-finite values are dropped
    pub fn from_finite<'a>(it: impl IntoIterator<Item = &'a T>) -> Self {
        it.into_iter()
            .copied()
            .filter(|x| x.is_finite())
            .collect::<Vec<_>>()
            .into()
    }

    pub fn maximum(&self) -> T {
        self[self.len() - 1]
    }

    pub fn minimum(&self) -> T {
        self[0]
    }

    pub fn median(&self) -> T {
        assert_ne!(self.len(), 0, "median of an empty array is undefined");
        let i = (self.len() - 1) / 2;
        if self.len() % 2 == 0 {
            T::half() * (self[i] + self[i + 1])
        } else {
            self[i]
        }
    }

    // R-5 from https://en.wikipedia.org/wiki/Quantile
    pub fn ppf(&self, q: f32) -> T {
        assert_ne!(self.len(), 0);
        assert!(
            (0.0..=1.0).contains(&q),
            "quantile should be between zero and unity"
        );
        let h = (self.len() as f32) * q - 0.5;
        let h_floor = h.floor();
        if h_floor < 0.0 {
            self.minimum()
        } else {
            #[allow(clippy::cast_sign_loss)]
            let i = h_floor as usize;
            if i >= self.len() - 1 {
                self.maximum()
            } else {
                self[i] + (h - h_floor).value_as::<T>().unwrap() * (self[i + 1] - self[i])
            }
        }
    }

    /// Median of absolute deviations from the median
    pub fn median_absolute_deviation(&self) -> T {
        let median = self.median();
        let deviations: SortedArray<T> = self
            .iter()
            .map(|&x| T::abs(x - median))
            .collect::<Vec<_>>()
            .into();
        deviations.median()
    }
}

impl<T> From<Vec<T>> for SortedArray<T>
where
    T: Float,
{
    fn from(mut v: Vec<T>) -> Self {
        v.retain(|x| !x.is_nan());
        v[..].sort_unstable_by(|a, b| a.partial_cmp(b).unwrap());
        Self(Array1::from_vec(v))
    }
}

impl<T> From<ArrayView1<'_, T>> for SortedArray<T>
where
    T: Float,
{
    fn from(v: ArrayView1<'_, T>) -> Self {
        v.to_vec().into()
    }
}

impl<T> Deref for SortedArray<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        self.0
            .as_slice()
            .expect("SortedArray is always contiguous")
    }
}

impl<T> AsRef<[T]> for SortedArray<T> {
    fn as_ref(&self) -> &[T] {
        self
    }
}

impl<T> JsonSchema for SortedArray<T>
where
    T: JsonSchema,
{
    fn inline_schema() -> bool {
        true
    }

    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("SortedArray")
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        <[T] as JsonSchema>::json_schema(generator)
    }
}
