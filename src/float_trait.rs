use conv::prelude::*;
use ndarray::ScalarOperand;
use num_traits::{FloatConst, FromPrimitive};
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::{Debug, Display, LowerExp};
use std::iter::Sum;
use std::ops::{AddAssign, DivAssign, MulAssign, SubAssign};

/// Floating number trait, it is implemented for [f32] and [f64] only
///
/// Time series, transit geometry and the box periodogram are generic over it, while the
/// design-matrix and regression code works in [f64] only
pub trait Float:
    'static
    + Sized
    + num_traits::Float
    + FloatConst
    + FromPrimitive
    + ValueFrom<usize>
    + ApproxFrom<usize>
    + ValueFrom<f32>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
    + Sum
    + Debug
    + Display
    + LowerExp
    + Send
    + Sync
    + ScalarOperand
    + Serialize
    + DeserializeOwned
    + JsonSchema
{
    fn half() -> Self;
    fn two() -> Self;
    fn four() -> Self;

    /// Float representation of a length or a count
    fn from_count(n: usize) -> Self {
        n.approx_as::<Self>()
            .expect("usize to float conversion must not fail")
    }
}

macro_rules! float_trait_impl {
    ($t: ty) => {
        impl Float for $t {
            #[inline]
            fn half() -> Self {
                0.5
            }

            #[inline]
            fn two() -> Self {
                2.0
            }

            #[inline]
            fn four() -> Self {
                4.0
            }
        }
    };
}

float_trait_impl!(f32);
float_trait_impl!(f64);
