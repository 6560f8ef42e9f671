//! Box periodogram: search for periodic transit-like dimming

mod bls;
pub use bls::{BlsPeak, BlsResult, BoxLeastSquares};

mod grid;
pub use grid::{
    DynamicPeriodGridParams, LinearPeriodGrid, PeriodGrid, PeriodGridStrategy, PeriodGridTrait,
    UniformFrequencyPeriodGrid,
};

mod objective;
pub use objective::{BlsObjective, BlsObjectiveTrait, LikelihoodObjective, SnrObjective};
