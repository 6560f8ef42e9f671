#![doc = include_str!("../README.md")]

pub mod basis;
pub use basis::{BasisBuilder, KnotPlacement, PcaConfig, SplineConfig};

mod data;
pub use data::{
    Centroids, DataSample, LightCurveMeta, PixelCube, QualityBitmask, TimeSeries,
};

pub mod design_matrix;
pub use design_matrix::{CompositeDesignMatrix, DesignMatrixBlock};

mod error;
pub use error::{
    DesignMatrixError, DetrendError, ErrorClass, PeriodogramError, PixelCubeError,
    RegressionError, SortedArrayError, TimeSeriesError, TransitModelError,
};

mod float_trait;
pub use float_trait::Float;

#[cfg(feature = "fits")]
mod io;
#[cfg(feature = "fits")]
pub use io::{LIGHT_CURVE_EXTENSION, write_fits};

pub mod periodogram;
pub use periodogram::{
    BlsObjective, BlsPeak, BlsResult, BoxLeastSquares, DynamicPeriodGridParams, PeriodGrid,
    PeriodGridStrategy,
};

mod pipeline;
pub use pipeline::{
    AuxiliaryData, DetrendConfig, DetrendOutput, DetrendPipeline, Detrended, TransitHandling,
};

pub mod regression;
pub use regression::{BlockContribution, LinearRegressor, RegressionResult, RegressorConfig};

mod sorted_array;

mod transit;
pub use transit::{TransitModel, TransitStatistics};

mod types;

pub use ndarray;
