//! Error types
//!
//! Every error belongs to one of the [ErrorClass] categories, so callers can tell bad input from
//! numerical breakdown and from data which is too poor to work with.

/// Broad category of an error
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Malformed input: wrong lengths, non-positive periods, etc.
    Validation,
    /// The numerical problem is ill-posed, e.g. rank-deficient design matrix
    Numerical,
    /// The data itself is unusable, e.g. no valid samples left after masking
    DataQuality,
    /// Writing output failed
    Io,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum TimeSeriesError {
    #[error("{name} has {actual} elements, but {expected} are expected")]
    LengthMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("time must not decrease, but t[{0}] > t[{0} + 1]")]
    Unsorted(usize),

    #[error("time series has no valid samples")]
    NoValidSamples,

    #[error("time window [{t_min}, {t_max}] contains no valid samples")]
    EmptyWindow { t_min: f64, t_max: f64 },

    #[error("flux cannot be normalized by non-positive median {0}")]
    NonPositiveMedian(f64),
}

impl TimeSeriesError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::LengthMismatch { .. } | Self::Unsorted(_) => ErrorClass::Validation,
            Self::NoValidSamples | Self::EmptyWindow { .. } | Self::NonPositiveMedian(_) => {
                ErrorClass::DataQuality
            }
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum TransitModelError {
    #[error("period must be positive and finite, {0} given")]
    InvalidPeriod(f64),

    #[error("duration must be positive and finite, {0} given")]
    InvalidDuration(f64),

    #[error("duration {duration} must be smaller than period {period}")]
    DurationNotShorterThanPeriod { duration: f64, period: f64 },

    #[error("epoch must be finite, {0} given")]
    InvalidEpoch(f64),
}

impl TransitModelError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Validation
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum PeriodogramError {
    #[error("period grid is empty")]
    EmptyPeriodGrid,

    #[error("periods must be positive and finite, {0} given")]
    InvalidPeriod(f64),

    #[error(transparent)]
    PeriodGrid(#[from] SortedArrayError),

    #[error("duration grid is empty")]
    EmptyDurationGrid,

    #[error("durations must be positive and finite, {0} given")]
    InvalidDuration(f64),

    #[error("duration {duration} must be smaller than the smallest period {period}")]
    DurationNotShorterThanPeriod { duration: f64, period: f64 },

    #[error("oversample factor must be at least unity")]
    InvalidOversample,

    #[error("frequency factor must be positive and finite, {0} given")]
    InvalidFrequencyFactor(f64),

    #[error("time series has {actual} valid samples, at least {minimum} are required")]
    ShortTimeSeries { actual: usize, minimum: usize },

    #[error("time series has zero time baseline")]
    ZeroBaseline,

    #[error("no period of the grid has enough in-transit samples to be scored")]
    NoReliablePeriod,
}

impl PeriodogramError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ShortTimeSeries { .. } | Self::ZeroBaseline | Self::NoReliablePeriod => {
                ErrorClass::DataQuality
            }
            _ => ErrorClass::Validation,
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum DesignMatrixError {
    #[error("block {block:?} has {actual} rows, but {expected} are expected")]
    RowMismatch {
        block: String,
        expected: usize,
        actual: usize,
    },

    #[error("block {0:?} has no columns")]
    EmptyBlock(String),

    #[error("block {block:?}: {name} has {actual} values for {expected} columns")]
    ColumnParameterLength {
        block: String,
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("block {block:?}: prior of column {column} must have finite mean and positive sigma")]
    InvalidPrior { block: String, column: usize },

    #[error("block {block:?}: breakpoint {breakpoint} is outside of 1..{rows} or not increasing")]
    InvalidBreakpoint {
        block: String,
        breakpoint: usize,
        rows: usize,
    },

    #[error("block name {0:?} is used twice")]
    DuplicateBlockName(String),

    #[error("composite design matrix needs at least one block")]
    NoBlocks,

    #[error("{requested} principal components requested, but only {available} are available")]
    TooManyComponents { requested: usize, available: usize },

    #[error("spline basis needs degree >= 1 and at least one interior knot")]
    InvalidSpline,

    #[error("time axis spans zero interval")]
    DegenerateTimeAxis,

    #[error("{name} has {actual} rows, but the time series has {expected} samples")]
    InputLength {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("basis builder has no valid samples")]
    NoValidSamples,
}

impl DesignMatrixError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NoValidSamples => ErrorClass::DataQuality,
            _ => ErrorClass::Validation,
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum RegressionError {
    #[error("time series has {series} valid samples, but design matrix has {matrix} rows")]
    RowMismatch { series: usize, matrix: usize },

    #[error("exclusion mask has {actual} elements, but time series has {expected} samples")]
    MaskLength { expected: usize, actual: usize },

    #[error("{samples} samples are left for the fit of {columns} columns")]
    NotEnoughSamples { samples: usize, columns: usize },

    #[error("design matrix is rank deficient: rank {rank} of {columns} columns")]
    RankDeficient { rank: usize, columns: usize },

    #[error("normal matrix is not positive definite")]
    NotPositiveDefinite,

    #[error("non-finite value in {0}")]
    NonFinite(&'static str),

    #[error("unknown design matrix block {0:?}")]
    UnknownBlock(String),
}

impl RegressionError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::RowMismatch { .. } | Self::MaskLength { .. } | Self::UnknownBlock(_) => {
                ErrorClass::Validation
            }
            Self::NotEnoughSamples { .. } => ErrorClass::DataQuality,
            Self::RankDeficient { .. } | Self::NotPositiveDefinite | Self::NonFinite(_) => {
                ErrorClass::Numerical
            }
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum PixelCubeError {
    #[error("{name} has shape {actual:?}, but {expected:?} is expected")]
    ShapeMismatch {
        name: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("aperture selects no pixels")]
    EmptyAperture,

    #[error("every pixel is inside the aperture, no background pixels left")]
    EmptyBackground,

    #[error(transparent)]
    TimeSeries(#[from] TimeSeriesError),
}

impl PixelCubeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::TimeSeries(err) => err.class(),
            Self::EmptyBackground => ErrorClass::DataQuality,
            _ => ErrorClass::Validation,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum SortedArrayError {
    #[error("SortedVec constructors accept sorted arrays only")]
    Unsorted,

    #[error("SortedVec constructors accept contiguous arrays only")]
    NonContiguous,
}

/// Error returned by [crate::DetrendPipeline]
#[derive(Debug, thiserror::Error)]
pub enum DetrendError {
    #[error(transparent)]
    TimeSeries(#[from] TimeSeriesError),

    #[error(transparent)]
    TransitModel(#[from] TransitModelError),

    #[error(transparent)]
    Periodogram(#[from] PeriodogramError),

    #[error(transparent)]
    DesignMatrix(#[from] DesignMatrixError),

    #[error(transparent)]
    Regression(#[from] RegressionError),

    #[error(transparent)]
    PixelCube(#[from] PixelCubeError),

    #[cfg(feature = "fits")]
    #[error("FITS output failed: {0}")]
    Fits(#[from] fitsio::errors::Error),
}

impl DetrendError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::TimeSeries(err) => err.class(),
            Self::TransitModel(err) => err.class(),
            Self::Periodogram(err) => err.class(),
            Self::DesignMatrix(err) => err.class(),
            Self::Regression(err) => err.class(),
            Self::PixelCube(err) => err.class(),
            #[cfg(feature = "fits")]
            Self::Fits(_) => ErrorClass::Io,
        }
    }
}
