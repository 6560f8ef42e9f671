mod data_sample;
pub use data_sample::DataSample;

mod meta;
pub use meta::LightCurveMeta;

mod pixel_cube;
pub use pixel_cube::{Centroids, PixelCube};

mod quality;
pub use quality::QualityBitmask;

mod time_series;
pub use time_series::TimeSeries;
