//! Regressor columns grouped into named blocks

mod block;
pub use block::DesignMatrixBlock;

mod composite;
pub use composite::CompositeDesignMatrix;
