use crate::design_matrix::block::DesignMatrixBlock;
use crate::error::DesignMatrixError;

use ndarray::{Array1, Array2, Axis, concatenate};
use std::collections::HashSet;
use std::ops::Range;

/// Ordered collection of [DesignMatrixBlock]s sharing the same rows
///
/// Columns of the blocks are concatenated in block order, every block keeps its column range,
/// so fitted coefficients can be attributed back to the block.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositeDesignMatrix {
    blocks: Vec<DesignMatrixBlock>,
    offsets: Vec<usize>,
}

impl CompositeDesignMatrix {
    pub fn new(
        blocks: impl IntoIterator<Item = DesignMatrixBlock>,
    ) -> Result<Self, DesignMatrixError> {
        let blocks: Vec<_> = blocks.into_iter().collect();
        let first = blocks.first().ok_or(DesignMatrixError::NoBlocks)?;
        let rows = first.nrows();
        let mut names = HashSet::with_capacity(blocks.len());
        for block in blocks.iter() {
            if block.nrows() != rows {
                return Err(DesignMatrixError::RowMismatch {
                    block: block.name().to_owned(),
                    expected: rows,
                    actual: block.nrows(),
                });
            }
            if !names.insert(block.name()) {
                return Err(DesignMatrixError::DuplicateBlockName(block.name().to_owned()));
            }
        }
        let offsets = blocks
            .iter()
            .scan(0, |offset, block| {
                let start = *offset;
                *offset += block.ncols();
                Some(start)
            })
            .collect();
        Ok(Self { blocks, offsets })
    }

    /// Append a block, it must have the same number of rows and a new name
    pub fn with_block(self, block: DesignMatrixBlock) -> Result<Self, DesignMatrixError> {
        Self::new(self.blocks.into_iter().chain(std::iter::once(block)))
    }

    pub fn nrows(&self) -> usize {
        self.blocks[0].nrows()
    }

    pub fn ncols(&self) -> usize {
        self.blocks.iter().map(|b| b.ncols()).sum()
    }

    pub fn blocks(&self) -> &[DesignMatrixBlock] {
        &self.blocks
    }

    pub fn block(&self, name: &str) -> Option<&DesignMatrixBlock> {
        self.blocks.iter().find(|b| b.name() == name)
    }

    /// Columns of the block in the concatenated matrix
    pub fn column_range(&self, name: &str) -> Option<Range<usize>> {
        self.blocks
            .iter()
            .zip(self.offsets.iter())
            .find(|(b, _)| b.name() == name)
            .map(|(b, &offset)| offset..offset + b.ncols())
    }

    /// Block names with their column ranges, in block order
    pub fn column_ranges(&self) -> impl Iterator<Item = (&str, Range<usize>)> {
        self.blocks
            .iter()
            .zip(self.offsets.iter())
            .map(|(b, &offset)| (b.name(), offset..offset + b.ncols()))
    }

    pub fn column_names(&self) -> Vec<String> {
        self.blocks
            .iter()
            .flat_map(|b| b.column_names().iter().cloned())
            .collect()
    }

    pub fn prior_mu(&self) -> Array1<f64> {
        self.blocks
            .iter()
            .flat_map(|b| b.prior_mu().to_vec())
            .collect()
    }

    pub fn prior_sigma(&self) -> Array1<f64> {
        self.blocks
            .iter()
            .flat_map(|b| b.prior_sigma().to_vec())
            .collect()
    }

    /// Concatenated (rows × columns) matrix
    pub fn values(&self) -> Array2<f64> {
        let views: Vec<_> = self.blocks.iter().map(|b| b.values()).collect();
        concatenate(Axis(1), &views).expect("blocks have the same number of rows")
    }
}
