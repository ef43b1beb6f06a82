use faer::sparse::SymbolicSparseColMat;

use super::{IndexType, SparseColMat};
use crate::error::{DiffsolError, MatrixError};

/// Placement of one source matrix inside an iteration matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    pub source: usize,
    pub row_offset: IndexType,
    pub col_offset: IndexType,
}

impl Block {
    pub const fn new(source: usize, row_offset: IndexType, col_offset: IndexType) -> Self {
        Self {
            source,
            row_offset,
            col_offset,
        }
    }
}

/// Union sparsity pattern of a block linear combination of sparse matrices.
///
/// The implicit methods assemble matrices such as `fac * M - J` (or the real 2N x 2N form of the
/// complex Radau matrix) many times with the same operands but different coefficients. The union
/// pattern and the position of every source non-zero inside it are computed once, so assembly is
/// a single pass over the source values and the resulting matrices always share one symbolic
/// structure, which lets [crate::FaerSparseLU] reuse its symbolic factorisation.
#[derive(Clone, Debug)]
pub struct IterationPattern {
    dim: IndexType,
    col_ptr: Vec<IndexType>,
    row_idx: Vec<IndexType>,
    blocks: Vec<Block>,
    slots: Vec<Vec<usize>>,
    sources: Vec<SparseColMat>,
}

impl IterationPattern {
    pub fn new(
        dim: IndexType,
        sources: &[&SparseColMat],
        blocks: &[Block],
    ) -> Result<Self, DiffsolError> {
        let mut indices = Vec::new();
        for block in blocks {
            let source = sources.get(block.source).ok_or_else(|| {
                MatrixError::Other(format!("block refers to missing source {}", block.source))
            })?;
            if block.row_offset + source.nrows() > dim || block.col_offset + source.ncols() > dim {
                return Err(MatrixError::ShapeMismatch {
                    expected: (dim, dim),
                    found: (
                        block.row_offset + source.nrows(),
                        block.col_offset + source.ncols(),
                    ),
                }
                .into());
            }
            indices.extend(
                source
                    .triplet_iter()
                    .map(|(i, j, _)| (i + block.row_offset, j + block.col_offset, 1.0)),
            );
        }
        // the diagonal is always part of the pattern
        indices.extend((0..dim).map(|i| (i, i, 0.0)));
        let union = SparseColMat::try_from_triplets(dim, dim, &indices)?;
        let col_ptr = union.col_ptr();
        let row_idx = union.row_idx();
        let mut slots = Vec::with_capacity(blocks.len());
        for block in blocks {
            let source = sources[block.source];
            let mut block_slots = Vec::with_capacity(source.nnz());
            for (i, j, _) in source.triplet_iter() {
                let (row, col) = (i + block.row_offset, j + block.col_offset);
                let start = col_ptr[col];
                let end = col_ptr[col + 1];
                let offset = row_idx[start..end]
                    .binary_search(&row)
                    .map_err(|_| MatrixError::Other(format!("({row}, {col}) not in pattern")))?;
                block_slots.push(start + offset);
            }
            slots.push(block_slots);
        }
        Ok(Self {
            dim,
            col_ptr: col_ptr.to_vec(),
            row_idx: row_idx.to_vec(),
            blocks: blocks.to_vec(),
            slots,
            sources: sources.iter().map(|s| (*s).clone()).collect(),
        })
    }

    pub fn dim(&self) -> IndexType {
        self.dim
    }

    /// `true` if every source still has the pattern this union was built from.
    pub fn matches(&self, sources: &[&SparseColMat]) -> bool {
        sources.len() == self.sources.len()
            && sources
                .iter()
                .zip(self.sources.iter())
                .all(|(a, b)| a.same_pattern(b))
    }

    /// Assemble `sum_b coeffs[b] * sources[block_b.source]` placed at each block's offsets.
    pub fn assemble(
        &self,
        sources: &[&SparseColMat],
        coeffs: &[f64],
    ) -> Result<SparseColMat, DiffsolError> {
        if !self.matches(sources) || coeffs.len() != self.blocks.len() {
            return Err(MatrixError::Other(
                "iteration matrix operands do not match the cached pattern".to_string(),
            )
            .into());
        }
        let mut values = vec![0.0; self.row_idx.len()];
        for ((block, slots), coeff) in self.blocks.iter().zip(&self.slots).zip(coeffs) {
            let source = sources[block.source];
            for (slot, v) in slots.iter().zip(source.values()) {
                values[*slot] += coeff * v;
            }
        }
        let symbolic = SymbolicSparseColMat::new_checked(
            self.dim,
            self.dim,
            self.col_ptr.clone(),
            None,
            self.row_idx.clone(),
        );
        Ok(SparseColMat::from_parts(symbolic, values))
    }
}

#[cfg(test)]
mod tests {
    use super::{Block, IterationPattern};
    use crate::matrix::SparseColMat;

    #[test]
    fn real_combination() {
        let mass = SparseColMat::try_from_triplets(2, 2, &[(0, 0, 1.0)]).unwrap();
        let jac = SparseColMat::try_from_triplets(2, 2, &[(0, 1, 2.0), (1, 0, 3.0)]).unwrap();
        let pattern = IterationPattern::new(
            2,
            &[&mass, &jac],
            &[Block::new(0, 0, 0), Block::new(1, 0, 0)],
        )
        .unwrap();
        let e = pattern.assemble(&[&mass, &jac], &[4.0, -1.0]).unwrap();
        let dense = e.to_dense();
        assert_eq!(dense[(0, 0)], 4.0);
        assert_eq!(dense[(0, 1)], -2.0);
        assert_eq!(dense[(1, 0)], -3.0);
        assert_eq!(dense[(1, 1)], 0.0);
    }

    #[test]
    fn complex_block_form() {
        let mass = SparseColMat::identity(1);
        let jac = SparseColMat::try_from_triplets(1, 1, &[(0, 0, -1.0)]).unwrap();
        let blocks = [
            Block::new(0, 0, 0),
            Block::new(1, 0, 0),
            Block::new(0, 0, 1),
            Block::new(0, 1, 0),
            Block::new(0, 1, 1),
            Block::new(1, 1, 1),
        ];
        let pattern = IterationPattern::new(2, &[&mass, &jac], &blocks).unwrap();
        let (a, b) = (2.0, 3.0);
        let e = pattern
            .assemble(&[&mass, &jac], &[a, -1.0, -b, b, a, -1.0])
            .unwrap()
            .to_dense();
        assert_eq!(e[(0, 0)], 3.0);
        assert_eq!(e[(0, 1)], -3.0);
        assert_eq!(e[(1, 0)], 3.0);
        assert_eq!(e[(1, 1)], 3.0);
    }

    #[test]
    fn changed_pattern_is_detected() {
        let mass = SparseColMat::identity(2);
        let jac = SparseColMat::try_from_triplets(2, 2, &[(0, 1, 2.0)]).unwrap();
        let pattern = IterationPattern::new(
            2,
            &[&mass, &jac],
            &[Block::new(0, 0, 0), Block::new(1, 0, 0)],
        )
        .unwrap();
        let other = SparseColMat::try_from_triplets(2, 2, &[(1, 0, 2.0)]).unwrap();
        assert!(!pattern.matches(&[&mass, &other]));
        assert!(pattern.assemble(&[&mass, &other], &[1.0, 1.0]).is_err());
    }
}
