use std::fmt::Debug;

use faer::sparse::{SymbolicSparseColMat, Triplet};
use nalgebra::DVector;

use super::{IndexType, Triplets};
use crate::error::{DiffsolError, MatrixError};
use crate::matrix_error;

/// Compressed sparse column matrix backed by [faer::sparse::SparseColMat].
///
/// Used for the mass matrix, the Jacobian and the iteration matrices of the implicit methods.
/// Row indices within each column are sorted and unique.
pub struct SparseColMat(faer::sparse::SparseColMat<IndexType, f64>);

impl Debug for SparseColMat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl Clone for SparseColMat {
    fn clone(&self) -> Self {
        Self(faer::sparse::SparseColMat::new(
            self.0.symbolic().to_owned().expect("cloning a valid pattern"),
            self.0.val().to_vec(),
        ))
    }
}

impl SparseColMat {
    pub fn faer(&self) -> &faer::sparse::SparseColMat<IndexType, f64> {
        &self.0
    }

    pub(crate) fn from_parts(symbolic: SymbolicSparseColMat<IndexType>, values: Vec<f64>) -> Self {
        Self(faer::sparse::SparseColMat::new(symbolic, values))
    }

    /// Assemble a matrix from `(row, col, value)` triplets; duplicate entries are summed.
    ///
    /// Out-of-range indices and non-finite values are reported as [MatrixError]s.
    pub fn try_from_triplets(
        nrows: IndexType,
        ncols: IndexType,
        triplets: &[(IndexType, IndexType, f64)],
    ) -> Result<Self, DiffsolError> {
        let mut entries = Vec::with_capacity(triplets.len());
        for &(row, col, val) in triplets {
            if row >= nrows || col >= ncols {
                return Err(matrix_error!(IndexOutOfBounds {
                    row,
                    col,
                    nrows,
                    ncols
                }));
            }
            if !val.is_finite() {
                return Err(matrix_error!(NonFiniteEntry { row, col }));
            }
            entries.push(Triplet::new(row, col, val));
        }
        match faer::sparse::SparseColMat::try_new_from_triplets(nrows, ncols, entries.as_slice()) {
            Ok(mat) => Ok(Self(mat)),
            Err(e) => Err(DiffsolError::from(
                MatrixError::FailedToCreateMatrixFromTriplets(e),
            )),
        }
    }

    pub fn try_from_assembly(triplets: &Triplets) -> Result<Self, DiffsolError> {
        Self::try_from_triplets(triplets.nrows(), triplets.ncols(), triplets.entries())
    }

    pub fn identity(n: IndexType) -> Self {
        let diagonal = (0..n).map(|i| (i, i, 1.0)).collect::<Vec<_>>();
        Self::try_from_triplets(n, n, &diagonal).expect("identity entries are in range")
    }

    pub fn zeros(nrows: IndexType, ncols: IndexType) -> Self {
        Self::try_from_triplets(nrows, ncols, &[]).expect("empty matrix is valid")
    }

    pub fn nrows(&self) -> IndexType {
        self.0.nrows()
    }

    pub fn ncols(&self) -> IndexType {
        self.0.ncols()
    }

    pub fn nnz(&self) -> usize {
        self.0.val().len()
    }

    pub fn values(&self) -> &[f64] {
        self.0.val()
    }

    pub fn col_ptr(&self) -> &[IndexType] {
        self.0.symbolic().col_ptr()
    }

    pub fn row_idx(&self) -> &[IndexType] {
        self.0.row_idx()
    }

    pub fn same_pattern(&self, other: &SparseColMat) -> bool {
        self.nrows() == other.nrows()
            && self.ncols() == other.ncols()
            && self.col_ptr() == other.col_ptr()
            && self.row_idx() == other.row_idx()
    }

    /// `true` if the matrix is the identity, which lets callers skip mass-matrix products.
    pub fn is_identity(&self) -> bool {
        self.nrows() == self.ncols()
            && self.nnz() == self.nrows()
            && self.triplet_iter().all(|(i, j, v)| i == j && *v == 1.0)
    }

    pub fn triplet_iter(&self) -> impl Iterator<Item = (IndexType, IndexType, &f64)> {
        (0..self.ncols()).flat_map(move |j| {
            self.0.col_range(j).map(move |i| {
                let row = self.0.row_idx()[i];
                (row, j, &self.0.val()[i])
            })
        })
    }

    /// y = alpha * A x + beta * y
    pub fn gemv(&self, alpha: f64, x: &DVector<f64>, beta: f64, y: &mut DVector<f64>) {
        if beta == 0.0 {
            y.fill(0.0);
        } else if beta != 1.0 {
            *y *= beta;
        }
        for (i, j, v) in self.triplet_iter() {
            y[i] += alpha * v * x[j];
        }
    }

    pub fn to_dense(&self) -> nalgebra::DMatrix<f64> {
        let mut dense = nalgebra::DMatrix::zeros(self.nrows(), self.ncols());
        for (i, j, v) in self.triplet_iter() {
            dense[(i, j)] += *v;
        }
        dense
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DVector;

    use super::SparseColMat;
    use crate::error::{DiffsolError, MatrixError};

    #[test]
    fn triplets_are_summed_and_multiplied() {
        let m = SparseColMat::try_from_triplets(
            2,
            2,
            &[(0, 0, 1.0), (1, 1, 2.0), (0, 0, 1.0), (1, 0, -1.0)],
        )
        .unwrap();
        assert_eq!(m.nnz(), 3);
        let x = DVector::from_vec(vec![1.0, 3.0]);
        let mut y = DVector::from_vec(vec![10.0, 10.0]);
        m.gemv(1.0, &x, 0.0, &mut y);
        assert_eq!(y.as_slice(), &[2.0, 5.0]);
        m.gemv(2.0, &x, 1.0, &mut y);
        assert_eq!(y.as_slice(), &[6.0, 15.0]);
    }

    #[test]
    fn malformed_triplets_are_errors() {
        let err = SparseColMat::try_from_triplets(2, 2, &[(2, 0, 1.0)]).unwrap_err();
        assert!(matches!(
            err,
            DiffsolError::MatrixError(MatrixError::IndexOutOfBounds { row: 2, .. })
        ));
        let err = SparseColMat::try_from_triplets(2, 2, &[(0, 0, f64::NAN)]).unwrap_err();
        assert!(matches!(
            err,
            DiffsolError::MatrixError(MatrixError::NonFiniteEntry { .. })
        ));
    }

    #[test]
    fn identity_is_detected() {
        assert!(SparseColMat::identity(3).is_identity());
        let m = SparseColMat::try_from_triplets(2, 2, &[(0, 0, 1.0), (1, 1, 0.0)]).unwrap();
        assert!(!m.is_identity());
    }
}
