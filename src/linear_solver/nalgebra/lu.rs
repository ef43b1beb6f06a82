use nalgebra::{DVector, Dyn};

use crate::{
    error::{DiffsolError, LinearSolverError},
    linear_solver_error, LinearSolver, SparseColMat,
};

/// A [LinearSolver] backed by the dense LU decomposition of
/// [`nalgebra`](https://nalgebra.org/).
///
/// The sparse iteration matrix is densified before factorisation, which is the cheaper option
/// for small problems.
#[derive(Clone, Default)]
pub struct LU {
    lu: Option<nalgebra::LU<f64, Dyn, Dyn>>,
    nrows: usize,
}

impl LinearSolver for LU {
    fn set_matrix(&mut self, matrix: &SparseColMat) -> Result<(), DiffsolError> {
        if matrix.nrows() != matrix.ncols() {
            return Err(linear_solver_error!(LinearSolverMatrixNotSquare));
        }
        let lu = matrix.to_dense().lu();
        if !lu.is_invertible() {
            self.lu = None;
            return Err(linear_solver_error!(LuSolveFailed));
        }
        self.lu = Some(lu);
        self.nrows = matrix.nrows();
        Ok(())
    }

    fn solve_in_place(&self, b: &mut DVector<f64>) -> Result<(), DiffsolError> {
        let lu = match self.lu.as_ref() {
            Some(lu) => lu,
            None => return Err(linear_solver_error!(LuNotInitialized)),
        };
        if b.len() != self.nrows {
            return Err(linear_solver_error!(LinearSolverMatrixVectorNotCompatible {
                expected: self.nrows,
                found: b.len(),
            }));
        }
        match lu.solve_mut(b) {
            true => Ok(()),
            false => Err(linear_solver_error!(LuSolveFailed)),
        }
    }

    fn is_factorised(&self) -> bool {
        self.lu.is_some()
    }
}
