use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::{
    error::{DiffsolError, LinearSolverError},
    linear_solver::LinearSolver,
    linear_solver_error,
    matrix::IndexType,
    SparseColMat,
};

use faer::{
    linalg::solvers::Solve,
    reborrow::Reborrow,
    sparse::linalg::{solvers::Lu, solvers::SymbolicLu},
    Col,
};
use nalgebra::DVector;

/// A [LinearSolver] backed by the sparse LU decomposition of
/// [`faer`](https://github.com/sarah-ek/faer-rs).
///
/// The symbolic analysis is kept between calls to [LinearSolver::set_matrix] as long as the
/// sparsity pattern does not change, so refactorising an iteration matrix with new values only
/// repeats the numeric phase.
pub struct FaerSparseLU {
    lu: Option<Lu<IndexType, f64>>,
    lu_symbolic: Option<SymbolicLu<IndexType>>,
    pattern: Option<(Vec<IndexType>, Vec<IndexType>)>,
    nrows: usize,
    symbolic_factorisations: usize,
}

impl Default for FaerSparseLU {
    fn default() -> Self {
        Self {
            lu: None,
            lu_symbolic: None,
            pattern: None,
            nrows: 0,
            symbolic_factorisations: 0,
        }
    }
}

impl FaerSparseLU {
    /// Number of symbolic analyses performed so far.
    pub fn symbolic_factorisations(&self) -> usize {
        self.symbolic_factorisations
    }

    fn pattern_is_cached(&self, matrix: &SparseColMat) -> bool {
        match &self.pattern {
            Some((col_ptr, row_idx)) => {
                self.nrows == matrix.nrows()
                    && col_ptr.as_slice() == matrix.col_ptr()
                    && row_idx.as_slice() == matrix.row_idx()
            }
            None => false,
        }
    }
}

impl LinearSolver for FaerSparseLU {
    fn set_matrix(&mut self, matrix: &SparseColMat) -> Result<(), DiffsolError> {
        if matrix.nrows() != matrix.ncols() {
            return Err(linear_solver_error!(LinearSolverMatrixNotSquare));
        }
        self.lu = None;
        if self.lu_symbolic.is_none() || !self.pattern_is_cached(matrix) {
            let symbolic = SymbolicLu::try_new(matrix.faer().symbolic())
                .map_err(|e| linear_solver_error!(Other, format!("{e:?}")))?;
            self.lu_symbolic = Some(symbolic);
            self.pattern = Some((matrix.col_ptr().to_vec(), matrix.row_idx().to_vec()));
            self.nrows = matrix.nrows();
            self.symbolic_factorisations += 1;
        }
        let symbolic = self
            .lu_symbolic
            .as_ref()
            .ok_or_else(|| linear_solver_error!(LuNotInitialized))?;
        // the numeric phase panics on a zero pivot instead of returning an error
        let lu = catch_unwind(AssertUnwindSafe(|| {
            Lu::try_new_with_symbolic(symbolic.clone(), matrix.faer().rb())
        }))
        .map_err(|_| linear_solver_error!(SingularMatrix))?
        .map_err(|e| linear_solver_error!(Other, format!("{e:?}")))?;
        self.lu = Some(lu);
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
        let mut x = Col::<f64>::from_fn(b.len(), |i| b[i]);
        lu.solve_in_place(&mut x);
        for i in 0..b.len() {
            if !x[i].is_finite() {
                return Err(linear_solver_error!(LuSolveFailed));
            }
            b[i] = x[i];
        }
        Ok(())
    }

    fn is_factorised(&self) -> bool {
        self.lu.is_some()
    }
}
