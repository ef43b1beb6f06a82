use ::nalgebra::DVector;

use crate::{error::DiffsolError, SparseColMat};

pub mod faer;
pub mod nalgebra;

pub use faer::sparse_lu::FaerSparseLU;
pub use nalgebra::lu::LU as NalgebraLU;

/// A solver for the linear problem `Ax = b`, where `A` is an iteration matrix assembled by one of
/// the implicit integrators.
///
/// The solver owns the factorisation of the last matrix given to [Self::set_matrix]; it is reused
/// for every subsequent solve until a new matrix is set.
pub trait LinearSolver: Default {
    /// Factorise `matrix`, discarding any previous factorisation.
    fn set_matrix(&mut self, matrix: &SparseColMat) -> Result<(), DiffsolError>;

    /// Solve the problem `Ax = b` and return the solution `x`.
    fn solve(&self, b: &DVector<f64>) -> Result<DVector<f64>, DiffsolError> {
        let mut b = b.clone();
        self.solve_in_place(&mut b)?;
        Ok(b)
    }

    fn solve_in_place(&self, b: &mut DVector<f64>) -> Result<(), DiffsolError>;

    fn is_factorised(&self) -> bool;
}
