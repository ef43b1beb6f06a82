//! # radsol
//!
//! Adaptive integrators for problems of the form
//!
//! ```text
//! M y' = f(x, y),  y(xa) = y0
//! ```
//!
//! where the mass matrix `M` may be singular (differential-algebraic equations of index 1).
//!
//! The explicit methods ([Method::Dopri5], [Method::ModifiedEuler], [Method::ForwardEuler]) are
//! embedded Runge-Kutta schemes defined by a [Tableau]. The implicit methods ([Method::Radau5],
//! [Method::BackwardEuler]) solve their stage equations with a simplified Newton iteration on
//! sparse iteration matrices assembled from `M` and the Jacobian; the Jacobian is either supplied
//! by the user or computed by finite differences with column coloring.
//!
//! Problems are described with [OdeBuilder] and solved with [OdeSolver]. The right-hand side may
//! be split over several cooperating workers through the [distributed] module, in which case every
//! worker runs its own [OdeSolver] and all of them produce the same result as a serial solve.
//!
//! The library logs through the [log] facade and installs no logger of its own.

pub mod distributed;
pub mod error;
pub mod jacobian;
pub mod linear_solver;
pub mod matrix;
pub mod nonlinear_solver;
pub mod ode_solver;

pub use distributed::{Communicator, Evaluator, LocalCommunicator, Partition, SerialCommunicator};
pub use error::{
    CallbackError, CallbackResult, DiffsolError, DistributedError, LinearSolverError, MatrixError,
    NonLinearSolverError, OdeSolverError,
};
pub use linear_solver::{FaerSparseLU, LinearSolver, NalgebraLU};
pub use matrix::{SparseColMat, Triplets};
pub use ode_solver::{
    Method, OdeBuilder, OdeProblem, OdeSolver, RejectReason, SolverConfig, SolverStatistics,
    StepResult, Tableau, Tolerance, Tolerances, Trajectory,
};

#[cfg(test)]
mod tests {
    use nalgebra::DVector;

    use crate::{Method, OdeBuilder, OdeSolver, SolverConfig, Tolerances, Triplets};

    // WARNING: if this test fails and you make a change to the code, you should update the README.md file as well!!!
    #[test]
    fn test_readme() {
        // Robertson's chemical kinetics as a DAE: the third equation is the mass balance
        let mut mass = Triplets::new(3, 3);
        mass.put(0, 0, 1.0);
        mass.put(1, 1, 1.0);
        let problem = OdeBuilder::new(3)
            .rhs(|_x, y, f| {
                f[0] = -0.04 * y[0] + 1.0e4 * y[1] * y[2];
                f[1] = 0.04 * y[0] - 1.0e4 * y[1] * y[2] - 3.0e7 * y[1] * y[1];
                f[2] = y[0] + y[1] + y[2] - 1.0;
                Ok(())
            })
            .jacobian(|_x, y, jac| {
                jac.put(0, 0, -0.04);
                jac.put(0, 1, 1.0e4 * y[2]);
                jac.put(0, 2, 1.0e4 * y[1]);
                jac.put(1, 0, 0.04);
                jac.put(1, 1, -1.0e4 * y[2] - 6.0e7 * y[1]);
                jac.put(1, 2, -1.0e4 * y[1]);
                jac.put(2, 0, 1.0);
                jac.put(2, 1, 1.0);
                jac.put(2, 2, 1.0);
                Ok(())
            })
            .mass(mass)
            .build()
            .unwrap();

        let config = SolverConfig::new(Method::Radau5);
        let tolerances = Tolerances::new(vec![1e-8, 1e-10, 1e-8], 1e-6);
        let mut solver = OdeSolver::new(&problem, config, tolerances).unwrap();
        let mut y = DVector::from_vec(vec![1.0, 0.0, 0.0]);
        solver.solve(&mut y, 0.0, 0.4, 1e-6, false).unwrap();

        assert!((y[0] - 0.985_172_1).abs() < 1e-5);
        assert!((y.sum() - 1.0).abs() < 1e-10);
        println!("{:?}", solver.statistics());
    }
}
