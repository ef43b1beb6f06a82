use nalgebra::DVector;

use crate::{
    error::{CallbackResult, DiffsolError, OdeSolverError},
    matrix::Triplets,
    ode_solver::problem::{JacobianFn, OdeProblem, RhsFn},
    ode_solver_error, SparseColMat,
};

/// Builder for ODE and DAE problems. Set the callbacks and then call [OdeBuilder::build].
///
/// # Example
///
/// ```rust
/// use radsol::{OdeBuilder, Triplets};
///
/// // y0' = -y0, 0 = y1 - y0
/// let mut mass = Triplets::new(2, 2);
/// mass.put(0, 0, 1.0);
/// let problem = OdeBuilder::new(2)
///     .rhs(|_x, y, f| {
///         f[0] = -y[0];
///         f[1] = y[1] - y[0];
///         Ok(())
///     })
///     .jacobian(|_x, _y, jac| {
///         jac.put(0, 0, -1.0);
///         jac.put(1, 0, -1.0);
///         jac.put(1, 1, 1.0);
///         Ok(())
///     })
///     .mass(mass)
///     .build()
///     .unwrap();
/// assert_eq!(problem.nstates(), 2);
/// ```
pub struct OdeBuilder {
    nstates: usize,
    rhs: Option<Box<RhsFn>>,
    jacobian: Option<Box<JacobianFn>>,
    mass: Option<Triplets>,
    use_coloring: bool,
}

impl OdeBuilder {
    /// Create a new builder for a problem with `nstates` states.
    ///
    /// Without a mass matrix the problem is the explicit ODE `y' = f(x, y)`; without a Jacobian
    /// callback the implicit methods use finite differences.
    pub fn new(nstates: usize) -> Self {
        Self {
            nstates,
            rhs: None,
            jacobian: None,
            mass: None,
            use_coloring: false,
        }
    }

    pub fn rhs<F>(mut self, rhs: F) -> Self
    where
        F: Fn(f64, &DVector<f64>, &mut DVector<f64>) -> CallbackResult + 'static,
    {
        self.rhs = Some(Box::new(rhs));
        self
    }

    pub fn jacobian<F>(mut self, jacobian: F) -> Self
    where
        F: Fn(f64, &DVector<f64>, &mut Triplets) -> CallbackResult + 'static,
    {
        self.jacobian = Some(Box::new(jacobian));
        self
    }

    pub fn mass(mut self, mass: Triplets) -> Self {
        self.mass = Some(mass);
        self
    }

    /// Detect the Jacobian sparsity and use graph coloring for finite-difference Jacobians.
    pub fn use_coloring(mut self, use_coloring: bool) -> Self {
        self.use_coloring = use_coloring;
        self
    }

    pub fn build(self) -> Result<OdeProblem, DiffsolError> {
        if self.nstates == 0 {
            return Err(ode_solver_error!(
                BuilderError,
                "problem must have at least one state"
            ));
        }
        let rhs = self
            .rhs
            .ok_or_else(|| ode_solver_error!(BuilderError, "rhs function not set"))?;
        let mass = match self.mass {
            Some(mass) => {
                if mass.nrows() != self.nstates || mass.ncols() != self.nstates {
                    return Err(ode_solver_error!(
                        BuilderError,
                        format!(
                            "mass matrix is {}x{} but the problem has {} states",
                            mass.nrows(),
                            mass.ncols(),
                            self.nstates
                        )
                    ));
                }
                SparseColMat::try_from_assembly(&mass)?
            }
            None => SparseColMat::identity(self.nstates),
        };
        Ok(OdeProblem {
            nstates: self.nstates,
            rhs,
            jacobian: self.jacobian,
            mass,
            use_coloring: self.use_coloring,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::OdeBuilder;
    use crate::{
        error::{DiffsolError, MatrixError, OdeSolverError},
        matrix::Triplets,
    };

    #[test]
    fn missing_rhs_is_an_error() {
        let err = OdeBuilder::new(2).build().unwrap_err();
        assert!(matches!(
            err,
            DiffsolError::OdeSolverError(OdeSolverError::BuilderError(_))
        ));
    }

    #[test]
    fn malformed_mass_is_an_error() {
        let mut mass = Triplets::new(2, 2);
        mass.put(0, 5, 1.0);
        let err = OdeBuilder::new(2)
            .rhs(|_x, _y, _f| Ok(()))
            .mass(mass)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            DiffsolError::MatrixError(MatrixError::IndexOutOfBounds { col: 5, .. })
        ));
    }

    #[test]
    fn callback_failures_carry_context() {
        let problem = OdeBuilder::new(1)
            .rhs(|x, _y, _f| {
                if x > 1.0 {
                    Err("out of range".into())
                } else {
                    Ok(())
                }
            })
            .build()
            .unwrap();
        assert!(problem.mass().is_identity());
        let y = nalgebra::DVector::zeros(1);
        let mut f = nalgebra::DVector::zeros(1);
        problem.rhs(0.5, &y, &mut f).unwrap();
        match problem.rhs(2.0, &y, &mut f).unwrap_err() {
            DiffsolError::CallbackError { context, x, .. } => {
                assert_eq!(context, "rhs");
                assert_eq!(x, 2.0);
            }
            e => panic!("unexpected error {e}"),
        }
    }
}
