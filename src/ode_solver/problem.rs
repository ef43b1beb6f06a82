use std::fmt;

use nalgebra::DVector;

use crate::{
    error::{callback_error, CallbackResult, DiffsolError},
    matrix::Triplets,
    SparseColMat,
};

/// Right-hand side `f(x, y)`, written into a zeroed output buffer.
pub type RhsFn = dyn Fn(f64, &DVector<f64>, &mut DVector<f64>) -> CallbackResult;

/// Jacobian `df/dy (x, y)` as triplets written into a cleared assembly buffer.
pub type JacobianFn = dyn Fn(f64, &DVector<f64>, &mut Triplets) -> CallbackResult;

/// The problem `M y' = f(x, y)`.
///
/// `M` is the (possibly singular) mass matrix; zero rows of `M` encode algebraic equations.
/// A problem is immutable and is borrowed by the solver for the duration of a solve. Create one
/// with [crate::OdeBuilder].
pub struct OdeProblem {
    pub(crate) nstates: usize,
    pub(crate) rhs: Box<RhsFn>,
    pub(crate) jacobian: Option<Box<JacobianFn>>,
    pub(crate) mass: SparseColMat,
    pub(crate) use_coloring: bool,
}

impl fmt::Debug for OdeProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OdeProblem")
            .field("nstates", &self.nstates)
            .field("jacobian", &self.jacobian.is_some())
            .field("mass", &self.mass)
            .field("use_coloring", &self.use_coloring)
            .finish()
    }
}

impl OdeProblem {
    pub fn nstates(&self) -> usize {
        self.nstates
    }

    pub fn mass(&self) -> &SparseColMat {
        &self.mass
    }

    pub fn has_jacobian(&self) -> bool {
        self.jacobian.is_some()
    }

    /// Whether a numerical Jacobian groups columns by graph coloring instead of perturbing one
    /// column at a time.
    pub fn use_coloring(&self) -> bool {
        self.use_coloring
    }

    /// Evaluates the right-hand side into `f`, which is zeroed first.
    pub fn rhs(&self, x: f64, y: &DVector<f64>, f: &mut DVector<f64>) -> Result<(), DiffsolError> {
        f.fill(0.0);
        (self.rhs)(x, y, f).map_err(|e| callback_error("rhs", x, e))
    }

    /// Evaluates the analytical Jacobian into `jac`, which is cleared first.
    ///
    /// Returns `Ok(false)` if the problem has no analytical Jacobian.
    pub fn jacobian(
        &self,
        x: f64,
        y: &DVector<f64>,
        jac: &mut Triplets,
    ) -> Result<bool, DiffsolError> {
        jac.clear();
        match &self.jacobian {
            Some(jacobian) => {
                jacobian(x, y, jac).map_err(|e| callback_error("jacobian", x, e))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
