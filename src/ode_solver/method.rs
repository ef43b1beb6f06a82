use std::{fmt, str::FromStr};

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::{controller::Controller, statistics::SolverStatistics, tolerance::Tolerances};
use crate::{
    distributed::{Communicator, Evaluator},
    error::{DiffsolError, OdeSolverError},
    matrix::Triplets,
    ode_solver_error,
};

/// The integration methods of [crate::OdeSolver].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// Explicit Euler, order 1. Fixed-step only.
    ForwardEuler,
    /// Heun's method with an embedded Euler error estimate, order 2(1).
    ModifiedEuler,
    /// Dormand-Prince 5(4) with first-same-as-last stage reuse.
    Dopri5,
    /// Implicit Euler with Newton iteration, order 1. Fixed-step only.
    BackwardEuler,
    /// Radau IIA collocation, order 5, for stiff problems and index-1 DAEs.
    Radau5,
}

impl Method {
    pub const ALL: [Method; 5] = [
        Method::ForwardEuler,
        Method::ModifiedEuler,
        Method::Dopri5,
        Method::BackwardEuler,
        Method::Radau5,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Method::ForwardEuler => "ForwardEuler",
            Method::ModifiedEuler => "ModifiedEuler",
            Method::Dopri5 => "Dopri5",
            Method::BackwardEuler => "BackwardEuler",
            Method::Radau5 => "Radau5",
        }
    }

    /// Order of the propagated solution.
    pub fn order(&self) -> usize {
        match self {
            Method::ForwardEuler | Method::BackwardEuler => 1,
            Method::ModifiedEuler => 2,
            Method::Dopri5 | Method::Radau5 => 5,
        }
    }

    /// Order `q` of the embedded error estimate, which sets the controller exponent `1/(q+1)`.
    /// `None` for methods without an error estimator.
    pub fn error_order(&self) -> Option<usize> {
        match self {
            Method::ForwardEuler | Method::BackwardEuler => None,
            Method::ModifiedEuler => Some(1),
            Method::Dopri5 => Some(4),
            Method::Radau5 => Some(3),
        }
    }

    pub fn is_adaptive(&self) -> bool {
        self.error_order().is_some()
    }

    pub fn is_implicit(&self) -> bool {
        matches!(self, Method::BackwardEuler | Method::Radau5)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = DiffsolError;

    /// Parses a method name, ignoring case, underscores and dashes. The short names `FwEuler`,
    /// `MoEuler` and `BwEuler` are accepted too.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "forwardeuler" | "fweuler" | "euler" => Ok(Method::ForwardEuler),
            "modifiedeuler" | "moeuler" | "heuneuler" | "heun" => Ok(Method::ModifiedEuler),
            "dopri5" | "dormandprince" => Ok(Method::Dopri5),
            "backwardeuler" | "bweuler" => Ok(Method::BackwardEuler),
            "radau5" | "radau" => Ok(Method::Radau5),
            _ => Err(ode_solver_error!(UnknownMethod, s)),
        }
    }
}

/// Why an integrator refused a step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RejectReason {
    /// The error estimate exceeded the tolerance.
    ErrorTest { err: f64 },
    /// Newton converged too slowly for the current step size.
    SlowConvergence,
    /// Newton stopped contracting or ran out of iterations.
    NewtonFailure,
}

/// Outcome of a single step attempt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StepResult {
    /// `y` now holds the solution at `x + h`; `h_next` is the proposed next step size.
    Accepted { h_next: f64 },
    /// `y` is unchanged; retry with `h_next`.
    Rejected { h_next: f64, reason: RejectReason },
}

/// Everything an integrator needs from the solver for one step attempt.
pub(crate) struct StepContext<'s, 'a, C: Communicator> {
    pub evaluator: &'s mut Evaluator<'a, C>,
    pub statistics: &'s mut SolverStatistics,
    pub controller: &'s mut Controller,
    pub tolerances: &'s Tolerances,
}

impl<C: Communicator> StepContext<'_, '_, C> {
    pub fn rhs(
        &mut self,
        x: f64,
        y: &DVector<f64>,
        f: &mut DVector<f64>,
    ) -> Result<(), DiffsolError> {
        self.evaluator.rhs(x, y, f)?;
        self.statistics.number_of_function_evaluations += 1;
        Ok(())
    }

    /// `f0` must hold `f(x, y)`.
    pub fn jacobian(
        &mut self,
        x: f64,
        y: &DVector<f64>,
        f0: &DVector<f64>,
        jac: &mut Triplets,
    ) -> Result<(), DiffsolError> {
        let evaluations = self.evaluator.jacobian(x, y, f0, jac)?;
        self.statistics.number_of_function_evaluations += evaluations;
        self.statistics.number_of_jacobian_evaluations += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Method;

    #[test]
    fn parse_method_names() {
        for method in Method::ALL {
            assert_eq!(method.name().parse::<Method>().unwrap(), method);
        }
        assert_eq!("radau_5".parse::<Method>().unwrap(), Method::Radau5);
        assert_eq!("FwEuler".parse::<Method>().unwrap(), Method::ForwardEuler);
        assert_eq!("bw-euler".parse::<Method>().unwrap(), Method::BackwardEuler);
        assert!("rk45".parse::<Method>().is_err());
    }

    #[test]
    fn fixed_step_only_methods() {
        let adaptive = Method::ALL
            .iter()
            .filter(|m| m.is_adaptive())
            .collect::<Vec<_>>();
        assert_eq!(
            adaptive,
            vec![&Method::ModifiedEuler, &Method::Dopri5, &Method::Radau5]
        );
    }
}
