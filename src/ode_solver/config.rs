use serde::{Deserialize, Serialize};

use super::method::Method;
use crate::{
    error::{DiffsolError, OdeSolverError},
    ode_solver_error,
};

/// Numerical options of [crate::OdeSolver].
///
/// Create one with [SolverConfig::new], which fills in the defaults for the chosen method, and
/// override individual fields as needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    pub method: Method,
    /// Safety factor applied to the optimal step size.
    pub safety: f64,
    /// Smallest step-size ratio `h_new / h`.
    pub facmin: f64,
    /// Largest step-size ratio `h_new / h`.
    pub facmax: f64,
    /// Lund stabilisation exponent for the explicit methods; 0 gives the elementary controller.
    pub lund_beta: f64,
    /// Gustafsson predictive control for Radau5.
    pub predictive: bool,
    /// The adaptive solve fails once the step size drops below this value.
    pub h_min: f64,
    pub h_max: f64,
    /// Step attempts allowed per solve, accepted or not.
    pub max_steps: usize,
    pub max_newton_iterations: usize,
    /// Consecutive Newton failures tolerated before the solve is abandoned.
    pub max_newton_failures: usize,
    /// Keep the Jacobian after an accepted step while the Newton contraction rate is at most
    /// this value.
    pub theta_max: f64,
    /// Keep the factorised iteration matrices (and the step size) while `h_new / h` lies in
    /// `[quot1, quot2]`.
    pub quot1: f64,
    pub quot2: f64,
    /// Replaces the Newton tolerance derived from the relative tolerance.
    pub newton_tolerance: Option<f64>,
    /// Record every accepted step in the trajectory.
    pub save_trajectory: bool,
}

impl SolverConfig {
    pub fn new(method: Method) -> Self {
        let facmax = if method == Method::Radau5 { 8.0 } else { 10.0 };
        let max_newton_iterations = if method == Method::BackwardEuler {
            10
        } else {
            7
        };
        Self {
            method,
            safety: 0.9,
            facmin: 0.2,
            facmax,
            lund_beta: 0.0,
            predictive: true,
            h_min: 1e-10,
            h_max: f64::INFINITY,
            max_steps: 1000,
            max_newton_iterations,
            max_newton_failures: 10,
            theta_max: 1e-3,
            quot1: 1.0,
            quot2: 1.2,
            newton_tolerance: None,
            save_trajectory: false,
        }
    }

    pub fn validate(&self) -> Result<(), DiffsolError> {
        let checks = [
            (self.safety > 0.0 && self.safety <= 1.0, "safety must lie in (0, 1]"),
            (
                self.facmin > 0.0 && self.facmin <= 1.0,
                "facmin must lie in (0, 1]",
            ),
            (self.facmax >= 1.0, "facmax must be at least 1"),
            (
                (0.0..0.2).contains(&self.lund_beta),
                "lund_beta must lie in [0, 0.2)",
            ),
            (self.h_min >= 0.0, "h_min must not be negative"),
            (self.h_max > self.h_min, "h_max must exceed h_min"),
            (self.max_steps > 0, "max_steps must be positive"),
            (
                self.max_newton_iterations > 0,
                "max_newton_iterations must be positive",
            ),
            (
                self.theta_max > 0.0 && self.theta_max < 1.0,
                "theta_max must lie in (0, 1)",
            ),
            (
                self.quot1 <= 1.0 && self.quot2 >= 1.0,
                "quot1 <= 1 <= quot2 is required",
            ),
            (
                self.newton_tolerance.map_or(true, |t| t > 0.0),
                "newton_tolerance must be positive",
            ),
        ];
        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, msg)) => Err(ode_solver_error!(InvalidConfig, msg)),
            None => Ok(()),
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self::new(Method::Dopri5)
    }
}

#[cfg(test)]
mod tests {
    use super::SolverConfig;
    use crate::Method;

    #[test]
    fn defaults_are_valid() {
        for method in Method::ALL {
            SolverConfig::new(method).validate().unwrap();
        }
        assert_eq!(SolverConfig::new(Method::Radau5).facmax, 8.0);
        assert_eq!(SolverConfig::default().method, Method::Dopri5);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = SolverConfig::new(Method::Dopri5);
        config.facmin = 2.0;
        assert!(config.validate().is_err());
        let mut config = SolverConfig::new(Method::Radau5);
        config.quot2 = 0.5;
        assert!(config.validate().is_err());
    }
}
