use log::trace;

use super::config::SolverConfig;
use crate::{
    error::{DiffsolError, OdeSolverError},
    ode_solver_error,
};

/// Step-size selection from a scalar error norm.
///
/// The next step size is `h * min(facmax, max(facmin, safety * err^(-1/(q+1))))`, where `q` is the
/// order of the error estimate. Directly after a rejection `facmax` is 1. Explicit methods may add
/// Lund stabilisation (`lund_beta > 0`); implicit methods use Gustafsson's predictive controller,
/// which limits growth using the previous accepted step.
#[derive(Clone, Debug)]
pub struct Controller {
    safety: f64,
    facmin: f64,
    facmax: f64,
    beta: f64,
    predictive: bool,
    h_min: f64,
    h_max: f64,
    exponent: f64,
    last_rejected: bool,
    err_old: f64,
    accepted: Option<(f64, f64)>,
}

impl Controller {
    pub fn new(config: &SolverConfig, error_order: usize) -> Self {
        Self {
            safety: config.safety,
            facmin: config.facmin,
            facmax: config.facmax,
            beta: if config.method.is_implicit() {
                0.0
            } else {
                config.lund_beta
            },
            predictive: config.predictive && config.method.is_implicit(),
            h_min: config.h_min,
            h_max: config.h_max,
            exponent: 1.0 / (error_order + 1) as f64,
            last_rejected: false,
            err_old: 1e-4,
            accepted: None,
        }
    }

    pub fn reset(&mut self) {
        self.last_rejected = false;
        self.err_old = 1e-4;
        self.accepted = None;
    }

    pub fn safety(&self) -> f64 {
        self.safety
    }

    pub fn h_max(&self) -> f64 {
        self.h_max
    }

    pub fn last_rejected(&self) -> bool {
        self.last_rejected
    }

    /// A step passes the error test iff its scaled error norm is at most 1.
    pub fn accepts(err: f64) -> bool {
        err <= 1.0
    }

    /// Fails if `h` is below `h_min` or too small to change `x`.
    pub fn check(&self, x: f64, h: f64) -> Result<(), DiffsolError> {
        if h < self.h_min || 0.1 * h <= x.abs() * f64::EPSILON {
            return Err(ode_solver_error!(StepSizeTooSmall { x, h }));
        }
        Ok(())
    }

    fn factor(&self, err: f64, safety: f64, facmax: f64) -> f64 {
        if !err.is_finite() {
            return self.facmin;
        }
        let err = err.max(1e-10);
        let mut fac = safety * err.powf(-(self.exponent - 0.75 * self.beta));
        if self.beta > 0.0 {
            fac *= self.err_old.powf(self.beta);
        }
        fac.max(self.facmin).min(facmax)
    }

    /// Next step size after accepting a step of size `h` with error norm `err <= 1`.
    ///
    /// `safety` may be lower than the configured one, e.g. when Newton needed many iterations.
    pub fn accept(&mut self, h: f64, err: f64, safety: f64) -> f64 {
        let facmax = if self.last_rejected { 1.0 } else { self.facmax };
        let mut fac = self.factor(err, safety, facmax);
        if self.predictive {
            let err = err.max(1e-10);
            if let Some((h_acc, err_acc)) = self.accepted {
                let gus = self.safety * (h / h_acc) * (err_acc / (err * err)).powf(self.exponent);
                fac = fac.min(gus.max(self.facmin).min(facmax));
            }
            self.accepted = Some((h, err.max(1e-2)));
        }
        self.err_old = err.max(1e-4);
        self.last_rejected = false;
        let h_new = (h * fac).min(self.h_max);
        trace!("accepted h = {h:e} with err = {err:.3e}, next h = {h_new:e}");
        h_new
    }

    /// Smaller step size after rejecting a step of size `h` with error norm `err > 1`.
    pub fn reject(&mut self, h: f64, err: f64, safety: f64) -> f64 {
        let fac = self.factor(err, safety, 1.0);
        self.last_rejected = true;
        let h_new = h * fac;
        trace!("rejected h = {h:e} with err = {err:.3e}, retry with h = {h_new:e}");
        h_new
    }

    /// Marks the last attempt as rejected without an error estimate (e.g. Newton failure).
    pub fn mark_rejected(&mut self) {
        self.last_rejected = true;
    }
}

#[cfg(test)]
mod tests {
    use super::Controller;
    use crate::{
        error::{DiffsolError, OdeSolverError},
        Method, SolverConfig,
    };

    fn controller(q: usize) -> Controller {
        let mut config = SolverConfig::new(Method::Dopri5);
        config.predictive = false;
        Controller::new(&config, q)
    }

    #[test]
    fn elementary_controller() {
        let mut c = controller(4);
        // err = 0.9^5 gives the unit ratio
        let h = c.accept(0.1, 0.9_f64.powi(5), 0.9);
        assert!((h - 0.1).abs() < 1e-15);
        // tiny errors are capped by facmax
        assert_eq!(c.accept(0.1, 0.0, 0.9), 0.1 * 10.0);
    }

    #[test]
    fn rejection_shrinks_and_blocks_growth() {
        let mut c = controller(4);
        let h = c.reject(1.0, 100.0, 0.9);
        assert!(h < 1.0);
        assert!(h >= 0.2);
        assert!(c.last_rejected());
        // no growth directly after a rejection
        assert_eq!(c.accept(h, 1e-8, 0.9), h);
        assert!(!c.last_rejected());
        assert!(c.accept(h, 1e-8, 0.9) > h);
    }

    #[test]
    fn unit_error_is_accepted() {
        assert!(Controller::accepts(0.0));
        assert!(Controller::accepts(1.0));
        assert!(!Controller::accepts(1.0 + f64::EPSILON));
        assert!(!Controller::accepts(f64::NAN));
    }

    #[test]
    fn step_size_limits() {
        let mut config = SolverConfig::new(Method::Dopri5);
        config.h_max = 0.5;
        let mut c = Controller::new(&config, 4);
        assert_eq!(c.accept(0.4, 1e-6, 0.9), 0.5);
        assert!(c.check(1.0, 1e-3).is_ok());
        assert!(matches!(
            c.check(2.0, 1e-12),
            Err(DiffsolError::OdeSolverError(
                OdeSolverError::StepSizeTooSmall { x, h }
            )) if x == 2.0 && h == 1e-12
        ));
        // step below the resolution of x
        config.h_min = 0.0;
        let c = Controller::new(&config, 4);
        assert!(c.check(1e10, 1e-7).is_err());
    }

    #[test]
    fn predictive_control_limits_growth() {
        let config = SolverConfig::new(Method::Radau5);
        let mut c = Controller::new(&config, 3);
        let mut plain = controller(3);
        c.accept(0.1, 0.01, 0.9);
        plain.accept(0.1, 0.01, 0.9);
        // the error grew with the step size
        let predicted = c.accept(0.2, 0.5, 0.9);
        let elementary = plain.accept(0.2, 0.5, 0.9);
        assert!(predicted < elementary);
        assert!(predicted < 0.2);
    }
}
