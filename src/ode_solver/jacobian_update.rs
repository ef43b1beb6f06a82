use super::config::SolverConfig;

/// Decides when the implicit integrators re-evaluate the Jacobian and re-factorise their
/// iteration matrices.
///
/// The Jacobian is kept across accepted steps while Newton contracts quickly (`theta <=
/// theta_max`). The factorisations depend on the Jacobian and on `h`; they are kept while neither
/// changes. To make that happen more often, a proposed step size within `[quot1, quot2] * h` is
/// replaced by `h` itself. After a rejected attempt the Jacobian is refreshed unless it was
/// evaluated at the current state already.
#[derive(Clone, Debug)]
pub struct JacobianUpdate {
    theta_max: f64,
    quot1: f64,
    quot2: f64,
    refresh_jacobian: bool,
    jacobian_is_current: bool,
    factorised_h: Option<f64>,
}

impl JacobianUpdate {
    pub fn new(config: &SolverConfig) -> Self {
        Self {
            theta_max: config.theta_max,
            quot1: config.quot1,
            quot2: config.quot2,
            refresh_jacobian: true,
            jacobian_is_current: false,
            factorised_h: None,
        }
    }

    pub fn reset(&mut self) {
        self.refresh_jacobian = true;
        self.jacobian_is_current = false;
        self.factorised_h = None;
    }

    pub fn theta_max(&self) -> f64 {
        self.theta_max
    }

    pub fn check_jacobian_update(&self) -> bool {
        self.refresh_jacobian
    }

    /// The Jacobian was evaluated at the current state; the factorisations are stale.
    pub fn update_jacobian(&mut self) {
        self.refresh_jacobian = false;
        self.jacobian_is_current = true;
        self.factorised_h = None;
    }

    pub fn check_factorisation_update(&self, h: f64) -> bool {
        self.factorised_h != Some(h)
    }

    pub fn update_factorisation(&mut self, h: f64) {
        self.factorised_h = Some(h);
    }

    /// Records an accepted step of size `h` whose Newton iteration ended with contraction rate
    /// `theta`, and returns the step size to propose instead of `h_new`.
    pub fn step_accepted(&mut self, h: f64, h_new: f64, theta: f64) -> f64 {
        self.jacobian_is_current = false;
        if theta <= self.theta_max {
            let ratio = h_new / h;
            if ratio >= self.quot1 && ratio <= self.quot2 {
                return h;
            }
        } else {
            self.refresh_jacobian = true;
        }
        h_new
    }

    pub fn step_rejected(&mut self) {
        if !self.jacobian_is_current {
            self.refresh_jacobian = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::JacobianUpdate;
    use crate::{Method, SolverConfig};

    #[test]
    fn reuse_policy() {
        let mut update = JacobianUpdate::new(&SolverConfig::new(Method::Radau5));
        assert!(update.check_jacobian_update());
        update.update_jacobian();
        assert!(!update.check_jacobian_update());
        assert!(update.check_factorisation_update(0.1));
        update.update_factorisation(0.1);
        assert!(!update.check_factorisation_update(0.1));

        // small growth with fast convergence keeps both h and the factorisation
        assert_eq!(update.step_accepted(0.1, 0.11, 1e-4), 0.1);
        assert!(!update.check_factorisation_update(0.1));
        assert!(!update.check_jacobian_update());

        // a rejection refreshes the Jacobian, which is no longer current
        update.step_rejected();
        assert!(update.check_jacobian_update());
        update.update_jacobian();
        assert!(update.check_factorisation_update(0.1));

        // a second rejection at the same state keeps the fresh Jacobian
        update.step_rejected();
        assert!(!update.check_jacobian_update());

        // slow convergence refreshes the Jacobian on the next step
        assert_eq!(update.step_accepted(0.1, 0.3, 0.5), 0.3);
        assert!(update.check_jacobian_update());
    }
}
