use crate::matrix::IndexType;

/// Convergence monitor of a simplified Newton iteration.
///
/// Tracks the contraction rate `theta` of consecutive increment norms and the derived factor
/// `faccon = theta / (1 - theta)`, which estimates the distance to the solution from the last
/// increment. Both persist across solves: the next solve starts from the previous `faccon`, and the
/// final `theta` of a solve tells the caller whether its Jacobian is still good enough to keep.
#[derive(Clone, Debug)]
pub struct Convergence {
    tol: f64,
    max_iter: IndexType,
    niter: IndexType,
    old_norm: f64,
    old_rate: f64,
    theta: f64,
    faccon: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConvergenceStatus {
    Converged,
    /// The iteration is converging too slowly to meet the tolerance in the remaining iterations;
    /// retry with the step size multiplied by `h_factor`.
    Diverged {
        h_factor: f64,
    },
    /// The increments stopped contracting or the iteration budget ran out.
    Failed,
    Continue,
}

impl Convergence {
    pub fn new(tol: f64, max_iter: IndexType) -> Self {
        Self {
            tol,
            max_iter,
            niter: 0,
            old_norm: f64::EPSILON,
            old_rate: 1.0,
            theta: 0.0,
            faccon: 1.0,
        }
    }

    pub fn max_iter(&self) -> IndexType {
        self.max_iter
    }

    pub fn set_max_iter(&mut self, value: IndexType) {
        self.max_iter = value;
    }

    pub fn tol(&self) -> f64 {
        self.tol
    }

    pub fn niter(&self) -> IndexType {
        self.niter
    }

    pub fn theta(&self) -> f64 {
        self.theta
    }

    /// Prepare for a new Newton solve; `theta` starts at `theta_init` so that a solve converging in
    /// a single iteration reports a fast contraction.
    pub fn reset(&mut self, theta_init: f64) {
        self.niter = 0;
        self.faccon = self.faccon.max(f64::EPSILON).powf(0.8);
        self.theta = theta_init.abs();
    }

    /// Check the scaled norm of the latest increment.
    ///
    /// On [ConvergenceStatus::Converged] and [ConvergenceStatus::Continue] the caller applies the
    /// increment; on [ConvergenceStatus::Diverged] and [ConvergenceStatus::Failed] it is discarded.
    pub fn check_norm(&mut self, norm: f64) -> ConvergenceStatus {
        self.niter += 1;
        if self.niter > 1 && self.niter < self.max_iter {
            let rate = norm / self.old_norm;
            self.theta = if self.niter == 2 {
                rate
            } else {
                (rate * self.old_rate).sqrt()
            };
            self.old_rate = rate;
            if self.theta < 0.99 {
                self.faccon = self.theta / (1.0 - self.theta);
                let remaining = (self.max_iter - 1 - self.niter) as f64;
                // predicted error after the remaining iterations
                let dyth = self.faccon * norm * self.theta.powf(remaining) / self.tol;
                if dyth >= 1.0 {
                    let qnewt = dyth.clamp(1e-4, 20.0);
                    return ConvergenceStatus::Diverged {
                        h_factor: 0.8 * qnewt.powf(-1.0 / (4.0 + remaining)),
                    };
                }
            } else {
                return ConvergenceStatus::Failed;
            }
        }
        self.old_norm = norm.max(f64::EPSILON);
        if self.faccon * norm <= self.tol {
            ConvergenceStatus::Converged
        } else if self.niter >= self.max_iter {
            ConvergenceStatus::Failed
        } else {
            ConvergenceStatus::Continue
        }
    }
}
