use log::warn;
use nalgebra::DVector;

use super::{
    config::SolverConfig,
    jacobian_update::JacobianUpdate,
    method::{RejectReason, StepContext, StepResult},
    tolerance::Tolerances,
};
use crate::{
    distributed::Communicator,
    error::{DiffsolError, LinearSolverError, NonLinearSolverError},
    linear_solver::{FaerSparseLU, LinearSolver},
    linear_solver_error,
    matrix::{iteration::Block, IterationPattern, SparseColMat, Triplets},
    non_linear_solver_error,
    nonlinear_solver::{Convergence, ConvergenceStatus},
};

/// Implicit Euler, `M (y1 - y0) = h f(x0 + h, y1)`, solved by simplified Newton iteration with
/// the iteration matrix `M/h - J`. Fixed-step only.
pub struct BackwardEuler<LS: LinearSolver = FaerSparseLU> {
    mass: SparseColMat,
    newton_tol: f64,
    convergence: Convergence,
    update: JacobianUpdate,
    max_newton_failures: usize,
    newton_failures: usize,
    jacobian_triplets: Triplets,
    jacobian: Option<SparseColMat>,
    pattern: Option<IterationPattern>,
    lu: LS,
    f0: DVector<f64>,
    f: DVector<f64>,
    y1: DVector<f64>,
    dy: DVector<f64>,
    scal: DVector<f64>,
}

impl<LS: LinearSolver> BackwardEuler<LS> {
    pub fn new(mass: SparseColMat, tolerances: &Tolerances, config: &SolverConfig) -> Self {
        let n = mass.nrows();
        let newton_tol = config
            .newton_tolerance
            .unwrap_or_else(|| tolerances.radau().1);
        Self {
            mass,
            newton_tol,
            convergence: Convergence::new(newton_tol, config.max_newton_iterations),
            update: JacobianUpdate::new(config),
            max_newton_failures: config.max_newton_failures,
            newton_failures: 0,
            jacobian_triplets: Triplets::new(n, n),
            jacobian: None,
            pattern: None,
            lu: LS::default(),
            f0: DVector::zeros(n),
            f: DVector::zeros(n),
            y1: DVector::zeros(n),
            dy: DVector::zeros(n),
            scal: DVector::zeros(n),
        }
    }

    pub fn set_tolerances(&mut self, tolerances: &Tolerances, config: &SolverConfig) {
        self.newton_tol = config
            .newton_tolerance
            .unwrap_or_else(|| tolerances.radau().1);
        self.convergence = Convergence::new(self.newton_tol, config.max_newton_iterations);
    }

    pub fn reset(&mut self) {
        self.update.reset();
        self.newton_failures = 0;
    }

    fn factorise(&mut self, step: usize, x: f64, h: f64) -> Result<(), DiffsolError> {
        let jacobian = match &self.jacobian {
            Some(jacobian) => jacobian,
            None => return Err(linear_solver_error!(LuNotInitialized)),
        };
        let sources = [&self.mass, jacobian];
        if !self.pattern.as_ref().is_some_and(|p| p.matches(&sources)) {
            self.pattern = Some(IterationPattern::new(
                self.mass.nrows(),
                &sources,
                &[Block::new(0, 0, 0), Block::new(1, 0, 0)],
            )?);
        }
        if let Some(pattern) = &self.pattern {
            let matrix = pattern.assemble(&sources, &[1.0 / h, -1.0])?;
            self.lu.set_matrix(&matrix).map_err(|e| {
                log::debug!("iteration matrix factorisation failed: {e}");
                linear_solver_error!(SingularIterationMatrix { step, x, h })
            })?;
        }
        self.update.update_factorisation(h);
        Ok(())
    }

    pub(crate) fn step<C: Communicator>(
        &mut self,
        ctx: &mut StepContext<'_, '_, C>,
        x: f64,
        y: &mut DVector<f64>,
        h: f64,
    ) -> Result<StepResult, DiffsolError> {
        let step = ctx.statistics.number_of_steps;
        if self.update.check_jacobian_update() {
            ctx.rhs(x, y, &mut self.f0)?;
            ctx.jacobian(x, y, &self.f0, &mut self.jacobian_triplets)?;
            self.jacobian = Some(SparseColMat::try_from_assembly(&self.jacobian_triplets)?);
            self.update.update_jacobian();
        }
        if self.update.check_factorisation_update(h) {
            self.factorise(step, x, h)?;
            ctx.statistics.number_of_decompositions += 1;
        }
        ctx.tolerances.scale_vector(y, &mut self.scal);

        self.y1.copy_from(y);
        self.convergence.reset(self.update.theta_max());
        let n = y.len();
        loop {
            ctx.rhs(x + h, &self.y1, &mut self.f)?;
            // residual f(x + h, y1) - M (y1 - y0) / h
            self.dy.copy_from(&self.y1);
            self.dy -= &*y;
            self.mass.gemv(-1.0 / h, &self.dy, 1.0, &mut self.f);
            self.dy.copy_from(&self.f);
            self.lu.solve_in_place(&mut self.dy).map_err(|e| {
                log::debug!("iteration matrix solve failed: {e}");
                linear_solver_error!(SingularIterationMatrix { step, x, h })
            })?;
            ctx.statistics.number_of_linear_solves += 1;
            let sum = (0..n)
                .map(|i| (self.dy[i] / self.scal[i]).powi(2))
                .sum::<f64>();
            let norm = (sum / n.max(1) as f64).sqrt();
            let status = if norm.is_finite() {
                self.convergence.check_norm(norm)
            } else {
                ConvergenceStatus::Failed
            };
            match status {
                ConvergenceStatus::Continue => self.y1 += &self.dy,
                ConvergenceStatus::Converged => {
                    self.y1 += &self.dy;
                    break;
                }
                ConvergenceStatus::Diverged { h_factor } => {
                    ctx.controller.mark_rejected();
                    self.update.step_rejected();
                    return Ok(StepResult::Rejected {
                        h_next: h * h_factor,
                        reason: RejectReason::SlowConvergence,
                    });
                }
                ConvergenceStatus::Failed => {
                    self.newton_failures += 1;
                    if self.newton_failures > self.max_newton_failures {
                        return Err(non_linear_solver_error!(NewtonDivergence {
                            failures: self.newton_failures,
                            x,
                            h
                        }));
                    }
                    warn!("Newton iteration failed at x = {x}, h = {h}");
                    ctx.controller.mark_rejected();
                    self.update.step_rejected();
                    return Ok(StepResult::Rejected {
                        h_next: 0.5 * h,
                        reason: RejectReason::NewtonFailure,
                    });
                }
            }
        }
        ctx.statistics
            .record_newton_iterations(self.convergence.niter());
        y.copy_from(&self.y1);
        self.newton_failures = 0;
        self.update.step_accepted(h, h, self.convergence.theta());
        Ok(StepResult::Accepted { h_next: h })
    }
}
