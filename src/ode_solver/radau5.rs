use log::{debug, trace, warn};
use nalgebra::DVector;

use super::{
    config::SolverConfig,
    controller::Controller,
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

// collocation nodes
const SQ6: f64 = 2.449_489_742_783_178;
const C1: f64 = (4.0 - SQ6) / 10.0;
const C2: f64 = (4.0 + SQ6) / 10.0;
const C1M1: f64 = C1 - 1.0;
const C2M1: f64 = C2 - 1.0;
const C1MC2: f64 = C1 - C2;

// error estimate weights
const DD1: f64 = -(13.0 + 7.0 * SQ6) / 3.0;
const DD2: f64 = (-13.0 + 7.0 * SQ6) / 3.0;
const DD3: f64 = -1.0 / 3.0;

// eigenvector basis of the Radau IIA matrix
const T11: f64 = 9.123_239_487_089_294_279_2e-02;
const T12: f64 = -0.141_255_295_020_954_208_43;
const T13: f64 = -3.002_919_410_514_742_449_2e-02;
const T21: f64 = 0.241_717_932_707_107_018_96;
const T22: f64 = 0.204_129_352_293_799_931_99;
const T23: f64 = 0.382_942_112_757_261_937_79;
const T31: f64 = 0.966_048_182_615_092_936_19;
const TI11: f64 = 4.325_579_890_063_155_351_0;
const TI12: f64 = 0.339_199_251_815_809_869_54;
const TI13: f64 = 0.541_770_539_935_874_871_19;
const TI21: f64 = -4.178_718_591_551_904_727_3;
const TI22: f64 = -0.327_682_820_761_062_387_08;
const TI23: f64 = 0.476_623_554_500_550_451_96;
const TI31: f64 = -0.502_872_634_945_786_875_95;
const TI32: f64 = 2.571_926_949_855_605_429_2;
const TI33: f64 = -0.596_039_204_828_224_924_97;

/// The real eigenvalue `u1` and the complex pair `alpha +- i beta` of the inverse Radau IIA matrix.
fn eigenvalues() -> (f64, f64, f64) {
    let (cbrt81, cbrt9) = (81.0_f64.cbrt(), 9.0_f64.cbrt());
    let u1 = (6.0 + cbrt81 - cbrt9) / 30.0;
    let alpha = (12.0 - cbrt81 + cbrt9) / 60.0;
    let beta = (cbrt81 + cbrt9) * 3.0_f64.sqrt() / 60.0;
    let cno = alpha * alpha + beta * beta;
    (1.0 / u1, alpha / cno, beta / cno)
}

/// Radau IIA of order 5 for `M y' = f(x, y)` with a possibly singular mass matrix.
///
/// The stage equations are solved by simplified Newton iteration in the transformed variables of
/// Hairer & Wanner, which decouples the `3N` system into one real `N x N` system with matrix
/// `E1 = u1/h M - J` and one complex system with `E2 = (alpha + i beta)/h M - J`. The complex
/// system is solved in its real `2N x 2N` form `[[aM - J, -bM], [bM, aM - J]]`.
///
/// E. Hairer and G. Wanner, Solving Ordinary Differential Equations II, Springer (1996),
/// Section IV.8.
pub struct Radau5<LS: LinearSolver = FaerSparseLU> {
    n: usize,
    mass: SparseColMat,
    tolerances: Tolerances,
    newton_tol: f64,
    eigenvalues: (f64, f64, f64),
    convergence: Convergence,
    update: JacobianUpdate,
    max_newton_failures: usize,
    newton_failures: usize,
    first: bool,

    jacobian_triplets: Triplets,
    jacobian: Option<SparseColMat>,
    real_pattern: Option<IterationPattern>,
    complex_pattern: Option<IterationPattern>,
    e1: LS,
    e2: LS,

    f0: DVector<f64>,
    f0_is_current: bool,
    /// collocation polynomial of the last accepted step
    cont: [DVector<f64>; 3],
    h_old: Option<f64>,

    z: [DVector<f64>; 3],
    w: [DVector<f64>; 3],
    rhs: [DVector<f64>; 3],
    rhs_complex: DVector<f64>,
    scal: DVector<f64>,
    tmp: DVector<f64>,
    mass_err: DVector<f64>,
    err: DVector<f64>,
    y_new: DVector<f64>,
}

impl<LS: LinearSolver> Radau5<LS> {
    pub fn new(mass: SparseColMat, tolerances: &Tolerances, config: &SolverConfig) -> Self {
        let n = mass.nrows();
        let (tolerances, newton_tol) = tolerances.radau();
        let newton_tol = config.newton_tolerance.unwrap_or(newton_tol);
        let zeros = || DVector::zeros(n);
        Self {
            n,
            mass,
            tolerances,
            newton_tol,
            eigenvalues: eigenvalues(),
            convergence: Convergence::new(newton_tol, config.max_newton_iterations),
            update: JacobianUpdate::new(config),
            max_newton_failures: config.max_newton_failures,
            newton_failures: 0,
            first: true,
            jacobian_triplets: Triplets::new(n, n),
            jacobian: None,
            real_pattern: None,
            complex_pattern: None,
            e1: LS::default(),
            e2: LS::default(),
            f0: zeros(),
            f0_is_current: false,
            cont: [zeros(), zeros(), zeros()],
            h_old: None,
            z: [zeros(), zeros(), zeros()],
            w: [zeros(), zeros(), zeros()],
            rhs: [zeros(), zeros(), zeros()],
            rhs_complex: DVector::zeros(2 * n),
            scal: zeros(),
            tmp: zeros(),
            mass_err: zeros(),
            err: zeros(),
            y_new: zeros(),
        }
    }

    pub fn set_tolerances(&mut self, tolerances: &Tolerances, config: &SolverConfig) {
        let (tolerances, newton_tol) = tolerances.radau();
        self.tolerances = tolerances;
        self.newton_tol = config.newton_tolerance.unwrap_or(newton_tol);
        self.convergence = Convergence::new(self.newton_tol, config.max_newton_iterations);
    }

    /// Tolerances actually used for the error test.
    pub fn tolerances(&self) -> &Tolerances {
        &self.tolerances
    }

    pub fn newton_tolerance(&self) -> f64 {
        self.newton_tol
    }

    /// Drop every piece of state carried from one step to the next.
    pub fn reset(&mut self) {
        self.update.reset();
        self.newton_failures = 0;
        self.first = true;
        self.f0_is_current = false;
        self.h_old = None;
        self.convergence = Convergence::new(self.newton_tol, self.convergence.max_iter());
    }

    fn singular(step: usize, x: f64, h: f64, source: DiffsolError) -> DiffsolError {
        debug!("iteration matrix factorisation failed: {source}");
        linear_solver_error!(SingularIterationMatrix { step, x, h })
    }

    fn factorise<C: Communicator>(
        &mut self,
        ctx: &mut StepContext<'_, '_, C>,
        x: f64,
        h: f64,
    ) -> Result<(), DiffsolError> {
        let jacobian = match &self.jacobian {
            Some(jacobian) => jacobian,
            None => return Err(linear_solver_error!(LuNotInitialized)),
        };
        let n = self.n;
        let sources = [&self.mass, jacobian];
        if !self.real_pattern.as_ref().is_some_and(|p| p.matches(&sources)) {
            self.real_pattern = Some(IterationPattern::new(
                n,
                &sources,
                &[Block::new(0, 0, 0), Block::new(1, 0, 0)],
            )?);
            self.complex_pattern = Some(IterationPattern::new(
                2 * n,
                &sources,
                &[
                    Block::new(0, 0, 0),
                    Block::new(1, 0, 0),
                    Block::new(0, 0, n),
                    Block::new(0, n, 0),
                    Block::new(0, n, n),
                    Block::new(1, n, n),
                ],
            )?);
        }
        let (u1, alpha, beta) = self.eigenvalues;
        let (fac1, alphn, betan) = (u1 / h, alpha / h, beta / h);
        let step = ctx.statistics.number_of_steps;
        if let (Some(real), Some(complex)) = (&self.real_pattern, &self.complex_pattern) {
            let e1 = real.assemble(&sources, &[fac1, -1.0])?;
            let e2 = complex.assemble(&sources, &[alphn, -1.0, -betan, betan, alphn, -1.0])?;
            self.e1
                .set_matrix(&e1)
                .map_err(|e| Self::singular(step, x, h, e))?;
            self.e2
                .set_matrix(&e2)
                .map_err(|e| Self::singular(step, x, h, e))?;
        }
        ctx.statistics.number_of_decompositions += 1;
        self.update.update_factorisation(h);
        Ok(())
    }

    /// Starting values of the transformed stage unknowns: zero on the first step, otherwise the
    /// collocation polynomial of the previous step extrapolated to the new stages.
    fn starting_values(&mut self, h: f64) {
        let h_old = match self.h_old {
            Some(h_old) if !self.first => h_old,
            _ => {
                for i in 0..3 {
                    self.z[i].fill(0.0);
                    self.w[i].fill(0.0);
                }
                return;
            }
        };
        let c3q = h / h_old;
        let c1q = C1 * c3q;
        let c2q = C2 * c3q;
        for i in 0..self.n {
            let (ak1, ak2, ak3) = (self.cont[0][i], self.cont[1][i], self.cont[2][i]);
            let z1 = c1q * (ak1 + (c1q - C2M1) * (ak2 + (c1q - C1M1) * ak3));
            let z2 = c2q * (ak1 + (c2q - C2M1) * (ak2 + (c2q - C1M1) * ak3));
            let z3 = c3q * (ak1 + (c3q - C2M1) * (ak2 + (c3q - C1M1) * ak3));
            self.z[0][i] = z1;
            self.z[1][i] = z2;
            self.z[2][i] = z3;
            self.w[0][i] = TI11 * z1 + TI12 * z2 + TI13 * z3;
            self.w[1][i] = TI21 * z1 + TI22 * z2 + TI23 * z3;
            self.w[2][i] = TI31 * z1 + TI32 * z2 + TI33 * z3;
        }
    }

    /// Run the simplified Newton iteration; `Ok(None)` if it converged.
    fn newton<C: Communicator>(
        &mut self,
        ctx: &mut StepContext<'_, '_, C>,
        x: f64,
        y: &DVector<f64>,
        h: f64,
    ) -> Result<Option<ConvergenceStatus>, DiffsolError> {
        let n = self.n;
        let (u1, alpha, beta) = self.eigenvalues;
        let (fac1, alphn, betan) = (u1 / h, alpha / h, beta / h);
        let step = ctx.statistics.number_of_steps;
        let nodes = [C1, C2, 1.0];
        self.convergence.reset(self.update.theta_max());
        loop {
            for s in 0..3 {
                self.tmp.copy_from(y);
                self.tmp += &self.z[s];
                ctx.rhs(x + nodes[s] * h, &self.tmp, &mut self.rhs[s])?;
            }
            for i in 0..n {
                let (a1, a2, a3) = (self.rhs[0][i], self.rhs[1][i], self.rhs[2][i]);
                self.rhs[0][i] = TI11 * a1 + TI12 * a2 + TI13 * a3;
                self.rhs[1][i] = TI21 * a1 + TI22 * a2 + TI23 * a3;
                self.rhs[2][i] = TI31 * a1 + TI32 * a2 + TI33 * a3;
            }
            self.mass.gemv(-fac1, &self.w[0], 1.0, &mut self.rhs[0]);
            self.mass.gemv(-alphn, &self.w[1], 1.0, &mut self.rhs[1]);
            self.mass.gemv(betan, &self.w[2], 1.0, &mut self.rhs[1]);
            self.mass.gemv(-alphn, &self.w[2], 1.0, &mut self.rhs[2]);
            self.mass.gemv(-betan, &self.w[1], 1.0, &mut self.rhs[2]);

            self.e1
                .solve_in_place(&mut self.rhs[0])
                .map_err(|e| Self::singular(step, x, h, e))?;
            self.rhs_complex.rows_mut(0, n).copy_from(&self.rhs[1]);
            self.rhs_complex.rows_mut(n, n).copy_from(&self.rhs[2]);
            self.e2
                .solve_in_place(&mut self.rhs_complex)
                .map_err(|e| Self::singular(step, x, h, e))?;
            self.rhs[1].copy_from(&self.rhs_complex.rows(0, n));
            self.rhs[2].copy_from(&self.rhs_complex.rows(n, n));
            ctx.statistics.number_of_linear_solves += 1;

            let mut sum = 0.0;
            for i in 0..n {
                let sc = self.scal[i];
                sum += (self.rhs[0][i] / sc).powi(2)
                    + (self.rhs[1][i] / sc).powi(2)
                    + (self.rhs[2][i] / sc).powi(2);
            }
            let norm = (sum / (3 * n).max(1) as f64).sqrt();

            let status = if norm.is_finite() {
                self.convergence.check_norm(norm)
            } else {
                ConvergenceStatus::Failed
            };
            match status {
                ConvergenceStatus::Converged | ConvergenceStatus::Continue => {
                    for i in 0..n {
                        let f1 = self.w[0][i] + self.rhs[0][i];
                        let f2 = self.w[1][i] + self.rhs[1][i];
                        let f3 = self.w[2][i] + self.rhs[2][i];
                        self.w[0][i] = f1;
                        self.w[1][i] = f2;
                        self.w[2][i] = f3;
                        self.z[0][i] = T11 * f1 + T12 * f2 + T13 * f3;
                        self.z[1][i] = T21 * f1 + T22 * f2 + T23 * f3;
                        self.z[2][i] = T31 * f1 + f2;
                    }
                    if status == ConvergenceStatus::Converged {
                        return Ok(None);
                    }
                }
                status => return Ok(Some(status)),
            }
        }
    }

    /// Scaled norm of the embedded error estimate. A second, filtered estimate is computed after
    /// a rejection or on the first step, where the first one is unreliable for stiff components.
    fn error_estimate<C: Communicator>(
        &mut self,
        ctx: &mut StepContext<'_, '_, C>,
        x: f64,
        y: &DVector<f64>,
        h: f64,
    ) -> Result<f64, DiffsolError> {
        let step = ctx.statistics.number_of_steps;
        for i in 0..self.n {
            self.tmp[i] = (DD1 * self.z[0][i] + DD2 * self.z[1][i] + DD3 * self.z[2][i]) / h;
        }
        self.mass.gemv(1.0, &self.tmp, 0.0, &mut self.mass_err);
        self.err.copy_from(&self.mass_err);
        self.err += &self.f0;
        self.e1
            .solve_in_place(&mut self.err)
            .map_err(|e| Self::singular(step, x, h, e))?;
        ctx.statistics.number_of_linear_solves += 1;
        let mut err = self
            .tolerances
            .error_norm(&self.err, y, &self.y_new)
            .max(1e-10);
        if !Controller::accepts(err) && (self.first || ctx.controller.last_rejected()) {
            self.tmp.copy_from(y);
            self.tmp += &self.err;
            ctx.rhs(x, &self.tmp, &mut self.err)?;
            self.err += &self.mass_err;
            self.e1
                .solve_in_place(&mut self.err)
                .map_err(|e| Self::singular(step, x, h, e))?;
            ctx.statistics.number_of_linear_solves += 1;
            err = self
                .tolerances
                .error_norm(&self.err, y, &self.y_new)
                .max(1e-10);
        }
        Ok(err)
    }

    pub(crate) fn step<C: Communicator>(
        &mut self,
        ctx: &mut StepContext<'_, '_, C>,
        x: f64,
        y: &mut DVector<f64>,
        h: f64,
        fixed: bool,
    ) -> Result<StepResult, DiffsolError> {
        if !self.f0_is_current {
            ctx.rhs(x, y, &mut self.f0)?;
            self.f0_is_current = true;
        }
        if self.update.check_jacobian_update() {
            ctx.jacobian(x, y, &self.f0, &mut self.jacobian_triplets)?;
            self.jacobian = Some(SparseColMat::try_from_assembly(&self.jacobian_triplets)?);
            self.update.update_jacobian();
        }
        if self.update.check_factorisation_update(h) {
            self.factorise(ctx, x, h)?;
        }
        self.tolerances.scale_vector(y, &mut self.scal);
        self.starting_values(h);

        if let Some(status) = self.newton(ctx, x, y, h)? {
            ctx.controller.mark_rejected();
            self.update.step_rejected();
            let (h_next, reason) = match status {
                ConvergenceStatus::Diverged { h_factor } => {
                    (h * h_factor, RejectReason::SlowConvergence)
                }
                _ => {
                    self.newton_failures += 1;
                    if self.newton_failures > self.max_newton_failures {
                        return Err(non_linear_solver_error!(NewtonDivergence {
                            failures: self.newton_failures,
                            x,
                            h
                        }));
                    }
                    warn!(
                        "Newton iteration failed at x = {x}, h = {h}; retrying with h = {}",
                        0.5 * h
                    );
                    (0.5 * h, RejectReason::NewtonFailure)
                }
            };
            return Ok(StepResult::Rejected { h_next, reason });
        }
        let niter = self.convergence.niter();
        ctx.statistics.record_newton_iterations(niter);
        let theta = self.convergence.theta();

        self.y_new.copy_from(y);
        self.y_new += &self.z[2];
        let (err, h_new) = if fixed {
            (0.0, h)
        } else {
            let err = self.error_estimate(ctx, x, y, h)?;
            let nit = self.convergence.max_iter() as f64;
            let safety = ctx.controller.safety();
            let fac = safety.min(safety * (1.0 + 2.0 * nit) / (niter as f64 + 2.0 * nit));
            if !Controller::accepts(err) {
                let h_next = ctx.controller.reject(h, err, fac);
                self.update.step_rejected();
                return Ok(StepResult::Rejected {
                    h_next,
                    reason: RejectReason::ErrorTest { err },
                });
            }
            (err, ctx.controller.accept(h, err, fac))
        };

        for i in 0..self.n {
            let (z1, z2, z3) = (self.z[0][i], self.z[1][i], self.z[2][i]);
            let cont1 = (z2 - z3) / C2M1;
            let ak = (z1 - z2) / C1MC2;
            let acont3 = (ak - z1 / C1) / C2;
            let cont2 = (ak - cont1) / C1M1;
            self.cont[0][i] = cont1;
            self.cont[1][i] = cont2;
            self.cont[2][i] = cont2 - acont3;
        }
        y.copy_from(&self.y_new);
        ctx.rhs(x + h, y, &mut self.f0)?;
        self.first = false;
        self.newton_failures = 0;
        self.h_old = Some(h);
        let h_next = if fixed {
            self.update.step_accepted(h, h, theta);
            h
        } else {
            self.update.step_accepted(h, h_new, theta)
        };
        trace!("radau5 step accepted: err = {err:.3e}, newton iterations = {niter}");
        Ok(StepResult::Accepted { h_next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transformation_matrices_are_inverse() {
        let t = [[T11, T12, T13], [T21, T22, T23], [T31, 1.0, 0.0]];
        let ti = [
            [TI11, TI12, TI13],
            [TI21, TI22, TI23],
            [TI31, TI32, TI33],
        ];
        for i in 0..3 {
            for j in 0..3 {
                let v = (0..3).map(|k| ti[i][k] * t[k][j]).sum::<f64>();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((v - expected).abs() < 1e-14, "({i}, {j}): {v}");
            }
        }
    }

    #[test]
    fn radau_constants() {
        let (u1, alpha, beta) = eigenvalues();
        assert!((u1 - 3.637_834_252_744_496).abs() < 1e-12);
        assert!((alpha - 2.681_082_873_627_752).abs() < 1e-12);
        assert!((beta - 3.050_430_199_247_411).abs() < 1e-12);
        assert!((C1 - 0.155_051_025_721_682_2).abs() < 1e-15);
        assert!((C2 - 0.644_948_974_278_317_8).abs() < 1e-15);
        assert!((DD1 + DD2 + DD3 + 9.0).abs() < 1e-12);
    }
}
