use log::{debug, trace, warn};
use nalgebra::DVector;

use super::{
    backward_euler::BackwardEuler,
    config::SolverConfig,
    controller::Controller,
    explicit_rk::ExplicitRk,
    method::{Method, RejectReason, StepContext, StepResult},
    problem::OdeProblem,
    radau5::Radau5,
    statistics::SolverStatistics,
    tableau::Tableau,
    tolerance::Tolerances,
    trajectory::Trajectory,
};
use crate::{
    distributed::{Communicator, Evaluator, Partition, SerialCommunicator},
    error::{DiffsolError, OdeSolverError},
    linear_solver::{FaerSparseLU, LinearSolver},
    ode_solver_error,
};

enum Integrator<LS: LinearSolver> {
    Explicit(ExplicitRk),
    Radau5(Radau5<LS>),
    BackwardEuler(BackwardEuler<LS>),
}

impl<LS: LinearSolver> Integrator<LS> {
    fn new<C: Communicator>(
        config: &SolverConfig,
        tolerances: &Tolerances,
        evaluator: &Evaluator<'_, C>,
    ) -> Self {
        let n = evaluator.nstates();
        let mass = evaluator.mass().clone();
        match config.method {
            Method::ForwardEuler => Self::Explicit(ExplicitRk::new(Tableau::forward_euler(), n)),
            Method::ModifiedEuler => Self::Explicit(ExplicitRk::new(Tableau::heun_euler(), n)),
            Method::Dopri5 => Self::Explicit(ExplicitRk::new(Tableau::dopri5(), n)),
            Method::BackwardEuler => {
                Self::BackwardEuler(BackwardEuler::new(mass, tolerances, config))
            }
            Method::Radau5 => Self::Radau5(Radau5::new(mass, tolerances, config)),
        }
    }

    fn reset(&mut self) {
        match self {
            Self::Explicit(rk) => rk.reset(),
            Self::Radau5(radau) => radau.reset(),
            Self::BackwardEuler(be) => be.reset(),
        }
    }

    fn set_tolerances(&mut self, tolerances: &Tolerances, config: &SolverConfig) {
        match self {
            Self::Explicit(_) => {}
            Self::Radau5(radau) => radau.set_tolerances(tolerances, config),
            Self::BackwardEuler(be) => be.set_tolerances(tolerances, config),
        }
    }

    fn step<C: Communicator>(
        &mut self,
        ctx: &mut StepContext<'_, '_, C>,
        x: f64,
        y: &mut DVector<f64>,
        h: f64,
        fixed: bool,
    ) -> Result<StepResult, DiffsolError> {
        match self {
            Self::Explicit(rk) => rk.step(ctx, x, y, h, fixed),
            Self::Radau5(radau) => radau.step(ctx, x, y, h, fixed),
            Self::BackwardEuler(be) => be.step(ctx, x, y, h),
        }
    }
}

/// Integrates `M y' = f(x, y)` over an interval with one of the [Method]s.
///
/// The solver borrows the problem for its lifetime and owns everything that changes during a
/// solve: the integrator state, the step-size controller, the counters and the trajectory. With a
/// communicator of several workers, every worker creates its own solver over the same problem
/// and calls [OdeSolver::solve] with the same arguments; all workers then step in lockstep and
/// finish with bit-identical states.
///
/// # Example
///
/// ```rust
/// use nalgebra::DVector;
/// use radsol::{Method, OdeBuilder, OdeSolver, SolverConfig, Tolerances};
///
/// let problem = OdeBuilder::new(1)
///     .rhs(|_x, y, f| {
///         f[0] = -y[0];
///         Ok(())
///     })
///     .build()
///     .unwrap();
/// let config = SolverConfig::new(Method::Dopri5);
/// let mut solver = OdeSolver::new(&problem, config, Tolerances::new(1e-10, 1e-8)).unwrap();
/// let mut y = DVector::from_element(1, 1.0);
/// solver.solve(&mut y, 0.0, 1.0, 1e-3, false).unwrap();
/// assert!((y[0] - (-1.0_f64).exp()).abs() < 1e-7);
/// ```
pub struct OdeSolver<'a, C: Communicator = SerialCommunicator, LS: LinearSolver = FaerSparseLU> {
    config: SolverConfig,
    tolerances: Tolerances,
    evaluator: Evaluator<'a, C>,
    integrator: Integrator<LS>,
    controller: Controller,
    statistics: SolverStatistics,
    trajectory: Trajectory,
}

impl<'a> OdeSolver<'a> {
    /// A single-worker solver using the sparse LU for the implicit methods.
    pub fn new(
        problem: &'a OdeProblem,
        config: SolverConfig,
        tolerances: Tolerances,
    ) -> Result<Self, DiffsolError> {
        Self::new_distributed(problem, config, tolerances, SerialCommunicator, None)
    }
}

impl<'a, C: Communicator, LS: LinearSolver> OdeSolver<'a, C, LS> {
    /// A solver whose right-hand side, Jacobian and mass matrix are assembled by the workers of
    /// `comm`, each evaluating the equations `partition` assigns to it. This is a collective call.
    ///
    /// Fails before any stepping if the configuration or the tolerances are invalid, or if the
    /// partition does not fit the problem and the communicator.
    pub fn new_distributed(
        problem: &'a OdeProblem,
        config: SolverConfig,
        tolerances: Tolerances,
        comm: C,
        partition: Option<Partition>,
    ) -> Result<Self, DiffsolError> {
        config.validate()?;
        tolerances.validate(problem.nstates())?;
        let evaluator = Evaluator::new(problem, comm, partition)?;
        let integrator = Integrator::new(&config, &tolerances, &evaluator);
        let error_order = config
            .method
            .error_order()
            .unwrap_or(config.method.order());
        let controller = Controller::new(&config, error_order);
        Ok(Self {
            config,
            tolerances,
            evaluator,
            integrator,
            controller,
            statistics: SolverStatistics::default(),
            trajectory: Trajectory::default(),
        })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn tolerances(&self) -> &Tolerances {
        &self.tolerances
    }

    pub fn set_tolerances(&mut self, tolerances: Tolerances) -> Result<(), DiffsolError> {
        tolerances.validate(self.evaluator.nstates())?;
        self.integrator.set_tolerances(&tolerances, &self.config);
        self.tolerances = tolerances;
        Ok(())
    }

    pub fn problem(&self) -> &'a OdeProblem {
        self.evaluator.problem()
    }

    /// Counters of the last solve.
    pub fn statistics(&self) -> &SolverStatistics {
        &self.statistics
    }

    /// Accepted steps of the last solve, if [SolverConfig::save_trajectory] is set.
    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    pub fn rank(&self) -> usize {
        self.evaluator.rank()
    }

    /// Forget the counters, the trajectory and all state carried between steps.
    pub fn reset(&mut self) {
        self.statistics.reset();
        self.trajectory.clear();
        self.controller.reset();
        self.integrator.reset();
    }

    /// Integrates from `xa` to `xb`, overwriting `y` with the solution at `xb`.
    ///
    /// With `fixed_step` the interval is divided into `ceil((xb - xa) / h)` steps of size `h`, the
    /// last one shortened to end at `xb`. Otherwise `h` is the initial step size and the
    /// controller adapts it. Every call starts from fresh counters and integrator state.
    pub fn solve(
        &mut self,
        y: &mut DVector<f64>,
        xa: f64,
        xb: f64,
        h: f64,
        fixed_step: bool,
    ) -> Result<(), DiffsolError> {
        let n = self.evaluator.nstates();
        if y.len() != n {
            return Err(ode_solver_error!(WrongStateLength {
                expected: n,
                found: y.len()
            }));
        }
        if xb < xa {
            return Err(ode_solver_error!(StopTimeBeforeCurrentTime {
                stop_time: xb,
                state_time: xa
            }));
        }
        if !(h > 0.0 && h.is_finite()) {
            return Err(ode_solver_error!(InvalidStepSize { h }));
        }
        let method = self.config.method;
        if !fixed_step && !method.is_adaptive() {
            return Err(ode_solver_error!(AdaptiveStepNotSupported {
                method: method.to_string()
            }));
        }

        self.reset();
        if self.config.save_trajectory {
            self.trajectory.push(xa, y, 0.0);
        }
        debug!(
            "{method} solve on [{xa}, {xb}] with h = {h:e}{}",
            if fixed_step { " (fixed step)" } else { "" }
        );
        if fixed_step {
            self.solve_fixed(y, xa, xb, h)?;
        } else {
            self.solve_adaptive(y, xa, xb, h)?;
        }
        debug!("{method} solve finished: {:?}", self.statistics);
        Ok(())
    }

    fn context(&mut self) -> (StepContext<'_, 'a, C>, &mut Integrator<LS>) {
        (
            StepContext {
                evaluator: &mut self.evaluator,
                statistics: &mut self.statistics,
                controller: &mut self.controller,
                tolerances: &self.tolerances,
            },
            &mut self.integrator,
        )
    }

    fn solve_fixed(
        &mut self,
        y: &mut DVector<f64>,
        xa: f64,
        xb: f64,
        h: f64,
    ) -> Result<(), DiffsolError> {
        if xb <= xa {
            return Ok(());
        }
        // the slack keeps an exact multiple from gaining a vanishing extra step
        let nsteps = (((xb - xa) / h - 1e-9).ceil() as usize).max(1);
        let mut x = xa;
        for i in 0..nsteps {
            let last = i + 1 == nsteps;
            let h_step = if last { xb - x } else { h };
            let mut retried = false;
            loop {
                self.statistics.number_of_steps += 1;
                let (mut ctx, integrator) = self.context();
                match integrator.step(&mut ctx, x, y, h_step, true)? {
                    StepResult::Accepted { .. } => break,
                    StepResult::Rejected { reason, .. } => {
                        if retried {
                            return Err(ode_solver_error!(FixedStepFailed { x, h: h_step }));
                        }
                        warn!("fixed step at x = {x} failed ({reason:?}), retrying once");
                        retried = true;
                    }
                }
            }
            self.statistics.number_of_accepted_steps += 1;
            x = if last { xb } else { xa + (i + 1) as f64 * h };
            if self.config.save_trajectory {
                self.trajectory.push(x, y, h_step);
            }
        }
        Ok(())
    }

    fn solve_adaptive(
        &mut self,
        y: &mut DVector<f64>,
        xa: f64,
        xb: f64,
        h: f64,
    ) -> Result<(), DiffsolError> {
        let max_steps = self.config.max_steps;
        let mut x = xa;
        let mut h = h.min(self.controller.h_max());
        while xb - x > 10.0 * f64::EPSILON * xb.abs() {
            self.controller.check(x, h)?;
            // stretch the step by up to 1% to land on xb
            let last = x + 1.01 * h >= xb;
            let h_step = if last { xb - x } else { h };
            if self.statistics.number_of_steps >= max_steps {
                return Err(ode_solver_error!(TooManySteps { max_steps, x }));
            }
            self.statistics.number_of_steps += 1;
            let (mut ctx, integrator) = self.context();
            match integrator.step(&mut ctx, x, y, h_step, false)? {
                StepResult::Accepted { h_next } => {
                    x = if last { xb } else { x + h_step };
                    self.statistics.number_of_accepted_steps += 1;
                    if self.config.save_trajectory {
                        self.trajectory.push(x, y, h_step);
                    }
                    h = h_next;
                }
                StepResult::Rejected { h_next, reason } => {
                    match reason {
                        RejectReason::ErrorTest { .. } => {
                            self.statistics.number_of_rejected_steps += 1
                        }
                        RejectReason::SlowConvergence | RejectReason::NewtonFailure => {}
                    }
                    trace!("step at x = {x} with h = {h_step:e} rejected: {reason:?}");
                    h = h_next;
                }
            }
        }
        Ok(())
    }
}
