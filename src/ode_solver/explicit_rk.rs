use nalgebra::DVector;

use super::{
    controller::Controller,
    method::{RejectReason, StepContext, StepResult},
    tableau::Tableau,
};
use crate::{distributed::Communicator, error::DiffsolError};

/// An explicit Runge-Kutta method.
///
/// The particular method is defined by the [Tableau] used to create the integrator. If the last
/// stage of the tableau is evaluated on the propagated solution (first same as last), the final
/// stage of an accepted step is kept as the first stage of the next one. The first stage is also
/// kept across rejected attempts, since the state does not change.
pub struct ExplicitRk {
    tableau: Tableau,
    fsal: bool,
    k: Vec<DVector<f64>>,
    first_stage_valid: bool,
    y_stage: DVector<f64>,
    y_new: DVector<f64>,
    error: DVector<f64>,
}

impl ExplicitRk {
    pub fn new(tableau: Tableau, nstates: usize) -> Self {
        let s = tableau.s();
        let fsal = tableau.is_fsal();
        Self {
            tableau,
            fsal,
            k: vec![DVector::zeros(nstates); s],
            first_stage_valid: false,
            y_stage: DVector::zeros(nstates),
            y_new: DVector::zeros(nstates),
            error: DVector::zeros(nstates),
        }
    }

    pub fn tableau(&self) -> &Tableau {
        &self.tableau
    }

    /// Forget the cached first stage, e.g. because the state was changed from outside.
    pub fn reset(&mut self) {
        self.first_stage_valid = false;
    }

    /// Attempt a step of size `h` from `(x, y)`. In fixed-step mode the step is always accepted.
    pub(crate) fn step<C: Communicator>(
        &mut self,
        ctx: &mut StepContext<'_, '_, C>,
        x: f64,
        y: &mut DVector<f64>,
        h: f64,
        fixed: bool,
    ) -> Result<StepResult, DiffsolError> {
        let s = self.tableau.s();
        if !self.first_stage_valid {
            ctx.rhs(x, y, &mut self.k[0])?;
            self.first_stage_valid = true;
        }
        for i in 1..s {
            self.y_stage.copy_from(y);
            for j in 0..i {
                let a = self.tableau.a()[(i, j)];
                if a != 0.0 {
                    self.y_stage.axpy(h * a, &self.k[j], 1.0);
                }
            }
            ctx.rhs(x + self.tableau.c()[i] * h, &self.y_stage, &mut self.k[i])?;
        }
        self.y_new.copy_from(y);
        for j in 0..s {
            let b = self.tableau.b()[j];
            if b != 0.0 {
                self.y_new.axpy(h * b, &self.k[j], 1.0);
            }
        }

        let err = match self.tableau.d() {
            Some(d) if !fixed => {
                self.error.fill(0.0);
                for j in 0..s {
                    if d[j] != 0.0 {
                        self.error.axpy(h * d[j], &self.k[j], 1.0);
                    }
                }
                ctx.tolerances.error_norm(&self.error, y, &self.y_new)
            }
            _ => 0.0,
        };

        if fixed || Controller::accepts(err) {
            y.copy_from(&self.y_new);
            if self.fsal {
                self.k.swap(0, s - 1);
            } else {
                self.first_stage_valid = false;
            }
            let h_next = if fixed {
                h
            } else {
                let safety = ctx.controller.safety();
                ctx.controller.accept(h, err, safety)
            };
            Ok(StepResult::Accepted { h_next })
        } else {
            let safety = ctx.controller.safety();
            let h_next = ctx.controller.reject(h, err, safety);
            Ok(StepResult::Rejected {
                h_next,
                reason: RejectReason::ErrorTest { err },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DVector;

    use super::ExplicitRk;
    use crate::{
        distributed::Evaluator,
        ode_solver::{
            controller::Controller,
            method::{RejectReason, StepContext, StepResult},
            test_models::exponential_decay::exponential_decay_problem,
        },
        Method, SolverConfig, SolverStatistics, Tableau, Tolerances,
    };

    #[test]
    fn too_large_first_step_is_rejected_and_shrunk() {
        let (problem, _soln) = exponential_decay_problem(1000.0, true);
        let config = SolverConfig::new(Method::Dopri5);
        let tolerances = Tolerances::new(1e-6, 1e-6);
        let mut evaluator = Evaluator::serial(&problem);
        let mut statistics = SolverStatistics::default();
        let mut controller = Controller::new(&config, 4);
        let mut ctx = StepContext {
            evaluator: &mut evaluator,
            statistics: &mut statistics,
            controller: &mut controller,
            tolerances: &tolerances,
        };
        let mut rk = ExplicitRk::new(Tableau::dopri5(), 2);
        let y0 = DVector::from_element(2, 1.0);
        let mut y = y0.clone();

        // every attempt until the first acceptance is strictly smaller than the one before
        let mut h = 0.1;
        let mut attempts = Vec::new();
        loop {
            let result = rk.step(&mut ctx, 0.0, &mut y, h, false).unwrap();
            attempts.push((h, result));
            match result {
                StepResult::Rejected { h_next, reason } => {
                    assert!(matches!(reason, RejectReason::ErrorTest { err } if err > 1.0));
                    assert!(h_next < h, "{h_next} >= {h}");
                    assert_eq!(y, y0);
                    h = h_next;
                }
                StepResult::Accepted { .. } => break,
            }
            assert!(attempts.len() < 50);
        }
        assert!(matches!(attempts[0].1, StepResult::Rejected { .. }));
        assert!(attempts.len() >= 2);
        assert!(y[0] < 1.0 && y[0] > 0.0);
        // FSAL keeps the first stage across rejections
        assert_eq!(
            ctx.statistics.number_of_function_evaluations,
            1 + 6 * attempts.len()
        );
    }
}
