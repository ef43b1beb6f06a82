use serde::Serialize;

/// Work counters of the last solve. Reset at the start of every solve.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SolverStatistics {
    pub number_of_function_evaluations: usize,
    pub number_of_jacobian_evaluations: usize,
    /// Every step attempt, including rejected ones and Newton failures.
    pub number_of_steps: usize,
    pub number_of_accepted_steps: usize,
    /// Steps rejected by the error test.
    pub number_of_rejected_steps: usize,
    pub number_of_decompositions: usize,
    pub number_of_linear_solves: usize,
    pub max_newton_iterations: usize,
}

impl SolverStatistics {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn record_newton_iterations(&mut self, niter: usize) {
        self.max_newton_iterations = self.max_newton_iterations.max(niter);
    }
}
