//! Small problems with known solutions, used by the tests and benchmarks.

use nalgebra::DVector;

pub mod exponential_decay;
pub mod linear_system;
pub mod oscillator;
pub mod relaxation_dae;
pub mod transistor_amplifier;

pub struct OdeSolverSolutionPoint {
    pub state: DVector<f64>,
    pub x: f64,
}

/// Reference values of a test problem. The first point is the initial condition.
pub struct OdeSolverSolution {
    pub solution_points: Vec<OdeSolverSolutionPoint>,
    pub rtol: f64,
    pub atol: f64,
}

impl Default for OdeSolverSolution {
    fn default() -> Self {
        Self {
            solution_points: Vec::new(),
            rtol: 1e-6,
            atol: 1e-6,
        }
    }
}

impl OdeSolverSolution {
    /// Inserts a point, keeping the points sorted by `x`.
    pub fn push(&mut self, state: DVector<f64>, x: f64) {
        let index = self
            .solution_points
            .iter()
            .position(|p| p.x > x)
            .unwrap_or(self.solution_points.len());
        self.solution_points
            .insert(index, OdeSolverSolutionPoint { state, x });
    }

    pub fn y0(&self) -> &DVector<f64> {
        &self.solution_points[0].state
    }

    pub fn last(&self) -> &OdeSolverSolutionPoint {
        &self.solution_points[self.solution_points.len() - 1]
    }

    /// Panics unless `y` agrees with the reference at `x` to `atol + rtol * |y_ref|`.
    pub fn assert_close(&self, x: f64, y: &DVector<f64>) {
        let point = self
            .solution_points
            .iter()
            .find(|p| (p.x - x).abs() <= 1e-12 * x.abs().max(1.0))
            .unwrap_or_else(|| panic!("no reference point at x = {x}"));
        for i in 0..y.len() {
            let tol = self.atol + self.rtol * point.state[i].abs();
            let err = (y[i] - point.state[i]).abs();
            assert!(
                err <= tol,
                "component {i} at x = {x}: got {}, expected {} (error {err:e}, tolerance {tol:e})",
                y[i],
                point.state[i]
            );
        }
    }
}
