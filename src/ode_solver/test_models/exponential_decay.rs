use nalgebra::DVector;

use super::OdeSolverSolution;
use crate::{OdeBuilder, OdeProblem};

// exponential decay problem
// dy/dx = -ay, y(0) = [1, 1]
// With a large `a` this is the stiff test problem for the step-size controller.
pub fn exponential_decay_problem(a: f64, with_jacobian: bool) -> (OdeProblem, OdeSolverSolution) {
    let mut builder = OdeBuilder::new(2).rhs(move |_x, y, f| {
        f[0] = -a * y[0];
        f[1] = -a * y[1];
        Ok(())
    });
    if with_jacobian {
        builder = builder.jacobian(move |_x, _y, jac| {
            jac.put(0, 0, -a);
            jac.put(1, 1, -a);
            Ok(())
        });
    }
    let problem = builder.build().unwrap();

    let mut soln = OdeSolverSolution::default();
    for i in 0..=10 {
        let x = i as f64 / 10.0;
        soln.push(DVector::from_element(2, (-a * x).exp()), x);
    }
    (problem, soln)
}

/// The problem with a zero right-hand side: every method keeps `y` constant.
pub fn constant_problem(nstates: usize) -> (OdeProblem, OdeSolverSolution) {
    let problem = OdeBuilder::new(nstates)
        .rhs(|_x, _y, _f| Ok(()))
        .jacobian(|_x, _y, _jac| Ok(()))
        .build()
        .unwrap();
    let mut soln = OdeSolverSolution::default();
    let y0 = DVector::from_iterator(nstates, (0..nstates).map(|i| i as f64 + 1.0));
    soln.push(y0.clone(), 0.0);
    soln.push(y0, 1.0);
    (problem, soln)
}
