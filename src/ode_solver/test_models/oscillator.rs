use nalgebra::DVector;

use super::OdeSolverSolution;
use crate::{OdeBuilder, OdeProblem};

// harmonic oscillator y'' = -y written as a first order system
// dy0/dx = y1
// dy1/dx = -y0
// y(0) = [1, 0], so y0 = cos(x) and y1 = -sin(x)
pub fn oscillator_problem() -> (OdeProblem, OdeSolverSolution) {
    let problem = OdeBuilder::new(2)
        .rhs(|_x, y, f| {
            f[0] = y[1];
            f[1] = -y[0];
            Ok(())
        })
        .jacobian(|_x, _y, jac| {
            jac.put(0, 1, 1.0);
            jac.put(1, 0, -1.0);
            Ok(())
        })
        .build()
        .unwrap();

    let mut soln = OdeSolverSolution::default();
    for i in 0..=10 {
        let x = i as f64;
        soln.push(DVector::from_vec(vec![x.cos(), -x.sin()]), x);
    }
    (problem, soln)
}

// dy/dx = cos(pi x / 2), y(0) = 0, so y(1) = 2 / pi
// The right-hand side does not depend on y, which makes the integrator a pure quadrature rule.
pub fn cosine_quadrature_problem() -> (OdeProblem, OdeSolverSolution) {
    let problem = OdeBuilder::new(1)
        .rhs(|x, _y, f| {
            f[0] = (std::f64::consts::FRAC_PI_2 * x).cos();
            Ok(())
        })
        .jacobian(|_x, _y, _jac| Ok(()))
        .build()
        .unwrap();

    let mut soln = OdeSolverSolution::default();
    for i in 0..=4 {
        let x = i as f64 / 4.0;
        let y = (std::f64::consts::FRAC_PI_2 * x).sin() / std::f64::consts::FRAC_PI_2;
        soln.push(DVector::from_element(1, y), x);
    }
    (problem, soln)
}
