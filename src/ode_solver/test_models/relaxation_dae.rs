use nalgebra::DVector;

use super::OdeSolverSolution;
use crate::{OdeBuilder, OdeProblem, Triplets};

// two relaxation equations driven by an algebraic variable
// dy0/dx = -1000 (y0 - y2)
// dy1/dx = -(y1 - y2)
//      0 = 2 - y2
// y(0) = [0, 0, 2], both differential states relax to 2
pub fn relaxation_dae_problem() -> (OdeProblem, OdeSolverSolution) {
    let mut mass = Triplets::new(3, 3);
    mass.put(0, 0, 1.0);
    mass.put(1, 1, 1.0);
    let problem = OdeBuilder::new(3)
        .rhs(|_x, y, f| {
            f[0] = -1000.0 * (y[0] - y[2]);
            f[1] = -(y[1] - y[2]);
            f[2] = 2.0 - y[2];
            Ok(())
        })
        .jacobian(|_x, _y, jac| {
            jac.put(0, 0, -1000.0);
            jac.put(0, 2, 1000.0);
            jac.put(1, 1, -1.0);
            jac.put(1, 2, 1.0);
            jac.put(2, 2, -1.0);
            Ok(())
        })
        .mass(mass)
        .build()
        .unwrap();

    let mut soln = OdeSolverSolution {
        rtol: 1e-5,
        atol: 1e-6,
        ..Default::default()
    };
    soln.push(DVector::from_vec(vec![0.0, 0.0, 2.0]), 0.0);
    for x in [1.0_f64, 5.0, 20.0] {
        let y0 = 2.0 - 2.0 * (-1000.0 * x).exp();
        let y1 = 2.0 - 2.0 * (-x).exp();
        soln.push(DVector::from_vec(vec![y0, y1, 2.0]), x);
    }
    (problem, soln)
}
