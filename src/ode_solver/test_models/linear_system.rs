use nalgebra::{DMatrix, DVector};

use super::OdeSolverSolution;
use crate::{OdeBuilder, OdeProblem};

// dy/dx = A y with a non-normal A
// A = [[-1, 0.5], [0.2, -2]], y(0) = [1, 1]
// y(x) = expm(A x) y(0)
pub fn linear_system_problem() -> (OdeProblem, OdeSolverSolution) {
    let a = DMatrix::from_row_slice(2, 2, &[-1.0, 0.5, 0.2, -2.0]);
    let rhs_a = a.clone();
    let jac_a = a.clone();
    let problem = OdeBuilder::new(2)
        .rhs(move |_x, y, f| {
            f.gemv(1.0, &rhs_a, y, 0.0);
            Ok(())
        })
        .jacobian(move |_x, _y, jac| {
            for j in 0..2 {
                for i in 0..2 {
                    jac.put(i, j, jac_a[(i, j)]);
                }
            }
            Ok(())
        })
        .build()
        .unwrap();

    let y0 = DVector::from_element(2, 1.0);
    let mut soln = OdeSolverSolution {
        rtol: 1e-4,
        atol: 1e-7,
        ..Default::default()
    };
    for x in [0.0_f64, 1.0, 5.0, 10.0] {
        soln.push((&a * x).exp() * &y0, x);
    }
    (problem, soln)
}
