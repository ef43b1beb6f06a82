use nalgebra::DVector;

use super::OdeSolverSolution;
use crate::{distributed::Partition, OdeBuilder, OdeProblem, Triplets};

// two-stage transistor amplifier, an index-1 DAE with a singular mass matrix
// from E. Hairer, G. Wanner, Solving Ordinary Differential Equations II, Section VI.1
const UE: f64 = 0.1;
const UB: f64 = 6.0;
const UF: f64 = 0.026;
const ALPHA: f64 = 0.99;
const BETA: f64 = 1e-6;
const R0: f64 = 1000.0;
const R1: f64 = 9000.0;
const R2: f64 = 9000.0;
const R3: f64 = 9000.0;
const R4: f64 = 9000.0;
const R5: f64 = 9000.0;
const R6: f64 = 9000.0;
const R7: f64 = 9000.0;
const R8: f64 = 9000.0;
const R9: f64 = 9000.0;
const W: f64 = 2.0 * 3.141592654 * 100.0;
const C: [f64; 5] = [1e-6, 2e-6, 3e-6, 4e-6, 5e-6];

/// Worker that owns equation `i` when the problem is split over three workers.
fn owner(i: usize) -> usize {
    match i {
        0 => 0,
        1 | 2 => 1,
        _ => 2,
    }
}

pub fn amplifier_partition() -> Partition {
    Partition::new(vec![vec![0], vec![1, 2], vec![3, 4, 5, 6, 7]])
}

pub fn amplifier_y0() -> DVector<f64> {
    let v1 = UB / (R6 / R5 + 1.0);
    let v2 = UB / (R2 / R1 + 1.0);
    DVector::from_vec(vec![0.0, UB, v1, v1, UB, v2, v2, 0.0])
}

/// The amplifier problem. With `Some(rank)` the callbacks only produce the equations owned by
/// that worker of [amplifier_partition]; with `None` they produce all of them.
pub fn amplifier_problem(rank: Option<usize>) -> (OdeProblem, OdeSolverSolution) {
    let owns = move |i: usize| rank.map_or(true, |r| owner(i) == r);

    let mut mass = Triplets::new(8, 8);
    for (i, j, v) in [
        (0, 0, -C[4]),
        (0, 1, C[4]),
        (1, 0, C[4]),
        (1, 1, -C[4]),
        (2, 2, -C[3]),
        (3, 3, -C[2]),
        (3, 4, C[2]),
        (4, 3, C[2]),
        (4, 4, -C[2]),
        (5, 5, -C[1]),
        (6, 6, -C[0]),
        (6, 7, C[0]),
        (7, 6, C[0]),
        (7, 7, -C[0]),
    ] {
        if owns(i) {
            mass.put(i, j, v);
        }
    }

    let problem = OdeBuilder::new(8)
        .rhs(move |x, y, f| {
            let fac1 = BETA * (((y[3] - y[2]) / UF).exp() - 1.0);
            let fac2 = BETA * (((y[6] - y[5]) / UF).exp() - 1.0);
            let values = [
                y[0] / R9,
                (y[1] - UB) / R8 + ALPHA * fac1,
                y[2] / R7 - fac1,
                y[3] / R5 + (y[3] - UB) / R6 + (1.0 - ALPHA) * fac1,
                (y[4] - UB) / R4 + ALPHA * fac2,
                y[5] / R3 - fac2,
                y[6] / R1 + (y[6] - UB) / R2 + (1.0 - ALPHA) * fac2,
                (y[7] - UE * (W * x).sin()) / R0,
            ];
            for (i, v) in values.into_iter().enumerate() {
                if owns(i) {
                    f[i] = v;
                }
            }
            Ok(())
        })
        .jacobian(move |_x, y, jac| {
            let f14 = BETA * ((y[3] - y[2]) / UF).exp() / UF;
            let f27 = BETA * ((y[6] - y[5]) / UF).exp() / UF;
            for (i, j, v) in [
                (0, 0, 1.0 / R9),
                (1, 1, 1.0 / R8),
                (1, 2, -ALPHA * f14),
                (1, 3, ALPHA * f14),
                (2, 2, 1.0 / R7 + f14),
                (2, 3, -f14),
                (3, 3, 1.0 / R5 + 1.0 / R6 + (1.0 - ALPHA) * f14),
                (3, 2, -(1.0 - ALPHA) * f14),
                (4, 4, 1.0 / R4),
                (4, 5, -ALPHA * f27),
                (4, 6, ALPHA * f27),
                (5, 5, 1.0 / R3 + f27),
                (5, 6, -f27),
                (6, 6, 1.0 / R1 + 1.0 / R2 + (1.0 - ALPHA) * f27),
                (6, 5, -(1.0 - ALPHA) * f27),
                (7, 7, 1.0 / R0),
            ] {
                if owns(i) {
                    jac.put(i, j, v);
                }
            }
            Ok(())
        })
        .mass(mass)
        .build()
        .unwrap();

    let mut soln = OdeSolverSolution {
        rtol: 1e-3,
        atol: 1e-4,
        ..Default::default()
    };
    soln.push(amplifier_y0(), 0.0);
    soln.push(
        DVector::from_vec(vec![
            0.472_694_456,
            5.535_355_478,
            2.494_964_055,
            2.434_180_000,
            3.467_284_033,
            2.849_957_729,
            3.006_521_523,
            -0.005_561_951,
        ]),
        0.05,
    );
    (problem, soln)
}
