use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::{
    error::{DiffsolError, OdeSolverError},
    ode_solver_error,
};

/// A tolerance applied uniformly or per component.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Tolerance {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Tolerance {
    pub fn get(&self, i: usize) -> f64 {
        match self {
            Tolerance::Scalar(v) => *v,
            Tolerance::Vector(v) => v[i],
        }
    }

    fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        match self {
            Tolerance::Scalar(v) => Tolerance::Scalar(f(*v)),
            Tolerance::Vector(v) => Tolerance::Vector(v.iter().copied().map(f).collect()),
        }
    }

    fn validate(&self, name: &str, nstates: usize) -> Result<(), DiffsolError> {
        let values: &[f64] = match self {
            Tolerance::Scalar(v) => std::slice::from_ref(v),
            Tolerance::Vector(v) => {
                if v.len() != nstates {
                    return Err(ode_solver_error!(
                        InvalidTolerance,
                        format!("{name} has {} components, expected {nstates}", v.len())
                    ));
                }
                v
            }
        };
        match values.iter().position(|v| !(v.is_finite() && *v > 0.0)) {
            Some(i) => Err(ode_solver_error!(
                InvalidTolerance,
                format!("{name}[{i}] = {} must be positive and finite", values[i])
            )),
            None => Ok(()),
        }
    }
}

impl From<f64> for Tolerance {
    fn from(value: f64) -> Self {
        Tolerance::Scalar(value)
    }
}

impl From<Vec<f64>> for Tolerance {
    fn from(value: Vec<f64>) -> Self {
        Tolerance::Vector(value)
    }
}

/// Absolute and relative error tolerances.
///
/// The error of component `i` is measured against
/// `sc_i = atol_i + rtol_i * max(|y_i|, |y_prev_i|)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    pub atol: Tolerance,
    pub rtol: Tolerance,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self::new(1e-4, 1e-4)
    }
}

impl Tolerances {
    pub fn new(atol: impl Into<Tolerance>, rtol: impl Into<Tolerance>) -> Self {
        Self {
            atol: atol.into(),
            rtol: rtol.into(),
        }
    }

    /// Both tolerances must be strictly positive, and per-component tolerances must have one entry
    /// per state.
    pub fn validate(&self, nstates: usize) -> Result<(), DiffsolError> {
        self.atol.validate("atol", nstates)?;
        self.rtol.validate("rtol", nstates)
    }

    pub fn scale(&self, i: usize, y_prev: f64, y: f64) -> f64 {
        self.atol.get(i) + self.rtol.get(i) * y_prev.abs().max(y.abs())
    }

    /// `sqrt(mean((e_i / sc_i)^2))`
    pub fn error_norm(&self, e: &DVector<f64>, y_prev: &DVector<f64>, y: &DVector<f64>) -> f64 {
        let n = e.len();
        if n == 0 {
            return 0.0;
        }
        let sum = (0..n)
            .map(|i| (e[i] / self.scale(i, y_prev[i], y[i])).powi(2))
            .sum::<f64>();
        (sum / n as f64).sqrt()
    }

    /// The scale vector `atol + rtol * |y|`, used to measure Newton increments.
    pub fn scale_vector(&self, y: &DVector<f64>, out: &mut DVector<f64>) {
        for i in 0..y.len() {
            out[i] = self.scale(i, y[i], y[i]);
        }
    }

    /// Tolerances used internally by Radau5 together with the Newton stopping tolerance.
    ///
    /// `rtol' = 0.1 rtol^(2/3)` and `atol' = rtol' atol / rtol`, so that the error of the order-3
    /// estimator is compared against a tolerance proportional to the order-5 solution's. The
    /// Newton tolerance is `max(10 eps / rtol', min(0.03, sqrt(rtol')))` for the tightest
    /// component.
    pub fn radau(&self) -> (Tolerances, f64) {
        let rtol = self.rtol.map(|r| 0.1 * r.powf(2.0 / 3.0));
        let atol = match (&self.atol, &self.rtol) {
            (Tolerance::Scalar(a), Tolerance::Scalar(r)) => {
                Tolerance::Scalar(0.1 * r.powf(2.0 / 3.0) * a / r)
            }
            (atol, rtol) => {
                let n = match (atol, rtol) {
                    (Tolerance::Vector(v), _) | (_, Tolerance::Vector(v)) => v.len(),
                    _ => 0,
                };
                Tolerance::Vector(
                    (0..n)
                        .map(|i| {
                            let r = rtol.get(i);
                            0.1 * r.powf(2.0 / 3.0) * atol.get(i) / r
                        })
                        .collect(),
                )
            }
        };
        let rtol_min = match &rtol {
            Tolerance::Scalar(r) => *r,
            Tolerance::Vector(v) => v.iter().copied().fold(f64::INFINITY, f64::min),
        };
        let newton_tol = (10.0 * f64::EPSILON / rtol_min).max(0.03_f64.min(rtol_min.sqrt()));
        (Tolerances { atol, rtol }, newton_tol)
    }
}
