use nalgebra::{DMatrix, DVector};

use crate::{
    error::{DiffsolError, OdeSolverError},
    ode_solver_error,
};

/// Butcher tableau of an explicit Runge-Kutta method with an optional embedded error estimate.
///
/// `d` holds the error weights `b - b_hat`, so the local error estimate of a step is
/// `h * sum_i d_i k_i`.
#[derive(Clone, Debug, PartialEq)]
pub struct Tableau {
    a: DMatrix<f64>,
    b: DVector<f64>,
    c: DVector<f64>,
    d: Option<DVector<f64>>,
    order: usize,
    error_order: Option<usize>,
}

impl Tableau {
    /// Dormand-Prince 5(4)
    /// from J.R. Dormand and P.J. Prince, A family of embedded Runge-Kutta formulae, Journal of
    /// Computational and Applied Mathematics 6 (1980) 19-26.
    pub fn dopri5() -> Self {
        let a = DMatrix::from_row_slice(
            7,
            7,
            &[
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
                // row 1
                1.0 / 5.0,
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
                // row 2
                3.0 / 40.0,
                9.0 / 40.0,
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
                // row 3
                44.0 / 45.0,
                -56.0 / 15.0,
                32.0 / 9.0,
                0.0,
                0.0,
                0.0,
                0.0,
                // row 4
                19372.0 / 6561.0,
                -25360.0 / 2187.0,
                64448.0 / 6561.0,
                -212.0 / 729.0,
                0.0,
                0.0,
                0.0,
                // row 5
                9017.0 / 3168.0,
                -355.0 / 33.0,
                46732.0 / 5247.0,
                49.0 / 176.0,
                -5103.0 / 18656.0,
                0.0,
                0.0,
                // row 6
                35.0 / 384.0,
                0.0,
                500.0 / 1113.0,
                125.0 / 192.0,
                -2187.0 / 6784.0,
                11.0 / 84.0,
                0.0,
            ],
        );
        let b = DVector::from_vec(vec![
            35.0 / 384.0,
            0.0,
            500.0 / 1113.0,
            125.0 / 192.0,
            -2187.0 / 6784.0,
            11.0 / 84.0,
            0.0,
        ]);
        let c = DVector::from_vec(vec![
            0.0,
            1.0 / 5.0,
            3.0 / 10.0,
            4.0 / 5.0,
            8.0 / 9.0,
            1.0,
            1.0,
        ]);
        let d = DVector::from_vec(vec![
            71.0 / 57600.0,
            0.0,
            -71.0 / 16695.0,
            71.0 / 1920.0,
            -17253.0 / 339200.0,
            22.0 / 525.0,
            -1.0 / 40.0,
        ]);
        Self {
            a,
            b,
            c,
            d: Some(d),
            order: 5,
            error_order: Some(4),
        }
    }

    /// Heun's method with the explicit Euler solution as the embedded estimate.
    pub fn heun_euler() -> Self {
        let a = DMatrix::from_row_slice(2, 2, &[0.0, 0.0, 1.0, 0.0]);
        let b = DVector::from_vec(vec![0.5, 0.5]);
        let c = DVector::from_vec(vec![0.0, 1.0]);
        let d = DVector::from_vec(vec![-0.5, 0.5]);
        Self {
            a,
            b,
            c,
            d: Some(d),
            order: 2,
            error_order: Some(1),
        }
    }

    pub fn forward_euler() -> Self {
        Self {
            a: DMatrix::zeros(1, 1),
            b: DVector::from_element(1, 1.0),
            c: DVector::zeros(1),
            d: None,
            order: 1,
            error_order: None,
        }
    }

    pub fn new(
        a: DMatrix<f64>,
        b: DVector<f64>,
        c: DVector<f64>,
        d: Option<DVector<f64>>,
        order: usize,
        error_order: Option<usize>,
    ) -> Result<Self, DiffsolError> {
        let s = c.len();
        if a.nrows() != s || a.ncols() != s {
            return Err(ode_solver_error!(
                InvalidTableau,
                format!("a is {}x{}, expected {s}x{s}", a.nrows(), a.ncols())
            ));
        }
        if b.len() != s || d.as_ref().is_some_and(|d| d.len() != s) {
            return Err(ode_solver_error!(
                InvalidTableau,
                format!("b and d must have {s} entries")
            ));
        }
        if d.is_some() != error_order.is_some() {
            return Err(ode_solver_error!(
                InvalidTableau,
                "error weights and error order must be given together"
            ));
        }
        for i in 0..s {
            for j in i..s {
                if a[(i, j)] != 0.0 {
                    return Err(ode_solver_error!(
                        InvalidTableau,
                        format!("a[({i}, {j})] must be zero for an explicit method")
                    ));
                }
            }
        }
        Ok(Self {
            a,
            b,
            c,
            d,
            order,
            error_order,
        })
    }

    pub fn a(&self) -> &DMatrix<f64> {
        &self.a
    }

    pub fn b(&self) -> &DVector<f64> {
        &self.b
    }

    pub fn c(&self) -> &DVector<f64> {
        &self.c
    }

    pub fn d(&self) -> Option<&DVector<f64>> {
        self.d.as_ref()
    }

    pub fn s(&self) -> usize {
        self.c.len()
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn error_order(&self) -> Option<usize> {
        self.error_order
    }

    /// The last stage is evaluated at `x + h` on the propagated solution, so it can be reused as
    /// the first stage of the next step.
    pub fn is_fsal(&self) -> bool {
        let s = self.s();
        s > 1 && self.c[s - 1] == 1.0 && (0..s).all(|j| self.a[(s - 1, j)] == self.b[j])
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{DMatrix, DVector};

    use super::Tableau;

    fn check_consistency(tableau: &Tableau) {
        let s = tableau.s();
        for i in 0..s {
            let row_sum = (0..s).map(|j| tableau.a()[(i, j)]).sum::<f64>();
            assert!((row_sum - tableau.c()[i]).abs() < 1e-14);
        }
        assert!((tableau.b().sum() - 1.0).abs() < 1e-14);
        if let Some(d) = tableau.d() {
            assert!(d.sum().abs() < 1e-14);
        }
    }

    #[test]
    fn builtin_tableaus() {
        let dopri5 = Tableau::dopri5();
        check_consistency(&dopri5);
        assert!(dopri5.is_fsal());
        assert_eq!(dopri5.error_order(), Some(4));
        // fifth order quadrature condition
        let b_c4 = (0..7)
            .map(|i| dopri5.b()[i] * dopri5.c()[i].powi(4))
            .sum::<f64>();
        assert!((b_c4 - 0.2).abs() < 1e-14);

        let heun = Tableau::heun_euler();
        check_consistency(&heun);
        assert!(!heun.is_fsal());
        check_consistency(&Tableau::forward_euler());
    }

    #[test]
    fn implicit_tableau_is_rejected() {
        let a = DMatrix::from_element(1, 1, 1.0);
        let b = DVector::from_element(1, 1.0);
        let c = DVector::from_element(1, 1.0);
        assert!(Tableau::new(a, b, c, None, 1, None).is_err());
    }
}
