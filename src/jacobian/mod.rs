//! Finite-difference Jacobians for problems that do not supply an analytical one.

use nalgebra::DVector;

use crate::{error::DiffsolError, matrix::Triplets};

use self::{coloring::nonzeros2graph, greedy_coloring::color_graph_greedy};

pub mod coloring;
pub mod graph;
pub mod greedy_coloring;

/// Find the non-zero entries of the Jacobian of `rhs` at `y`.
///
/// Each state is set to NaN in turn and every output that becomes NaN is recorded as depending on
/// it. Dependencies hidden behind comparisons (which are false for NaN) are not detected.
pub fn find_jacobian_non_zeros<F>(
    nrows: usize,
    y: &DVector<f64>,
    mut rhs: F,
) -> Result<Vec<(usize, usize)>, DiffsolError>
where
    F: FnMut(&DVector<f64>, &mut DVector<f64>) -> Result<(), DiffsolError>,
{
    let mut v = y.clone();
    let mut col = DVector::zeros(nrows);
    let mut non_zeros = Vec::with_capacity(y.len());
    for j in 0..y.len() {
        v[j] = f64::NAN;
        col.fill(0.0);
        rhs(&v, &mut col)?;
        for i in 0..nrows {
            if col[i].is_nan() {
                non_zeros.push((i, j));
            }
        }
        v[j] = y[j];
    }
    Ok(non_zeros)
}

/// Forward-difference Jacobian evaluation, perturbing structurally orthogonal columns together.
///
/// A dense instance perturbs one column per right-hand-side evaluation; a sparse instance groups
/// columns by a greedy coloring of the column intersection graph, so a banded Jacobian costs a
/// handful of evaluations regardless of the problem size. The emitted triplet pattern is the same
/// at every evaluation, including entries whose value happens to be zero.
#[derive(Clone, Debug)]
pub struct JacobianColoring {
    nrows: usize,
    ncols: usize,
    cols_per_color: Vec<Vec<usize>>,
    entries_per_color: Vec<Vec<(usize, usize)>>,
}

impl JacobianColoring {
    pub fn new(nrows: usize, ncols: usize, non_zeros: &[(usize, usize)]) -> Self {
        let graph = nonzeros2graph(non_zeros, nrows, ncols);
        let coloring = color_graph_greedy(&graph);
        let ncolors = coloring.iter().copied().max().unwrap_or(0);
        let mut cols_per_color = vec![Vec::new(); ncolors];
        for (j, &c) in coloring.iter().enumerate() {
            cols_per_color[c - 1].push(j);
        }
        let mut entries_per_color = vec![Vec::new(); ncolors];
        for &(i, j) in non_zeros {
            entries_per_color[coloring[j] - 1].push((i, j));
        }
        Self {
            nrows,
            ncols,
            cols_per_color,
            entries_per_color,
        }
    }

    /// One color per column, every entry present.
    pub fn dense(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            cols_per_color: (0..ncols).map(|j| vec![j]).collect(),
            entries_per_color: (0..ncols)
                .map(|j| (0..nrows).map(|i| (i, j)).collect())
                .collect(),
        }
    }

    /// Number of right-hand-side evaluations per Jacobian.
    pub fn ncolors(&self) -> usize {
        self.cols_per_color.len()
    }

    /// Writes `df/dy` at `y` into `out` given `f0 = f(y)`; returns the number of `rhs` calls made.
    pub fn jacobian<F>(
        &self,
        y: &DVector<f64>,
        f0: &DVector<f64>,
        mut rhs: F,
        out: &mut Triplets,
    ) -> Result<usize, DiffsolError>
    where
        F: FnMut(&DVector<f64>, &mut DVector<f64>) -> Result<(), DiffsolError>,
    {
        out.clear();
        let mut v = y.clone();
        let mut f1 = DVector::zeros(self.nrows);
        let mut delta = vec![0.0; self.ncols];
        for (cols, entries) in self.cols_per_color.iter().zip(&self.entries_per_color) {
            for &j in cols {
                delta[j] = (f64::EPSILON * y[j].abs().max(1e-5)).sqrt();
                v[j] = y[j] + delta[j];
            }
            f1.fill(0.0);
            rhs(&v, &mut f1)?;
            for &(i, j) in entries {
                out.put(i, j, (f1[i] - f0[i]) / delta[j]);
            }
            for &j in cols {
                v[j] = y[j];
            }
        }
        Ok(self.ncolors())
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DVector;

    use super::{find_jacobian_non_zeros, JacobianColoring};
    use crate::{error::DiffsolError, matrix::Triplets, SparseColMat};

    // f_i = y_{i-1} - 2 y_i + y_{i+1} + y_i^2
    fn laplacian(y: &DVector<f64>, f: &mut DVector<f64>) -> Result<(), DiffsolError> {
        let n = y.len();
        for i in 0..n {
            let left = if i > 0 { y[i - 1] } else { 0.0 };
            let right = if i + 1 < n { y[i + 1] } else { 0.0 };
            f[i] = left - 2.0 * y[i] + right + y[i] * y[i];
        }
        Ok(())
    }

    #[test]
    fn sparsity_of_tridiagonal_rhs() {
        let y = DVector::from_element(4, 1.0);
        let nz = find_jacobian_non_zeros(4, &y, laplacian).unwrap();
        assert_eq!(nz.len(), 10);
        assert!(nz.contains(&(0, 1)));
        assert!(!nz.contains(&(0, 2)));
    }

    #[test]
    fn colored_jacobian_matches_dense() {
        let n = 6;
        let y = DVector::from_fn(n, |i, _| 1.0 + 0.1 * i as f64);
        let mut f0 = DVector::zeros(n);
        laplacian(&y, &mut f0).unwrap();

        let nz = find_jacobian_non_zeros(n, &y, laplacian).unwrap();
        let sparse = JacobianColoring::new(n, n, &nz);
        assert_eq!(sparse.ncolors(), 3);
        let dense = JacobianColoring::dense(n, n);
        assert_eq!(dense.ncolors(), n);

        let mut t_sparse = Triplets::new(n, n);
        let mut t_dense = Triplets::new(n, n);
        sparse.jacobian(&y, &f0, laplacian, &mut t_sparse).unwrap();
        dense.jacobian(&y, &f0, laplacian, &mut t_dense).unwrap();
        let a = SparseColMat::try_from_assembly(&t_sparse).unwrap().to_dense();
        let b = SparseColMat::try_from_assembly(&t_dense).unwrap().to_dense();
        for i in 0..n {
            for j in 0..n {
                let exact = match (i as i64 - j as i64).abs() {
                    0 => -2.0 + 2.0 * y[i],
                    1 => 1.0,
                    _ => 0.0,
                };
                assert!((a[(i, j)] - exact).abs() < 1e-5);
                assert!((b[(i, j)] - exact).abs() < 1e-5);
            }
        }
    }
}
