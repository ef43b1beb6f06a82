// Translated from https://github.com/JuliaDiff/SparseDiffTools.jl under an MIT license

use petgraph::graph::NodeIndex;

use super::graph::Graph;

/// Returns, for each of the `nrows` rows, the column indices of its non-zeros.
fn cols_by_rows(non_zeros: &[(usize, usize)], nrows: usize) -> Vec<Vec<usize>> {
    let mut cols_by_rows = vec![Vec::new(); nrows];
    for &(i, j) in non_zeros {
        cols_by_rows[i].push(j);
    }
    cols_by_rows
}

/// Builds the column intersection graph of a sparse matrix: columns are vertices and two vertices
/// are connected when the columns are not structurally orthogonal, i.e. they have a non-zero in a
/// common row and cannot be perturbed together by a finite-difference Jacobian.
///
/// non_zeros: A vector of indices (i, j) where i is the row index and j is the column index
pub fn nonzeros2graph(non_zeros: &[(usize, usize)], nrows: usize, ncols: usize) -> Graph {
    let cols_by_rows = cols_by_rows(non_zeros, nrows);
    let mut edges = Vec::new();
    for cols in cols_by_rows.iter() {
        for (k, &cur_col) in cols.iter().enumerate() {
            for &next_col in cols[..k].iter() {
                if next_col != cur_col {
                    edges.push((cur_col, next_col));
                }
            }
        }
    }
    edges.sort_unstable();
    edges.dedup();
    let mut graph = Graph::with_capacity(ncols, edges.len());
    for _ in 0..ncols {
        graph.add_node(());
    }
    for &(i, j) in edges.iter() {
        graph.update_edge(NodeIndex::new(i), NodeIndex::new(j), ());
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::nonzeros2graph;

    #[test]
    fn tridiagonal_graph() {
        // | x x . |
        // | x x x |
        // | . x x |
        let nz = vec![(0, 0), (0, 1), (1, 0), (1, 1), (1, 2), (2, 1), (2, 2)];
        let graph = nonzeros2graph(&nz, 3, 3);
        assert_eq!(graph.node_count(), 3);
        // columns 0 and 2 share row 1
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn diagonal_graph_has_no_edges() {
        let nz = vec![(0, 0), (1, 1), (2, 2)];
        let graph = nonzeros2graph(&nz, 3, 3);
        assert_eq!(graph.edge_count(), 0);
    }
}
