// Translated from https://github.com/JuliaDiff/SparseDiffTools.jl under an MIT license

use petgraph::graph::NodeIndex;

use super::graph::Graph;

/// Greedy graph coloring algorithm.
///
/// Find a coloring of a given input graph such that
/// no two vertices connected by an edge have the same
/// color using greedy approach. The number of colors
/// used may be equal or greater than the chromatic
/// number `χ(G)` of the graph. Colors start at 1.
pub fn color_graph_greedy(graph: &Graph) -> Vec<usize> {
    let n = graph.node_count();
    let mut result = vec![0; n];
    if n == 0 {
        return result;
    }
    result[0] = 1;
    // one more slot than vertices so a free color always exists
    let mut used = vec![false; n + 1];

    for ii in 1..n {
        for j in graph.neighbors(NodeIndex::new(ii)) {
            if result[j.index()] != 0 {
                used[result[j.index()] - 1] = true;
            }
        }
        if let Some(free) = used.iter().position(|u| !u) {
            result[ii] = free + 1;
        }
        used.iter_mut().for_each(|u| *u = false);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::color_graph_greedy;
    use crate::jacobian::coloring::nonzeros2graph;

    #[test]
    fn adjacent_columns_get_different_colors() {
        let nz = vec![(0, 0), (0, 1), (1, 0), (1, 1), (1, 2), (2, 1), (2, 2)];
        let colors = color_graph_greedy(&nonzeros2graph(&nz, 3, 3));
        assert_eq!(colors, vec![1, 2, 3]);
        let nz = vec![(0, 0), (0, 1), (1, 1), (1, 2), (2, 2), (2, 3), (3, 3)];
        let colors = color_graph_greedy(&nonzeros2graph(&nz, 4, 4));
        assert_eq!(colors, vec![1, 2, 1, 2]);
    }
}
