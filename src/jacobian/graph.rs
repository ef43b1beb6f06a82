use petgraph::graph::UnGraph;

/// Column intersection graph: one node per Jacobian column, an edge between two columns that
/// share a non-zero row.
pub type Graph = UnGraph<(), ()>;
