//! Sparse storage for the mass matrix, the Jacobian and the implicit iteration matrices.

pub mod iteration;
pub mod sparse_faer;

pub use iteration::IterationPattern;
pub use sparse_faer::SparseColMat;

pub type IndexType = usize;

/// Triplet (coordinate) assembly buffer, filled by the Jacobian callback and used to describe
/// mass matrices.
///
/// Entries are only validated when the buffer is assembled into a [SparseColMat], so callbacks
/// can `put` freely; duplicated `(row, col)` pairs are summed on assembly.
#[derive(Clone, Debug, Default)]
pub struct Triplets {
    nrows: IndexType,
    ncols: IndexType,
    entries: Vec<(IndexType, IndexType, f64)>,
}

impl Triplets {
    pub fn new(nrows: IndexType, ncols: IndexType) -> Self {
        Self::with_capacity(nrows, ncols, 0)
    }

    pub fn with_capacity(nrows: IndexType, ncols: IndexType, capacity: usize) -> Self {
        Self {
            nrows,
            ncols,
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn put(&mut self, row: IndexType, col: IndexType, val: f64) {
        self.entries.push((row, col, val));
    }

    /// Removes all entries while keeping the shape and the allocation.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn nrows(&self) -> IndexType {
        self.nrows
    }

    pub fn ncols(&self) -> IndexType {
        self.ncols
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(IndexType, IndexType, f64)] {
        &self.entries
    }

    /// Drops every entry whose row is not marked in `rows`.
    pub(crate) fn retain_rows(&mut self, rows: &[bool]) {
        self.entries
            .retain(|(i, _, _)| rows.get(*i).copied().unwrap_or(false));
    }

    pub(crate) fn extend(&mut self, other: impl IntoIterator<Item = (IndexType, IndexType, f64)>) {
        self.entries.extend(other);
    }
}

impl From<&SparseColMat> for Triplets {
    fn from(mat: &SparseColMat) -> Self {
        let mut triplets = Triplets::with_capacity(mat.nrows(), mat.ncols(), mat.nnz());
        triplets.extend(mat.triplet_iter().map(|(i, j, v)| (i, j, *v)));
        triplets
    }
}
