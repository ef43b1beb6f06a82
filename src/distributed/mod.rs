//! Partitioned right-hand-side evaluation across cooperating workers.
//!
//! Every worker runs the same stepping loop on its own copy of the solver. Right-hand-side and
//! Jacobian callbacks compute only the equations a worker owns (its [Partition] entry); the
//! [Evaluator] combines the partial results with a collective sum over a [Communicator] before
//! the integrators see them. The reduction is the only point where workers interact, so every
//! worker must issue the same sequence of evaluations; the solver guarantees this because all of
//! its decisions are made from reduced, hence identical, data.

use crate::error::DiffsolError;

pub mod evaluator;
pub mod local;
pub mod partition;

pub use evaluator::Evaluator;
pub use local::LocalCommunicator;
pub use partition::Partition;

/// Collective-communication context shared by a fixed group of workers.
pub trait Communicator {
    /// Identity of this worker, in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of workers in the group.
    fn size(&self) -> usize;

    /// Blocks until every worker has reached the barrier.
    fn barrier(&mut self) -> Result<(), DiffsolError>;

    /// Replaces `buf` on every worker with the element-wise sum of all workers' buffers.
    ///
    /// The result is bit-identical on every worker.
    fn all_reduce_sum(&mut self, buf: &mut [f64]) -> Result<(), DiffsolError>;
}

/// The communicator of a single worker; all collective operations are no-ops.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&mut self) -> Result<(), DiffsolError> {
        Ok(())
    }

    fn all_reduce_sum(&mut self, _buf: &mut [f64]) -> Result<(), DiffsolError> {
        Ok(())
    }
}
