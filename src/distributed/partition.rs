use serde::{Deserialize, Serialize};

use crate::{
    distributed_error,
    error::{DiffsolError, DistributedError},
};

/// Assignment of equation (state) indices to workers.
///
/// Entry `r` lists the equations worker `r` computes. A valid partition covers every equation of
/// the problem exactly once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    workers: Vec<Vec<usize>>,
}

impl Partition {
    pub fn new(workers: Vec<Vec<usize>>) -> Self {
        Self { workers }
    }

    /// Splits `0..nstates` into `nworkers` contiguous blocks whose sizes differ by at most one.
    pub fn contiguous(nstates: usize, nworkers: usize) -> Self {
        let nworkers = nworkers.max(1);
        let base = nstates / nworkers;
        let extra = nstates % nworkers;
        let mut start = 0;
        let workers = (0..nworkers)
            .map(|r| {
                let len = base + usize::from(r < extra);
                let block = (start..start + len).collect();
                start += len;
                block
            })
            .collect();
        Self { workers }
    }

    pub fn nworkers(&self) -> usize {
        self.workers.len()
    }

    pub fn indices(&self, rank: usize) -> &[usize] {
        self.workers.get(rank).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Checks that every index in `0..nstates` is owned by exactly one worker.
    pub fn validate(&self, nstates: usize) -> Result<(), DiffsolError> {
        let mut owner: Vec<Option<usize>> = vec![None; nstates];
        for (rank, indices) in self.workers.iter().enumerate() {
            for &index in indices {
                match owner.get(index) {
                    None => {
                        return Err(distributed_error!(PartitionIndexOutOfRange {
                            index,
                            nstates
                        }))
                    }
                    Some(Some(first)) => {
                        return Err(distributed_error!(OverlappingPartition {
                            index,
                            first: *first,
                            second: rank,
                        }))
                    }
                    Some(None) => owner[index] = Some(rank),
                }
            }
        }
        if let Some(index) = owner.iter().position(Option::is_none) {
            return Err(distributed_error!(IncompletePartition { index }));
        }
        Ok(())
    }

    /// `mask[i]` is `true` if worker `rank` owns equation `i`.
    pub fn owned_mask(&self, rank: usize, nstates: usize) -> Vec<bool> {
        let mut mask = vec![false; nstates];
        for &i in self.indices(rank) {
            if i < nstates {
                mask[i] = true;
            }
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::Partition;
    use crate::error::{DiffsolError, DistributedError};

    #[test]
    fn contiguous_blocks() {
        let p = Partition::contiguous(8, 3);
        assert_eq!(p.indices(0), &[0, 1, 2]);
        assert_eq!(p.indices(1), &[3, 4, 5]);
        assert_eq!(p.indices(2), &[6, 7]);
        p.validate(8).unwrap();
        assert_eq!(p.owned_mask(2, 8), vec![false, false, false, false, false, false, true, true]);
    }

    #[test]
    fn invalid_partitions() {
        let err = Partition::new(vec![vec![0, 1], vec![1, 2]]).validate(3).unwrap_err();
        assert!(matches!(
            err,
            DiffsolError::DistributedError(DistributedError::OverlappingPartition {
                index: 1,
                first: 0,
                second: 1
            })
        ));
        let err = Partition::new(vec![vec![0], vec![2]]).validate(3).unwrap_err();
        assert!(matches!(
            err,
            DiffsolError::DistributedError(DistributedError::IncompletePartition { index: 1 })
        ));
        let err = Partition::new(vec![vec![0, 3]]).validate(3).unwrap_err();
        assert!(matches!(
            err,
            DiffsolError::DistributedError(DistributedError::PartitionIndexOutOfRange {
                index: 3,
                ..
            })
        ));
    }
}
