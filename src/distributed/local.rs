use crossbeam_channel::{unbounded, Receiver, Sender};

use super::Communicator;
use crate::{
    distributed_error,
    error::{DiffsolError, DistributedError},
};

#[derive(Debug)]
struct Message {
    seq: u64,
    rank: usize,
    data: Vec<f64>,
}

/// A [Communicator] connecting a group of in-process workers, typically one per thread.
///
/// Workers exchange owned buffers over channels; nothing is shared between them. Each reduction
/// is an all-to-all exchange tagged with a sequence number, and contributions are summed in rank
/// order so all workers obtain the same bits. A worker may run at most one reduction ahead of the
/// others; messages that arrive early are kept until their reduction starts.
pub struct LocalCommunicator {
    rank: usize,
    size: usize,
    senders: Vec<Option<Sender<Message>>>,
    receiver: Receiver<Message>,
    seq: u64,
    pending: Vec<Message>,
}

impl LocalCommunicator {
    /// Creates the communicators of a group of `size` workers, ordered by rank.
    pub fn group(size: usize) -> Vec<Self> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, receiver)| Self {
                rank,
                size,
                senders: senders
                    .iter()
                    .enumerate()
                    .map(|(dest, s)| (dest != rank).then(|| s.clone()))
                    .collect(),
                receiver,
                seq: 0,
                pending: Vec::new(),
            })
            .collect()
    }

    fn receive(
        &mut self,
        seq: u64,
        contributions: &mut [Option<Vec<f64>>],
    ) -> Result<(), DiffsolError> {
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].seq == seq {
                let msg = self.pending.swap_remove(i);
                contributions[msg.rank] = Some(msg.data);
            } else {
                i += 1;
            }
        }
        while let Some(missing) = contributions.iter().position(Option::is_none) {
            let msg = self
                .receiver
                .recv()
                .map_err(|_| distributed_error!(WorkerDisconnected { rank: missing }))?;
            if msg.seq == seq {
                contributions[msg.rank] = Some(msg.data);
            } else {
                self.pending.push(msg);
            }
        }
        Ok(())
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&mut self) -> Result<(), DiffsolError> {
        self.all_reduce_sum(&mut [])
    }

    fn all_reduce_sum(&mut self, buf: &mut [f64]) -> Result<(), DiffsolError> {
        self.seq += 1;
        if self.size == 1 {
            return Ok(());
        }
        let seq = self.seq;
        for (dest, sender) in self.senders.iter().enumerate() {
            if let Some(sender) = sender {
                sender
                    .send(Message {
                        seq,
                        rank: self.rank,
                        data: buf.to_vec(),
                    })
                    .map_err(|_| distributed_error!(WorkerDisconnected { rank: dest }))?;
            }
        }
        let mut contributions = vec![None; self.size];
        contributions[self.rank] = Some(buf.to_vec());
        self.receive(seq, &mut contributions)?;

        let contributions = contributions.into_iter().flatten().collect::<Vec<_>>();
        for (rank, data) in contributions.iter().enumerate() {
            if data.len() != buf.len() {
                return Err(distributed_error!(BufferLengthMismatch {
                    local: buf.len(),
                    rank,
                    remote: data.len(),
                }));
            }
        }
        for (i, value) in buf.iter_mut().enumerate() {
            let mut sum = 0.0;
            for data in contributions.iter() {
                sum += data[i];
            }
            *value = sum;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::LocalCommunicator;
    use crate::distributed::Communicator;

    #[test]
    fn all_reduce_sums_every_worker() {
        let handles = LocalCommunicator::group(4)
            .into_iter()
            .map(|mut comm| {
                thread::spawn(move || {
                    let mut results = Vec::new();
                    for round in 0..5 {
                        let mut buf = vec![0.0; 3];
                        buf[comm.rank() % 3] = (comm.rank() + round) as f64;
                        comm.all_reduce_sum(&mut buf).unwrap();
                        results.push(buf);
                    }
                    comm.barrier().unwrap();
                    results
                })
            })
            .collect::<Vec<_>>();
        let results = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect::<Vec<_>>();
        for round in 0..5 {
            let expected = vec![(round + round + 3) as f64, (1 + round) as f64, (2 + round) as f64];
            for worker in results.iter() {
                assert_eq!(worker[round], expected);
            }
        }
    }

    #[test]
    fn single_worker_is_identity() {
        let mut comm = LocalCommunicator::group(1).pop().unwrap();
        let mut buf = vec![1.0, -2.0];
        comm.all_reduce_sum(&mut buf).unwrap();
        assert_eq!(buf, vec![1.0, -2.0]);
    }

    #[test]
    fn mismatched_lengths_are_reported() {
        let handles = LocalCommunicator::group(2)
            .into_iter()
            .map(|mut comm| {
                thread::spawn(move || {
                    let mut buf = vec![1.0; comm.rank() + 1];
                    comm.all_reduce_sum(&mut buf).is_err()
                })
            })
            .collect::<Vec<_>>();
        for h in handles {
            assert!(h.join().unwrap());
        }
    }
}
