use log::debug;
use nalgebra::DVector;

use super::{Communicator, Partition, SerialCommunicator};
use crate::{
    distributed_error,
    error::{DiffsolError, DistributedError},
    jacobian::{find_jacobian_non_zeros, JacobianColoring},
    matrix::Triplets,
    OdeProblem, SparseColMat,
};

/// Evaluates the right-hand side, Jacobian and mass matrix of a problem whose equations are
/// partitioned across the workers of a [Communicator].
///
/// Each evaluation zeroes the output, calls the worker's callback, discards entries of equations
/// the worker does not own and sums the partial results over all workers. With a
/// [SerialCommunicator] and no partition this is a plain callback invocation.
pub struct Evaluator<'a, C: Communicator = SerialCommunicator> {
    problem: &'a OdeProblem,
    comm: C,
    owned: Option<Vec<bool>>,
    mass: SparseColMat,
    numerical_jacobian: Option<JacobianColoring>,
    local: Triplets,
}

impl<'a> Evaluator<'a, SerialCommunicator> {
    pub fn serial(problem: &'a OdeProblem) -> Self {
        Self {
            problem,
            comm: SerialCommunicator,
            owned: None,
            mass: problem.mass().clone(),
            numerical_jacobian: None,
            local: Triplets::new(problem.nstates(), problem.nstates()),
        }
    }
}

impl<'a, C: Communicator> Evaluator<'a, C> {
    /// Validates `partition` against the problem and the communicator, then assembles the global
    /// mass matrix from every worker's rows. This is a collective call.
    ///
    /// Without a partition every worker owns every equation, which is only meaningful for a
    /// single worker.
    pub fn new(
        problem: &'a OdeProblem,
        comm: C,
        partition: Option<Partition>,
    ) -> Result<Self, DiffsolError> {
        let n = problem.nstates();
        let mut evaluator = Self {
            problem,
            comm,
            owned: None,
            mass: problem.mass().clone(),
            numerical_jacobian: None,
            local: Triplets::new(n, n),
        };
        let partition = match partition {
            Some(partition) => partition,
            None if evaluator.comm.size() == 1 => return Ok(evaluator),
            None => {
                return Err(distributed_error!(WorkerCountMismatch {
                    expected: 1,
                    found: evaluator.comm.size(),
                }))
            }
        };
        let (rank, size) = (evaluator.comm.rank(), evaluator.comm.size());
        if partition.nworkers() != size {
            return Err(distributed_error!(WorkerCountMismatch {
                expected: partition.nworkers(),
                found: size,
            }));
        }
        partition.validate(n)?;
        debug!(
            "worker {} of {} owns {} of {} equations",
            rank,
            size,
            partition.indices(rank).len(),
            n
        );
        evaluator.owned = Some(partition.owned_mask(rank, n));
        let mut mass = Triplets::from(problem.mass());
        evaluator.gather(&mut mass)?;
        evaluator.mass = SparseColMat::try_from_assembly(&mass)?;
        Ok(evaluator)
    }

    pub fn problem(&self) -> &'a OdeProblem {
        self.problem
    }

    pub fn nstates(&self) -> usize {
        self.problem.nstates()
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn nworkers(&self) -> usize {
        self.comm.size()
    }

    /// The mass matrix combined over all workers.
    pub fn mass(&self) -> &SparseColMat {
        &self.mass
    }

    pub fn barrier(&mut self) -> Result<(), DiffsolError> {
        self.comm.barrier()
    }

    /// `f = f(x, y)` summed over all workers.
    pub fn rhs(
        &mut self,
        x: f64,
        y: &DVector<f64>,
        f: &mut DVector<f64>,
    ) -> Result<(), DiffsolError> {
        evaluate_rhs(self.problem, &mut self.comm, self.owned.as_deref(), x, y, f)
    }

    /// Writes `df/dy (x, y)` into `jac` and returns the number of right-hand-side evaluations it
    /// cost (zero for an analytical Jacobian). `f0` must equal `f(x, y)`.
    pub fn jacobian(
        &mut self,
        x: f64,
        y: &DVector<f64>,
        f0: &DVector<f64>,
        jac: &mut Triplets,
    ) -> Result<usize, DiffsolError> {
        if self.problem.jacobian(x, y, jac)? {
            self.gather(jac)?;
            return Ok(0);
        }
        let mut evaluations = 0;
        if self.numerical_jacobian.is_none() {
            let n = self.nstates();
            let coloring = if self.problem.use_coloring() {
                let (problem, comm, owned) = (self.problem, &mut self.comm, self.owned.as_deref());
                let mut calls = 0;
                let non_zeros = find_jacobian_non_zeros(n, y, |v, out| {
                    calls += 1;
                    evaluate_rhs(problem, comm, owned, x, v, out)
                });
                evaluations += calls;
                match non_zeros {
                    Ok(non_zeros) => JacobianColoring::new(n, n, &non_zeros),
                    // the callback may reject NaN input
                    Err(e) => {
                        debug!("sparsity detection failed, using a dense jacobian: {e}");
                        JacobianColoring::dense(n, n)
                    }
                }
            } else {
                JacobianColoring::dense(n, n)
            };
            debug!("numerical jacobian uses {} colors", coloring.ncolors());
            self.numerical_jacobian = Some(coloring);
        }
        let (problem, comm, owned) = (self.problem, &mut self.comm, self.owned.as_deref());
        if let Some(coloring) = &self.numerical_jacobian {
            evaluations += coloring.jacobian(
                y,
                f0,
                |v, out| evaluate_rhs(problem, comm, owned, x, v, out),
                jac,
            )?;
        }
        Ok(evaluations)
    }

    /// Replaces the worker-local triplets in `triplets` by the triplets of all workers, keeping
    /// only entries in rows each worker owns. Two reductions: entry counts, then packed entries.
    fn gather(&mut self, triplets: &mut Triplets) -> Result<(), DiffsolError> {
        let owned = match &self.owned {
            Some(owned) => owned,
            None => return Ok(()),
        };
        triplets.retain_rows(owned);
        let (rank, size) = (self.comm.rank(), self.comm.size());
        let mut counts = vec![0.0; size];
        counts[rank] = triplets.len() as f64;
        self.comm.all_reduce_sum(&mut counts)?;
        let total = counts.iter().sum::<f64>() as usize;
        let offset = counts[..rank].iter().sum::<f64>() as usize;

        let mut packed = vec![0.0; 3 * total];
        for (k, &(i, j, v)) in triplets.entries().iter().enumerate() {
            let base = 3 * (offset + k);
            packed[base] = i as f64;
            packed[base + 1] = j as f64;
            packed[base + 2] = v;
        }
        self.comm.all_reduce_sum(&mut packed)?;

        self.local.clear();
        self.local.extend(
            packed
                .chunks_exact(3)
                .map(|e| (e[0] as usize, e[1] as usize, e[2])),
        );
        std::mem::swap(&mut self.local, triplets);
        Ok(())
    }
}

fn evaluate_rhs<C: Communicator>(
    problem: &OdeProblem,
    comm: &mut C,
    owned: Option<&[bool]>,
    x: f64,
    y: &DVector<f64>,
    f: &mut DVector<f64>,
) -> Result<(), DiffsolError> {
    problem.rhs(x, y, f)?;
    if let Some(owned) = owned {
        for (fi, own) in f.iter_mut().zip(owned) {
            if !own {
                *fi = 0.0;
            }
        }
        comm.all_reduce_sum(f.as_mut_slice())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::thread;

    use nalgebra::DVector;

    use super::Evaluator;
    use crate::{
        distributed::{Communicator, LocalCommunicator, Partition, SerialCommunicator},
        error::{DiffsolError, DistributedError},
        matrix::Triplets,
        ode_solver::test_models::transistor_amplifier::{amplifier_problem, amplifier_y0},
        OdeBuilder, SparseColMat,
    };

    #[test]
    fn partitioned_rhs_equals_serial_rhs() {
        let (serial_problem, _) = amplifier_problem(None);
        let y = amplifier_y0();
        let x = 0.0123;
        let mut expected = DVector::zeros(8);
        let mut serial = Evaluator::serial(&serial_problem);
        serial.rhs(x, &y, &mut expected).unwrap();
        let mut expected_jac = Triplets::new(8, 8);
        serial.jacobian(x, &y, &expected, &mut expected_jac).unwrap();
        let expected_jac = SparseColMat::try_from_assembly(&expected_jac).unwrap().to_dense();
        let expected_mass = serial.mass().to_dense();

        let partition = Partition::new(vec![vec![0], vec![1, 2], vec![3, 4, 5, 6, 7]]);
        let handles = LocalCommunicator::group(3)
            .into_iter()
            .map(|comm| {
                let partition = partition.clone();
                let y = y.clone();
                thread::spawn(move || {
                    let (problem, _) = amplifier_problem(Some(comm_rank(&comm)));
                    let mut ev = Evaluator::new(&problem, comm, Some(partition)).unwrap();
                    let mut f = DVector::zeros(8);
                    ev.rhs(x, &y, &mut f).unwrap();
                    let mut jac = Triplets::new(8, 8);
                    ev.jacobian(x, &y, &f, &mut jac).unwrap();
                    let jac = SparseColMat::try_from_assembly(&jac).unwrap().to_dense();
                    (f, jac, ev.mass().to_dense())
                })
            })
            .collect::<Vec<_>>();
        for h in handles {
            let (f, jac, mass) = h.join().unwrap();
            for i in 0..8 {
                assert_eq!(f[i], expected[i]);
            }
            assert_eq!(jac, expected_jac);
            assert_eq!(mass, expected_mass);
        }
    }

    fn comm_rank(comm: &LocalCommunicator) -> usize {
        comm.rank()
    }

    #[test]
    fn missing_partition_with_several_workers_is_fatal() {
        let problem = OdeBuilder::new(2).rhs(|_x, _y, _f| Ok(())).build().unwrap();
        let comm = LocalCommunicator::group(2).pop().unwrap();
        assert!(Evaluator::new(&problem, comm, None).is_err());
    }

    #[test]
    fn worker_count_mismatch_is_fatal() {
        let problem = OdeBuilder::new(2).rhs(|_x, _y, _f| Ok(())).build().unwrap();
        let err = Evaluator::new(&problem, SerialCommunicator, Some(Partition::contiguous(2, 2)))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            DiffsolError::DistributedError(DistributedError::WorkerCountMismatch {
                expected: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn numerical_jacobian_is_counted() {
        let problem = OdeBuilder::new(3)
            .rhs(|_x, y, f| {
                f[0] = -y[0];
                f[1] = y[0] - 2.0 * y[1];
                f[2] = y[1] * y[2];
                Ok(())
            })
            .use_coloring(true)
            .build()
            .unwrap();
        let mut ev = Evaluator::serial(&problem);
        let y = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let mut f0 = DVector::zeros(3);
        ev.rhs(0.0, &y, &mut f0).unwrap();
        let mut jac = Triplets::new(3, 3);
        // sparsity detection on the first call
        let first = ev.jacobian(0.0, &y, &f0, &mut jac).unwrap();
        let second = ev.jacobian(0.0, &y, &f0, &mut jac).unwrap();
        assert!(second < 3);
        assert_eq!(first, second + 3);
        let dense = SparseColMat::try_from_assembly(&jac).unwrap().to_dense();
        assert!((dense[(2, 2)] - 2.0).abs() < 1e-6);
        assert!((dense[(1, 0)] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn failed_sparsity_detection_falls_back_to_dense() {
        let problem = OdeBuilder::new(2)
            .rhs(|_x, y, f| {
                if y.iter().any(|v| v.is_nan()) {
                    return Err("state is not finite".into());
                }
                f[0] = -y[0];
                f[1] = y[0] - y[1];
                Ok(())
            })
            .use_coloring(true)
            .build()
            .unwrap();
        let mut ev = Evaluator::serial(&problem);
        let y = DVector::from_vec(vec![1.0, 2.0]);
        let mut f0 = DVector::zeros(2);
        ev.rhs(0.0, &y, &mut f0).unwrap();
        let mut jac = Triplets::new(2, 2);
        // one failed probe, then one evaluation per column
        assert_eq!(ev.jacobian(0.0, &y, &f0, &mut jac).unwrap(), 3);
        let dense = SparseColMat::try_from_assembly(&jac).unwrap().to_dense();
        assert!((dense[(1, 0)] - 1.0).abs() < 1e-6);
        assert!((dense[(1, 1)] + 1.0).abs() < 1e-6);
    }
}
