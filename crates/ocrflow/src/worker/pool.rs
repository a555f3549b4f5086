use std::sync::{Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};

use super::runner::JobExecution;
use crate::error::RunnerError;

struct PoolState {
    /// `None` once the pool is shut down. Dropping it disconnects the queue,
    /// which is what tells workers to exit after draining it.
    job_sender: Option<Sender<JobExecution>>,
    workers: Vec<JoinHandle<()>>,
}

/// Fixed set of worker threads draining a shared job queue.
///
/// The queue is unbounded so that handing over a job never blocks the
/// submitter; queued jobs simply wait for a free worker.
pub struct WorkerPool {
    state: Mutex<PoolState>,
    job_receiver: Receiver<JobExecution>,
}

impl WorkerPool {
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub(crate) fn new(worker_count: usize) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");
        let (job_sender, job_receiver) = unbounded::<JobExecution>();

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();

            match thread::Builder::new()
                .name(format!("job-worker-{}", worker_id))
                .spawn(move || run_worker(worker_id, job_rx))
            {
                Ok(handle) => workers.push(handle),
                Err(e) => error!("Failed to start worker {}: {}", worker_id, e),
            }
        }

        info!("Started {} workers", workers.len());
        let job_sender = if workers.is_empty() {
            error!("No worker could be started, rejecting all jobs");
            None
        } else {
            Some(job_sender)
        };

        Self {
            state: Mutex::new(PoolState {
                job_sender,
                workers,
            }),
            job_receiver,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Worker pool lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Queues `execution`. Fails once [`shutdown`](Self::shutdown) has run;
    /// a job accepted here is always picked up by a worker.
    pub(crate) fn submit(&self, execution: JobExecution) -> Result<(), RunnerError> {
        let state = self.lock_state();
        let Some(sender) = &state.job_sender else {
            return Err(RunnerError::ChannelClosed);
        };
        sender
            .send(execution)
            .map_err(|_| RunnerError::ChannelClosed)
    }

    /// Number of jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        self.job_receiver.len()
    }

    /// Rejects further submissions; workers exit once the queue is empty.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.lock_state().job_sender = None;
    }

    pub fn is_shutdown(&self) -> bool {
        self.lock_state().job_sender.is_none()
    }

    /// Joins every worker. Returns immediately unless [`shutdown`](Self::shutdown)
    /// was called first.
    pub fn wait(&self) {
        let workers = {
            let mut state = self.lock_state();
            if state.job_sender.is_some() {
                warn!("WorkerPool::wait called before shutdown, ignoring");
                return;
            }
            std::mem::take(&mut state.workers)
        };

        for (i, worker) in workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }
}

fn run_worker(worker_id: usize, job_receiver: Receiver<JobExecution>) {
    debug!("Worker {} started", worker_id);

    // `recv` fails only once the sender is gone and the queue is empty.
    while let Ok(execution) = job_receiver.recv() {
        debug!("Worker {} processing job {}", worker_id, execution.job_id());
        execution.execute();
    }

    debug!("Worker {} stopped", worker_id);
}
