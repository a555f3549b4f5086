//! Concurrent execution of jobs, either one thread per job or a bounded pool.

pub mod pool;
pub mod runner;

pub use pool::WorkerPool;
pub use runner::JobRunner;
