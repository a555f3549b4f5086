//! Job state: records, their logs and cancellation flags, and the registry
//! that indexes them.

pub mod cancel;
pub mod log_sink;
pub mod record;
pub mod registry;

pub use cancel::CancellationToken;
pub use log_sink::LogSink;
pub use record::{JobRecord, JobStatus, JobSummary, JobType, JobView, Outcome};
pub use registry::{JobRegistry, RetentionPolicy, StatusCounts};

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Acquires a read guard, recovering from poisoning.
///
/// A panicking writer cannot leave job state half-written: every write is a
/// plain field assignment, so the data behind a poisoned lock is still usable.
pub(crate) fn read_guard<'a, T>(lock: &'a RwLock<T>, what: &str) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("{} lock was poisoned, recovering", what);
            poisoned.into_inner()
        }
    }
}

pub(crate) fn write_guard<'a, T>(lock: &'a RwLock<T>, what: &str) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("{} lock was poisoned, recovering", what);
            poisoned.into_inner()
        }
    }
}
