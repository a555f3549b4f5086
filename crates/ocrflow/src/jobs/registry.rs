//! In-memory job registry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;

use super::record::{JobRecord, JobStatus};
use super::{read_guard, write_guard};
use crate::tasks::JobParams;

/// How many finished jobs the registry keeps around.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Every job stays for the lifetime of the registry.
    #[default]
    KeepAll,
    /// At most this many terminal jobs are kept; the oldest go first.
    /// Running jobs are never evicted.
    MaxFinished(usize),
}

/// Number of jobs per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

#[derive(Default)]
struct Index {
    by_id: HashMap<String, Arc<JobRecord>>,
    /// Ids in creation order, oldest first.
    order: Vec<String>,
}

/// Concurrency-safe store of job records keyed by id.
///
/// The index lock is only held for map operations; each record guards its
/// own mutable state, so a job writing its log never contends with readers
/// of other jobs. `list` returns records in creation order, oldest first.
pub struct JobRegistry {
    index: RwLock<Index>,
    retention: RetentionPolicy,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::with_retention(RetentionPolicy::KeepAll)
    }

    pub fn with_retention(retention: RetentionPolicy) -> Self {
        Self {
            index: RwLock::new(Index::default()),
            retention,
        }
    }

    /// Allocates a fresh id, inserts a running record and returns it.
    pub fn create(&self, params: JobParams) -> Arc<JobRecord> {
        let mut index = write_guard(&self.index, "Job registry");

        let mut id = uuid::Uuid::new_v4().to_string();
        while index.by_id.contains_key(&id) {
            id = uuid::Uuid::new_v4().to_string();
        }

        let record = Arc::new(JobRecord::new(id.clone(), params));
        index.by_id.insert(id.clone(), Arc::clone(&record));
        index.order.push(id);
        log::debug!(
            "Registered {} job {} ({} total)",
            record.job_type(),
            record.id(),
            index.order.len()
        );

        self.evict_finished(&mut index);
        record
    }

    pub fn get(&self, id: &str) -> Option<Arc<JobRecord>> {
        read_guard(&self.index, "Job registry").by_id.get(id).cloned()
    }

    /// All records in creation order, oldest first.
    pub fn list(&self) -> Vec<Arc<JobRecord>> {
        let index = read_guard(&self.index, "Job registry");
        index
            .order
            .iter()
            .filter_map(|id| index.by_id.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        read_guard(&self.index, "Job registry").order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for record in self.list() {
            match record.status() {
                JobStatus::Running => counts.running += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    /// Applies the retention policy now rather than at the next `create`.
    pub fn prune(&self) -> usize {
        let mut index = write_guard(&self.index, "Job registry");
        self.evict_finished(&mut index)
    }

    fn evict_finished(&self, index: &mut Index) -> usize {
        let max_finished = match self.retention {
            RetentionPolicy::KeepAll => return 0,
            RetentionPolicy::MaxFinished(max) => max,
        };

        let finished: Vec<String> = index
            .order
            .iter()
            .filter(|id| index.by_id.get(*id).is_some_and(|r| r.is_terminal()))
            .cloned()
            .collect();
        if finished.len() <= max_finished {
            return 0;
        }

        let evicted = &finished[..finished.len() - max_finished];
        for id in evicted {
            index.by_id.remove(id);
        }
        index.order.retain(|id| index.by_id.contains_key(id));
        log::info!("Evicted {} finished job(s) from registry", evicted.len());
        evicted.len()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
