//! Job lifecycle events for push-style consumers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::jobs::{JobStatus, JobType};

/// What happened to a job.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEventKind {
    Submitted {
        #[serde(rename = "jobType")]
        job_type: JobType,
    },
    Log {
        line: String,
    },
    Finished {
        status: JobStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// A lifecycle event for one job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: JobEventKind,
}

impl JobEvent {
    fn new(job_id: &str, kind: JobEventKind) -> Self {
        Self {
            job_id: job_id.to_string(),
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn submitted(job_id: &str, job_type: JobType) -> Self {
        Self::new(job_id, JobEventKind::Submitted { job_type })
    }

    pub fn log(job_id: &str, line: &str) -> Self {
        Self::new(
            job_id,
            JobEventKind::Log {
                line: line.to_string(),
            },
        )
    }

    pub fn finished(job_id: &str, status: JobStatus, error: Option<&str>) -> Self {
        Self::new(
            job_id,
            JobEventKind::Finished {
                status,
                error: error.map(|e| e.to_string()),
            },
        )
    }
}

/// Broadcasts job lifecycle events.
///
/// Polling `get`/`list` stays authoritative; a slow subscriber may lag and
/// miss events, it never slows a job down.
#[derive(Clone)]
pub struct JobEventBroadcaster {
    sender: Arc<broadcast::Sender<JobEvent>>,
}

impl JobEventBroadcaster {
    /// Creates a broadcaster with the given channel capacity (at least 1).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: JobEvent) {
        // Ignore errors - no active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobEventBroadcaster {
    fn default() -> Self {
        Self::new(1000)
    }
}
