//! Job record: identity, parameters, and lifecycle state of one job.

use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cancel::CancellationToken;
use super::log_sink::LogSink;
use super::{read_guard, write_guard};
use crate::error::OrchestratorError;
use crate::tasks::{JobParams, TaskDetail};

/// Pipeline stage a job runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Drive,
    Ocr,
    Analysis,
}

impl JobType {
    pub const ALL: [JobType; 3] = [JobType::Drive, JobType::Ocr, JobType::Analysis];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Drive => "drive",
            JobType::Ocr => "ocr",
            JobType::Analysis => "analysis",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drive" => Ok(JobType::Drive),
            "ocr" => Ok(JobType::Ocr),
            "analysis" => Ok(JobType::Analysis),
            other => Err(OrchestratorError::InvalidJobType(other.to_string())),
        }
    }
}

/// Lifecycle status of a job.
///
/// `Running` is the only non-terminal state. A job leaves it exactly once.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal transition applied by the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed(String),
    Cancelled,
}

impl Outcome {
    fn status(&self) -> JobStatus {
        match self {
            Outcome::Completed => JobStatus::Completed,
            Outcome::Failed(_) => JobStatus::Failed,
            Outcome::Cancelled => JobStatus::Cancelled,
        }
    }
}

/// Fields that change after creation. Guarded as one unit so readers never
/// see status, finish time, error and log out of step with each other.
#[derive(Debug)]
struct JobState {
    status: JobStatus,
    finished_at: Option<DateTime<Utc>>,
    error: Option<String>,
    log: LogSink,
    command: Option<String>,
    return_code: Option<i32>,
}

/// A single job tracked by the registry.
#[derive(Debug)]
pub struct JobRecord {
    id: String,
    job_type: JobType,
    params: JobParams,
    created_at: DateTime<Utc>,
    cancel: CancellationToken,
    state: RwLock<JobState>,
}

impl JobRecord {
    pub fn new(id: impl Into<String>, params: JobParams) -> Self {
        Self {
            id: id.into(),
            job_type: params.job_type(),
            params,
            created_at: Utc::now(),
            cancel: CancellationToken::new(),
            state: RwLock::new(JobState {
                status: JobStatus::Running,
                finished_at: None,
                error: None,
                log: LogSink::new(),
                command: None,
                return_code: None,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn job_type(&self) -> JobType {
        self.job_type
    }

    pub fn params(&self) -> &JobParams {
        &self.params
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Token handed to the task. Observing it is all a task can do with it.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.is_cancel_requested()
    }

    pub fn status(&self) -> JobStatus {
        read_guard(&self.state, "job state").status
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Appends one log line. Returns `false` once the job is terminal.
    pub fn append_log(&self, line: impl Into<String>) -> bool {
        let mut state = write_guard(&self.state, "job state");
        if state.status.is_terminal() {
            return false;
        }
        state.log.append(line)
    }

    /// Stores a process fact reported by the task. Returns `false` once the
    /// job is terminal, in which case nothing changes.
    pub fn record_detail(&self, detail: TaskDetail) -> bool {
        let mut state = write_guard(&self.state, "job state");
        if state.status.is_terminal() {
            return false;
        }
        match detail {
            TaskDetail::Command(command) => state.command = Some(command),
            TaskDetail::ReturnCode(code) => state.return_code = Some(code),
        }
        true
    }

    /// Flags the job for cancellation.
    ///
    /// Returns `true` while the job is running (repeat calls included) and
    /// `false` once it is terminal, in which case nothing changes.
    pub fn request_cancel(&self) -> bool {
        // Held across the flag update so a concurrent `finish` either sees
        // the flag or makes this call observe a terminal status.
        let state = read_guard(&self.state, "job state");
        if state.status.is_terminal() {
            return false;
        }
        if self.cancel.signal() {
            log::info!("Cancellation requested for job {}", self.id);
        }
        true
    }

    /// Applies a terminal transition and freezes the log.
    ///
    /// Returns `false` (and changes nothing) if the job already finished.
    pub fn finish(&self, outcome: Outcome) -> bool {
        let mut state = write_guard(&self.state, "job state");
        if state.status.is_terminal() {
            log::warn!(
                "Ignoring {:?} for job {}: already {}",
                outcome,
                self.id,
                state.status
            );
            return false;
        }

        state.status = outcome.status();
        state.finished_at = Some(Utc::now());
        if let Outcome::Failed(error) = outcome {
            state.error = Some(error);
        }
        state.log.seal();
        true
    }

    /// Full point-in-time projection, log included.
    pub fn view(&self) -> JobView {
        let state = read_guard(&self.state, "job state");
        JobView {
            id: self.id.clone(),
            job_type: self.job_type,
            status: state.status,
            created_at: self.created_at,
            finished_at: state.finished_at,
            log: state.log.snapshot(),
            error: state.error.clone(),
            command: state.command.clone(),
            return_code: state.return_code,
            cancel_requested: self.cancel.is_cancel_requested(),
            params: self.params.clone(),
        }
    }

    /// Projection used for listings (no log).
    pub fn summary(&self) -> JobSummary {
        let state = read_guard(&self.state, "job state");
        JobSummary {
            id: self.id.clone(),
            job_type: self.job_type,
            status: state.status,
            created_at: self.created_at,
            finished_at: state.finished_at,
        }
    }
}

/// Read-only snapshot of a job returned by `get`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub log: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Command line of the spawned process, for script-backed jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_code: Option<i32>,
    pub cancel_requested: bool,
    pub params: JobParams,
}

/// Listing entry returned by `list`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}
