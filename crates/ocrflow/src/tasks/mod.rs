//! Task adapters: the long-running work a job wraps.
//!
//! An adapter receives its validated parameters and a [`TaskContext`] that
//! carries the log callback and the cancellation token. Adapters must log
//! incrementally and are expected to check the token between units of work.

pub mod analysis;
pub mod drive;
pub mod ocr;
pub mod params;
pub mod script;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::Config;
use crate::error::TaskError;
use crate::jobs::{CancellationToken, JobType};

pub use params::{AnalysisParams, Device, DriveParams, JobParams, OcrParams};
pub use script::{CommandSpec, ScriptTask};

/// Cloneable log callback handed to a task.
///
/// Lines appended through one appender reach the job log in call order.
#[derive(Clone)]
pub struct LogAppender {
    sink: Arc<dyn Fn(String) + Send + Sync>,
}

impl LogAppender {
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        Self {
            sink: Arc::new(sink),
        }
    }

    pub fn append(&self, line: impl Into<String>) {
        (self.sink)(line.into());
    }
}

impl fmt::Debug for LogAppender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogAppender").finish_non_exhaustive()
    }
}

/// Process facts a task reports back to its job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskDetail {
    /// The command line that was spawned.
    Command(String),
    /// Exit code of the spawned process.
    ReturnCode(i32),
}

/// Cloneable callback receiving [`TaskDetail`]s.
#[derive(Clone)]
pub struct DetailRecorder {
    sink: Arc<dyn Fn(TaskDetail) + Send + Sync>,
}

impl DetailRecorder {
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(TaskDetail) + Send + Sync + 'static,
    {
        Self {
            sink: Arc::new(sink),
        }
    }

    pub fn record(&self, detail: TaskDetail) {
        (self.sink)(detail);
    }
}

impl fmt::Debug for DetailRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetailRecorder").finish_non_exhaustive()
    }
}

/// What a running task can see of its job.
#[derive(Debug, Clone)]
pub struct TaskContext {
    job_id: String,
    log: LogAppender,
    cancel: CancellationToken,
    details: Option<DetailRecorder>,
}

impl TaskContext {
    pub fn new(job_id: impl Into<String>, log: LogAppender, cancel: CancellationToken) -> Self {
        Self {
            job_id: job_id.into(),
            log,
            cancel,
            details: None,
        }
    }

    /// Routes [`set_command`](Self::set_command) and
    /// [`set_exit_code`](Self::set_exit_code) to `details`. Without it they
    /// are dropped.
    pub fn with_details(mut self, details: DetailRecorder) -> Self {
        self.details = Some(details);
        self
    }

    pub fn set_command(&self, command: impl Into<String>) {
        if let Some(details) = &self.details {
            details.record(TaskDetail::Command(command.into()));
        }
    }

    pub fn set_exit_code(&self, code: i32) {
        if let Some(details) = &self.details {
            details.record(TaskDetail::ReturnCode(code));
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn log(&self, line: impl Into<String>) {
        self.log.append(line);
    }

    /// A detached handle to the log callback, e.g. for reader threads.
    pub fn logger(&self) -> LogAppender {
        self.log.clone()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancel_requested()
    }

    /// Returns `Err(TaskError::Cancelled)` once cancellation was requested.
    pub fn checkpoint(&self) -> Result<(), TaskError> {
        if self.cancel.is_cancel_requested() {
            return Err(TaskError::Cancelled);
        }
        Ok(())
    }
}

/// A pipeline stage implementation.
///
/// `execute` may block for minutes. It runs on its own thread and should
/// return [`TaskError::Cancelled`] when it stops early because of the token.
pub trait TaskAdapter: Send + Sync {
    /// Checks `params` before a job exists. Called synchronously by `submit`;
    /// an `Err` rejects the request with the returned reason.
    fn validate(&self, _params: &JobParams) -> Result<(), String> {
        Ok(())
    }

    fn execute(&self, params: &JobParams, ctx: &TaskContext) -> Result<(), TaskError>;
}

impl<F> TaskAdapter for F
where
    F: Fn(&JobParams, &TaskContext) -> Result<(), TaskError> + Send + Sync,
{
    fn execute(&self, params: &JobParams, ctx: &TaskContext) -> Result<(), TaskError> {
        self(params, ctx)
    }
}

/// The closed set of adapters the orchestrator can dispatch to.
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: HashMap<JobType, Arc<dyn TaskAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script-backed adapters for every stage, as configured.
    pub fn from_config(config: &Config) -> Self {
        let mut set = Self::new();
        for job_type in JobType::ALL {
            set.insert(job_type, Arc::new(ScriptTask::from_config(job_type, config)));
        }
        set
    }

    pub fn insert(&mut self, job_type: JobType, adapter: Arc<dyn TaskAdapter>) {
        self.adapters.insert(job_type, adapter);
    }

    pub fn with(mut self, job_type: JobType, adapter: Arc<dyn TaskAdapter>) -> Self {
        self.insert(job_type, adapter);
        self
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn TaskAdapter>> {
        self.adapters.get(&job_type).cloned()
    }

    pub fn contains(&self, job_type: JobType) -> bool {
        self.adapters.contains_key(&job_type)
    }
}
