//! Job orchestration for long-running document pipeline stages.
//!
//! Callers submit a job type plus JSON parameters and get an id back
//! immediately; the stage runs on its own thread while its log, status and
//! cancellation flag stay observable through [`Orchestrator`].

pub mod broadcast;
pub mod config;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod orchestrator;
pub mod sanitize;
pub mod tasks;
pub mod worker;

pub use broadcast::{JobEvent, JobEventBroadcaster, JobEventKind};
pub use config::{load_config, load_config_from_str, Config};
pub use error::{ConfigError, LoggingError, OrchestratorError, Result, RunnerError, TaskError};
pub use jobs::{
    CancellationToken, JobRecord, JobRegistry, JobStatus, JobSummary, JobType, JobView,
    RetentionPolicy, StatusCounts,
};
pub use logging::{init_logging, LogFormat};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use tasks::{
    AdapterSet, DetailRecorder, JobParams, LogAppender, ScriptTask, TaskAdapter, TaskContext,
    TaskDetail,
};
