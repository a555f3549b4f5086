use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced synchronously to callers of the orchestrator.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Unknown job type: {0}")]
    InvalidJobType(String),

    #[error("Invalid parameters for {job_type} job: {reason}")]
    InvalidParameters { job_type: String, reason: String },

    #[error("Job not found: {0}")]
    NotFound(String),
}

/// Errors returned by a task adapter. Only ever observed through a job's
/// terminal state, never by the submitting caller.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Cancelled")]
    Cancelled,

    #[error("{0}")]
    Failed(String),

    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TaskError {
    pub fn failed(message: impl Into<String>) -> Self {
        TaskError::Failed(message.into())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to spawn job thread: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,
}

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to bridge `log` records into tracing: {0}")]
    LogBridge(#[from] log::SetLoggerError),

    #[error("A global tracing subscriber is already installed: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
