use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::jobs::{JobType, RetentionPolicy};
use crate::tasks::params::DEFAULT_MODEL;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    /// Interpreter the stage scripts are run with.
    #[serde(default = "default_python")]
    pub python: String,
    #[serde(default)]
    pub scripts: ScriptsConfig,
    /// `None` runs every job on its own thread. `Some(n)` bounds execution to
    /// a pool of `n` workers, with `0` meaning one worker per CPU.
    #[serde(default)]
    pub max_concurrent_jobs: Option<usize>,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Analysis models offered to clients.
    #[serde(default = "default_models")]
    pub models: Vec<String>,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_event_capacity() -> usize {
    1000
}

fn default_models() -> Vec<String> {
    vec![
        DEFAULT_MODEL.to_string(),
        "gemini-1.5-pro-002".to_string(),
        "gemini-1.0-pro".to_string(),
        "gemini-pro".to_string(),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            python: default_python(),
            scripts: ScriptsConfig::default(),
            max_concurrent_jobs: None,
            retention: RetentionConfig::default(),
            event_capacity: default_event_capacity(),
            models: default_models(),
        }
    }
}

impl Config {
    pub fn retention_policy(&self) -> RetentionPolicy {
        match self.retention.max_finished_jobs {
            Some(max) => RetentionPolicy::MaxFinished(max),
            None => RetentionPolicy::KeepAll,
        }
    }

    /// Worker count for the bounded pool, if one is configured.
    pub fn worker_count(&self) -> Option<usize> {
        self.max_concurrent_jobs.map(|n| if n == 0 { num_cpus::get() } else { n })
    }
}

/// Location of the stage scripts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    #[serde(default = "default_scripts_directory")]
    pub directory: String,
    #[serde(default = "default_drive_script")]
    pub drive: String,
    #[serde(default = "default_ocr_script")]
    pub ocr: String,
    #[serde(default = "default_analysis_script")]
    pub analysis: String,
}

fn default_scripts_directory() -> String {
    ".".to_string()
}

fn default_drive_script() -> String {
    "drive_fetch.py".to_string()
}

fn default_ocr_script() -> String {
    "gpu_turkish_ocr.py".to_string()
}

fn default_analysis_script() -> String {
    "analyze_ocr_outputs.py".to_string()
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            directory: default_scripts_directory(),
            drive: default_drive_script(),
            ocr: default_ocr_script(),
            analysis: default_analysis_script(),
        }
    }
}

impl ScriptsConfig {
    pub fn script_path(&self, job_type: JobType) -> PathBuf {
        let name = match job_type {
            JobType::Drive => &self.drive,
            JobType::Ocr => &self.ocr,
            JobType::Analysis => &self.analysis,
        };
        PathBuf::from(&self.directory).join(name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Finished jobs kept in memory; `None` keeps all of them.
    #[serde(default)]
    pub max_finished_jobs: Option<usize>,
}
