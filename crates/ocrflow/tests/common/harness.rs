//! Test harness for isolated test execution.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use ocrflow::config::schema::ScriptsConfig;
use ocrflow::{Config, JobView, Orchestrator};

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Temp directories plus a config whose stage scripts are shell scripts.
pub struct TestHarness {
    temp_dir: TempDir,
    /// Where stage scripts are written.
    pub scripts_dir: PathBuf,
    /// A directory that exists, usable as an OCR source or analysis root.
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();

        let scripts_dir = base.join("scripts");
        let input_dir = base.join("input");
        let output_dir = base.join("output");

        std::fs::create_dir_all(&scripts_dir).expect("Failed to create scripts dir");
        std::fs::create_dir_all(&input_dir).expect("Failed to create input dir");
        std::fs::create_dir_all(&output_dir).expect("Failed to create output dir");

        Self {
            temp_dir,
            scripts_dir,
            input_dir,
            output_dir,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes a stage script. It is run as `sh <script> <args…>`.
    pub fn write_script(&self, filename: &str, body: &str) -> PathBuf {
        let path = self.scripts_dir.join(filename);
        std::fs::write(&path, body).expect("Failed to write script");
        path
    }

    /// Writes a file under the temp root, e.g. a service-account key.
    pub fn write_file(&self, filename: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(filename);
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Config running every stage with `sh` from `scripts_dir`.
    pub fn config(&self) -> Config {
        Config {
            python: "sh".to_string(),
            scripts: ScriptsConfig {
                directory: self.scripts_dir.display().to_string(),
                drive: "drive.sh".to_string(),
                ocr: "ocr.sh".to_string(),
                analysis: "analysis.sh".to_string(),
            },
            ..Config::default()
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::from_config(&self.config())
    }
}

/// Polls `get` until the job is terminal. Panics after five seconds.
pub fn wait_for_terminal(orchestrator: &Orchestrator, job_id: &str) -> JobView {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    loop {
        let view = orchestrator.get(job_id).expect("job should exist");
        if view.status.is_terminal() {
            return view;
        }
        assert!(
            Instant::now() < deadline,
            "job {} still {} after {:?}; log: {:?}",
            job_id,
            view.status,
            WAIT_TIMEOUT,
            view.log
        );
        thread::sleep(Duration::from_millis(5));
    }
}

/// Polls `condition` until it holds. Panics after five seconds.
pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(5));
    }
}
