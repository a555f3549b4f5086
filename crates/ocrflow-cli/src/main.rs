//! ocrflow - run document pipeline stages from the command line.
//!
//! `submit` starts one job, streams its log to stdout as lines arrive and
//! exits once the job is terminal. Ctrl-C requests cancellation.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, warn};
use ocrflow::config::default_config_path;
use ocrflow::{init_logging, load_config, Config, JobStatus, JobView, LogFormat, Orchestrator};

const EXIT_FAILED: i32 = 1;
const EXIT_CANCELLED: i32 = 130;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    /// Human-readable diagnostics on stderr
    Pretty,
    /// JSON diagnostics on stderr
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Parser)]
#[command(name = "ocrflow")]
#[command(about = "Run Drive sync, OCR and analysis jobs", long_about = None)]
struct Cli {
    /// Config file (defaults to the platform config dir, then built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Diagnostic log format
    #[arg(long, value_enum, default_value = "pretty", global = true)]
    log_format: LogFormatArg,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a job and follow it until it finishes
    Submit {
        /// Job type: drive, ocr or analysis
        job_type: String,

        /// Parameters as a JSON object, or @path to read them from a file
        #[arg(long, default_value = "{}")]
        params: String,

        /// Print the final job snapshot as JSON
        #[arg(long)]
        json: bool,

        /// How often to poll for new log lines, in milliseconds
        #[arg(long, default_value = "200")]
        poll_ms: u64,
    },

    /// List models offered for analysis jobs
    Models,

    /// Print the effective configuration
    Config,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ocrflow::ConfigError),

    #[error(transparent)]
    Orchestrator(#[from] ocrflow::OrchestratorError),

    #[error("Failed to read parameters from '{path}': {source}")]
    ReadParams {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_format.into()) {
        eprintln!("Warning: {}", e);
    }

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(EXIT_FAILED);
        }
    }
}

fn run(cli: Cli) -> Result<i32, CliError> {
    let config = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Command::Submit {
            job_type,
            params,
            json,
            poll_ms,
        } => {
            let params = read_params(&params)?;
            let orchestrator = Orchestrator::from_config(&config);
            let view = follow_job(&orchestrator, &job_type, params, Duration::from_millis(poll_ms))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                eprintln!("Job {} {}", view.id, view.status);
                if let Some(error) = &view.error {
                    eprintln!("Error: {}", error);
                }
            }

            Ok(exit_code(view.status))
        }
        Command::Models => {
            println!("{}", serde_json::to_string_pretty(&config.models)?);
            Ok(0)
        }
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(0)
        }
    }
}

fn resolve_config(explicit: Option<&Path>) -> Result<Config, CliError> {
    if let Some(path) = explicit {
        return Ok(load_config(path)?);
    }

    match default_config_path() {
        Some(path) if path.is_file() => {
            debug!("Loading config from {}", path.display());
            Ok(load_config(path)?)
        }
        _ => Ok(Config::default()),
    }
}

fn read_params(raw: &str) -> Result<serde_json::Value, CliError> {
    let text = match raw.strip_prefix('@') {
        Some(path) => fs::read_to_string(path).map_err(|source| CliError::ReadParams {
            path: PathBuf::from(path),
            source,
        })?,
        None => raw.to_string(),
    };
    Ok(serde_json::from_str(&text)?)
}

/// Submits the job and prints new log lines until it is terminal.
fn follow_job(
    orchestrator: &Orchestrator,
    job_type: &str,
    params: serde_json::Value,
    poll_interval: Duration,
) -> Result<JobView, CliError> {
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))?;
    }

    let job_id = orchestrator.submit(job_type, params)?;
    eprintln!("Submitted {} job {}", job_type, job_id);

    let mut printed = 0;
    let mut cancel_sent = false;
    loop {
        if interrupted.load(Ordering::SeqCst) && !cancel_sent {
            cancel_sent = true;
            if orchestrator.cancel(&job_id) {
                eprintln!("Cancelling job {}...", job_id);
            } else {
                warn!("Job {} already finished, nothing to cancel", job_id);
            }
        }

        let view = orchestrator.get(&job_id)?;
        for line in &view.log[printed..] {
            println!("{}", line);
        }
        printed = view.log.len();

        if view.status.is_terminal() {
            return Ok(view);
        }
        thread::sleep(poll_interval);
    }
}

fn exit_code(status: JobStatus) -> i32 {
    match status {
        JobStatus::Completed => 0,
        JobStatus::Cancelled => EXIT_CANCELLED,
        JobStatus::Failed | JobStatus::Running => EXIT_FAILED,
    }
}
