//! Runs a pipeline stage as a child process and streams its output into
//! the job log.

use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info_span, warn};

use super::{analysis, drive, ocr, JobParams, TaskAdapter, TaskContext};
use crate::config::Config;
use crate::error::TaskError;
use crate::jobs::JobType;
use crate::sanitize;

/// Upper bound on how long a cancellation request goes unnoticed while the
/// child is silent.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long output is still collected after a cancelled child is killed.
const CANCEL_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Human-readable command line; arguments containing whitespace are quoted.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|part| {
                if part.is_empty() || part.chars().any(char::is_whitespace) {
                    format!("'{}'", part.replace('\'', r"'\''"))
                } else {
                    part.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Adapter that runs `<interpreter> <script> <stage args…>`.
#[derive(Debug, Clone)]
pub struct ScriptTask {
    job_type: JobType,
    interpreter: String,
    script: PathBuf,
    poll_interval: Duration,
}

impl ScriptTask {
    pub fn new(job_type: JobType, interpreter: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            job_type,
            interpreter: interpreter.into(),
            script: script.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn from_config(job_type: JobType, config: &Config) -> Self {
        Self::new(job_type, &config.python, config.scripts.script_path(job_type))
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    /// Builds the full command line for `params`.
    pub fn command(&self, params: &JobParams) -> Result<CommandSpec, TaskError> {
        let stage_args = match (self.job_type, params) {
            (JobType::Drive, JobParams::Drive(p)) => drive::build_args(p)?,
            (JobType::Ocr, JobParams::Ocr(p)) => ocr::build_args(p)?,
            (JobType::Analysis, JobParams::Analysis(p)) => analysis::build_args(p)?,
            (expected, other) => {
                return Err(TaskError::failed(format!(
                    "{} task received {} parameters",
                    expected,
                    other.job_type()
                )))
            }
        };

        Ok(CommandSpec::new(&self.interpreter)
            .arg(self.script.display().to_string())
            .args(stage_args))
    }

    fn preflight(&self, params: &JobParams) -> Result<(), TaskError> {
        match params {
            JobParams::Drive(p) => drive::preflight(p),
            JobParams::Ocr(p) => ocr::preflight(p),
            JobParams::Analysis(p) => analysis::preflight(p),
        }
    }
}

impl TaskAdapter for ScriptTask {
    fn validate(&self, params: &JobParams) -> Result<(), String> {
        self.command(params).map_err(|e| e.to_string())?;
        self.preflight(params).map_err(|e| e.to_string())
    }

    fn execute(&self, params: &JobParams, ctx: &TaskContext) -> Result<(), TaskError> {
        let _span = info_span!(
            "script",
            job_id = %ctx.job_id(),
            stage = %self.job_type,
            script = %sanitize::redact_path(&self.script),
        )
        .entered();

        ctx.checkpoint()?;
        self.preflight(params)?;
        let command = self.command(params)?;
        run_command(&command, ctx, self.poll_interval)
    }
}

/// Spawns `command`, forwards each output line to the job log as it arrives
/// and kills the child once cancellation is requested.
///
/// Lines from one stream keep their order; stdout and stderr are interleaved
/// in arrival order. On unix the child leads its own process group, so a
/// cancel also takes down anything the script started.
pub fn run_command(
    command: &CommandSpec,
    ctx: &TaskContext,
    poll_interval: Duration,
) -> Result<(), TaskError> {
    ctx.log(format!("$ {}", command.display()));

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let mut child = cmd.spawn().map_err(|source| TaskError::Spawn {
        program: command.program.clone(),
        source,
    })?;
    ctx.set_command(command.display());
    debug!("Spawned pid {}", child.id());

    let line_rx = match spawn_readers(ctx.job_id(), &mut child) {
        Ok(line_rx) => line_rx,
        Err(e) => {
            terminate(&mut child);
            return Err(e);
        }
    };

    loop {
        if ctx.is_cancel_requested() {
            terminate(&mut child);
            drain_lines(&line_rx, ctx, CANCEL_DRAIN_TIMEOUT);
            ctx.log("[process cancelled]");
            return Err(TaskError::Cancelled);
        }

        match line_rx.recv_timeout(poll_interval) {
            Ok(line) => ctx.log(line),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let status = child.wait()?;
    match status.code() {
        Some(code) => {
            ctx.set_exit_code(code);
            ctx.log(format!("[process finished, code={}]", code));
        }
        None => ctx.log("[process terminated by signal]"),
    }

    if status.success() {
        Ok(())
    } else {
        Err(TaskError::failed(match status.code() {
            Some(code) => format!("{} exited with code {}", command.program, code),
            None => format!("{} was terminated by a signal", command.program),
        }))
    }
}

/// Starts one reader thread per captured stream. The returned channel
/// disconnects once both streams hit EOF.
fn spawn_readers(job_id: &str, child: &mut Child) -> Result<Receiver<String>, TaskError> {
    let (line_tx, line_rx) = unbounded::<String>();
    if let Some(stdout) = child.stdout.take() {
        spawn_reader(job_id, "stdout", stdout, line_tx.clone())?;
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_reader(job_id, "stderr", stderr, line_tx)?;
    }
    Ok(line_rx)
}

/// Kills the child and reaps it.
fn terminate(child: &mut Child) {
    let pid = child.id();
    if let Err(e) = kill_process_tree(child) {
        warn!("Failed to kill pid {}: {}", pid, e);
    }
    match child.wait() {
        Ok(status) => debug!("pid {} exited after kill: {}", pid, status),
        Err(e) => warn!("Failed to reap pid {}: {}", pid, e),
    }
}

#[cfg(unix)]
fn kill_process_tree(child: &mut Child) -> io::Result<()> {
    let pgid = child.id() as libc::pid_t;
    // The child was spawned with `process_group(0)`, so its pid is the group id.
    let result = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if result == 0 {
        return Ok(());
    }
    let errno = io::Error::last_os_error();
    debug!("Failed to signal process group {}: {}", pgid, errno);
    child.kill()
}

#[cfg(not(unix))]
fn kill_process_tree(child: &mut Child) -> io::Result<()> {
    child.kill()
}

/// Forwards lines still in flight after a kill, until both streams close or
/// `timeout` runs out.
fn drain_lines(lines: &Receiver<String>, ctx: &TaskContext, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        match lines.recv_deadline(deadline) {
            Ok(line) => ctx.log(line),
            Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => break,
        }
    }
    debug!("Output still open {:?} after kill, giving up", timeout);
}

fn spawn_reader<R>(
    job_id: &str,
    stream: &str,
    source: R,
    lines: Sender<String>,
) -> Result<(), TaskError>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name(format!("job-{}-{}", job_id, stream))
        .spawn(move || {
            let mut reader = BufReader::new(source);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        let line = line.trim_end_matches(['\n', '\r']).to_string();
                        if lines.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = lines.send(format!("[output read error: {}]", e));
                        break;
                    }
                }
            }
        })?;
    Ok(())
}

/// Expands a leading `~` and makes the path absolute.
pub fn resolve_path(raw: &str) -> Result<PathBuf, TaskError> {
    let expanded = match raw.strip_prefix("~") {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => match dirs::home_dir() {
            Some(home) => home.join(rest.trim_start_matches('/')),
            None => PathBuf::from(raw),
        },
        _ => PathBuf::from(raw),
    };

    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(std::env::current_dir()?.join(expanded))
    }
}
