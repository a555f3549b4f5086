//! Executes task adapters for jobs and applies their terminal transitions.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tracing::{info, info_span, warn};

use super::pool::WorkerPool;
use crate::broadcast::{JobEvent, JobEventBroadcaster};
use crate::error::{RunnerError, TaskError};
use crate::jobs::{JobRecord, Outcome};
use crate::tasks::{DetailRecorder, LogAppender, TaskAdapter, TaskContext};

/// One job paired with the adapter that will run it.
pub(crate) struct JobExecution {
    record: Arc<JobRecord>,
    adapter: Arc<dyn TaskAdapter>,
    events: JobEventBroadcaster,
}

impl JobExecution {
    pub(crate) fn new(
        record: Arc<JobRecord>,
        adapter: Arc<dyn TaskAdapter>,
        events: JobEventBroadcaster,
    ) -> Self {
        Self {
            record,
            adapter,
            events,
        }
    }

    pub(crate) fn job_id(&self) -> &str {
        self.record.id()
    }

    /// Runs the adapter to completion on the current thread.
    ///
    /// Never panics: a panicking adapter is recorded as a failed job.
    pub(crate) fn execute(self) {
        let record = Arc::clone(&self.record);
        let _span = info_span!("job",
            job_id = %record.id(),
            job_type = %record.job_type()
        )
        .entered();

        if record.cancel_requested() {
            info!("Job cancelled before it started");
            self.finish(Outcome::Cancelled);
            return;
        }

        let ctx = TaskContext::new(record.id(), self.log_appender(), record.cancel_token())
            .with_details(self.detail_recorder());
        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.adapter.execute(record.params(), &ctx)
        }));

        let outcome = resolve_outcome(result, record.cancel_requested());
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Job finished: {:?}",
            outcome
        );
        self.finish(outcome);
    }

    fn log_appender(&self) -> LogAppender {
        let record = Arc::clone(&self.record);
        let events = self.events.clone();
        LogAppender::new(move |line| {
            let event = (events.receiver_count() > 0).then(|| JobEvent::log(record.id(), &line));
            if record.append_log(line) {
                if let Some(event) = event {
                    events.send(event);
                }
            }
        })
    }

    fn detail_recorder(&self) -> DetailRecorder {
        let record = Arc::clone(&self.record);
        DetailRecorder::new(move |detail| {
            record.record_detail(detail);
        })
    }

    fn finish(&self, outcome: Outcome) {
        let error = match &outcome {
            Outcome::Failed(error) => Some(error.clone()),
            _ => None,
        };
        if self.record.finish(outcome) {
            self.events.send(JobEvent::finished(
                self.record.id(),
                self.record.status(),
                error.as_deref(),
            ));
        }
    }
}

/// Maps what the adapter did onto a terminal transition.
///
/// Only a `Cancelled` result while a request is pending cancels the job.
/// Success completes and any other error fails it, whether or not a request
/// is pending. A panic is a failure regardless.
fn resolve_outcome(
    result: thread::Result<Result<(), TaskError>>,
    cancel_requested: bool,
) -> Outcome {
    match result {
        Ok(Ok(())) => Outcome::Completed,
        Ok(Err(TaskError::Cancelled)) if cancel_requested => Outcome::Cancelled,
        Ok(Err(TaskError::Cancelled)) => {
            Outcome::Failed("Task reported cancellation but none was requested".to_string())
        }
        Ok(Err(e)) => Outcome::Failed(e.to_string()),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!("Task panicked: {}", message);
            Outcome::Failed(format!("Task panicked: {}", message))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

enum Dispatch {
    ThreadPerJob,
    Pool(WorkerPool),
}

/// Hands jobs to concurrent execution and returns immediately.
pub struct JobRunner {
    dispatch: Dispatch,
    events: JobEventBroadcaster,
}

impl JobRunner {
    /// Every job gets its own thread; no admission limit.
    pub fn new(events: JobEventBroadcaster) -> Self {
        Self {
            dispatch: Dispatch::ThreadPerJob,
            events,
        }
    }

    /// Jobs queue for a fixed pool of `worker_count` threads.
    ///
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn with_pool(worker_count: usize, events: JobEventBroadcaster) -> Self {
        Self {
            dispatch: Dispatch::Pool(WorkerPool::new(worker_count)),
            events,
        }
    }

    /// Starts `adapter` for `record` without waiting for it.
    ///
    /// If the job cannot be dispatched it is failed on the spot, so it never
    /// stays `running` without anything running it.
    pub fn run(&self, record: Arc<JobRecord>, adapter: Arc<dyn TaskAdapter>) {
        let execution = JobExecution::new(Arc::clone(&record), adapter, self.events.clone());
        let dispatched = match &self.dispatch {
            Dispatch::ThreadPerJob => spawn_job_thread(execution),
            Dispatch::Pool(pool) => pool.submit(execution),
        };

        if let Err(e) = dispatched {
            warn!(job_id = %record.id(), "Failed to dispatch job: {}", e);
            let error = e.to_string();
            if record.finish(Outcome::Failed(error.clone())) {
                self.events.send(JobEvent::finished(
                    record.id(),
                    record.status(),
                    Some(&error),
                ));
            }
        }
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self.dispatch, Dispatch::Pool(_))
    }

    /// Stops accepting work. Queued pool jobs still run.
    pub fn shutdown(&self) {
        if let Dispatch::Pool(pool) = &self.dispatch {
            pool.shutdown();
        }
    }

    /// Blocks until pool workers have exited. Call after [`shutdown`](Self::shutdown).
    pub fn wait(&self) {
        if let Dispatch::Pool(pool) = &self.dispatch {
            pool.wait();
        }
    }
}

fn spawn_job_thread(execution: JobExecution) -> Result<(), RunnerError> {
    thread::Builder::new()
        .name(format!("job-{}", execution.job_id()))
        .spawn(move || execution.execute())
        .map(|_| ())
        .map_err(|e| RunnerError::SpawnFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::JobEventKind;
    use crate::jobs::JobStatus;
    use crate::tasks::{JobParams, OcrParams};
    use std::time::Duration;

    fn record() -> Arc<JobRecord> {
        Arc::new(JobRecord::new("job-1", JobParams::Ocr(OcrParams::new("/in"))))
    }

    fn wait_terminal(record: &JobRecord) -> JobStatus {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            let status = record.status();
            if status.is_terminal() {
                return status;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("job {} did not finish", record.id());
    }

    #[test]
    fn test_resolve_outcome() {
        assert_eq!(resolve_outcome(Ok(Ok(())), false), Outcome::Completed);
        assert_eq!(resolve_outcome(Ok(Ok(())), true), Outcome::Completed);
        assert_eq!(
            resolve_outcome(Ok(Err(TaskError::Cancelled)), true),
            Outcome::Cancelled
        );
        assert_eq!(
            resolve_outcome(Ok(Err(TaskError::failed("exit 1"))), true),
            Outcome::Failed("exit 1".to_string())
        );
        assert_eq!(
            resolve_outcome(Ok(Err(TaskError::failed("exit 1"))), false),
            Outcome::Failed("exit 1".to_string())
        );
        assert!(matches!(
            resolve_outcome(Ok(Err(TaskError::Cancelled)), false),
            Outcome::Failed(_)
        ));
    }

    #[test]
    fn test_panic_message() {
        let payload = panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload = panic::catch_unwind(|| panic!("code {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "code 7");
    }

    #[test]
    fn test_execute_completes_with_log() {
        let record = record();
        let adapter: Arc<dyn TaskAdapter> =
            Arc::new(|_: &JobParams, ctx: &TaskContext| -> Result<(), TaskError> {
                ctx.log("page 1/3 done");
                ctx.log("page 2/3 done");
                Ok(())
            });

        JobExecution::new(Arc::clone(&record), adapter, JobEventBroadcaster::new(8)).execute();

        let view = record.view();
        assert_eq!(view.status, JobStatus::Completed);
        assert_eq!(view.log, vec!["page 1/3 done", "page 2/3 done"]);
        assert!(view.finished_at.is_some());
        assert!(view.command.is_none());
    }

    #[test]
    fn test_execute_records_process_details() {
        let record = record();
        let adapter: Arc<dyn TaskAdapter> =
            Arc::new(|_: &JobParams, ctx: &TaskContext| -> Result<(), TaskError> {
                ctx.set_command("python3 ocr.py /in");
                ctx.set_exit_code(2);
                Err(TaskError::failed("exited with code 2"))
            });

        JobExecution::new(Arc::clone(&record), adapter, JobEventBroadcaster::new(8)).execute();

        let view = record.view();
        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.command.as_deref(), Some("python3 ocr.py /in"));
        assert_eq!(view.return_code, Some(2));
    }

    #[test]
    fn test_execute_contains_panic() {
        let record = record();
        let adapter: Arc<dyn TaskAdapter> =
            Arc::new(|_: &JobParams, ctx: &TaskContext| -> Result<(), TaskError> {
                ctx.log("line1");
                ctx.log("line2");
                panic!("model crashed");
            });

        JobExecution::new(Arc::clone(&record), adapter, JobEventBroadcaster::new(8)).execute();

        let view = record.view();
        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.log, vec!["line1", "line2"]);
        assert!(view.error.unwrap().contains("model crashed"));
    }

    #[test]
    fn test_execute_skips_adapter_when_cancelled_first() {
        let record = record();
        record.request_cancel();
        let adapter: Arc<dyn TaskAdapter> =
            Arc::new(|_: &JobParams, _: &TaskContext| -> Result<(), TaskError> {
                panic!("adapter must not run");
            });

        JobExecution::new(Arc::clone(&record), adapter, JobEventBroadcaster::new(8)).execute();

        assert_eq!(record.status(), JobStatus::Cancelled);
        assert!(record.view().error.is_none());
    }

    #[test]
    fn test_events_emitted() {
        let record = record();
        let events = JobEventBroadcaster::new(16);
        let mut rx = events.subscribe();
        let adapter: Arc<dyn TaskAdapter> =
            Arc::new(|_: &JobParams, ctx: &TaskContext| -> Result<(), TaskError> {
                ctx.log("working");
                Err(TaskError::failed("disk full"))
            });

        JobExecution::new(Arc::clone(&record), adapter, events).execute();

        let log = rx.try_recv().unwrap();
        assert_eq!(
            log.kind,
            JobEventKind::Log {
                line: "working".to_string()
            }
        );
        let finished = rx.try_recv().unwrap();
        assert_eq!(
            finished.kind,
            JobEventKind::Finished {
                status: JobStatus::Failed,
                error: Some("disk full".to_string())
            }
        );
    }

    #[test]
    fn test_run_returns_before_task_finishes() {
        let runner = JobRunner::new(JobEventBroadcaster::default());
        let record = record();
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);
        let adapter: Arc<dyn TaskAdapter> =
            Arc::new(move |_: &JobParams, _: &TaskContext| -> Result<(), TaskError> {
                release_rx
                    .recv()
                    .map_err(|_| TaskError::failed("release channel closed"))
            });

        runner.run(Arc::clone(&record), adapter);
        assert_eq!(record.status(), JobStatus::Running);

        release_tx.send(()).unwrap();
        assert_eq!(wait_terminal(&record), JobStatus::Completed);
    }

    #[test]
    fn test_pooled_runner_executes_jobs() {
        let runner = JobRunner::with_pool(2, JobEventBroadcaster::default());
        assert!(runner.is_pooled());

        let records: Vec<_> = (0..6)
            .map(|i| {
                Arc::new(JobRecord::new(
                    format!("pooled-{}", i),
                    JobParams::Ocr(OcrParams::new("/in")),
                ))
            })
            .collect();
        for record in &records {
            let adapter: Arc<dyn TaskAdapter> =
                Arc::new(|_: &JobParams, ctx: &TaskContext| -> Result<(), TaskError> {
                    ctx.log("done");
                    Ok(())
                });
            runner.run(Arc::clone(record), adapter);
        }

        for record in &records {
            assert_eq!(wait_terminal(record), JobStatus::Completed);
        }
        runner.shutdown();
        runner.wait();
    }

    #[test]
    fn test_run_after_pool_shutdown_fails_job() {
        let runner = JobRunner::with_pool(1, JobEventBroadcaster::default());
        runner.shutdown();

        let record = record();
        let adapter: Arc<dyn TaskAdapter> =
            Arc::new(|_: &JobParams, _: &TaskContext| -> Result<(), TaskError> { Ok(()) });
        runner.run(Arc::clone(&record), adapter);

        let view = record.view();
        assert_eq!(view.status, JobStatus::Failed);
        assert!(view.error.is_some());
        runner.wait();
    }
}
