//! Task adapters with scripted behaviour for driving the engine in tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};

use ocrflow::tasks::AdapterSet;
use ocrflow::{JobParams, JobType, TaskAdapter, TaskContext, TaskError};

pub type TaskResult = Result<(), TaskError>;

/// Logs `lines` in order and succeeds.
pub fn logs_then_ok(lines: &'static [&'static str]) -> Arc<dyn TaskAdapter> {
    Arc::new(move |_: &JobParams, ctx: &TaskContext| -> TaskResult {
        for line in lines {
            ctx.log(*line);
        }
        Ok(())
    })
}

/// Logs `lines` in order and then fails with `error`.
pub fn logs_then_fail(lines: &'static [&'static str], error: &'static str) -> Arc<dyn TaskAdapter> {
    Arc::new(move |_: &JobParams, ctx: &TaskContext| -> TaskResult {
        for line in lines {
            ctx.log(*line);
        }
        Err(TaskError::failed(error))
    })
}

/// Logs `lines` in order and then panics with `message`.
pub fn logs_then_panic(
    lines: &'static [&'static str],
    message: &'static str,
) -> Arc<dyn TaskAdapter> {
    Arc::new(move |_: &JobParams, ctx: &TaskContext| -> TaskResult {
        for line in lines {
            ctx.log(*line);
        }
        panic!("{}", message);
    })
}

/// Logs a numbered line per unit of work until the token is set.
pub fn cooperative_loop(unit: Duration) -> Arc<dyn TaskAdapter> {
    Arc::new(move |_: &JobParams, ctx: &TaskContext| -> TaskResult {
        let mut n = 0u64;
        loop {
            ctx.checkpoint()?;
            n += 1;
            ctx.log(format!("unit {}", n));
            thread::sleep(unit);
        }
    })
}

/// Sleeps for `duration` without ever looking at the token.
pub fn ignores_cancel(duration: Duration) -> Arc<dyn TaskAdapter> {
    Arc::new(move |_: &JobParams, ctx: &TaskContext| -> TaskResult {
        ctx.log("working without checkpoints");
        thread::sleep(duration);
        ctx.log("done");
        Ok(())
    })
}

/// Sleeps for `duration` without looking at the token, then fails with
/// `error`.
pub fn fails_ignoring_cancel(duration: Duration, error: &'static str) -> Arc<dyn TaskAdapter> {
    Arc::new(move |_: &JobParams, ctx: &TaskContext| -> TaskResult {
        ctx.log("writing pages");
        thread::sleep(duration);
        Err(TaskError::failed(error))
    })
}

/// Holds every task started through [`Gate::adapter`] until released.
#[derive(Clone)]
pub struct Gate {
    open_tx: Sender<()>,
    open_rx: Receiver<()>,
}

impl Gate {
    pub fn new() -> Self {
        let (open_tx, open_rx) = bounded(64);
        Self { open_tx, open_rx }
    }

    /// Lets one waiting (or future) task through.
    pub fn release(&self) {
        self.open_tx.send(()).expect("gate closed");
    }

    /// Waits at the gate without logging, then checks the token once and
    /// succeeds.
    pub fn adapter(&self) -> Arc<dyn TaskAdapter> {
        let open = self.open_rx.clone();
        Arc::new(move |_: &JobParams, ctx: &TaskContext| -> TaskResult {
            open.recv()
                .map_err(|_| TaskError::failed("gate dropped"))?;
            ctx.checkpoint()?;
            ctx.log("passed gate");
            Ok(())
        })
    }
}

/// The same adapter registered for every stage.
pub fn all_stages(adapter: Arc<dyn TaskAdapter>) -> AdapterSet {
    let mut set = AdapterSet::new();
    for job_type in JobType::ALL {
        set.insert(job_type, Arc::clone(&adapter));
    }
    set
}
