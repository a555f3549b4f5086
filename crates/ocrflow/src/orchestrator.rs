//! The public face of the engine: submit, inspect, list and cancel jobs.

use tokio::sync::broadcast;
use tracing::{debug, info, info_span};

use crate::broadcast::{JobEvent, JobEventBroadcaster};
use crate::config::Config;
use crate::error::{OrchestratorError, Result};
use crate::jobs::{JobRegistry, JobSummary, JobType, JobView, RetentionPolicy, StatusCounts};
use crate::sanitize;
use crate::tasks::{params, AdapterSet, JobParams};
use crate::worker::JobRunner;

/// Shared by every caller; all methods take `&self` and are safe to call
/// from any thread.
pub struct Orchestrator {
    registry: JobRegistry,
    adapters: AdapterSet,
    runner: JobRunner,
    events: JobEventBroadcaster,
    models: Vec<String>,
}

impl Orchestrator {
    /// One thread per job, every job kept, default event capacity.
    pub fn new(adapters: AdapterSet) -> Self {
        Self::builder(adapters).build()
    }

    pub fn builder(adapters: AdapterSet) -> OrchestratorBuilder {
        OrchestratorBuilder::new(adapters)
    }

    /// Script-backed adapters and limits taken from `config`.
    pub fn from_config(config: &Config) -> Self {
        let mut builder = Self::builder(AdapterSet::from_config(config))
            .retention(config.retention_policy())
            .event_capacity(config.event_capacity)
            .models(config.models.clone());
        if let Some(workers) = config.worker_count() {
            builder = builder.max_concurrent_jobs(workers);
        }
        builder.build()
    }

    /// Validates the request, registers a running job, starts its task and
    /// returns the new job id without waiting for the task.
    ///
    /// Nothing is registered when validation fails.
    pub fn submit(&self, job_type: &str, params: serde_json::Value) -> Result<String> {
        let job_type: JobType = job_type.parse()?;
        let adapter = self
            .adapters
            .get(job_type)
            .ok_or_else(|| OrchestratorError::InvalidJobType(job_type.to_string()))?;
        let params = JobParams::parse(job_type, params)?;
        adapter
            .validate(&params)
            .map_err(|reason| OrchestratorError::InvalidParameters {
                job_type: job_type.to_string(),
                reason,
            })?;

        let record = self.registry.create(params);
        let id = record.id().to_string();
        {
            let _span = info_span!("submit", job_id = %id, job_type = %job_type).entered();
            info!("Job submitted: {}", sanitize::describe_params(record.params()));
        }

        self.events.send(JobEvent::submitted(&id, job_type));
        self.runner.run(record, adapter);
        Ok(id)
    }

    /// Full snapshot of one job, including its log so far.
    pub fn get(&self, job_id: &str) -> Result<JobView> {
        self.registry
            .get(job_id)
            .map(|record| record.view())
            .ok_or_else(|| OrchestratorError::NotFound(job_id.to_string()))
    }

    /// Summaries of every retained job, oldest first.
    pub fn list(&self) -> Vec<JobSummary> {
        self.registry.list().iter().map(|r| r.summary()).collect()
    }

    /// Requests cooperative cancellation.
    ///
    /// Returns `true` if the job exists and was still running. The job stays
    /// `running` until its task stops.
    pub fn cancel(&self, job_id: &str) -> bool {
        let Some(record) = self.registry.get(job_id) else {
            debug!(job_id, "Cancel requested for unknown job");
            return false;
        };

        let accepted = record.request_cancel();
        if !accepted {
            debug!(job_id, status = %record.status(), "Cancel ignored, job already finished");
        }
        accepted
    }

    /// Model names offered for analysis jobs.
    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Live lifecycle events. Slow receivers lag and lose the oldest events;
    /// [`get`](Self::get) remains authoritative.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub fn counts(&self) -> StatusCounts {
        self.registry.counts()
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Applies the retention policy now. Returns how many jobs were evicted.
    pub fn prune(&self) -> usize {
        self.registry.prune()
    }

    /// Stops accepting queued work and waits for pool workers to drain.
    ///
    /// Jobs submitted afterwards fail immediately when a pool is in use.
    /// Thread-per-job tasks are not waited for.
    pub fn shutdown(&self) {
        self.runner.shutdown();
        self.runner.wait();
    }
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    adapters: AdapterSet,
    retention: RetentionPolicy,
    max_concurrent_jobs: Option<usize>,
    event_capacity: usize,
    models: Vec<String>,
}

impl OrchestratorBuilder {
    fn new(adapters: AdapterSet) -> Self {
        Self {
            adapters,
            retention: RetentionPolicy::KeepAll,
            max_concurrent_jobs: None,
            event_capacity: 1000,
            models: vec![params::DEFAULT_MODEL.to_string()],
        }
    }

    pub fn retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Runs at most `n` tasks at once; further jobs queue. 0 means one per CPU.
    pub fn max_concurrent_jobs(mut self, n: usize) -> Self {
        self.max_concurrent_jobs = Some(if n == 0 { num_cpus::get() } else { n });
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    pub fn build(self) -> Orchestrator {
        let events = JobEventBroadcaster::new(self.event_capacity);
        let runner = match self.max_concurrent_jobs {
            Some(workers) => JobRunner::with_pool(workers, events.clone()),
            None => JobRunner::new(events.clone()),
        };

        Orchestrator {
            registry: JobRegistry::with_retention(self.retention),
            adapters: self.adapters,
            runner,
            events,
            models: self.models,
        }
    }
}

impl From<&Config> for Orchestrator {
    fn from(config: &Config) -> Self {
        Self::from_config(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::jobs::JobStatus;
    use crate::tasks::{TaskAdapter, TaskContext};
    use serde_json::json;
    use std::sync::Arc;

    fn noop_adapters() -> AdapterSet {
        let noop: Arc<dyn TaskAdapter> =
            Arc::new(|_: &JobParams, _: &TaskContext| -> std::result::Result<(), TaskError> {
                Ok(())
            });
        AdapterSet::new().with(JobType::Ocr, noop)
    }

    #[test]
    fn test_unknown_job_type_rejected() {
        let orchestrator = Orchestrator::new(noop_adapters());
        let err = orchestrator.submit("transcode", json!({})).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidJobType(ref t) if t == "transcode"));
        assert!(orchestrator.list().is_empty());
    }

    #[test]
    fn test_job_type_without_adapter_rejected() {
        let orchestrator = Orchestrator::new(noop_adapters());
        let err = orchestrator
            .submit("drive", json!({"folder_id": "f", "destination": "/d", "service_account": "/s"}))
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidJobType(_)));
        assert!(orchestrator.registry().is_empty());
    }

    #[test]
    fn test_invalid_params_register_nothing() {
        let orchestrator = Orchestrator::new(noop_adapters());
        let err = orchestrator.submit("ocr", json!({"dpi": 300})).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidParameters { .. }));
        assert!(orchestrator.list().is_empty());
    }

    struct RejectsSource;

    impl TaskAdapter for RejectsSource {
        fn validate(&self, params: &JobParams) -> std::result::Result<(), String> {
            match params {
                JobParams::Ocr(p) if p.source == "/missing" => {
                    Err("Source folder not found: /missing".to_string())
                }
                _ => Ok(()),
            }
        }

        fn execute(
            &self,
            _: &JobParams,
            _: &TaskContext,
        ) -> std::result::Result<(), TaskError> {
            Ok(())
        }
    }

    #[test]
    fn test_adapter_validation_rejects_before_registering() {
        let orchestrator =
            Orchestrator::new(AdapterSet::new().with(JobType::Ocr, Arc::new(RejectsSource)));
        let mut events = orchestrator.subscribe();

        let err = orchestrator
            .submit("ocr", json!({"source": "/missing"}))
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::InvalidParameters { ref job_type, ref reason }
                if job_type == "ocr" && reason.contains("/missing")
        ));
        assert!(orchestrator.list().is_empty());
        assert!(events.try_recv().is_err());

        let id = orchestrator.submit("ocr", json!({"source": "/in"})).unwrap();
        assert_eq!(orchestrator.list().len(), 1);
        assert_eq!(orchestrator.list()[0].id, id);
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let orchestrator = Orchestrator::new(noop_adapters());
        assert!(matches!(
            orchestrator.get("nope"),
            Err(OrchestratorError::NotFound(ref id)) if id == "nope"
        ));
        assert!(!orchestrator.cancel("nope"));
    }

    #[test]
    fn test_submit_registers_running_job() {
        let orchestrator = Orchestrator::new(noop_adapters());
        let mut events = orchestrator.subscribe();

        let id = orchestrator.submit("ocr", json!({"source": "/in"})).unwrap();

        let view = orchestrator.get(&id).unwrap();
        assert_eq!(view.job_type, JobType::Ocr);
        assert!(matches!(
            view.status,
            JobStatus::Running | JobStatus::Completed
        ));

        let first = events.try_recv().unwrap();
        assert_eq!(first.job_id, id);
        assert!(matches!(
            first.kind,
            crate::broadcast::JobEventKind::Submitted { job_type: JobType::Ocr }
        ));
    }

    #[test]
    fn test_builder_models() {
        let orchestrator = Orchestrator::builder(noop_adapters())
            .models(vec!["a".to_string(), "b".to_string()])
            .build();
        assert_eq!(orchestrator.models(), ["a", "b"]);

        let defaulted = Orchestrator::new(noop_adapters());
        assert_eq!(defaulted.models(), [params::DEFAULT_MODEL]);
    }

    #[test]
    fn test_from_config_uses_configured_models() {
        let config = Config::default();
        let orchestrator = Orchestrator::from(&config);
        assert_eq!(orchestrator.models(), config.models.as_slice());
    }
}
