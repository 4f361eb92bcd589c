//! Bounded concurrent job runner.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::job::JobExecution;
use crate::workflow::WorkflowDefinition;

/// Runs independent jobs on the tokio runtime, at most `limit` at a time.
///
/// Jobs share nothing but the engine; each owns its execution context.
#[derive(Clone)]
pub struct JobPool {
    engine: Engine,
    permits: Arc<Semaphore>,
    limit: usize,
}

impl JobPool {
    pub fn new(engine: Engine, max_concurrent_jobs: usize) -> Self {
        let limit = max_concurrent_jobs.max(1);
        Self {
            engine,
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(Engine::new(config), config.max_concurrent_jobs)
    }

    /// Queue a job. It starts once a slot frees up.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(
        &self,
        definition: Arc<WorkflowDefinition>,
        inputs: HashMap<String, String>,
    ) -> JoinHandle<JobExecution> {
        let engine = self.engine.clone();
        let permits = Arc::clone(&self.permits);

        tokio::spawn(async move {
            // The semaphore is never closed, so acquiring cannot fail.
            let _permit = permits.acquire_owned().await.ok();
            tracing::debug!(workflow = %definition.name, "Job slot acquired");
            engine.run(&definition, &inputs).await
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Slots not currently held by a running job.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskExecutionError;
    use crate::executor::{Invocation, TaskExecutor, TaskOutput};
    use crate::job::JobStatus;
    use crate::task::TaskDefinition;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records the highest number of overlapping calls.
    #[derive(Default)]
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl TaskExecutor for Gauge {
        async fn execute(&self, _invocation: &Invocation) -> Result<TaskOutput, TaskExecutionError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(TaskOutput::text("ok"))
        }
    }

    fn workflow() -> Arc<WorkflowDefinition> {
        Arc::new(
            WorkflowDefinition::builder("pooled")
                .input("id")
                .task(TaskDefinition::cli("step", &["echo", "${workflow.input.id}"]))
                .build()
                .unwrap(),
        )
    }

    async fn run_jobs(limit: usize, jobs: usize) -> (usize, Vec<JobExecution>) {
        let gauge = Arc::new(Gauge::default());
        let pool = JobPool::new(Engine::with_executor(gauge.clone()), limit);
        let definition = workflow();

        let handles: Vec<_> = (0..jobs)
            .map(|i| {
                let inputs = HashMap::from([("id".to_string(), i.to_string())]);
                pool.submit(Arc::clone(&definition), inputs)
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        assert_eq!(pool.available(), pool.limit());
        (gauge.peak.load(Ordering::SeqCst), results)
    }

    #[tokio::test]
    async fn test_pool_limits_concurrency() {
        let (peak, jobs) = run_jobs(2, 6).await;

        assert!(peak <= 2, "peak concurrency {}", peak);
        assert_eq!(jobs.len(), 6);
        assert!(jobs.iter().all(|j| j.status == JobStatus::Succeeded));
    }

    #[tokio::test]
    async fn test_jobs_have_isolated_contexts() {
        let (_, jobs) = run_jobs(4, 4).await;

        let mut ids: Vec<String> = jobs
            .iter()
            .map(|j| j.context.as_json()["workflow"]["input"]["id"].as_str().unwrap().to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["0", "1", "2", "3"]);
    }

    #[test]
    fn test_zero_limit_is_clamped() {
        let pool = JobPool::new(Engine::default(), 0);
        assert_eq!(pool.limit(), 1);
    }
}
