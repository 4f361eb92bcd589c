//! Workflow execution engine.
//!
//! A job walks its tasks in definition order. Each task goes through
//! `Resolving` (requirements checked, templates substituted) and
//! `Executing` (one executor call per attempt). Execution failures are
//! retried immediately until the task's budget is spent; resolution
//! failures are not retried. The first task to fail halts the job.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::error::{Error, JobAbortedError, ResolutionError, Result, TaskError};
use crate::executor::{DefaultExecutor, Invocation, TaskExecutor};
use crate::job::{JobExecution, JobStatus, TaskResult, TaskStatus};
use crate::task::TaskDefinition;
use crate::workflow::WorkflowDefinition;

/// Drives jobs to a terminal state.
#[derive(Clone)]
pub struct Engine {
    executor: Arc<dyn TaskExecutor>,
}

impl Engine {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_executor(Arc::new(DefaultExecutor::new(config)))
    }

    /// Use a custom executor for every task attempt.
    pub fn with_executor(executor: Arc<dyn TaskExecutor>) -> Self {
        Self { executor }
    }

    /// Run a workflow to completion.
    ///
    /// Never fails as a call: task failures are recorded in the returned
    /// job, whose status is always terminal.
    pub async fn run(
        &self,
        definition: &WorkflowDefinition,
        inputs: &HashMap<String, String>,
    ) -> JobExecution {
        let start = Instant::now();
        let context = ExecutionContext::with_inputs(&definition.input_parameters, inputs);
        let mut job = JobExecution::new(definition, context);

        tracing::info!(
            workflow = %definition.name,
            version = definition.version,
            tasks = definition.tasks.len(),
            "Starting job"
        );
        job.status = JobStatus::Running;

        for task in &definition.tasks {
            let result = self.run_task(task, &job.context).await;

            if let Some(output) = &result.output {
                job.context.publish(&task.name, output);
            }

            if let Some(error) = &result.error {
                tracing::warn!(
                    workflow = %definition.name,
                    task = %task.name,
                    attempts = result.attempts,
                    code = error.code(),
                    error = %error,
                    "Task failed, aborting job"
                );
                job.error = Some(JobAbortedError {
                    task: task.name.clone(),
                    attempts: result.attempts,
                    source: error.clone(),
                });
                job.results.push(result);
                job.status = JobStatus::Failed;
                job.duration = start.elapsed();
                return job;
            }

            job.results.push(result);
        }

        job.status = JobStatus::Succeeded;
        job.duration = start.elapsed();

        tracing::info!(
            workflow = %definition.name,
            total_ms = job.duration.as_millis() as u64,
            "Job completed"
        );

        job
    }

    /// Resolve and execute one task against a read-only view of the context.
    async fn run_task(&self, task: &TaskDefinition, ctx: &ExecutionContext) -> TaskResult {
        let start = Instant::now();
        transition(task, TaskStatus::Resolving);

        if let Some(missing) = task.requires.iter().find(|r| !ctx.contains(r)) {
            let error = ResolutionError::UnmetRequirement {
                reference: missing.to_string(),
            };
            transition(task, TaskStatus::Failed);
            return TaskResult::failed(&task.name, 0, error.into(), start.elapsed());
        }

        let invocation = match Invocation::resolve(task, ctx) {
            Ok(invocation) => invocation,
            Err(error) => {
                transition(task, TaskStatus::Failed);
                return TaskResult::failed(&task.name, 0, error.into(), start.elapsed());
            }
        };

        let max_attempts = task.retries.saturating_add(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            transition(task, TaskStatus::Executing);

            match self.executor.execute(&invocation).await {
                Ok(output) => {
                    transition(task, TaskStatus::Succeeded);
                    return TaskResult::succeeded(&task.name, attempt, output, start.elapsed());
                }
                Err(error) if attempt < max_attempts => {
                    tracing::warn!(
                        task = %task.name,
                        attempt,
                        max_attempts,
                        error = %error,
                        "Task attempt failed, retrying"
                    );
                }
                Err(error) => {
                    transition(task, TaskStatus::Failed);
                    return TaskResult::failed(
                        &task.name,
                        attempt,
                        TaskError::Execution(error),
                        start.elapsed(),
                    );
                }
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

fn transition(task: &TaskDefinition, status: TaskStatus) {
    tracing::debug!(task = %task.name, status = %status, "Task state");
}

/// Execute a workflow on a private runtime, blocking until it finishes.
///
/// Inside an async context this returns [`Error::Runtime`] without
/// running anything; use [`Engine::run`] there instead.
///
/// # Example
///
/// ```rust,no_run
/// use std::collections::HashMap;
/// use fleet_workflows::{execute, parse};
///
/// let workflow = parse(br#"{"name": "hello", "tasks": [
///     {"name": "say", "type": "cli", "cli": {"command": ["echo", "hi"]}}
/// ]}"#)?;
///
/// let job = execute(&workflow, &HashMap::new())?;
/// assert!(job.succeeded());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn execute(
    definition: &WorkflowDefinition,
    inputs: &HashMap<String, String>,
) -> Result<JobExecution> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(Error::Runtime(
            "execute() cannot block inside a tokio runtime, use Engine::run".to_string(),
        ));
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(Engine::default().run(definition, inputs)))
}
