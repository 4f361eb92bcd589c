//! Job and task results.

use std::fmt;
use std::time::Duration;

use crate::context::ExecutionContext;
use crate::error::{JobAbortedError, TaskError};
use crate::executor::TaskOutput;
use crate::workflow::WorkflowDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Pending,
    Resolving,
    Executing,
    Succeeded,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Resolving => "resolving",
            TaskStatus::Executing => "executing",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome of one task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult {
    pub name: String,
    pub status: TaskStatus,

    /// Executor calls made; zero when the task failed while resolving
    pub attempts: u32,

    pub output: Option<TaskOutput>,
    pub error: Option<TaskError>,

    pub duration: Duration,
}

impl TaskResult {
    pub(crate) fn succeeded(name: &str, attempts: u32, output: TaskOutput, duration: Duration) -> Self {
        Self {
            name: name.to_string(),
            status: TaskStatus::Succeeded,
            attempts,
            output: Some(output),
            error: None,
            duration,
        }
    }

    pub(crate) fn failed(name: &str, attempts: u32, error: TaskError, duration: Duration) -> Self {
        Self {
            name: name.to_string(),
            status: TaskStatus::Failed,
            attempts,
            output: None,
            error: Some(error),
            duration,
        }
    }
}

/// One run of a workflow against concrete inputs.
#[derive(Debug, Clone)]
pub struct JobExecution {
    pub workflow: String,
    pub version: u32,
    pub status: JobStatus,

    /// Inputs plus the outputs of every task that succeeded
    pub context: ExecutionContext,

    /// Results of the tasks attempted, in execution order
    pub results: Vec<TaskResult>,

    /// Set when the job failed
    pub error: Option<JobAbortedError>,

    pub duration: Duration,
}

impl JobExecution {
    pub(crate) fn new(definition: &WorkflowDefinition, context: ExecutionContext) -> Self {
        Self {
            workflow: definition.name.clone(),
            version: definition.version,
            status: JobStatus::Pending,
            context,
            results: Vec::new(),
            error: None,
            duration: Duration::ZERO,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Succeeded
    }

    pub fn result(&self, task: &str) -> Option<&TaskResult> {
        self.results.iter().find(|r| r.name == task)
    }

    /// The task that aborted the job, if any.
    pub fn failed_task(&self) -> Option<&TaskResult> {
        self.results.iter().find(|r| r.status == TaskStatus::Failed)
    }

    /// Turn a failed job into its abort error.
    pub fn into_result(self) -> Result<Self, JobAbortedError> {
        match self.error.clone() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}
