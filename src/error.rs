//! Error types for definition parsing and job execution.
//!
//! Errors fall into two families. Definition bugs ([`ParseError`],
//! [`ResolutionError`]) are never retried. Integration failures
//! ([`TaskExecutionError`]) are retried up to a task's budget. Every error
//! carries a stable [`code`](Error::code) so callers can tell them apart
//! without matching on messages.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for crate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A definition document could not be turned into a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The bytes are neither valid JSON nor valid YAML.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// The document decoded but is not a valid workflow.
    #[error("schema error: {0}")]
    Schema(String),
}

impl ParseError {
    pub(crate) fn schema(msg: impl Into<String>) -> Self {
        ParseError::Schema(msg.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            ParseError::Syntax(_) => "PARSE_SYNTAX",
            ParseError::Schema(_) => "PARSE_SCHEMA",
        }
    }
}

/// A placeholder could not be resolved against the execution context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// A template references a variable the context does not hold.
    #[error("unresolved reference ${{{reference}}}")]
    MissingReference { reference: String },

    /// A task's `requires` entry is not bound yet.
    #[error("requirement ${{{reference}}} is not satisfied")]
    UnmetRequirement { reference: String },
}

impl ResolutionError {
    /// The dotted reference that failed to resolve.
    pub fn reference(&self) -> &str {
        match self {
            ResolutionError::MissingReference { reference }
            | ResolutionError::UnmetRequirement { reference } => reference,
        }
    }
}

/// A single attempt of a task failed at the integration boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskExecutionError {
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("process exited with {}: {stderr}", exit_code_label(.code))]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("failed to spawn `{program}`: {reason}")]
    Spawn { program: String, reason: String },

    #[error("I/O error: {0}")]
    Io(String),
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "signal".to_string(),
    }
}

impl TaskExecutionError {
    pub fn code(&self) -> &'static str {
        match self {
            TaskExecutionError::Timeout(_) => "TASK_TIMEOUT",
            TaskExecutionError::Connection(_) => "TASK_CONNECTION",
            TaskExecutionError::Request(_) => "TASK_REQUEST",
            TaskExecutionError::UnexpectedStatus { .. } => "TASK_STATUS",
            TaskExecutionError::NonZeroExit { .. } => "TASK_EXIT_CODE",
            TaskExecutionError::Spawn { .. } => "TASK_SPAWN",
            TaskExecutionError::Io(_) => "TASK_IO",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskExecutionError::Timeout(_))
    }
}

/// Why a task ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Execution(#[from] TaskExecutionError),
}

impl TaskError {
    /// Only execution failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskError::Execution(_))
    }

    pub fn code(&self) -> &'static str {
        match self {
            TaskError::Resolution(_) => "RESOLUTION_ERROR",
            TaskError::Execution(e) => e.code(),
        }
    }
}

/// The first fatal task failure of a job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("job aborted: task '{task}' failed after {attempts} attempt(s): {source}")]
pub struct JobAbortedError {
    pub task: String,
    pub attempts: u32,
    #[source]
    pub source: TaskError,
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Execution(#[from] TaskExecutionError),

    #[error(transparent)]
    JobAborted(#[from] JobAbortedError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking entry point was called where it cannot block.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl Error {
    /// Stable error code for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Parse(e) => e.code(),
            Error::Resolution(_) => "RESOLUTION_ERROR",
            Error::Execution(e) => e.code(),
            Error::JobAborted(_) => "JOB_ABORTED",
            Error::Io(_) => "IO_ERROR",
            Error::Runtime(_) => "RUNTIME_ERROR",
        }
    }
}
