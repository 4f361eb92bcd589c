//! Task dispatch: resolved invocations and the executors that run them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::cli::{CliExecutor, CliInvocation};
use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::error::{ResolutionError, TaskExecutionError};
use crate::http::{HttpExecutor, HttpRequest};
use crate::task::{TaskDefinition, TaskKind};

/// What a successful attempt captured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOutput {
    /// Response body or standard output
    pub body: String,
    pub status_code: Option<u16>,
    pub headers: BTreeMap<String, String>,
    pub exit_code: Option<i32>,
}

impl TaskOutput {
    /// Output carrying only a body.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// The value published at `<task>` in the execution context.
    pub(crate) fn to_namespace(&self) -> Value {
        let mut ns = Map::new();
        ns.insert("output".to_string(), decode_body(&self.body));
        if let Some(status) = self.status_code {
            ns.insert("statusCode".to_string(), Value::from(status));
            let headers = self
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            ns.insert("headers".to_string(), Value::Object(headers));
        }
        if let Some(code) = self.exit_code {
            ns.insert("exitCode".to_string(), Value::from(code));
        }
        Value::Object(ns)
    }
}

/// JSON objects and arrays are decoded so paths can reach into them;
/// anything else stays text, minus the trailing newline.
fn decode_body(body: &str) -> Value {
    match serde_json::from_str::<Value>(body.trim()) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => value,
        _ => Value::String(body.trim_end_matches(['\n', '\r']).to_string()),
    }
}

/// A task with every template substituted, ready to run.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    Http(HttpRequest),
    Cli(CliInvocation),
}

impl Invocation {
    /// Resolve a task's payload against the context.
    pub fn resolve(task: &TaskDefinition, ctx: &ExecutionContext) -> Result<Self, ResolutionError> {
        Ok(match &task.kind {
            TaskKind::Http(http) => Invocation::Http(HttpRequest::resolve(http, ctx)?),
            TaskKind::Cli(cli) => Invocation::Cli(CliInvocation::resolve(cli, ctx)?),
        })
    }
}

/// Performs one attempt of a resolved task.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, invocation: &Invocation) -> Result<TaskOutput, TaskExecutionError>;
}

/// Dispatches HTTP and CLI invocations to their executors.
#[derive(Debug, Clone)]
pub struct DefaultExecutor {
    http: HttpExecutor,
    cli: CliExecutor,
}

impl DefaultExecutor {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            http: HttpExecutor::new(config.connection_timeout(), config.read_timeout()),
            cli: CliExecutor::new(config.execution_timeout()),
        }
    }
}

impl Default for DefaultExecutor {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

#[async_trait]
impl TaskExecutor for DefaultExecutor {
    async fn execute(&self, invocation: &Invocation) -> Result<TaskOutput, TaskExecutionError> {
        match invocation {
            Invocation::Http(request) => self.http.send(request).await,
            Invocation::Cli(command) => self.cli.run(command).await,
        }
    }
}
