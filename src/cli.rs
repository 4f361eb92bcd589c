//! CLI task executor.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;

use crate::context::ExecutionContext;
use crate::error::{ResolutionError, TaskExecutionError};
use crate::executor::TaskOutput;
use crate::task::CliTask;

/// A CLI task with its argv resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliInvocation {
    pub argv: Vec<String>,
    pub execution_timeout: Option<Duration>,
}

impl CliInvocation {
    pub fn resolve(task: &CliTask, ctx: &ExecutionContext) -> Result<Self, ResolutionError> {
        let argv = task
            .command
            .iter()
            .map(|arg| arg.resolve(ctx))
            .collect::<Result<_, _>>()?;

        Ok(Self {
            argv,
            execution_timeout: task.execution_timeout,
        })
    }
}

/// Runs one child process per attempt.
///
/// The process is killed if it outlives its execution timeout.
#[derive(Debug, Clone)]
pub struct CliExecutor {
    execution_timeout: Duration,
}

impl CliExecutor {
    pub fn new(execution_timeout: Duration) -> Self {
        Self { execution_timeout }
    }

    pub async fn run(&self, invocation: &CliInvocation) -> Result<TaskOutput, TaskExecutionError> {
        let (program, args) = invocation
            .argv
            .split_first()
            .ok_or_else(|| TaskExecutionError::Spawn {
                program: String::new(),
                reason: "empty command".to_string(),
            })?;
        let limit = invocation.execution_timeout.unwrap_or(self.execution_timeout);

        tracing::debug!(program = %program, args = ?args, "Spawning process");
        let start = Instant::now();

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TaskExecutionError::Spawn {
                program: program.clone(),
                reason: e.to_string(),
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| TaskExecutionError::Io(e.to_string()))?,
            Err(_) => {
                tracing::warn!(program = %program, timeout_ms = limit.as_millis() as u64, "Process timed out, killed");
                return Err(TaskExecutionError::Timeout(limit));
            }
        };

        tracing::debug!(
            program = %program,
            status = %output.status,
            duration_ms = start.elapsed().as_millis() as u64,
            "Process exited"
        );

        if !output.status.success() {
            return Err(TaskExecutionError::NonZeroExit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(TaskOutput {
            body: String::from_utf8_lossy(&output.stdout).to_string(),
            exit_code: output.status.code(),
            ..TaskOutput::default()
        })
    }
}
