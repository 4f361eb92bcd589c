//! # fleet-workflows
//!
//! Declarative HTTP and CLI workflows for device lifecycle operations.
//!
//! A workflow is an ordered list of tasks. Tasks read job inputs and the
//! outputs of earlier tasks through `${...}` references, and each task may
//! be retried a fixed number of times before the job gives up.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use fleet_workflows::{execute, TaskDefinition, WorkflowDefinition};
//!
//! let workflow = WorkflowDefinition::builder("decommission_device")
//!     .input("device_id")
//!     .task(
//!         TaskDefinition::http(
//!             "delete_inventory",
//!             "DELETE",
//!             "http://inventory:8080/api/devices/${workflow.input.device_id}",
//!         )
//!         .retries(2),
//!     )
//!     .task(
//!         TaskDefinition::cli("notify", &["echo", "${delete_inventory.output}"])
//!             .requires("${delete_inventory.output}"),
//!     )
//!     .build()?;
//!
//! let inputs = HashMap::from([("device_id".to_string(), "dev-42".to_string())]);
//! let job = execute(&workflow, &inputs)?;
//! println!("{:?}", job.status);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Definition Files
//!
//! ```yaml
//! name: decommission_device
//! version: 4
//! inputParameters:
//!   - device_id
//! tasks:
//!   - name: delete_inventory
//!     type: http
//!     retries: 2
//!     http:
//!       method: DELETE
//!       uri: http://inventory:8080/api/devices/${workflow.input.device_id}
//!       connectionTimeOut: 1000
//!       readTimeOut: 1000
//! ```
//!
//! A directory of such files (JSON or YAML) is loaded with
//! [`load_from_directory`], and many jobs can run side by side through a
//! [`JobPool`].

mod cli;
pub mod config;
mod context;
mod engine;
pub mod error;
mod executor;
mod http;
mod job;
pub mod parser;
mod pool;
mod registry;
mod task;
mod template;
#[cfg(test)]
mod test_support;
mod workflow;

pub use cli::{CliExecutor, CliInvocation};
pub use config::EngineConfig;
pub use context::{ExecutionContext, WORKFLOW_NAMESPACE};
pub use engine::{execute, Engine};
pub use error::{
    Error, JobAbortedError, ParseError, ResolutionError, Result, TaskError, TaskExecutionError,
};
pub use executor::{DefaultExecutor, Invocation, TaskExecutor, TaskOutput};
pub use http::{HttpExecutor, HttpRequest, RequestBody};
pub use job::{JobExecution, JobStatus, TaskResult, TaskStatus};
pub use parser::parse;
pub use pool::JobPool;
pub use registry::{load_from_directory, WorkflowRegistry};
pub use task::{
    CliTask, HttpBody, HttpMethod, HttpTask, TaskBuilder, TaskDefinition, TaskKind, TaskType,
};
pub use template::{JsonTemplate, Reference, Segment, Template};
pub use workflow::{WorkflowBuilder, WorkflowDefinition};

/// Re-export common types
pub use serde_json::Value;
