//! Workflow definition and builder.

use crate::error::ParseError;
use crate::parser::RawWorkflow;
use crate::task::{TaskBuilder, TaskDefinition};

/// A named, versioned, ordered list of tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowDefinition {
    /// Workflow name, unique within a registry
    pub name: String,

    /// Description of what this workflow does
    pub description: String,

    /// Revision counter of the definition content
    pub version: u32,

    /// Structural revision of the document format
    pub schema_version: u32,

    /// Parameter names callers bind at invocation time
    pub input_parameters: Vec<String>,

    /// Tasks in default execution order
    pub tasks: Vec<TaskDefinition>,
}

impl WorkflowDefinition {
    /// Create a new workflow with a name.
    pub fn builder(name: &str) -> WorkflowBuilder {
        WorkflowBuilder::new(name)
    }

    pub fn task(&self, name: &str) -> Option<&TaskDefinition> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

/// Builder for creating workflows.
#[derive(Debug, Clone)]
pub struct WorkflowBuilder {
    raw: RawWorkflow,
}

impl WorkflowBuilder {
    /// Create a new workflow builder.
    pub fn new(name: &str) -> Self {
        Self {
            raw: RawWorkflow {
                name: name.to_string(),
                ..RawWorkflow::default()
            },
        }
    }

    /// Set the workflow description.
    pub fn description(mut self, desc: &str) -> Self {
        self.raw.description = desc.to_string();
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.raw.version = version;
        self
    }

    pub fn schema_version(mut self, schema_version: u32) -> Self {
        self.raw.schema_version = schema_version;
        self
    }

    /// Declare an input parameter.
    pub fn input(mut self, parameter: &str) -> Self {
        self.raw.input_parameters.push(parameter.to_string());
        self
    }

    /// Add a task to the workflow.
    pub fn task(mut self, task: TaskBuilder) -> Self {
        self.raw.tasks.push(task.into_raw());
        self
    }

    /// Validate and build the workflow.
    pub fn build(self) -> Result<WorkflowDefinition, ParseError> {
        self.raw.into_definition()
    }
}
