//! Execution context for workflow variables.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::executor::TaskOutput;
use crate::template::Reference;

/// Namespace reserved for caller-supplied inputs (`workflow.input.*`).
pub const WORKFLOW_NAMESPACE: &str = "workflow";

/// Variables visible to one job: inputs plus outputs of finished tasks.
///
/// Stored as a JSON tree so references walk it segment by segment:
/// `workflow.input.<param>` for inputs, `<task>.output[.path]` for results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    root: Map<String, Value>,
}

impl ExecutionContext {
    /// Create a new empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a context with the declared parameters the caller supplied.
    ///
    /// Declared parameters without a value stay unbound; undeclared
    /// values are ignored.
    pub fn with_inputs(parameters: &[String], inputs: &HashMap<String, String>) -> Self {
        let mut ctx = Self::new();
        for param in parameters {
            match inputs.get(param) {
                Some(value) => ctx.bind_input(param, value.clone()),
                None => tracing::debug!(parameter = %param, "Input parameter not supplied"),
            }
        }
        for name in inputs.keys().filter(|k| !parameters.contains(*k)) {
            tracing::debug!(parameter = %name, "Ignoring undeclared input");
        }
        ctx
    }

    /// Bind `workflow.input.<name>`.
    pub fn bind_input(&mut self, name: &str, value: impl Into<String>) {
        let workflow = self
            .root
            .entry(WORKFLOW_NAMESPACE)
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(workflow) = workflow {
            let input = workflow
                .entry("input")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(input) = input {
                input.insert(name.to_string(), Value::String(value.into()));
            }
        }
    }

    /// Publish a finished task's output under its own namespace.
    pub fn publish(&mut self, task: &str, output: &TaskOutput) {
        self.root.insert(task.to_string(), output.to_namespace());
    }

    /// Look a reference up, descending into objects and array indices.
    pub fn lookup(&self, reference: &Reference) -> Option<&Value> {
        let (first, rest) = reference.segments().split_first()?;
        let mut current = self.root.get(first)?;
        for segment in rest {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn contains(&self, reference: &Reference) -> bool {
        self.lookup(reference).is_some()
    }

    /// Whether a task has already published into this context.
    pub fn has_task(&self, task: &str) -> bool {
        task != WORKFLOW_NAMESPACE && self.root.contains_key(task)
    }

    /// Get all variables as a JSON object.
    pub fn as_json(&self) -> Value {
        Value::Object(self.root.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reference(path: &str) -> Reference {
        Reference::parse(path).unwrap()
    }

    #[test]
    fn test_context_inputs() {
        let params = vec!["device_id".to_string(), "request_id".to_string()];
        let mut inputs = HashMap::new();
        inputs.insert("device_id".to_string(), "dev-1".to_string());
        inputs.insert("unexpected".to_string(), "x".to_string());

        let ctx = ExecutionContext::with_inputs(&params, &inputs);

        assert_eq!(
            ctx.lookup(&reference("workflow.input.device_id")),
            Some(&Value::String("dev-1".to_string()))
        );
        assert!(!ctx.contains(&reference("workflow.input.request_id")));
        assert!(!ctx.contains(&reference("workflow.input.unexpected")));
    }

    #[test]
    fn test_context_task_outputs() {
        let mut ctx = ExecutionContext::new();
        ctx.publish("inventory", &TaskOutput::text(r#"{"devices": [{"id": "a"}, {"id": "b"}]}"#));

        assert!(ctx.has_task("inventory"));
        assert_eq!(
            ctx.lookup(&reference("inventory.output.devices.1.id")),
            Some(&Value::String("b".to_string()))
        );
        assert!(ctx.lookup(&reference("inventory.output.devices.9.id")).is_none());
        assert!(ctx.lookup(&reference("inventory.output.devices.x")).is_none());
    }

    #[test]
    fn test_publish_replaces_namespace() {
        let mut ctx = ExecutionContext::new();
        ctx.publish("step", &TaskOutput::text("first"));
        ctx.publish("step", &TaskOutput::text("second"));

        assert_eq!(
            ctx.lookup(&reference("step.output")),
            Some(&json!("second"))
        );
    }

    #[test]
    fn test_workflow_namespace_is_not_a_task() {
        let mut ctx = ExecutionContext::new();
        ctx.bind_input("id", "1");
        assert!(!ctx.has_task("workflow"));
        assert_eq!(ctx.as_json(), json!({"workflow": {"input": {"id": "1"}}}));
    }
}
