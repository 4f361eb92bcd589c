//! Workflow document parser.
//!
//! Documents may be JSON or YAML. The encoding is detected by decoding,
//! never by file name: JSON is tried first, then YAML. Both decode into
//! the same intermediate tree, so one workflow written in either format
//! produces an identical [`WorkflowDefinition`].

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;
use serde_json::Value;

use crate::context::WORKFLOW_NAMESPACE;
use crate::error::ParseError;
use crate::task::{CliTask, HttpBody, HttpTask, TaskDefinition, TaskKind, TaskType};
use crate::template::{JsonTemplate, Reference, Template};
use crate::workflow::WorkflowDefinition;

/// Parse a workflow from raw document bytes.
///
/// # Example
///
/// ```rust
/// use fleet_workflows::parse;
///
/// let yaml = r#"
/// name: decommission_device
/// inputParameters: [device_id]
/// tasks:
///   - name: delete_device_inventory
///     type: http
///     http:
///       uri: http://inventory/devices/${workflow.input.device_id}
///       method: DELETE
/// "#;
///
/// let workflow = parse(yaml.as_bytes()).unwrap();
/// assert_eq!(workflow.name, "decommission_device");
/// assert_eq!(workflow.tasks.len(), 1);
/// ```
pub fn parse(bytes: &[u8]) -> Result<WorkflowDefinition, ParseError> {
    let document = decode(bytes)?;
    if !document.is_object() {
        return Err(ParseError::schema("document is not a workflow mapping"));
    }

    let raw: RawWorkflow =
        serde_json::from_value(document).map_err(|e| ParseError::Schema(e.to_string()))?;

    raw.into_definition()
}

/// Load and parse a workflow from a file.
///
/// ```rust,no_run
/// use fleet_workflows::parser::load_file;
///
/// let workflow = load_file("workflows/decommission_device.json")?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_file(path: impl AsRef<Path>) -> anyhow::Result<WorkflowDefinition> {
    let path = path.as_ref();
    let content = std::fs::read(path)
        .with_context(|| format!("Failed to read workflow file: {}", path.display()))?;

    parse(&content).with_context(|| format!("Failed to parse workflow file: {}", path.display()))
}

/// Decode JSON or YAML into a generic tree.
pub(crate) fn decode(bytes: &[u8]) -> Result<Value, ParseError> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => Ok(value),
        Err(json_err) => serde_yaml::from_slice::<Value>(bytes).map_err(|yaml_err| {
            ParseError::Syntax(format!(
                "neither JSON ({}) nor YAML ({})",
                json_err, yaml_err
            ))
        }),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawWorkflow {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub input_parameters: Vec<String>,
    pub tasks: Vec<RawTask>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawTask {
    pub name: String,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub http: Option<RawHttp>,
    #[serde(default)]
    pub cli: Option<RawCli>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawHttp {
    pub uri: String,
    pub method: String,
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default, rename = "formdata", alias = "formData")]
    pub form_data: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub json: Option<Value>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub status_codes: Vec<u16>,
    #[serde(default, rename = "connectionTimeOut")]
    pub connection_timeout: Option<u64>,
    #[serde(default, rename = "readTimeOut")]
    pub read_timeout: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawCli {
    pub command: Vec<String>,
    #[serde(default, rename = "executionTimeOut")]
    pub execution_timeout: Option<u64>,
}

impl RawWorkflow {
    pub(crate) fn into_definition(self) -> Result<WorkflowDefinition, ParseError> {
        if self.name.trim().is_empty() {
            return Err(ParseError::schema("workflow name cannot be empty"));
        }

        let mut params = HashSet::new();
        for param in &self.input_parameters {
            if param.is_empty() {
                return Err(ParseError::schema("input parameter name cannot be empty"));
            }
            if !params.insert(param.as_str()) {
                return Err(ParseError::schema(format!(
                    "duplicate input parameter '{}'",
                    param
                )));
            }
        }

        if self.tasks.is_empty() {
            return Err(ParseError::schema("workflow must have at least one task"));
        }

        let mut names = HashSet::new();
        let mut tasks = Vec::with_capacity(self.tasks.len());
        for raw in self.tasks {
            let task = raw.into_task()?;
            if !names.insert(task.name.clone()) {
                return Err(ParseError::schema(format!(
                    "duplicate task name '{}'",
                    task.name
                )));
            }
            tasks.push(task);
        }

        Ok(WorkflowDefinition {
            name: self.name,
            description: self.description,
            version: self.version,
            schema_version: self.schema_version,
            input_parameters: self.input_parameters,
            tasks,
        })
    }
}

impl RawTask {
    pub(crate) fn into_task(self) -> Result<TaskDefinition, ParseError> {
        if self.name.trim().is_empty() {
            return Err(ParseError::schema("task name cannot be empty"));
        }
        if self.name == WORKFLOW_NAMESPACE {
            return Err(ParseError::schema(format!(
                "task name '{}' is reserved",
                WORKFLOW_NAMESPACE
            )));
        }
        if let Some(bad) = self.name.chars().find(|c| !is_name_char(*c)) {
            return Err(ParseError::schema(format!(
                "task name '{}' contains '{}'; it must be usable as a single ${{...}} path segment",
                self.name, bad
            )));
        }

        let name = self.name;
        let in_task = |err: ParseError| match err {
            ParseError::Schema(msg) => ParseError::Schema(format!("task '{}': {}", name, msg)),
            other => other,
        };

        let task_type: TaskType = self.task_type.parse().map_err(in_task)?;
        let kind = match (task_type, self.http, self.cli) {
            (TaskType::Http, Some(http), None) => TaskKind::Http(http.into_task().map_err(in_task)?),
            (TaskType::Cli, None, Some(cli)) => TaskKind::Cli(cli.into_task().map_err(in_task)?),
            (declared, http, cli) => {
                return Err(in_task(ParseError::schema(format!(
                    "type '{}' requires exactly one '{}' payload (http: {}, cli: {})",
                    declared,
                    declared,
                    presence(http.is_some()),
                    presence(cli.is_some()),
                ))));
            }
        };

        let requires = self
            .requires
            .iter()
            .map(|r| Reference::parse_placeholder(r))
            .collect::<Result<Vec<_>, _>>()
            .map_err(in_task)?;

        Ok(TaskDefinition {
            name,
            requires,
            retries: self.retries,
            kind,
        })
    }
}

/// Task names become the first segment of `${<task>.output}` references.
fn is_name_char(c: char) -> bool {
    !(c == '.' || c == '$' || c == '{' || c == '}' || c.is_whitespace())
}

fn presence(present: bool) -> &'static str {
    if present {
        "present"
    } else {
        "absent"
    }
}

impl RawHttp {
    fn into_task(self) -> Result<HttpTask, ParseError> {
        let method = self.method.parse()?;
        let uri = Template::parse(&self.uri)?;
        if self.uri.trim().is_empty() {
            return Err(ParseError::schema("http uri cannot be empty"));
        }

        let headers = self
            .headers
            .unwrap_or_default()
            .iter()
            .map(|(k, v)| Ok((k.clone(), Template::parse(v)?)))
            .collect::<Result<BTreeMap<_, _>, ParseError>>()?;

        let body = match (self.body, self.form_data, self.json) {
            (None, None, None) => HttpBody::Empty,
            (Some(body), None, None) => HttpBody::Raw(Template::parse(&body)?),
            (None, Some(fields), None) => HttpBody::Form(
                fields
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), Template::parse(v)?)))
                    .collect::<Result<BTreeMap<_, _>, ParseError>>()?,
            ),
            (None, None, Some(json)) => HttpBody::Json(JsonTemplate::parse(&json)?),
            _ => {
                return Err(ParseError::schema(
                    "body, formdata and json are mutually exclusive",
                ))
            }
        };

        if let Some(code) = self.status_codes.iter().find(|c| !(100..=599).contains(*c)) {
            return Err(ParseError::schema(format!("invalid status code {}", code)));
        }

        Ok(HttpTask {
            uri,
            method,
            headers,
            body,
            content_type: self.content_type,
            status_codes: self.status_codes,
            connection_timeout: millis(self.connection_timeout),
            read_timeout: millis(self.read_timeout),
        })
    }
}

impl RawCli {
    fn into_task(self) -> Result<CliTask, ParseError> {
        match self.command.first() {
            None => return Err(ParseError::schema("cli command cannot be empty")),
            Some(program) if program.trim().is_empty() => {
                return Err(ParseError::schema("cli executable cannot be empty"))
            }
            Some(_) => {}
        }

        let command = self
            .command
            .iter()
            .map(|arg| Template::parse(arg))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CliTask {
            command,
            execution_timeout: millis(self.execution_timeout),
        })
    }
}

/// Zero means unset.
fn millis(ms: Option<u64>) -> Option<Duration> {
    ms.filter(|ms| *ms > 0).map(Duration::from_millis)
}
