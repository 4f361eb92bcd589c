//! Task definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde_json::Value;

use crate::error::ParseError;
use crate::parser::{RawCli, RawHttp, RawTask};
use crate::template::{JsonTemplate, Reference, Template};

/// A single step in a workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDefinition {
    /// Unique within its workflow; also the namespace its output is published under
    pub name: String,

    /// References that must be bound before the task may start
    pub requires: Vec<Reference>,

    /// Additional attempts allowed after the first failure
    pub retries: u32,

    pub kind: TaskKind,
}

impl TaskDefinition {
    /// Start building an HTTP task.
    pub fn http(name: &str, method: &str, uri: &str) -> TaskBuilder {
        TaskBuilder::new(name, "http").with_http(RawHttp {
            uri: uri.to_string(),
            method: method.to_string(),
            ..RawHttp::default()
        })
    }

    /// Start building a CLI task from an argv vector.
    pub fn cli(name: &str, command: &[&str]) -> TaskBuilder {
        TaskBuilder::new(name, "cli").with_cli(RawCli {
            command: command.iter().map(|s| s.to_string()).collect(),
            execution_timeout: None,
        })
    }

    /// The `type` tag this task was declared with.
    pub fn task_type(&self) -> TaskType {
        match self.kind {
            TaskKind::Http(_) => TaskType::Http,
            TaskKind::Cli(_) => TaskType::Cli,
        }
    }

    /// Every reference used by the payload's templates.
    pub fn template_references(&self) -> Vec<&Reference> {
        match &self.kind {
            TaskKind::Http(http) => http.references(),
            TaskKind::Cli(cli) => cli.command.iter().flat_map(|t| t.references()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    Http,
    Cli,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Http => "http",
            TaskType::Cli => "cli",
        }
    }
}

impl FromStr for TaskType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(TaskType::Http),
            "cli" => Ok(TaskType::Cli),
            other => Err(ParseError::schema(format!(
                "unknown task type '{}' (expected http or cli)",
                other
            ))),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task payload, keyed by the declared `type`.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskKind {
    Http(HttpTask),
    Cli(CliTask),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpTask {
    pub uri: Template,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, Template>,
    pub body: HttpBody,
    /// Overrides the Content-Type implied by the body encoding
    pub content_type: Option<String>,
    /// Acceptable response codes; empty accepts any 2xx
    pub status_codes: Vec<u16>,
    pub connection_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
}

impl HttpTask {
    pub fn accepts(&self, status: u16) -> bool {
        crate::http::accepts(&self.status_codes, status)
    }

    fn references(&self) -> Vec<&Reference> {
        let mut refs: Vec<&Reference> = self.uri.references().collect();
        refs.extend(self.headers.values().flat_map(|t| t.references()));
        match &self.body {
            HttpBody::Empty => {}
            HttpBody::Raw(t) => refs.extend(t.references()),
            HttpBody::Form(fields) => refs.extend(fields.values().flat_map(|t| t.references())),
            HttpBody::Json(json) => refs.extend(json.references()),
        }
        refs
    }
}

/// At most one body encoding per request.
#[derive(Debug, Clone, PartialEq)]
pub enum HttpBody {
    Empty,
    Raw(Template),
    Form(BTreeMap<String, Template>),
    Json(JsonTemplate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "HEAD" => Ok(HttpMethod::Head),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "OPTIONS" => Ok(HttpMethod::Options),
            _ => Err(ParseError::schema(format!("unknown HTTP method '{}'", s))),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CliTask {
    /// argv; the first element is the executable
    pub command: Vec<Template>,
    pub execution_timeout: Option<Duration>,
}

/// Builder for creating tasks.
///
/// Builds the same document shape the parser reads, so a built task is
/// validated exactly like a parsed one. HTTP-only setters are ignored on
/// CLI tasks and vice versa.
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    raw: RawTask,
}

impl TaskBuilder {
    fn new(name: &str, task_type: &str) -> Self {
        Self {
            raw: RawTask {
                name: name.to_string(),
                task_type: task_type.to_string(),
                ..RawTask::default()
            },
        }
    }

    fn with_http(mut self, http: RawHttp) -> Self {
        self.raw.http = Some(http);
        self
    }

    fn with_cli(mut self, cli: RawCli) -> Self {
        self.raw.cli = Some(cli);
        self
    }

    /// Add a `${...}` precondition.
    pub fn requires(mut self, placeholder: &str) -> Self {
        self.raw.requires.push(placeholder.to_string());
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.raw.retries = retries;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let Some(http) = self.raw.http.as_mut() {
            http.headers
                .get_or_insert_with(BTreeMap::new)
                .insert(name.to_string(), value.to_string());
        }
        self
    }

    /// Raw string body.
    pub fn body(mut self, body: &str) -> Self {
        if let Some(http) = self.raw.http.as_mut() {
            http.body = Some(body.to_string());
        }
        self
    }

    /// Add a urlencoded form field.
    pub fn form_field(mut self, name: &str, value: &str) -> Self {
        if let Some(http) = self.raw.http.as_mut() {
            http.form_data
                .get_or_insert_with(BTreeMap::new)
                .insert(name.to_string(), value.to_string());
        }
        self
    }

    /// JSON body; string leaves are templates.
    pub fn json(mut self, json: Value) -> Self {
        if let Some(http) = self.raw.http.as_mut() {
            http.json = Some(json);
        }
        self
    }

    pub fn content_type(mut self, content_type: &str) -> Self {
        if let Some(http) = self.raw.http.as_mut() {
            http.content_type = Some(content_type.to_string());
        }
        self
    }

    pub fn status_codes(mut self, codes: &[u16]) -> Self {
        if let Some(http) = self.raw.http.as_mut() {
            http.status_codes = codes.to_vec();
        }
        self
    }

    pub fn connection_timeout_ms(mut self, ms: u64) -> Self {
        if let Some(http) = self.raw.http.as_mut() {
            http.connection_timeout = Some(ms);
        }
        self
    }

    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        if let Some(http) = self.raw.http.as_mut() {
            http.read_timeout = Some(ms);
        }
        self
    }

    pub fn execution_timeout_ms(mut self, ms: u64) -> Self {
        if let Some(cli) = self.raw.cli.as_mut() {
            cli.execution_timeout = Some(ms);
        }
        self
    }

    /// Validate and build the task.
    pub fn build(self) -> Result<TaskDefinition, ParseError> {
        self.raw.into_task()
    }

    pub(crate) fn into_raw(self) -> RawTask {
        self.raw
    }
}
