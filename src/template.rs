//! Structured `${...}` placeholders.
//!
//! Template strings are parsed once, when a definition is loaded, into a
//! sequence of literal text and [`Reference`] segments. Resolution then
//! walks the parsed form instead of re-scanning the raw string.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::{ParseError, ResolutionError};

const OPEN: &str = "${";
const CLOSE: char = '}';

/// A dotted path into the execution context, e.g. `workflow.input.device_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    segments: Vec<String>,
}

impl Reference {
    /// Parse the inside of a placeholder (`workflow.input.device_id`).
    pub fn parse(path: &str) -> Result<Self, ParseError> {
        let path = path.trim();
        if path.is_empty() {
            return Err(ParseError::schema("empty placeholder ${}"));
        }

        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(ParseError::schema(format!(
                "placeholder ${{{}}} has an empty path segment",
                path
            )));
        }

        Ok(Self { segments })
    }

    /// Parse a string that must be exactly one placeholder, as used by `requires`.
    pub fn parse_placeholder(raw: &str) -> Result<Self, ParseError> {
        let template = Template::parse(raw)?;
        match template.segments.as_slice() {
            [Segment::Reference(reference)] => Ok(reference.clone()),
            _ => Err(ParseError::schema(format!(
                "'{}' must be a single ${{...}} placeholder",
                raw
            ))),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.segments[0]
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Reference(Reference),
}

/// A parsed template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    raw: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a raw template string.
    ///
    /// Text outside `${...}` passes through verbatim. An unterminated
    /// `${` or an empty placeholder is a schema error.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let mut segments = Vec::new();
        let mut rest = raw;

        while let Some(start) = rest.find(OPEN) {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + OPEN.len()..];
            let end = after.find(CLOSE).ok_or_else(|| {
                ParseError::schema(format!("unterminated placeholder in '{}'", raw))
            })?;
            segments.push(Segment::Reference(Reference::parse(&after[..end])?));
            rest = &after[end + 1..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Reference(r) => Some(r),
            Segment::Literal(_) => None,
        })
    }

    /// Substitute every placeholder from the context.
    pub fn resolve(&self, ctx: &ExecutionContext) -> Result<String, ResolutionError> {
        let mut out = String::with_capacity(self.raw.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Reference(reference) => {
                    let value = ctx.lookup(reference).ok_or_else(|| {
                        ResolutionError::MissingReference {
                            reference: reference.to_string(),
                        }
                    })?;
                    out.push_str(&render(value));
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Strings render bare, everything else as compact JSON.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A JSON body whose string leaves are templates.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonTemplate {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(Template),
    Array(Vec<JsonTemplate>),
    Object(BTreeMap<String, JsonTemplate>),
}

impl JsonTemplate {
    pub fn parse(value: &Value) -> Result<Self, ParseError> {
        Ok(match value {
            Value::Null => JsonTemplate::Null,
            Value::Bool(b) => JsonTemplate::Bool(*b),
            Value::Number(n) => JsonTemplate::Number(n.clone()),
            Value::String(s) => JsonTemplate::String(Template::parse(s)?),
            Value::Array(items) => JsonTemplate::Array(
                items
                    .iter()
                    .map(JsonTemplate::parse)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => JsonTemplate::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), JsonTemplate::parse(v)?)))
                    .collect::<Result<_, ParseError>>()?,
            ),
        })
    }

    pub fn resolve(&self, ctx: &ExecutionContext) -> Result<Value, ResolutionError> {
        Ok(match self {
            JsonTemplate::Null => Value::Null,
            JsonTemplate::Bool(b) => Value::Bool(*b),
            JsonTemplate::Number(n) => Value::Number(n.clone()),
            JsonTemplate::String(t) => Value::String(t.resolve(ctx)?),
            JsonTemplate::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| item.resolve(ctx))
                    .collect::<Result<_, _>>()?,
            ),
            JsonTemplate::Object(map) => {
                let mut resolved = serde_json::Map::new();
                for (k, v) in map {
                    resolved.insert(k.clone(), v.resolve(ctx)?);
                }
                Value::Object(resolved)
            }
        })
    }

    pub fn references(&self) -> Vec<&Reference> {
        match self {
            JsonTemplate::String(t) => t.references().collect(),
            JsonTemplate::Array(items) => items.iter().flat_map(|i| i.references()).collect(),
            JsonTemplate::Object(map) => map.values().flat_map(|v| v.references()).collect(),
            _ => Vec::new(),
        }
    }
}
