//! HTTP task executor.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::{ResolutionError, TaskExecutionError};
use crate::executor::TaskOutput;
use crate::task::{HttpBody, HttpMethod, HttpTask};

/// Longest response body quoted in an error.
const MAX_ERROR_BODY: usize = 512;

/// Whether `status` is acceptable; an empty list accepts any 2xx.
pub(crate) fn accepts(status_codes: &[u16], status: u16) -> bool {
    if status_codes.is_empty() {
        (200..300).contains(&status)
    } else {
        status_codes.contains(&status)
    }
}

/// An HTTP task with its templates resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: RequestBody,
    pub content_type: Option<String>,
    pub status_codes: Vec<u16>,
    pub connection_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Raw(String),
    Form(BTreeMap<String, String>),
    Json(Value),
}

impl HttpRequest {
    pub fn resolve(task: &HttpTask, ctx: &ExecutionContext) -> Result<Self, ResolutionError> {
        let headers = task
            .headers
            .iter()
            .map(|(name, value)| Ok((name.clone(), value.resolve(ctx)?)))
            .collect::<Result<_, ResolutionError>>()?;

        let body = match &task.body {
            HttpBody::Empty => RequestBody::Empty,
            HttpBody::Raw(template) => RequestBody::Raw(template.resolve(ctx)?),
            HttpBody::Form(fields) => RequestBody::Form(
                fields
                    .iter()
                    .map(|(name, value)| Ok((name.clone(), value.resolve(ctx)?)))
                    .collect::<Result<_, ResolutionError>>()?,
            ),
            HttpBody::Json(json) => RequestBody::Json(json.resolve(ctx)?),
        };

        Ok(Self {
            method: task.method,
            url: task.uri.resolve(ctx)?,
            headers,
            body,
            content_type: task.content_type.clone(),
            status_codes: task.status_codes.clone(),
            connection_timeout: task.connection_timeout,
            read_timeout: task.read_timeout,
        })
    }

    pub fn accepts(&self, status: u16) -> bool {
        accepts(&self.status_codes, status)
    }
}

/// Sends one request per attempt.
///
/// The connection timeout bounds connection establishment; the read
/// timeout bounds each read of the response, headers and body alike.
/// Clients are built once per timeout pair and shared by every clone of
/// the executor.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    connection_timeout: Duration,
    read_timeout: Duration,
    clients: Arc<Mutex<HashMap<(Duration, Duration), Client>>>,
}

impl HttpExecutor {
    pub fn new(connection_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            connection_timeout,
            read_timeout,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn client(&self, connect: Duration, read: Duration) -> Result<Client, TaskExecutionError> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(&(connect, read)) {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .connect_timeout(connect)
            .read_timeout(read)
            .build()
            .map_err(|e| TaskExecutionError::Request(e.to_string()))?;
        tracing::debug!(
            connect_ms = connect.as_millis() as u64,
            read_ms = read.as_millis() as u64,
            "Built HTTP client"
        );
        clients.insert((connect, read), client.clone());
        Ok(client)
    }

    /// Number of distinct clients built so far.
    pub fn cached_clients(&self) -> usize {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub async fn send(&self, request: &HttpRequest) -> Result<TaskOutput, TaskExecutionError> {
        let connect = request.connection_timeout.unwrap_or(self.connection_timeout);
        let read = request.read_timeout.unwrap_or(self.read_timeout);
        let client = self.client(connect, read)?;

        let mut builder = client.request(method(request.method), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Raw(body) => builder.body(body.clone()),
            RequestBody::Form(fields) => builder.form(fields),
            RequestBody::Json(json) => builder.json(json),
        };

        let mut outbound = builder
            .build()
            .map_err(|e| TaskExecutionError::Request(e.to_string()))?;
        if let Some(content_type) = &request.content_type {
            let value = HeaderValue::from_str(content_type)
                .map_err(|e| TaskExecutionError::Request(format!("invalid contentType: {}", e)))?;
            outbound.headers_mut().insert(CONTENT_TYPE, value);
        }

        tracing::debug!(method = %request.method, url = %request.url, "Sending HTTP request");
        let start = Instant::now();

        let response = client
            .execute(outbound)
            .await
            .map_err(|e| classify(e, connect, read))?;

        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());

        let body = response
            .text()
            .await
            .map_err(|e| classify(e, connect, read))?;

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status,
            duration_ms = start.elapsed().as_millis() as u64,
            "HTTP response received"
        );

        if !request.accepts(status) {
            return Err(TaskExecutionError::UnexpectedStatus {
                status,
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        Ok(TaskOutput {
            body,
            status_code: Some(status),
            headers,
            exit_code: None,
        })
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Options => Method::OPTIONS,
    }
}

/// Repeated headers (`set-cookie`) are joined with `", "`.
fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = value.to_str().unwrap_or_default();
        collected
            .entry(name.to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    collected
}

fn classify(err: reqwest::Error, connect: Duration, read: Duration) -> TaskExecutionError {
    failure(err.is_timeout(), err.is_connect(), err.to_string(), connect, read)
}

fn failure(
    timed_out: bool,
    connecting: bool,
    message: String,
    connect: Duration,
    read: Duration,
) -> TaskExecutionError {
    match (timed_out, connecting) {
        (true, true) => TaskExecutionError::Timeout(connect),
        (true, false) => TaskExecutionError::Timeout(read),
        (false, true) => TaskExecutionError::Connection(message),
        (false, false) => TaskExecutionError::Request(message),
    }
}

fn truncate(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
