use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use tracing::{error, warn};

use cronhook_core::{ExecutionRecord, HttpMethod, TaskDefinition};

use crate::headers::parse_headers;

/// Transport configuration for the executor's shared HTTP client.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Per-request timeout; a run that exceeds it fails with a recorded error.
    pub request_timeout: Duration,
    /// Trust any TLS certificate. Off by default; only enable for
    /// operator-controlled internal endpoints with self-signed certs.
    pub accept_invalid_certs: bool,
    /// Cap on the stored response body, in bytes.
    pub max_response_bytes: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            accept_invalid_certs: false,
            max_response_bytes: 64 * 1024,
        }
    }
}

/// Performs one HTTP call per fire and turns the outcome into an
/// [`ExecutionRecord`]. Never returns an error to the scheduler: every
/// failure mode ends up inside the record.
pub struct HttpExecutor {
    client: Client,
    max_response_bytes: usize,
}

impl HttpExecutor {
    pub fn new(config: &ExecutorConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(config.request_timeout);
        if config.accept_invalid_certs {
            warn!("TLS certificate validation disabled for task requests");
            builder = builder.danger_accept_invalid_certs(true);
        }
        Ok(Self {
            client: builder.build()?,
            max_response_bytes: config.max_response_bytes,
        })
    }

    /// Run one task to completion. The record is finalized on every exit
    /// path: `finished_at` is always set before this returns.
    pub async fn execute(&self, task: &TaskDefinition) -> ExecutionRecord {
        let mut record = ExecutionRecord::started(task.id, Utc::now());
        match self.send(task).await {
            Ok((success, body)) => {
                record.success = success;
                record.response = Some(truncate_utf8(body, self.max_response_bytes));
            }
            Err(e) => {
                error!(task_id = task.id, error = %e, "task request failed");
                record.error = Some(e.to_string());
            }
        }
        record.finished_at = Some(Utc::now());
        record
    }

    async fn send(&self, task: &TaskDefinition) -> reqwest::Result<(bool, String)> {
        let mut request = self.client.request(to_method(task.method), &task.url);

        if let Some(raw) = task.headers.as_deref() {
            request = request.headers(parse_headers(raw));
        }

        // GET never carries a body, whatever the definition says.
        if task.method != HttpMethod::Get {
            if let Some(body) = task.body.as_deref().filter(|b| !b.is_empty()) {
                request = request
                    .header(CONTENT_TYPE, "application/json; charset=utf-8")
                    .body(body.to_owned());
            }
        }

        let response = request.send().await?;
        let success = response.status().is_success();
        let body = response.text().await?;
        Ok((success, body))
    }
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Head => Method::HEAD,
    }
}

/// Truncate to at most `max` bytes, backing off to a char boundary.
fn truncate_utf8(mut s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let mut cut = max;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
    s
}
