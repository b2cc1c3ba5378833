use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// HTTP method a task fires with. GET is the default and never carries a body.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            other => Err(format!("unknown HTTP method '{other}'")),
        }
    }
}

/// A stored task: one HTTP call plus its cron schedule.
///
/// The scheduler treats a definition as a value snapshot taken at schedule
/// time. Editing a live task requires an explicit unschedule + schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Assigned by the task source (SQLite rowid).
    pub id: i64,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    /// Raw newline-delimited "Key: Value" lines, as entered by the operator.
    pub headers: Option<String>,
    /// Request body; ignored for GET.
    pub body: Option<String>,
    /// 6-field (seconds-level) cron expression.
    pub cron_expression: String,
    pub active: bool,
    /// Identity of the creator. Opaque to the scheduler; the surrounding
    /// application uses it for access scoping.
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A task as submitted for creation, before the store assigns an id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    pub headers: Option<String>,
    pub body: Option<String>,
    pub cron_expression: String,
    #[serde(default = "default_active")]
    pub active: bool,
    pub owner: Option<String>,
}

fn default_active() -> bool {
    true
}

/// The logged outcome of one job run.
///
/// `response` and `error` are mutually exclusive: a run that got an HTTP
/// response records the body (success or not), a run that never got one
/// records the transport error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Assigned by the execution sink on append.
    pub id: Option<i64>,
    pub run_id: Uuid,
    pub task_id: i64,
    pub started_at: DateTime<Utc>,
    /// None only while the run is in flight.
    pub finished_at: Option<DateTime<Utc>>,
    pub success: bool,
    pub response: Option<String>,
    pub error: Option<String>,
}

impl ExecutionRecord {
    /// A freshly started run: not finished, not successful yet.
    pub fn started(task_id: i64, started_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            run_id: Uuid::new_v4(),
            task_id,
            started_at,
            finished_at: None,
            success: false,
            response: None,
            error: None,
        }
    }
}
