//! Task edit flow shared by the `edit` command.
use cronhook_core::{CronhookError, HttpMethod, TaskDefinition};
use cronhook_scheduler::TaskStore;

/// Fields an edit may change; `None` leaves the stored value alone.
/// An empty string clears an optional text field.
#[derive(Debug, Default)]
pub struct EditSpec {
    pub name: Option<String>,
    pub url: Option<String>,
    pub cron_expression: Option<String>,
    pub method: Option<HttpMethod>,
    pub headers: Option<String>,
    pub body: Option<String>,
    pub owner: Option<String>,
}

/// Apply an edit to a stored task. The new cron expression is validated
/// before anything is touched, so a rejected edit leaves the row unchanged.
/// The caller is responsible for rescheduling a live trigger afterwards
/// (unschedule + schedule, as two explicit steps).
pub fn apply_edit(
    store: &TaskStore,
    id: i64,
    spec: EditSpec,
) -> Result<TaskDefinition, CronhookError> {
    if let Some(expr) = &spec.cron_expression {
        if !cronhook_cron::validate(expr) {
            return Err(CronhookError::InvalidExpression(expr.clone()));
        }
    }

    let mut task = store.get(id)?;
    if let Some(v) = spec.name {
        task.name = v;
    }
    if let Some(v) = spec.url {
        task.url = v;
    }
    if let Some(v) = spec.cron_expression {
        task.cron_expression = v;
    }
    if let Some(v) = spec.method {
        task.method = v;
    }
    if let Some(v) = spec.headers {
        task.headers = if v.is_empty() { None } else { Some(v) };
    }
    if let Some(v) = spec.body {
        task.body = if v.is_empty() { None } else { Some(v) };
    }
    if let Some(v) = spec.owner {
        task.owner = if v.is_empty() { None } else { Some(v) };
    }
    store.update(&task)?;
    Ok(task)
}
