/// Cron expression parsing and fire-time expansion.
///
/// Expressions use the 6-field seconds-level form
/// `sec min hour day-of-month month day-of-week` and are evaluated in the
/// local time zone.
use std::str::FromStr;

use chrono::{DateTime, Local};
use cron::Schedule;

use cronhook_core::CronhookError;

/// Syntactic check only. Returns false rather than erroring so callers can
/// reject a schedule before any trigger is touched.
pub fn validate(expr: &str) -> bool {
    parse(expr).is_ok()
}

/// Parse a 6-field cron expression into a [`Schedule`].
pub fn parse(expr: &str) -> Result<Schedule, CronhookError> {
    let trimmed = expr.trim();
    let fields = trimmed.split_whitespace().count();
    if fields != 6 {
        return Err(CronhookError::InvalidExpression(format!(
            "expected 6 fields, got {fields}: '{expr}'"
        )));
    }
    Schedule::from_str(trimmed)
        .map_err(|e| CronhookError::InvalidExpression(format!("'{expr}': {e}")))
}

/// Up to `count` strictly increasing fire instants after `after`, each
/// computed from the previous one. Fewer than `count` only when the
/// expression can no longer fire.
pub fn next_fire_times(
    expr: &str,
    after: DateTime<Local>,
    count: usize,
) -> Result<Vec<DateTime<Local>>, CronhookError> {
    let schedule = parse(expr)?;
    Ok(schedule.after(&after).take(count).collect())
}
