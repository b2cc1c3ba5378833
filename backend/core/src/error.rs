use thiserror::Error;

/// Top-level error type for the cronhook runtime.
#[derive(Debug, Error)]
pub enum CronhookError {
    #[error("invalid cron expression: {0}")]
    InvalidExpression(String),

    #[error("task {0} has no active trigger")]
    NotScheduled(i64),

    #[error("task {0} already has an active trigger; unschedule it first")]
    AlreadyScheduled(i64),

    #[error("task {0} not found")]
    TaskNotFound(i64),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
