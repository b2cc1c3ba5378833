use async_trait::async_trait;

use crate::error::CronhookError;
use crate::types::{ExecutionRecord, TaskDefinition};

/// Supplies task definitions to the scheduler.
///
/// Called on the startup bulk-load path and for point lookups; must be safe
/// to call concurrently with in-flight executions.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// All tasks currently flagged active.
    async fn list_active(&self) -> Result<Vec<TaskDefinition>, CronhookError>;

    /// Point lookup; `TaskNotFound` if the id is unknown.
    async fn find_by_id(&self, id: i64) -> Result<TaskDefinition, CronhookError>;
}

/// Durably records execution outcomes, one record per run.
///
/// Appends may arrive concurrently from overlapping executions; each record
/// is written as a single atomic unit. An append failure never blocks or
/// fails the fire that produced the record.
#[async_trait]
pub trait ExecutionSink: Send + Sync {
    async fn append(&self, record: &ExecutionRecord) -> Result<(), CronhookError>;

    /// The newest `limit` records for a task, most recent first.
    async fn recent(&self, task_id: i64, limit: usize) -> Result<Vec<ExecutionRecord>, CronhookError>;
}
