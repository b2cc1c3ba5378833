/// Durable run log: one row per execution, appended whatever the outcome.
///
/// This is the scheduler's [`ExecutionSink`]. Appends arrive concurrently
/// from overlapping executions; the connection mutex makes each row a
/// single atomic write.
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use cronhook_core::{CronhookError, ExecutionRecord, ExecutionSink};

pub struct RunLog {
    conn: Mutex<Connection>,
}

impl RunLog {
    pub fn open(db_path: &str) -> Result<Self, CronhookError> {
        let conn = Connection::open(db_path).map_err(storage)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS execution_log (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id      TEXT NOT NULL,
                task_id     INTEGER NOT NULL,
                started_at  INTEGER NOT NULL,
                finished_at INTEGER,
                success     INTEGER NOT NULL,
                response    TEXT,
                error       TEXT
            );
            CREATE INDEX IF NOT EXISTS execution_log_task_id ON execution_log(task_id);
            "#,
        )
        .map_err(storage)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn record(&self, record: &ExecutionRecord) -> Result<(), CronhookError> {
        let conn = self.conn.lock().expect("run log mutex poisoned");
        conn.execute(
            r#"INSERT INTO execution_log
               (run_id, task_id, started_at, finished_at, success, response, error)
               VALUES (?1,?2,?3,?4,?5,?6,?7)"#,
            params![
                record.run_id.to_string(),
                record.task_id,
                record.started_at.timestamp_millis(),
                record.finished_at.map(|t| t.timestamp_millis()),
                record.success as i32,
                record.response,
                record.error,
            ],
        )
        .map_err(storage)?;
        Ok(())
    }

    /// The newest `limit` records for a task, most recent first.
    pub fn recent_records(
        &self,
        task_id: i64,
        limit: usize,
    ) -> Result<Vec<ExecutionRecord>, CronhookError> {
        let conn = self.conn.lock().expect("run log mutex poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT id, run_id, task_id, started_at, finished_at, success, response, error
                 FROM execution_log WHERE task_id = ?1
                 ORDER BY started_at DESC, id DESC LIMIT ?2",
            )
            .map_err(storage)?;
        let records = stmt
            .query_map(params![task_id, limit as i64], row_to_record)
            .map_err(storage)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage)?;
        Ok(records)
    }

    /// Delete records older than `max_age`. Returns the number removed.
    pub fn prune(&self, max_age: Duration) -> Result<usize, CronhookError> {
        let cutoff = Utc::now().timestamp_millis() - max_age.as_millis() as i64;
        let conn = self.conn.lock().expect("run log mutex poisoned");
        conn.execute(
            "DELETE FROM execution_log WHERE started_at < ?1",
            params![cutoff],
        )
        .map_err(storage)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExecutionRecord> {
    let run_id: String = row.get(1)?;
    let started_at: i64 = row.get(3)?;
    let finished_at: Option<i64> = row.get(4)?;
    Ok(ExecutionRecord {
        id: Some(row.get(0)?),
        run_id: Uuid::parse_str(&run_id).unwrap_or_default(),
        task_id: row.get(2)?,
        started_at: DateTime::<Utc>::from_timestamp_millis(started_at).unwrap_or_default(),
        finished_at: finished_at.and_then(DateTime::<Utc>::from_timestamp_millis),
        success: row.get::<_, i32>(5)? != 0,
        response: row.get(6)?,
        error: row.get(7)?,
    })
}

fn storage(e: rusqlite::Error) -> CronhookError {
    CronhookError::Storage(e.to_string())
}

#[async_trait]
impl ExecutionSink for RunLog {
    async fn append(&self, record: &ExecutionRecord) -> Result<(), CronhookError> {
        self.record(record)
    }

    async fn recent(
        &self,
        task_id: i64,
        limit: usize,
    ) -> Result<Vec<ExecutionRecord>, CronhookError> {
        self.recent_records(task_id, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn temp_log() -> RunLog {
        let path = std::env::temp_dir().join(format!("cronhook-runs-{}.db", Uuid::new_v4()));
        RunLog::open(path.to_str().unwrap()).unwrap()
    }

    fn finished(task_id: i64, started_at: DateTime<Utc>, success: bool) -> ExecutionRecord {
        let mut r = ExecutionRecord::started(task_id, started_at);
        r.success = success;
        r.response = Some("ok".into());
        r.finished_at = Some(started_at + TimeDelta::seconds(1));
        r
    }

    #[test]
    fn append_and_read_back() {
        let log = temp_log();
        let record = finished(1, Utc::now(), true);
        log.record(&record).unwrap();

        let got = log.recent_records(1, 10).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].run_id, record.run_id);
        assert_eq!(got[0].task_id, 1);
        assert!(got[0].success);
        assert_eq!(got[0].response.as_deref(), Some("ok"));
        assert!(got[0].error.is_none());
        assert!(got[0].finished_at.unwrap() >= got[0].started_at);
    }

    #[test]
    fn recent_is_newest_first_and_limited() {
        let log = temp_log();
        let base = Utc::now();
        for i in 0..5 {
            log.record(&finished(1, base + TimeDelta::seconds(i), i % 2 == 0))
                .unwrap();
        }
        log.record(&finished(2, base, true)).unwrap();

        let got = log.recent_records(1, 3).unwrap();
        assert_eq!(got.len(), 3);
        assert!(got[0].started_at > got[1].started_at);
        assert!(got[1].started_at > got[2].started_at);
        assert!(got.iter().all(|r| r.task_id == 1));
    }

    #[test]
    fn prune_drops_old_records() {
        let log = temp_log();
        let old = Utc::now() - TimeDelta::days(30);
        log.record(&finished(1, old, true)).unwrap();
        log.record(&finished(1, Utc::now(), true)).unwrap();

        let removed = log.prune(Duration::from_secs(7 * 24 * 3600)).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(log.recent_records(1, 10).unwrap().len(), 1);
    }
}
