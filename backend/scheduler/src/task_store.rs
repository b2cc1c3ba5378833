/// Durable SQLite-backed storage for task definitions.
///
/// The store assigns ids (rowids) and is the scheduler's [`TaskSource`]:
/// the startup bulk-load reads `list_active`, point lookups go through
/// `find_by_id`. The CRUD surface beyond that belongs to the surrounding
/// application (the CLI here).
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use cronhook_core::{CronhookError, HttpMethod, NewTask, TaskDefinition, TaskSource};

pub struct TaskStore {
    conn: Mutex<Connection>,
}

impl TaskStore {
    pub fn open(db_path: &str) -> Result<Self, CronhookError> {
        let conn = Connection::open(db_path).map_err(storage)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS tasks (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL,
                url             TEXT NOT NULL,
                method          TEXT NOT NULL DEFAULT 'GET',
                headers         TEXT,
                body            TEXT,
                cron_expression TEXT NOT NULL,
                active          INTEGER NOT NULL DEFAULT 1,
                owner           TEXT,
                created_at      INTEGER NOT NULL
            );
            "#,
        )
        .map_err(storage)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert a new task and return its store-assigned id.
    pub fn insert(&self, task: &NewTask) -> Result<i64, CronhookError> {
        let conn = self.conn.lock().expect("task store mutex poisoned");
        conn.execute(
            r#"INSERT INTO tasks
               (name, url, method, headers, body, cron_expression, active, owner, created_at)
               VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)"#,
            params![
                task.name,
                task.url,
                task.method.as_str(),
                task.headers,
                task.body,
                task.cron_expression,
                task.active as i32,
                task.owner,
                Utc::now().timestamp(),
            ],
        )
        .map_err(storage)?;
        Ok(conn.last_insert_rowid())
    }

    /// Overwrite all mutable fields of an existing task.
    pub fn update(&self, task: &TaskDefinition) -> Result<(), CronhookError> {
        let conn = self.conn.lock().expect("task store mutex poisoned");
        let n = conn
            .execute(
                r#"UPDATE tasks SET
                     name=?2, url=?3, method=?4, headers=?5, body=?6,
                     cron_expression=?7, active=?8, owner=?9
                   WHERE id=?1"#,
                params![
                    task.id,
                    task.name,
                    task.url,
                    task.method.as_str(),
                    task.headers,
                    task.body,
                    task.cron_expression,
                    task.active as i32,
                    task.owner,
                ],
            )
            .map_err(storage)?;
        if n == 0 {
            return Err(CronhookError::TaskNotFound(task.id));
        }
        Ok(())
    }

    pub fn get(&self, id: i64) -> Result<TaskDefinition, CronhookError> {
        let conn = self.conn.lock().expect("task store mutex poisoned");
        conn.query_row(
            &format!("{SELECT_TASK} WHERE id = ?1"),
            params![id],
            row_to_task,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => CronhookError::TaskNotFound(id),
            other => storage(other),
        })
    }

    pub fn list(&self) -> Result<Vec<TaskDefinition>, CronhookError> {
        self.query(&format!("{SELECT_TASK} ORDER BY id"))
    }

    pub fn list_active_tasks(&self) -> Result<Vec<TaskDefinition>, CronhookError> {
        self.query(&format!("{SELECT_TASK} WHERE active = 1 ORDER BY id"))
    }

    pub fn set_active(&self, id: i64, active: bool) -> Result<(), CronhookError> {
        let conn = self.conn.lock().expect("task store mutex poisoned");
        let n = conn
            .execute(
                "UPDATE tasks SET active = ?2 WHERE id = ?1",
                params![id, active as i32],
            )
            .map_err(storage)?;
        if n == 0 {
            return Err(CronhookError::TaskNotFound(id));
        }
        Ok(())
    }

    pub fn delete(&self, id: i64) -> Result<(), CronhookError> {
        let conn = self.conn.lock().expect("task store mutex poisoned");
        let n = conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])
            .map_err(storage)?;
        if n == 0 {
            return Err(CronhookError::TaskNotFound(id));
        }
        Ok(())
    }

    fn query(&self, sql: &str) -> Result<Vec<TaskDefinition>, CronhookError> {
        let conn = self.conn.lock().expect("task store mutex poisoned");
        let mut stmt = conn.prepare(sql).map_err(storage)?;
        let tasks = stmt
            .query_map([], row_to_task)
            .map_err(storage)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage)?;
        Ok(tasks)
    }
}

const SELECT_TASK: &str = "SELECT id, name, url, method, headers, body, \
                           cron_expression, active, owner, created_at FROM tasks";

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskDefinition> {
    let method: String = row.get(3)?;
    // A row with an unrecognized verb must not execute as GET; reject it.
    let method = method.parse::<HttpMethod>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
    })?;
    let created_at: i64 = row.get(9)?;
    Ok(TaskDefinition {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        method,
        headers: row.get(4)?,
        body: row.get(5)?,
        cron_expression: row.get(6)?,
        active: row.get::<_, i32>(7)? != 0,
        owner: row.get(8)?,
        created_at: DateTime::<Utc>::from_timestamp(created_at, 0).unwrap_or_default(),
    })
}

fn storage(e: rusqlite::Error) -> CronhookError {
    CronhookError::Storage(e.to_string())
}

#[async_trait]
impl TaskSource for TaskStore {
    async fn list_active(&self) -> Result<Vec<TaskDefinition>, CronhookError> {
        self.list_active_tasks()
    }

    async fn find_by_id(&self, id: i64) -> Result<TaskDefinition, CronhookError> {
        self.get(id)
    }
}
