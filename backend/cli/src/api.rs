//! Admin API served by the `serve` daemon.
//!
//! This is how runtime mutations reach the live trigger table: the task
//! management commands mutate the store, then call these endpoints so the
//! running scheduler picks the change up without a restart.
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde_json::{json, Value};

use cronhook_core::CronhookError;
use cronhook_scheduler::{Scheduler, TaskStore};

/// Shared application state for API handlers.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub store: Arc<TaskStore>,
}

/// Build the Axum router with all admin routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/tasks/:id/trigger", post(trigger))
        .route("/api/tasks/:id/enable", post(enable))
        .route("/api/tasks/:id/disable", post(disable))
        .route("/api/tasks/:id/reload", post(reload))
        .route("/api/tasks/:id", delete(remove))
        .with_state(state)
}

type ApiError = (StatusCode, Json<Value>);

fn error_response(e: CronhookError) -> ApiError {
    let status = match &e {
        CronhookError::TaskNotFound(_) | CronhookError::NotScheduled(_) => StatusCode::NOT_FOUND,
        CronhookError::InvalidExpression(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CronhookError::AlreadyScheduled(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": e.to_string() })))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "cronhook",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Fire a task immediately, out of band from its schedule.
async fn trigger(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    state.scheduler.trigger_now(id).await.map_err(error_response)?;
    Ok(Json(json!({ "triggered": id })))
}

/// Activate a stored task and install its trigger.
async fn enable(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    state.store.set_active(id, true).map_err(error_response)?;
    let task = state.store.get(id).map_err(error_response)?;
    state.scheduler.unschedule(id).await;
    state.scheduler.schedule(task).await.map_err(error_response)?;
    Ok(Json(json!({ "enabled": id })))
}

/// Deactivate a stored task and remove its trigger.
async fn disable(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    state.store.set_active(id, false).map_err(error_response)?;
    state.scheduler.unschedule(id).await;
    Ok(Json(json!({ "disabled": id })))
}

/// Re-read an edited task from the store and replace its trigger: the
/// explicit two-step unschedule + schedule, since triggers have no
/// in-place mutation.
async fn reload(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let task = state.store.get(id).map_err(error_response)?;
    state.scheduler.unschedule(id).await;
    if task.active {
        state.scheduler.schedule(task).await.map_err(error_response)?;
    }
    Ok(Json(json!({ "reloaded": id })))
}

/// Delete a task and cancel its future fires.
async fn remove(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    state.store.delete(id).map_err(error_response)?;
    state.scheduler.unschedule(id).await;
    Ok(Json(json!({ "deleted": id })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cronhook_core::{ExecutionSink, HttpMethod, NewTask, TaskSource};
    use cronhook_executor::{ExecutorConfig, HttpExecutor};
    use cronhook_scheduler::{RunLog, SchedulerConfig};
    use uuid::Uuid;

    async fn spawn_app() -> (String, AppState) {
        let path = std::env::temp_dir().join(format!("cronhook-api-{}.db", Uuid::new_v4()));
        let path = path.to_str().unwrap().to_string();
        let store = Arc::new(TaskStore::open(&path).unwrap());
        let run_log = Arc::new(RunLog::open(&path).unwrap());
        let executor = Arc::new(HttpExecutor::new(&ExecutorConfig::default()).unwrap());
        let scheduler = Arc::new(Scheduler::new(
            store.clone() as Arc<dyn TaskSource>,
            run_log as Arc<dyn ExecutionSink>,
            executor,
            SchedulerConfig::default(),
        ));
        let state = AppState {
            scheduler,
            store,
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), state)
    }

    fn new_task(active: bool) -> NewTask {
        NewTask {
            name: "ping".into(),
            url: "http://127.0.0.1:1/ping".into(),
            method: HttpMethod::Get,
            headers: None,
            body: None,
            cron_expression: "0 0 0 1 1 ?".into(),
            active,
            owner: None,
        }
    }

    #[tokio::test]
    async fn trigger_unknown_task_is_not_found() {
        let (base, _state) = spawn_app().await;
        let resp = reqwest::Client::new()
            .post(format!("{base}/api/tasks/99/trigger"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn enable_installs_trigger_and_disable_removes_it() {
        let (base, state) = spawn_app().await;
        let id = state.store.insert(&new_task(false)).unwrap();
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/api/tasks/{id}/enable"))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
        assert!(state.scheduler.is_scheduled(id).await);
        assert!(state.store.get(id).unwrap().active);

        let resp = client
            .post(format!("{base}/api/tasks/{id}/disable"))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
        assert!(!state.scheduler.is_scheduled(id).await);
        assert!(!state.store.get(id).unwrap().active);
    }

    #[tokio::test]
    async fn reload_replaces_the_trigger_after_an_edit() {
        let (base, state) = spawn_app().await;
        let id = state.store.insert(&new_task(true)).unwrap();
        let task = state.store.get(id).unwrap();
        state.scheduler.schedule(task).await.unwrap();

        let mut edited = state.store.get(id).unwrap();
        edited.cron_expression = "0 0 2 * * ?".into();
        state.store.update(&edited).unwrap();

        let resp = reqwest::Client::new()
            .post(format!("{base}/api/tasks/{id}/reload"))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
        assert!(state.scheduler.is_scheduled(id).await);
    }

    #[tokio::test]
    async fn delete_removes_task_and_trigger() {
        let (base, state) = spawn_app().await;
        let id = state.store.insert(&new_task(true)).unwrap();
        let task = state.store.get(id).unwrap();
        state.scheduler.schedule(task).await.unwrap();

        let resp = reqwest::Client::new()
            .delete(format!("{base}/api/tasks/{id}"))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
        assert!(!state.scheduler.is_scheduled(id).await);
        assert!(matches!(
            state.store.get(id),
            Err(CronhookError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn trigger_fires_a_scheduled_task() {
        let (base, state) = spawn_app().await;
        let id = state.store.insert(&new_task(true)).unwrap();
        let task = state.store.get(id).unwrap();
        state.scheduler.schedule(task).await.unwrap();

        let resp = reqwest::Client::new()
            .post(format!("{base}/api/tasks/{id}/trigger"))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
        // The yearly trigger stays installed after the manual fire.
        assert!(state.scheduler.is_scheduled(id).await);
    }
}
