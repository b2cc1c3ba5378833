use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Local};
use cron::Schedule;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::time::{self, Duration};
use tracing::{debug, info, warn};

use cronhook_core::{CronhookError, ExecutionSink, TaskDefinition, TaskSource};
use cronhook_executor::HttpExecutor;

/// Tuning knobs for the timing loop and dispatch.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often the timing loop checks for due triggers.
    pub tick_interval: Duration,
    /// Upper bound on concurrently running HTTP executions.
    pub max_concurrency: usize,
    /// How long shutdown waits for in-flight executions before abandoning them.
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            max_concurrency: 16,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

/// Runtime record of when a task should next fire. At most one exists per
/// task id; the table below is the only place one lives.
struct ScheduledTrigger {
    /// Value snapshot taken at schedule time. Edits to the stored task do
    /// not reach this copy; callers unschedule and schedule again.
    task: TaskDefinition,
    schedule: Schedule,
    next_fire: DateTime<Local>,
}

/// Owns the live trigger table and drives fire events.
///
/// One instance exists per process; the surrounding application holds it
/// (behind an `Arc`) and calls the mutation API while `run` ticks in the
/// background. All mutations go through the single table mutex, which
/// serializes them per task id.
pub struct Scheduler {
    triggers: Mutex<HashMap<i64, ScheduledTrigger>>,
    source: Arc<dyn TaskSource>,
    sink: Arc<dyn ExecutionSink>,
    executor: Arc<HttpExecutor>,
    limiter: Arc<Semaphore>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn TaskSource>,
        sink: Arc<dyn ExecutionSink>,
        executor: Arc<HttpExecutor>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            triggers: Mutex::new(HashMap::new()),
            source,
            sink,
            executor,
            limiter: Arc::new(Semaphore::new(config.max_concurrency)),
            config,
        }
    }

    /// Install a trigger for `task`. The first fire is the earliest valid
    /// instant after now.
    ///
    /// Fails with `InvalidExpression` before touching any state, and with
    /// `AlreadyScheduled` if the id already has a live trigger — replacing
    /// a trigger is an explicit unschedule + schedule, never implicit.
    pub async fn schedule(&self, task: TaskDefinition) -> Result<(), CronhookError> {
        let schedule = cronhook_cron::parse(&task.cron_expression)?;
        let mut triggers = self.triggers.lock().await;
        if triggers.contains_key(&task.id) {
            return Err(CronhookError::AlreadyScheduled(task.id));
        }
        let next_fire = schedule.after(&Local::now()).next().ok_or_else(|| {
            CronhookError::InvalidExpression(format!(
                "'{}' can never fire again",
                task.cron_expression
            ))
        })?;
        info!(task_id = task.id, task = %task.name, next_fire = %next_fire, "trigger installed");
        triggers.insert(
            task.id,
            ScheduledTrigger {
                task,
                schedule,
                next_fire,
            },
        );
        Ok(())
    }

    /// Remove the trigger for `task_id`, cancelling all future fires.
    /// A no-op if no trigger exists. Executions already dispatched finish
    /// on their own.
    pub async fn unschedule(&self, task_id: i64) {
        if self.triggers.lock().await.remove(&task_id).is_some() {
            info!(task_id, "trigger removed");
        } else {
            debug!(task_id, "unschedule of task with no trigger");
        }
    }

    /// Fire a task immediately, out of band from its cron schedule. The
    /// trigger's future fire times are untouched. Fails with `NotScheduled`
    /// if the task has no live trigger.
    pub async fn trigger_now(&self, task_id: i64) -> Result<(), CronhookError> {
        let task = {
            let triggers = self.triggers.lock().await;
            triggers
                .get(&task_id)
                .map(|t| t.task.clone())
                .ok_or(CronhookError::NotScheduled(task_id))?
        };
        info!(task_id, "manual trigger");
        self.dispatch(task);
        Ok(())
    }

    /// Preview the next `count` fire instants of an expression, anchored at
    /// now. Pure: does not require the task to be scheduled.
    pub fn next_fire_times(
        &self,
        expr: &str,
        count: usize,
    ) -> Result<Vec<DateTime<Local>>, CronhookError> {
        cronhook_cron::next_fire_times(expr, Local::now(), count)
    }

    pub fn validate_expression(&self, expr: &str) -> bool {
        cronhook_cron::validate(expr)
    }

    pub fn describe_expression(&self, expr: &str) -> Result<String, CronhookError> {
        cronhook_cron::describe(expr)
    }

    pub async fn is_scheduled(&self, task_id: i64) -> bool {
        self.triggers.lock().await.contains_key(&task_id)
    }

    pub async fn scheduled_ids(&self) -> Vec<i64> {
        self.triggers.lock().await.keys().copied().collect()
    }

    /// Startup bulk-load: schedule every task the source flags active.
    /// A task that fails validation is logged and skipped; it never aborts
    /// the load. Returns the number of triggers installed.
    pub async fn load_active(&self) -> Result<usize, CronhookError> {
        let tasks = self.source.list_active().await?;
        let total = tasks.len();
        let mut installed = 0;
        for task in tasks {
            let task_id = task.id;
            match self.schedule(task).await {
                Ok(()) => installed += 1,
                Err(e) => warn!(task_id, error = %e, "skipping task at startup"),
            }
        }
        info!(installed, total, "active tasks loaded");
        Ok(installed)
    }

    /// The timing authority. Ticks until the shutdown channel yields or
    /// closes, then waits up to the grace period for in-flight executions.
    pub async fn run(&self, mut shutdown: mpsc::Receiver<()>) {
        info!(
            tick_ms = self.config.tick_interval.as_millis() as u64,
            max_concurrency = self.config.max_concurrency,
            "scheduler started"
        );
        let mut ticker = time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.fire_due().await;
                }
                _ = shutdown.recv() => {
                    info!("scheduler shutting down");
                    break;
                }
            }
        }

        self.drain().await;
    }

    /// Dispatch every trigger whose fire instant has arrived and advance it
    /// to the next one. Fire times advance from the previous fire instant,
    /// never from the current wall clock, so they stay strictly increasing
    /// without drift accumulation.
    async fn fire_due(&self) {
        let now = Local::now();
        let mut due = Vec::new();
        {
            let mut triggers = self.triggers.lock().await;
            let mut exhausted = Vec::new();
            for (id, trigger) in triggers.iter_mut() {
                if trigger.next_fire > now {
                    continue;
                }
                due.push(trigger.task.clone());
                match trigger.schedule.after(&trigger.next_fire).next() {
                    Some(next) => trigger.next_fire = next,
                    None => exhausted.push(*id),
                }
            }
            for id in exhausted {
                info!(task_id = id, "schedule exhausted, removing trigger");
                triggers.remove(&id);
            }
        }
        for task in due {
            debug!(task_id = task.id, task = %task.name, "trigger fired");
            self.dispatch(task);
        }
    }

    /// Run one execution as an independent unit of work. Overlapping runs of
    /// the same task are permitted; each produces its own record. A sink
    /// failure is logged and swallowed — it never affects the fire path.
    fn dispatch(&self, task: TaskDefinition) {
        let limiter = self.limiter.clone();
        let executor = self.executor.clone();
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let _permit = match limiter.acquire_owned().await {
                Ok(p) => p,
                // Semaphore closed: the scheduler is past its grace period.
                Err(_) => {
                    warn!(task_id = task.id, "execution abandoned during shutdown");
                    return;
                }
            };
            let record = executor.execute(&task).await;
            debug!(
                task_id = task.id,
                run_id = %record.run_id,
                success = record.success,
                "execution finished"
            );
            if let Err(e) = sink.append(&record).await {
                warn!(task_id = task.id, error = %e, "failed to append execution record");
            }
        });
    }

    /// Best-effort drain: holding every semaphore permit means no execution
    /// is running. Permits are then revoked so late dispatches exit early.
    async fn drain(&self) {
        let permits = self.config.max_concurrency as u32;
        match time::timeout(self.config.shutdown_grace, self.limiter.acquire_many(permits)).await {
            Ok(Ok(_)) => info!("all in-flight executions finished"),
            Ok(Err(_)) => {}
            Err(_) => warn!(
                grace_secs = self.config.shutdown_grace.as_secs(),
                "grace period expired, abandoning in-flight executions"
            ),
        }
        self.limiter.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::routing::get;
    use axum::Router;
    use chrono::Utc;
    use cronhook_core::{ExecutionRecord, HttpMethod};
    use cronhook_executor::ExecutorConfig;

    struct StaticSource {
        tasks: Vec<TaskDefinition>,
    }

    #[async_trait]
    impl TaskSource for StaticSource {
        async fn list_active(&self) -> Result<Vec<TaskDefinition>, CronhookError> {
            Ok(self.tasks.iter().filter(|t| t.active).cloned().collect())
        }

        async fn find_by_id(&self, id: i64) -> Result<TaskDefinition, CronhookError> {
            self.tasks
                .iter()
                .find(|t| t.id == id)
                .cloned()
                .ok_or(CronhookError::TaskNotFound(id))
        }
    }

    struct CaptureSink {
        tx: mpsc::Sender<ExecutionRecord>,
    }

    #[async_trait]
    impl ExecutionSink for CaptureSink {
        async fn append(&self, record: &ExecutionRecord) -> Result<(), CronhookError> {
            let _ = self.tx.send(record.clone()).await;
            Ok(())
        }

        async fn recent(
            &self,
            _task_id: i64,
            _limit: usize,
        ) -> Result<Vec<ExecutionRecord>, CronhookError> {
            Ok(Vec::new())
        }
    }

    fn task(id: i64, url: &str, cron_expression: &str) -> TaskDefinition {
        TaskDefinition {
            id,
            name: format!("task-{id}"),
            url: url.into(),
            method: HttpMethod::Get,
            headers: None,
            body: None,
            cron_expression: cron_expression.into(),
            active: true,
            owner: None,
            created_at: Utc::now(),
        }
    }

    fn build(tasks: Vec<TaskDefinition>) -> (Arc<Scheduler>, mpsc::Receiver<ExecutionRecord>) {
        let (tx, rx) = mpsc::channel(64);
        let executor = HttpExecutor::new(&ExecutorConfig::default()).unwrap();
        let scheduler = Scheduler::new(
            Arc::new(StaticSource { tasks }),
            Arc::new(CaptureSink { tx }),
            Arc::new(executor),
            SchedulerConfig {
                tick_interval: Duration::from_millis(100),
                shutdown_grace: Duration::from_secs(2),
                ..SchedulerConfig::default()
            },
        );
        (Arc::new(scheduler), rx)
    }

    async fn serve_ok() -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/hit", get(|| async { "ok" }));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    // Far in the future relative to any test run: fires once a year.
    const YEARLY: &str = "0 0 0 1 1 ?";

    #[tokio::test]
    async fn schedule_rejects_invalid_expression() {
        let (scheduler, _rx) = build(vec![]);
        let err = scheduler
            .schedule(task(1, "http://localhost/x", "not a cron"))
            .await
            .unwrap_err();
        assert!(matches!(err, CronhookError::InvalidExpression(_)));
        assert!(!scheduler.is_scheduled(1).await);
    }

    #[tokio::test]
    async fn schedule_rejects_duplicate_trigger() {
        let (scheduler, _rx) = build(vec![]);
        scheduler
            .schedule(task(1, "http://localhost/x", YEARLY))
            .await
            .unwrap();
        let err = scheduler
            .schedule(task(1, "http://localhost/x", YEARLY))
            .await
            .unwrap_err();
        assert!(matches!(err, CronhookError::AlreadyScheduled(1)));
    }

    #[tokio::test]
    async fn unschedule_then_trigger_now_fails() {
        let (scheduler, _rx) = build(vec![]);
        scheduler
            .schedule(task(1, "http://localhost/x", "0 0 * * * ?"))
            .await
            .unwrap();
        scheduler.unschedule(1).await;
        assert!(scheduler.scheduled_ids().await.is_empty());
        let err = scheduler.trigger_now(1).await.unwrap_err();
        assert!(matches!(err, CronhookError::NotScheduled(1)));
    }

    #[tokio::test]
    async fn unschedule_missing_is_a_noop() {
        let (scheduler, _rx) = build(vec![]);
        scheduler.unschedule(42).await;
    }

    #[tokio::test]
    async fn trigger_now_dispatches_without_moving_fire_times() {
        let addr = serve_ok().await;
        let (scheduler, mut rx) = build(vec![]);
        scheduler
            .schedule(task(1, &format!("http://{addr}/hit"), YEARLY))
            .await
            .unwrap();

        scheduler.trigger_now(1).await.unwrap();

        let record = time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.task_id, 1);
        assert!(record.success);
        assert!(record.finished_at.is_some());
        // The yearly trigger is still installed and untouched.
        assert!(scheduler.is_scheduled(1).await);
    }

    #[tokio::test]
    async fn cron_fire_produces_execution_record() {
        let addr = serve_ok().await;
        let (scheduler, mut rx) = build(vec![]);
        scheduler
            .schedule(task(7, &format!("http://{addr}/hit"), "* * * * * *"))
            .await
            .unwrap();

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let runner = scheduler.clone();
        let handle = tokio::spawn(async move { runner.run(shutdown_rx).await });

        let record = time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("trigger should fire within five seconds")
            .unwrap();
        assert_eq!(record.task_id, 7);
        assert!(record.success);

        drop(shutdown_tx);
        let _ = time::timeout(Duration::from_secs(5), handle).await;
    }

    #[tokio::test]
    async fn load_active_skips_invalid_tasks() {
        let (scheduler, _rx) = build(vec![
            task(1, "http://localhost/a", "0 0 2 * * ?"),
            task(2, "http://localhost/b", "broken"),
            task(3, "http://localhost/c", YEARLY),
        ]);
        let installed = scheduler.load_active().await.unwrap();
        assert_eq!(installed, 2);
        assert!(scheduler.is_scheduled(1).await);
        assert!(!scheduler.is_scheduled(2).await);
        assert!(scheduler.is_scheduled(3).await);
    }

    #[tokio::test]
    async fn concurrent_mutations_never_leave_two_triggers() {
        let (scheduler, _rx) = build(vec![]);
        let mut handles = Vec::new();
        for _ in 0..50 {
            let s = scheduler.clone();
            handles.push(tokio::spawn(async move {
                let _ = s.schedule(task(1, "http://localhost/x", YEARLY)).await;
            }));
            let s = scheduler.clone();
            handles.push(tokio::spawn(async move {
                s.unschedule(1).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(scheduler.scheduled_ids().await.len() <= 1);
    }

    #[tokio::test]
    async fn next_fire_times_preview_needs_no_trigger() {
        let (scheduler, _rx) = build(vec![]);
        let times = scheduler.next_fire_times("0 0/5 * * * ?", 4).unwrap();
        assert_eq!(times.len(), 4);
        for pair in times.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }
}
