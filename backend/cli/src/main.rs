mod api;
mod config;
mod tasks;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};

use cronhook_core::{ExecutionSink, HttpMethod, NewTask, TaskSource};
use cronhook_executor::{ExecutorConfig, HttpExecutor};
use cronhook_scheduler::{RunLog, Scheduler, SchedulerConfig, TaskStore};

use api::AppState;
use config::Config;
use tasks::EditSpec;

#[derive(Parser)]
#[command(name = "cronhook")]
#[command(about = "cronhook — cron-scheduled HTTP task runner")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler daemon until ctrl-c
    Serve,
    /// Create a task
    Add {
        name: String,
        url: String,
        /// 6-field cron expression, e.g. "0 0/5 * * * ?"
        cron: String,
        #[arg(short, long, default_value = "GET")]
        method: HttpMethod,
        /// Header line "Key: Value"; repeat for multiple headers
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
        /// Request body (ignored for GET)
        #[arg(short, long)]
        body: Option<String>,
        #[arg(long)]
        owner: Option<String>,
        /// Create the task deactivated
        #[arg(long)]
        inactive: bool,
    },
    /// Edit a task; omitted options keep their stored value
    Edit {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        url: Option<String>,
        /// New 6-field cron expression
        #[arg(long)]
        cron: Option<String>,
        #[arg(short, long)]
        method: Option<HttpMethod>,
        /// Header line "Key: Value"; repeat for multiple. A single empty
        /// value clears all headers
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
        #[arg(short, long)]
        body: Option<String>,
        #[arg(long)]
        owner: Option<String>,
    },
    /// List all tasks
    List,
    /// Delete a task
    Rm { id: i64 },
    /// Activate a task
    Enable { id: i64 },
    /// Deactivate a task
    Disable { id: i64 },
    /// Fire a task immediately via the running daemon
    Trigger { id: i64 },
    /// Show recent executions of a task
    Runs {
        id: i64,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Delete run-log entries older than the given age
    Prune {
        #[arg(short, long, default_value_t = 30)]
        days: u64,
    },
    /// Check a cron expression
    Validate { expr: String },
    /// Preview upcoming fire times of a cron expression
    Next {
        expr: String,
        #[arg(short, long, default_value_t = 5)]
        count: usize,
    },
    /// Explain a cron expression in plain English
    Describe { expr: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => run_server(config).await?,
        Commands::Add {
            name,
            url,
            cron,
            method,
            headers,
            body,
            owner,
            inactive,
        } => {
            if !cronhook_cron::validate(&cron) {
                bail!("invalid cron expression: '{cron}'");
            }
            let store = TaskStore::open(&config.db_path)?;
            let id = store.insert(&NewTask {
                name,
                url,
                method,
                headers: if headers.is_empty() {
                    None
                } else {
                    Some(headers.join("\n"))
                },
                body,
                cron_expression: cron.clone(),
                active: !inactive,
                owner,
            })?;
            println!("task {id} created: {}", cronhook_cron::describe(&cron)?);
        }
        Commands::Edit {
            id,
            name,
            url,
            cron,
            method,
            headers,
            body,
            owner,
        } => {
            let store = TaskStore::open(&config.db_path)?;
            let task = tasks::apply_edit(
                &store,
                id,
                EditSpec {
                    name,
                    url,
                    cron_expression: cron,
                    method,
                    headers: if headers.is_empty() {
                        None
                    } else {
                        Some(headers.join("\n"))
                    },
                    body,
                    owner,
                },
            )?;
            println!(
                "task {id} updated: {}",
                cronhook_cron::describe(&task.cron_expression)?
            );
            notify_daemon(&config, &format!("/api/tasks/{id}/reload")).await;
        }
        Commands::List => {
            let store = TaskStore::open(&config.db_path)?;
            for task in store.list()? {
                let state = if task.active { "active" } else { "inactive" };
                println!(
                    "{:>4}  {:<8}  {:<6}  {:<30}  {}  [{}]",
                    task.id, state, task.method, task.name, task.url, task.cron_expression
                );
            }
        }
        Commands::Rm { id } => {
            TaskStore::open(&config.db_path)?.delete(id)?;
            println!("task {id} deleted");
            notify_daemon_delete(&config, id).await;
        }
        Commands::Enable { id } => {
            TaskStore::open(&config.db_path)?.set_active(id, true)?;
            println!("task {id} activated");
            notify_daemon(&config, &format!("/api/tasks/{id}/enable")).await;
        }
        Commands::Disable { id } => {
            TaskStore::open(&config.db_path)?.set_active(id, false)?;
            println!("task {id} deactivated");
            notify_daemon(&config, &format!("/api/tasks/{id}/disable")).await;
        }
        Commands::Trigger { id } => {
            let url = format!("{}/api/tasks/{id}/trigger", config.admin_url());
            match reqwest::Client::new().post(&url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    println!("task {id} triggered");
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    bail!("daemon refused trigger ({status}): {body}");
                }
                Err(_) => {
                    bail!("daemon not reachable at {url}; is `cronhook serve` running?");
                }
            }
        }
        Commands::Runs { id, limit } => {
            let log = RunLog::open(&config.db_path)?;
            for record in log.recent(id, limit).await? {
                let status = if record.success { "ok" } else { "failed" };
                let detail = record
                    .error
                    .or(record.response)
                    .unwrap_or_default()
                    .chars()
                    .take(80)
                    .collect::<String>();
                let duration = record
                    .finished_at
                    .map(|end| format!("{}ms", (end - record.started_at).num_milliseconds()))
                    .unwrap_or_else(|| "running".to_string());
                println!(
                    "{}  {:<6}  {:>8}  {}",
                    record.started_at.format("%Y-%m-%d %H:%M:%S"),
                    status,
                    duration,
                    detail
                );
            }
        }
        Commands::Prune { days } => {
            let log = RunLog::open(&config.db_path)?;
            let removed = log.prune(Duration::from_secs(days * 24 * 3600))?;
            println!("{removed} run-log entries removed");
        }
        Commands::Validate { expr } => {
            if cronhook_cron::validate(&expr) {
                println!("valid");
            } else {
                println!("invalid");
                std::process::exit(1);
            }
        }
        Commands::Next { expr, count } => {
            for t in cronhook_cron::next_fire_times(&expr, Local::now(), count)? {
                println!("{}", t.format("%Y-%m-%d %H:%M:%S %Z"));
            }
        }
        Commands::Describe { expr } => {
            println!("{}", cronhook_cron::describe(&expr)?);
        }
    }

    Ok(())
}

/// Best-effort POST to the running daemon so a store change takes effect
/// immediately. The store is the source of truth either way: an unreachable
/// daemon just means the change lands on its next start.
async fn notify_daemon(config: &Config, path: &str) {
    let url = format!("{}{}", config.admin_url(), path);
    match reqwest::Client::new().post(&url).send().await {
        Ok(resp) if resp.status().is_success() => println!("running daemon updated"),
        Ok(resp) => println!(
            "daemon returned {}; the change applies on its next start",
            resp.status()
        ),
        Err(_) => println!("daemon not running; the change applies on its next start"),
    }
}

async fn notify_daemon_delete(config: &Config, id: i64) {
    let url = format!("{}/api/tasks/{id}", config.admin_url());
    match reqwest::Client::new().delete(&url).send().await {
        Ok(resp) if resp.status().is_success() => println!("running daemon updated"),
        // The row is already gone locally; a 404 means the daemon had
        // nothing to unschedule.
        Ok(resp) => println!(
            "daemon returned {}; the trigger (if any) clears on its next start",
            resp.status()
        ),
        Err(_) => println!("daemon not running; nothing to unschedule"),
    }
}

async fn run_server(config: Config) -> Result<()> {
    info!(db = %config.db_path, "starting cronhook");

    let store = Arc::new(TaskStore::open(&config.db_path)?);
    let run_log = Arc::new(RunLog::open(&config.db_path)?);
    let executor = Arc::new(HttpExecutor::new(&ExecutorConfig {
        request_timeout: Duration::from_secs(config.request_timeout_secs),
        accept_invalid_certs: config.accept_invalid_certs,
        max_response_bytes: config.max_response_bytes,
    })?);

    let scheduler = Arc::new(Scheduler::new(
        store.clone() as Arc<dyn TaskSource>,
        run_log.clone() as Arc<dyn ExecutionSink>,
        executor,
        SchedulerConfig {
            max_concurrency: config.max_concurrency,
            shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
            ..SchedulerConfig::default()
        },
    ));

    scheduler.load_active().await?;

    // Admin API: how `trigger`/`enable`/`disable`/`rm`/`edit` reach the
    // live trigger table.
    let state = AppState {
        scheduler: scheduler.clone(),
        store: store.clone(),
    };
    let listener =
        tokio::net::TcpListener::bind((config.bind_address.as_str(), config.port)).await?;
    info!(addr = %listener.local_addr()?, "admin API listening");
    let app = api::build_router(state);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!(error = %e, "admin API stopped");
        }
    });

    if config.log_retention_days > 0 {
        let retention = Duration::from_secs(config.log_retention_days * 24 * 3600);
        let log = run_log.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(3600));
            loop {
                ticker.tick().await;
                match log.prune(retention) {
                    Ok(0) => {}
                    Ok(n) => info!(removed = n, "pruned old run-log entries"),
                    Err(e) => warn!(error = %e, "run-log prune failed"),
                }
            }
        });
    }

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let runner = scheduler.clone();
    let handle = tokio::spawn(async move { runner.run(shutdown_rx).await });

    tokio::signal::ctrl_c().await?;
    info!("ctrl-c received, stopping");
    let _ = shutdown_tx.send(()).await;
    handle.await?;

    Ok(())
}
