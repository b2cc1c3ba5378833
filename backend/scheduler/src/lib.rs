pub mod run_log;
pub mod scheduler;
pub mod task_store;

pub use run_log::RunLog;
pub use scheduler::{Scheduler, SchedulerConfig};
pub use task_store::TaskStore;
