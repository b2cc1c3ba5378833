pub mod error;
pub mod traits;
pub mod types;

pub use error::CronhookError;
pub use traits::{ExecutionSink, TaskSource};
pub use types::{ExecutionRecord, HttpMethod, NewTask, TaskDefinition};
