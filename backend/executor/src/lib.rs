pub mod executor;
pub mod headers;

pub use executor::{ExecutorConfig, HttpExecutor};
pub use headers::parse_headers;
