pub mod describe;
pub mod engine;

pub use describe::describe;
pub use engine::{next_fire_times, parse, validate};
