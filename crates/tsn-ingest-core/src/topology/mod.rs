//! Orchestration primitives: keyed fan-out, task outcomes, bounded calls.

mod call;
mod runner;
mod task;

pub use call::{CallInterrupt, bounded_call};
pub use runner::KeyedRunner;
pub use task::{TaskError, TaskResult};
