mod routine;
mod task_runner;

pub use routine::*;
pub use task_runner::*;
