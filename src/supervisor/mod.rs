//! Task supervision
//!
//! This module contains:
//! - Task states and failure records
//! - `TaskSupervisor`, which spawns crawl tasks under lifetime, volume and
//!   width limits and cancels them all on the first breach

mod scope;
mod task;

pub use scope::{SupervisorLimits, TaskHandle, TaskSupervisor};
pub use task::{SupervisorStats, TaskFailure, TaskId, TaskState};
