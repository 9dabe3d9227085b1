/// Task state definitions for supervised crawl work
///
/// A task is alive while Pending or Running and settles into exactly one of
/// the terminal states.
use crate::{CrawlError, ErrorKind};
use std::fmt;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Identity of a task within one supervisor
pub type TaskId = u64;

/// Represents the current state of a supervised task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    // ===== Alive States =====
    /// Admitted, limits not yet evaluated
    Pending,

    /// Passed admission and running its work
    Running,

    // ===== Terminal States =====
    /// Work returned successfully
    Completed,

    /// Work returned an error, panicked, or was force-failed on close
    Failed,

    /// Stopped by the supervisor or aborted
    Cancelled,
}

impl TaskState {
    /// Returns true while the task counts against the width limit
    pub fn is_alive(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    /// Returns true if the task has settled
    pub fn is_terminal(&self) -> bool {
        !self.is_alive()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bookkeeping for one alive task
#[derive(Debug)]
pub(crate) struct TaskRecord {
    pub(crate) state: TaskState,
    pub(crate) started_at: Instant,
    pub(crate) abort: Option<AbortHandle>,
    /// Set when the task's own handle aborted it
    pub(crate) aborting: bool,
}

impl TaskRecord {
    pub(crate) fn pending() -> Self {
        Self {
            state: TaskState::Pending,
            started_at: Instant::now(),
            abort: None,
            aborting: false,
        }
    }
}

/// A task that ended in [`TaskState::Failed`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub id: TaskId,
    pub kind: ErrorKind,
    pub message: String,
}

impl TaskFailure {
    pub(crate) fn from_error(id: TaskId, error: &CrawlError) -> Self {
        Self {
            id,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// How a task left the alive set
#[derive(Debug)]
pub(crate) enum Outcome {
    Completed,
    Cancelled,
    Failed(TaskFailure),
}

impl Outcome {
    pub(crate) fn state(&self) -> TaskState {
        match self {
            Self::Completed => TaskState::Completed,
            Self::Cancelled => TaskState::Cancelled,
            Self::Failed(_) => TaskState::Failed,
        }
    }
}

/// Snapshot of a supervisor's population
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorStats {
    /// Tasks currently Pending or Running
    pub alive: usize,
    /// Tasks that have left the alive set, in any terminal state
    pub settled: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}
