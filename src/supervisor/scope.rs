//! Bounded supervision of crawl tasks
//!
//! A supervisor owns a population of spawned tasks and enforces three limits
//! on it: how long the supervisor may live, how many tasks may settle, and
//! how many may be alive at once. Limits are evaluated when a task is
//! admitted; the first breach closes the supervisor, which cancels every
//! alive task and refuses new ones.

use crate::config::SupervisorConfig;
use crate::supervisor::task::{
    Outcome, SupervisorStats, TaskFailure, TaskId, TaskRecord, TaskState,
};
use crate::{CrawlError, ShutdownReason};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Limits of one supervisor; `None` means unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorLimits {
    /// Maximum age of the supervisor when a task is admitted
    pub max_lifetime: Option<Duration>,

    /// Maximum number of settled tasks when a task is admitted
    pub max_volume: Option<u64>,

    /// Maximum number of alive tasks, counting the one being admitted
    pub max_width: Option<usize>,
}

impl From<&SupervisorConfig> for SupervisorLimits {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            max_lifetime: config.max_lifetime.map(Duration::from_secs),
            max_volume: config.max_volume,
            max_width: config.max_width,
        }
    }
}

#[derive(Debug, Default)]
struct Population {
    alive: HashMap<TaskId, TaskRecord>,
    settled: u64,
    completed: u64,
    failed: u64,
    cancelled: u64,
    failures: Vec<TaskFailure>,
}

#[derive(Debug)]
struct Inner {
    limits: SupervisorLimits,
    born: Instant,
    closed: AtomicBool,
    next_id: AtomicU64,
    population: Mutex<Population>,
    cancel: CancellationToken,
    drained: watch::Sender<bool>,
}

impl Inner {
    fn population(&self) -> MutexGuard<'_, Population> {
        self.population
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Decides whether a freshly registered task may run
    fn verdict(&self, population: &Population) -> Option<ShutdownReason> {
        if self.is_closed() {
            return Some(ShutdownReason::Closed);
        }
        if let Some(max) = self.limits.max_lifetime {
            if self.born.elapsed() > max {
                return Some(ShutdownReason::LifetimeExceeded);
            }
        }
        if let Some(max) = self.limits.max_volume {
            if population.settled > max {
                return Some(ShutdownReason::VolumeExceeded);
            }
        }
        if let Some(max) = self.limits.max_width {
            if population.alive.len() > max {
                return Some(ShutdownReason::WidthExceeded);
            }
        }
        None
    }

    /// Closes the supervisor; returns false if it was already closed
    fn shut(&self, reason: ShutdownReason) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let alive = self.population().alive.len();
        tracing::info!(reason = %reason, alive, "closing supervisor");
        self.cancel.cancel();
        true
    }

    fn set_state(&self, id: TaskId, state: TaskState) {
        if let Some(record) = self.population().alive.get_mut(&id) {
            record.state = state;
        }
    }

    fn settle(&self, id: TaskId, outcome: Outcome) {
        let mut population = self.population();
        // Stragglers were already force-failed by `close`.
        let Some(record) = population.alive.remove(&id) else {
            return;
        };

        population.settled += 1;
        tracing::trace!(
            task = id,
            state = %outcome.state(),
            age = ?record.started_at.elapsed(),
            "task settled"
        );
        match outcome {
            Outcome::Completed => population.completed += 1,
            Outcome::Cancelled => population.cancelled += 1,
            Outcome::Failed(failure) => {
                population.failed += 1;
                population.failures.push(failure);
            }
        }

        if population.alive.is_empty() {
            self.drained.send_replace(true);
        }
    }

    /// Force-fails every task still alive and aborts it
    fn fail_stragglers(&self) -> usize {
        let mut population = self.population();
        let stragglers: Vec<(TaskId, TaskRecord)> = population.alive.drain().collect();

        for (id, record) in &stragglers {
            tracing::warn!(
                task = id,
                state = %record.state,
                age = ?record.started_at.elapsed(),
                "task did not settle before close timeout"
            );
            if let Some(abort) = &record.abort {
                abort.abort();
            }
            population.settled += 1;
            population.failed += 1;
            population.failures.push(TaskFailure::from_error(
                *id,
                &CrawlError::SupervisorShutdown {
                    reason: ShutdownReason::Straggler,
                },
            ));
        }

        self.drained.send_replace(true);
        stragglers.len()
    }
}

/// Settles a task exactly once, however its future ends
struct SettleGuard {
    inner: Arc<Inner>,
    id: TaskId,
    outcome: Option<Outcome>,
}

impl SettleGuard {
    /// Settles with a known outcome
    fn finish(mut self, outcome: Outcome) {
        self.outcome = Some(outcome);
    }
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        let outcome = match self.outcome.take() {
            Some(outcome) => outcome,
            // Dropped without an outcome: aborted, or the work panicked.
            None => {
                let aborted = self.inner.is_closed()
                    || self
                        .inner
                        .population()
                        .alive
                        .get(&self.id)
                        .map_or(true, |record| record.aborting);
                if aborted {
                    Outcome::Cancelled
                } else {
                    Outcome::Failed(TaskFailure::from_error(
                        self.id,
                        &CrawlError::TaskPanicked { id: self.id },
                    ))
                }
            }
        };
        self.inner.settle(self.id, outcome);
    }
}

/// Supervisor for a bounded population of crawl tasks
///
/// Cloning is cheap; clones share the same population and limits.
#[derive(Debug, Clone)]
pub struct TaskSupervisor {
    inner: Arc<Inner>,
}

impl TaskSupervisor {
    pub fn new(limits: SupervisorLimits) -> Self {
        let (drained, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner {
                limits,
                born: Instant::now(),
                closed: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                population: Mutex::new(Population::default()),
                cancel: CancellationToken::new(),
                drained,
            }),
        }
    }

    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self::new(SupervisorLimits::from(config))
    }

    pub fn limits(&self) -> SupervisorLimits {
        self.inner.limits
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Time since the supervisor was created
    pub fn age(&self) -> Duration {
        self.inner.born.elapsed()
    }

    pub fn stats(&self) -> SupervisorStats {
        let population = self.inner.population();
        SupervisorStats {
            alive: population.alive.len(),
            settled: population.settled,
            completed: population.completed,
            failed: population.failed,
            cancelled: population.cancelled,
        }
    }

    /// State of a task that has not settled yet
    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        self.inner.population().alive.get(&id).map(|record| record.state)
    }

    /// Spawns `work` under supervision
    ///
    /// The task is registered as Pending and the limits are checked before it
    /// runs. A breach closes the supervisor and the task ends with
    /// [`CrawlError::SupervisorShutdown`] without polling `work`; so does any
    /// task spawned after the supervisor closed.
    pub fn spawn<F, T>(&self, work: F) -> TaskHandle<T>
    where
        F: Future<Output = Result<T, CrawlError>> + Send + 'static,
        T: Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let verdict = {
            let mut population = self.inner.population();
            population.alive.insert(id, TaskRecord::pending());
            self.inner.drained.send_replace(false);
            self.inner.verdict(&population)
        };

        match verdict {
            Some(ShutdownReason::Closed) => {
                tracing::debug!(task = id, "supervisor closed, refusing task");
            }
            Some(reason) => {
                tracing::warn!(task = id, reason = %reason, "supervisor limit reached");
                self.inner.shut(reason);
            }
            None => tracing::trace!(task = id, "task admitted"),
        }

        let inner = self.inner.clone();
        let guard = SettleGuard {
            inner: self.inner.clone(),
            id,
            outcome: None,
        };

        let handle = tokio::spawn(async move {
            if let Some(reason) = verdict {
                guard.finish(Outcome::Cancelled);
                return Err(CrawlError::SupervisorShutdown { reason });
            }

            inner.set_state(id, TaskState::Running);
            let result = tokio::select! {
                biased;
                _ = inner.cancel.cancelled() => Err(CrawlError::SupervisorShutdown {
                    reason: ShutdownReason::Closed,
                }),
                result = work => result,
            };

            let result = match result {
                Err(CrawlError::Cancelled) if inner.is_closed() => {
                    Err(CrawlError::SupervisorShutdown {
                        reason: ShutdownReason::Closed,
                    })
                }
                other => other,
            };

            guard.finish(match &result {
                Ok(_) => Outcome::Completed,
                Err(e @ (CrawlError::SupervisorShutdown { .. } | CrawlError::Cancelled)) => {
                    tracing::debug!(task = id, reason = %e, "task cancelled");
                    Outcome::Cancelled
                }
                Err(e) => {
                    tracing::debug!(task = id, error = %e, "task failed");
                    Outcome::Failed(TaskFailure::from_error(id, e))
                }
            });
            result
        });

        if let Some(record) = self.inner.population().alive.get_mut(&id) {
            record.abort = Some(handle.abort_handle());
        }

        TaskHandle {
            id,
            handle,
            inner: self.inner.clone(),
        }
    }

    /// Closes the supervisor and waits for alive tasks to settle
    ///
    /// Every alive task is signalled to cancel. Tasks still alive when
    /// `timeout` expires are marked Failed and aborted; their number is
    /// returned. Closing twice is harmless.
    pub async fn close(&self, timeout: Option<Duration>) -> usize {
        self.inner.shut(ShutdownReason::Closed);

        match self.wait_drained(timeout).await {
            Ok(()) => 0,
            Err(_) => self.inner.fail_stragglers(),
        }
    }

    /// Waits until no task is alive
    ///
    /// # Errors
    ///
    /// * `CrawlError::Timeout` - tasks were still alive after `timeout`
    pub async fn join(&self, timeout: Option<Duration>) -> Result<(), CrawlError> {
        self.wait_drained(timeout).await
    }

    /// Waits like [`join`](Self::join), then returns every task failure so far
    pub async fn join_failures(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Vec<TaskFailure>, CrawlError> {
        self.wait_drained(timeout).await?;
        Ok(self.inner.population().failures.clone())
    }

    async fn wait_drained(&self, timeout: Option<Duration>) -> Result<(), CrawlError> {
        let mut drained = self.inner.drained.subscribe();
        let wait = async move {
            // The sender lives in `inner`, so this only ends on `true`.
            let _ = drained.wait_for(|drained| *drained).await;
        };

        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, wait)
                .await
                .map_err(|_| CrawlError::Timeout(timeout)),
            None => {
                wait.await;
                Ok(())
            }
        }
    }
}

/// Handle to one supervised task
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: TaskId,
    handle: JoinHandle<Result<T, CrawlError>>,
    inner: Arc<Inner>,
}

impl<T> TaskHandle<T> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancels this task alone; the supervisor stays open
    pub fn abort(&self) {
        if let Some(record) = self.inner.population().alive.get_mut(&self.id) {
            record.aborting = true;
        }
        self.handle.abort();
    }

    /// Waits for the task and returns its result
    pub async fn join(self) -> Result<T, CrawlError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(CrawlError::TaskPanicked { id: self.id }),
            Err(_) if self.inner.is_closed() => Err(CrawlError::SupervisorShutdown {
                reason: ShutdownReason::Closed,
            }),
            Err(_) => Err(CrawlError::Cancelled),
        }
    }
}
