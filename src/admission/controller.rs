//! Global and per-host admission control
//!
//! Every network operation holds one admission permit for its duration. A
//! permit counts against the global ceiling and, when the caller names a
//! host, against that host's ceiling as well. Waiters are not queued: each
//! release wakes all of them and whichever re-checks first wins.

use crate::admission::gate::WakeupGate;
use crate::config::FetchConfig;
use crate::url::host_key;
use crate::CrawlError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use url::Url;

/// Concurrency ceilings; `None` means unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdmissionLimits {
    /// Maximum permits held across all hosts
    pub global: Option<usize>,

    /// Maximum permits held for any single host
    pub per_host: Option<usize>,
}

impl AdmissionLimits {
    pub fn new(global: Option<usize>, per_host: Option<usize>) -> Self {
        Self { global, per_host }
    }

    /// No ceiling at all
    pub fn unbounded() -> Self {
        Self::default()
    }
}

impl From<&FetchConfig> for AdmissionLimits {
    fn from(config: &FetchConfig) -> Self {
        Self::new(config.global_limit, config.per_host_limit)
    }
}

/// Permits currently granted against one ceiling
#[derive(Debug)]
struct Counter {
    ceiling: Option<usize>,
    in_use: usize,
}

impl Counter {
    fn new(ceiling: Option<usize>) -> Self {
        Self { ceiling, in_use: 0 }
    }

    fn has_room(&self) -> bool {
        self.ceiling.map_or(true, |ceiling| self.in_use < ceiling)
    }

    /// Returns false if nothing was granted, in which case the counter stays put
    fn give_back(&mut self) -> bool {
        match self.in_use.checked_sub(1) {
            Some(n) => {
                self.in_use = n;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug)]
struct Budget {
    global: Counter,
    hosts: HashMap<String, Counter>,
}

#[derive(Debug)]
struct Inner {
    limits: AdmissionLimits,
    budget: Mutex<Budget>,
    gate: WakeupGate,
}

/// Admission controller shared by every fetch of one crawler instance
///
/// Cloning is cheap and yields a handle to the same budget.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    inner: Arc<Inner>,
}

impl AdmissionController {
    /// Creates a controller with the given ceilings
    pub fn new(limits: AdmissionLimits) -> Self {
        Self {
            inner: Arc::new(Inner {
                limits,
                budget: Mutex::new(Budget {
                    global: Counter::new(limits.global),
                    hosts: HashMap::new(),
                }),
                gate: WakeupGate::new(),
            }),
        }
    }

    /// Creates a controller from the `[fetch]` configuration section
    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(AdmissionLimits::from(config))
    }

    pub fn limits(&self) -> AdmissionLimits {
        self.inner.limits
    }

    /// Waits until a global permit (and a permit for `host`, if given) is free
    ///
    /// Passing `None` throttles against the global ceiling only; the per-host
    /// ceiling is not consulted at all.
    ///
    /// # Errors
    ///
    /// * `CrawlError::Usage` - `host` is `Some("")`
    pub async fn acquire(&self, host: Option<&str>) -> Result<AdmissionPermit, CrawlError> {
        let host = match host {
            Some("") => {
                return Err(CrawlError::Usage(
                    "admission requested for an empty host".to_string(),
                ))
            }
            other => other.map(str::to_string),
        };

        loop {
            // Subscribe before checking so a release in between still wakes us.
            let subscription = self.inner.gate.subscribe();

            if self.try_grant(host.as_deref()) {
                tracing::trace!(host = ?host, "admission granted");
                return Ok(AdmissionPermit {
                    controller: self.clone(),
                    host,
                    released: false,
                });
            }

            tracing::trace!(host = ?host, "admission full, waiting for a release");
            subscription.wait().await;
        }
    }

    /// Acquires a permit keyed by the URL's host
    pub async fn acquire_for(&self, url: &Url) -> Result<AdmissionPermit, CrawlError> {
        let host = host_key(url)?;
        self.acquire(Some(&host)).await
    }

    /// Returns one global permit (and one for `host`) and wakes all waiters
    ///
    /// Releasing more than was acquired is logged and otherwise ignored; the
    /// counters never drop below zero.
    pub fn release(&self, host: Option<&str>) {
        {
            let mut budget = self.budget();

            if !budget.global.give_back() {
                tracing::error!("excessive release regarding global limit");
            }

            if let Some(host) = host {
                let idle = match budget.hosts.get_mut(host) {
                    Some(counter) => {
                        if !counter.give_back() {
                            tracing::error!(host = %host, "excessive release regarding host limit");
                        }
                        counter.in_use == 0
                    }
                    None => {
                        tracing::error!(host = %host, "excessive release regarding host limit");
                        false
                    }
                };
                if idle {
                    budget.hosts.remove(host);
                }
            }
        }

        self.inner.gate.fire();
    }

    /// Permits currently held across all hosts
    pub fn in_flight(&self) -> usize {
        self.budget().global.in_use
    }

    /// Permits currently held for `host`
    pub fn in_flight_for(&self, host: &str) -> usize {
        self.budget().hosts.get(host).map_or(0, |c| c.in_use)
    }

    /// Number of releases so far, i.e. how many times waiters were woken
    pub fn wakeups(&self) -> u64 {
        self.inner.gate.generation()
    }

    fn try_grant(&self, host: Option<&str>) -> bool {
        let mut budget = self.budget();

        if !budget.global.has_room() {
            return false;
        }

        if let Some(host) = host {
            let per_host = self.inner.limits.per_host;
            let counter = budget
                .hosts
                .entry(host.to_string())
                .or_insert_with(|| Counter::new(per_host));
            if !counter.has_room() {
                return false;
            }
            counter.in_use += 1;
        }

        budget.global.in_use += 1;
        true
    }

    fn budget(&self) -> MutexGuard<'_, Budget> {
        self.inner
            .budget
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A granted admission; released when dropped
#[must_use = "dropping the permit releases it immediately"]
#[derive(Debug)]
pub struct AdmissionPermit {
    controller: AdmissionController,
    host: Option<String>,
    released: bool,
}

impl AdmissionPermit {
    /// The host this permit counts against, if any
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Releases the permit now instead of at end of scope
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.controller.release(self.host.as_deref());
        }
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.release_once();
    }
}
