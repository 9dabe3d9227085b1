//! Broadcast wakeup gate
//!
//! A gate is fired once per release. Firing wakes every waiter that was
//! subscribed at that moment and leaves a fresh, unfired gate behind: a
//! waiter that subscribes afterwards can only be woken by a later fire.
//! The generation counter makes each replacement observable.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

#[derive(Debug, Default)]
pub(crate) struct WakeupGate {
    notify: Notify,
    generation: AtomicU64,
}

impl WakeupGate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers interest in the current gate
    ///
    /// The returned future is already enabled, so a fire that happens
    /// between this call and the first poll is not lost.
    pub(crate) fn subscribe(&self) -> Subscription<'_> {
        let mut notified = Box::pin(self.notify.notified());
        notified.as_mut().enable();
        Subscription { notified }
    }

    /// Wakes all current subscribers and replaces the gate
    pub(crate) fn fire(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.notify.notify_waiters();
    }

    /// Number of times the gate has been fired
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

/// A single subscription to one generation of the gate
pub(crate) struct Subscription<'a> {
    notified: Pin<Box<Notified<'a>>>,
}

impl<'a> Subscription<'a> {
    pub(crate) async fn wait(self) {
        self.notified.await;
    }
}
