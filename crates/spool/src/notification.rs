//! Wake conduit between producers and the forwarder thread
//!
//! A best-effort signal, not a work queue: the forwarder clears it at the
//! start of every pass and always re-reads the store count after waking.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Reason the forwarder was woken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// A producer committed a new entry
    Committed,
    /// Shutdown sentinel
    Shutdown,
}

/// Timed, notifiable wait used by the forwarder loop
#[derive(Debug, Default)]
pub struct WakeQueue {
    pending: Mutex<VecDeque<Wake>>,
    cond: Condvar,
}

impl WakeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a wake-up and unblock the waiter
    pub fn notify(&self, wake: Wake) {
        let mut pending = self.pending.lock();
        pending.push_back(wake);
        self.cond.notify_all();
    }

    /// Push the shutdown sentinel unless a wake-up is already pending
    pub fn notify_shutdown(&self) {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            pending.push_back(Wake::Shutdown);
        }
        self.cond.notify_all();
    }

    /// Block until a wake-up is pending or `deadline` passes
    ///
    /// Consumes every pending wake-up and returns the oldest, or `None` on
    /// timeout.
    pub fn wait_until(&self, deadline: Instant) -> Option<Wake> {
        let mut pending = self.pending.lock();
        while pending.is_empty() {
            if self.cond.wait_until(&mut pending, deadline).timed_out() {
                break;
            }
        }
        let oldest = pending.pop_front();
        pending.clear();
        oldest
    }

    /// Sleep for `duration`, waking early only when `shutdown` is raised
    ///
    /// Producer wake-ups do not cut the sleep short.
    pub fn sleep_unless(&self, duration: Duration, shutdown: &AtomicBool) {
        let deadline = Instant::now() + duration;
        let mut pending = self.pending.lock();
        while !shutdown.load(Ordering::SeqCst) {
            if self.cond.wait_until(&mut pending, deadline).timed_out() {
                break;
            }
        }
    }

    /// Drop every pending wake-up
    pub fn clear(&self) {
        self.pending.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
