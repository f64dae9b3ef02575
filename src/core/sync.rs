//! Wake-up and cancellation primitives shared by the feed thread, the mission thread
//! and the scan timer.
//!
//! Every feed update bumps the [`Notifier`]; waiters re-check their predicate on each
//! bump instead of sleeping in a fixed-period loop. A [`CancelToken`] rides on the same
//! notifier so cancellation wakes every waiter immediately.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Result of a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The predicate held.
    Satisfied,
    /// The timeout elapsed first.
    TimedOut,
    /// The process-wide kill flag was raised.
    Cancelled,
}

impl WaitOutcome {
    /// True for [`WaitOutcome::Satisfied`].
    pub fn is_satisfied(self) -> bool {
        self == WaitOutcome::Satisfied
    }
}

/// Generation counter paired with a condition variable.
#[derive(Debug, Default)]
pub struct Notifier {
    generation: Mutex<u64>,
    changed: Condvar,
}

impl Notifier {
    /// Creates a notifier at generation zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumps the generation and wakes every waiter.
    pub fn notify(&self) {
        {
            let mut generation = self.generation.lock();
            *generation = generation.wrapping_add(1);
        }
        self.changed.notify_all();
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    /// Blocks until the generation moves past `seen` or `timeout` elapses.
    /// Returns the generation observed on wake-up.
    pub fn wait_for_change(&self, seen: u64, timeout: Duration) -> u64 {
        let mut generation = self.generation.lock();
        if *generation == seen {
            self.changed.wait_for(&mut generation, timeout);
        }
        *generation
    }
}

/// Process-wide kill flag. Cloning shares the flag.
#[derive(Debug, Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    notifier: Arc<Notifier>,
}

impl CancelToken {
    /// Creates a token that wakes waiters on `notifier` when cancelled.
    pub fn new(notifier: Arc<Notifier>) -> Self {
        CancelToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            notifier,
        }
    }

    /// Raises the flag and wakes every waiter.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notifier.notify();
    }

    /// Whether the flag has been raised.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// The notifier waiters block on.
    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// Sleeps for `duration` unless cancelled first. Returns `false` when cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            let seen = self.notifier.generation();
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            self.notifier.wait_for_change(seen, deadline - now);
        }
    }

    /// Blocks until `predicate` holds, the optional `timeout` elapses, or the token is
    /// cancelled.
    ///
    /// The predicate is re-evaluated on every notification and at least every `poll`,
    /// so state written without a notification is still picked up.
    pub fn wait_until<F>(&self, mut predicate: F, timeout: Option<Duration>, poll: Duration) -> WaitOutcome
    where
        F: FnMut() -> bool,
    {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        loop {
            // Read the generation before the predicate so a bump in between is not lost.
            let seen = self.notifier.generation();
            if self.is_cancelled() {
                return WaitOutcome::Cancelled;
            }
            if predicate() {
                return WaitOutcome::Satisfied;
            }
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return WaitOutcome::TimedOut;
                    }
                    (deadline - now).min(poll)
                }
                None => poll,
            };
            self.notifier.wait_for_change(seen, wait);
        }
    }
}

/// Runs `callback` once on a dedicated thread after `delay`, unless `cancel` fires first.
pub fn schedule_once<F>(
    name: &str,
    delay: Duration,
    cancel: CancelToken,
    callback: F,
) -> std::io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new().name(name.to_string()).spawn(move || {
        if cancel.sleep(delay) {
            callback();
        }
    })
}
