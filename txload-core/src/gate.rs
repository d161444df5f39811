use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

/// Decides whether workers may start another iteration.
///
/// Closes once the shared iteration budget is spent, the duration deadline has passed, or
/// [`IterationGate::stop`] was called. With neither budget nor duration exactly one
/// iteration is admitted.
#[derive(Debug)]
pub struct IterationGate {
    counter: AtomicU64,
    iterations: Option<u64>,
    duration: Option<Duration>,
    deadline: OnceLock<Instant>,
    stopped: AtomicBool,
    notify: Notify,
}

impl IterationGate {
    pub fn new(iterations: Option<u64>, duration: Option<Duration>) -> Self {
        Self {
            counter: AtomicU64::new(0),
            iterations,
            duration,
            deadline: OnceLock::new(),
            stopped: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn start_at(&self, started: Instant) {
        if let Some(duration) = self.duration {
            let _ = self.deadline.set(started + duration);
        }
    }

    pub fn start(&self) {
        self.start_at(Instant::now());
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.get().copied()
    }

    /// Closes the gate and wakes every worker parked in [`IterationGate::pause`].
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Admits one more iteration, or returns `false` once the gate is closed.
    pub fn next(&self) -> bool {
        if self.is_stopped() {
            return false;
        }

        if self.duration.is_some() {
            let now = Instant::now();
            if self.deadline.get().is_none() {
                self.start_at(now);
            }
            if let Some(deadline) = self.deadline.get()
                && now >= *deadline
            {
                return false;
            }
        }

        match self.iterations {
            Some(total) => self.counter.fetch_add(1, Ordering::Relaxed) < total,
            None if self.duration.is_none() => self.counter.fetch_add(1, Ordering::Relaxed) == 0,
            None => true,
        }
    }

    /// Sleeps for `delay`, cut short by [`IterationGate::stop`] or the deadline.
    pub async fn pause(&self, delay: Duration) {
        if delay.is_zero() {
            return;
        }

        let mut until = tokio::time::Instant::now() + delay;
        if let Some(deadline) = self.deadline() {
            until = until.min(tokio::time::Instant::from_std(deadline));
        }

        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_stopped() {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep_until(until) => {}
            _ = notified => {}
        }
    }
}
