//! Pause and cancellation.
//!
//! `JobControl` is shared between the worker and its controllers. Pausing
//! blocks the worker at the next chunk boundary; cancelling sets a sticky
//! flag and wakes the worker out of every wait (pause or conflict) so it can
//! unwind promptly.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

use crate::conflict::ConflictMailbox;
use crate::model::ConflictDecision;

#[derive(Debug, Default)]
pub struct JobControl {
    cancelled: AtomicBool,
    paused: Mutex<bool>,
    resumed: Condvar,
    conflicts: ConflictMailbox,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        let mut paused = self.paused.lock();
        if !*paused {
            info!("transfer paused");
        }
        *paused = true;
    }

    pub fn resume(&self) {
        let mut paused = self.paused.lock();
        if *paused {
            info!("transfer resumed");
        }
        *paused = false;
        self.resumed.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.lock()
    }

    /// Request cancellation. Idempotent; the flag is never cleared.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            info!("transfer cancellation requested");
        }
        {
            let _paused = self.paused.lock();
            self.resumed.notify_all();
        }
        self.conflicts.wake();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn cancel_flag(&self) -> &AtomicBool {
        &self.cancelled
    }

    /// Answer the conflict the worker is waiting on.
    ///
    /// Returns false when the worker is not waiting for one.
    pub fn resolve_conflict(&self, decision: ConflictDecision) -> bool {
        self.conflicts.resolve(decision)
    }

    pub fn conflicts(&self) -> &ConflictMailbox {
        &self.conflicts
    }

    /// Block while paused. Returns how long the worker was held, or `None`
    /// if it was not paused. Returns early on cancellation.
    pub fn wait_if_paused(&self) -> Option<Duration> {
        let mut paused = self.paused.lock();
        if !*paused || self.is_cancelled() {
            return None;
        }

        let started = Instant::now();
        while *paused && !self.is_cancelled() {
            self.resumed.wait(&mut paused);
        }
        Some(started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_not_paused_returns_immediately() {
        let control = JobControl::new();
        assert_eq!(control.wait_if_paused(), None);
    }

    #[test]
    fn test_resume_releases_waiter() {
        let control = Arc::new(JobControl::new());
        control.pause();
        assert!(control.is_paused());

        let resumer = Arc::clone(&control);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            resumer.resume();
        });

        let waited = control.wait_if_paused().expect("Expected to wait");
        handle.join().expect("Resume thread panicked");
        assert!(waited >= Duration::from_millis(40), "waited only {:?}", waited);
        assert!(!control.is_paused());
    }

    #[test]
    fn test_cancel_releases_paused_waiter() {
        let control = Arc::new(JobControl::new());
        control.pause();

        let canceller = Arc::clone(&control);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });

        assert!(control.wait_if_paused().is_some());
        handle.join().expect("Cancel thread panicked");
        assert!(control.is_cancelled());
        // Still paused, but a cancelled job never blocks again
        assert!(control.is_paused());
        assert_eq!(control.wait_if_paused(), None);
    }

    #[test]
    fn test_cancel_is_sticky() {
        let control = JobControl::new();
        control.cancel();
        control.cancel();
        control.resume();
        assert!(control.is_cancelled());
    }
}
