//! Flags shared between the event loop and a job's worker thread.

use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_flag_is_taken_once() {
        let control = JobControl::new();
        assert!(!control.take_progress());
        control.request_progress();
        assert!(control.take_progress());
        assert!(!control.take_progress());
    }

    #[test]
    fn cancel_outlives_pause() {
        let control = JobControl::new();
        control.pause();
        assert!(control.is_paused());
        control.cancel();
        assert!(control.is_cancelled());
        control.resume();
        assert!(!control.is_paused());
        assert!(control.is_cancelled());
    }
}

/// Cooperative control of one running job.
///
/// The event loop writes, the worker polls. A cancelled job never becomes
/// uncancelled.
#[derive(Debug, Default)]
pub struct JobControl {
    cancelled: AtomicBool,
    paused: AtomicBool,
    progress_due: AtomicBool,
    finished: AtomicBool,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Allows the worker to send one progress message.
    pub fn request_progress(&self) {
        self.progress_due.store(true, Ordering::Release);
    }

    /// Clears the progress flag, returning whether it was set.
    pub fn take_progress(&self) -> bool {
        self.progress_due.swap(false, Ordering::AcqRel)
    }

    pub fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}
