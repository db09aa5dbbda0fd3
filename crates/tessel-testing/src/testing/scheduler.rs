use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tessel_core::FlushScheduler;

/// [`FlushScheduler`] that only records requests. Tests decide when to flush.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    requested: AtomicBool,
    requests: AtomicUsize,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether a flush was requested since the last call.
    pub fn take_request(&self) -> bool {
        self.requested.swap(false, Ordering::SeqCst)
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Total requests ever made.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl FlushScheduler for ManualScheduler {
    fn schedule_flush(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.requested.store(true, Ordering::SeqCst);
    }
}
