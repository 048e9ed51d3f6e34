//! Cooperative cancellation via a shared atomic flag

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cancellation signal shared by the dispatcher, its workers and whoever
/// decides the run should stop (usually a SIGINT/SIGTERM handler).
///
/// Cloning is cheap; all clones observe the same flag. Workers poll it before
/// claiming a task and before reading each line, never mid-read.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Request cancellation, returning whether it had already been requested.
    ///
    /// Async-signal-safe; signal handlers use the return value to escalate
    /// on a second signal.
    pub fn swap_cancel(&self) -> bool {
        self.flag.swap(true, Ordering::Relaxed)
    }

    /// Check if cancellation was requested
    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
