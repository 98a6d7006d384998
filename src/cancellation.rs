//! Cooperative cancellation token (§5 cancellation requirements)
//!
//! Renamed and trimmed from the teacher's `execution/timeout.rs::QueryTimeout`/
//! `CancelHandle` pattern: the timeout-duration bookkeeping (`start_time`,
//! `timeout_duration`, `elapsed`/`remaining`) is dropped since this crate's cancellation
//! is driven by explicit user abort or a sibling task's fatal error, not a wall-clock
//! deadline (no spec counterpart — database-call timeouts, where they exist, are the
//! driver's concern per §6).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag checked at every suspension point (§5): before each database
/// read, between the clinical and genomic phases of a path execution, and when pulling
/// the next task off the queue.
#[derive(Clone, Default)]
pub struct Cancellation {
    cancelled: Arc<AtomicBool>,
}

impl Cancellation {
    #[must_use]
    pub fn new() -> Self {
        Cancellation {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn handle(&self) -> CancelHandle {
        CancelHandle {
            cancelled: Arc::clone(&self.cancelled),
        }
    }
}

/// A handle that can cancel the run from another task without holding the original
/// [`Cancellation`].
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_cancelled() {
        let token = Cancellation::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn handle_cancellation_is_observed_by_the_original_token() {
        let token = Cancellation::new();
        let handle = token.handle();
        handle.cancel();
        assert!(token.is_cancelled());
        assert!(handle.is_cancelled());
    }
}
