//! Lock-free error counter with a quiet-period reset.

use crate::clock::Clock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSnapshot {
    pub count: u32,
    pub last_error_ms: u64,
}

/// Counts processing errors shared by concurrent file tasks.
///
/// The counter drops back to zero once more than `reset_interval_ms` has
/// passed since the last recorded error. The reset is a compare-and-swap on
/// the count observed together with the stale timestamp, so an increment
/// racing with a reset survives it.
pub struct ErrorState {
    count: AtomicU32,
    last_error_ms: AtomicU64,
    max_errors: u32,
    reset_interval_ms: u64,
    clock: Arc<dyn Clock>,
}

impl ErrorState {
    pub fn new(max_errors: u32, reset_interval_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            count: AtomicU32::new(0),
            last_error_ms: AtomicU64::new(0),
            max_errors: max_errors.max(1),
            reset_interval_ms,
            clock,
        }
    }

    pub fn max_errors(&self) -> u32 {
        self.max_errors
    }

    /// Record one error and return the count including it
    pub fn record(&self) -> u32 {
        let now = self.clock.now_ms();
        self.expire(now);
        self.last_error_ms.store(now, Ordering::SeqCst);
        self.count.fetch_add(1, Ordering::SeqCst).saturating_add(1)
    }

    /// Current count after applying any due reset
    pub fn count(&self) -> u32 {
        self.expire(self.clock.now_ms());
        self.count.load(Ordering::SeqCst)
    }

    /// True while the count is at or above the threshold
    pub fn should_use_fallback(&self) -> bool {
        self.count() >= self.max_errors
    }

    pub fn snapshot(&self) -> ErrorSnapshot {
        ErrorSnapshot {
            count: self.count(),
            last_error_ms: self.last_error_ms.load(Ordering::SeqCst),
        }
    }

    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
        self.last_error_ms.store(0, Ordering::SeqCst);
    }

    fn expire(&self, now: u64) {
        let observed = self.count.load(Ordering::SeqCst);
        if observed == 0 {
            return;
        }
        let last = self.last_error_ms.load(Ordering::SeqCst);
        if now.saturating_sub(last) <= self.reset_interval_ms {
            return;
        }
        if self
            .count
            .compare_exchange(observed, 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            log::debug!("Error counter reset after {} ms without errors", now.saturating_sub(last));
        }
    }
}

impl std::fmt::Debug for ErrorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorState")
            .field("count", &self.count.load(Ordering::Relaxed))
            .field("max_errors", &self.max_errors)
            .field("reset_interval_ms", &self.reset_interval_ms)
            .finish_non_exhaustive()
    }
}
