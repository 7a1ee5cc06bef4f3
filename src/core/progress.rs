//! Progress reporting and cancellation
//!
//! The solver consults the sink once per shrinking cycle; batch
//! classification and normalization consult it per completed vector.
//! Cancellation is cooperative: a task in flight finishes its current
//! unit of work before exiting.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Abstract progress/cancellation collaborator
///
/// All methods default to no-ops so callers without a UI can pass
/// [`NullProgress`]. Implementations must be shareable across the worker
/// threads of batch operations.
pub trait ProgressSink: Send + Sync {
    /// Report overall progress in percent, clamped to `[0, 100]`
    fn update_progress(&self, _percent: f64) {}

    /// Report a human-readable status message
    fn update_status(&self, _message: &str) {}

    /// Whether the caller requested cancellation
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Sink that ignores progress and never cancels
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {}

/// Sink that forwards status messages to the `log` crate
///
/// Status goes to info, percentages to debug.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn update_progress(&self, percent: f64) {
        log::debug!("progress: {:.0}%", percent.clamp(0.0, 100.0));
    }

    fn update_status(&self, message: &str) {
        log::info!("{message}");
    }
}

/// Shared counter for batch operations fanning out across workers
///
/// Each worker increments the counter when it finishes a vector; the
/// accumulated count is forwarded to the wrapped sink as a percentage.
pub struct BatchProgress<'a> {
    sink: &'a dyn ProgressSink,
    done: AtomicUsize,
    total: usize,
}

impl<'a> BatchProgress<'a> {
    /// Wrap a sink for a batch of `total` items
    pub fn new(sink: &'a dyn ProgressSink, total: usize) -> Self {
        Self {
            sink,
            done: AtomicUsize::new(0),
            total,
        }
    }

    /// Record one completed item and forward the percentage
    pub fn item_done(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if self.total > 0 {
            self.sink
                .update_progress(100.0 * done as f64 / self.total as f64);
        }
    }

    /// Items completed so far
    pub fn completed(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }

    /// Whether the caller requested cancellation
    pub fn is_cancelled(&self) -> bool {
        self.sink.is_cancelled()
    }
}

/// Outcome of a cancellable batch operation
///
/// Cancellation is not an error: a cancelled batch reports how far it got
/// and the caller decides what to do with the partial result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchStatus {
    /// Items completed before the batch finished or was cancelled
    pub completed: usize,
    /// Whether cancellation cut the batch short
    pub cancelled: bool,
}

/// Flag-based sink for driving cancellation from another thread
///
/// Useful in tests and for embedding in a host application's own
/// progress plumbing.
#[derive(Debug, Default)]
pub struct CancelFlag {
    cancelled: AtomicBool,
}

impl CancelFlag {
    /// Create a new, unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

impl ProgressSink for CancelFlag {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
