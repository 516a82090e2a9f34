//! Progress-callback trait for per-item batch events.
//!
//! Pass an [`Arc<dyn BatchProgress>`] to the stage entry points in
//! [`crate::convert`] to receive events as workers finish items. The library
//! itself only logs through `tracing`; rendering a progress bar is left to
//! the caller (the `digitize` binary uses indicatif).
//!
//! # Example
//!
//! ```rust
//! use page_digitize::BatchProgress;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counting {
//!     done: AtomicUsize,
//! }
//!
//! impl BatchProgress for Counting {
//!     fn on_item_complete(&self, _sequence: usize, _total: usize, name: &str) {
//!         let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{n} done ({name})");
//!     }
//! }
//! ```

use std::sync::Arc;

/// Called by the orchestrator and item processors as a batch runs.
///
/// Workers call these methods concurrently from blocking threads; keep them
/// cheap and protect shared mutable state with atomics or a `Mutex`. All
/// methods default to no-ops.
pub trait BatchProgress: Send + Sync {
    /// Called once after discovery, before any item is dispatched.
    fn on_batch_start(&self, total_items: usize) {
        let _ = total_items;
    }

    /// Called when a worker picks an item up.
    fn on_item_start(&self, sequence: usize, total_items: usize, name: &str) {
        let _ = (sequence, total_items, name);
    }

    /// Called when an item produced its artifacts.
    fn on_item_complete(&self, sequence: usize, total_items: usize, name: &str) {
        let _ = (sequence, total_items, name);
    }

    /// Called when an item failed terminally (after it was logged).
    fn on_item_failed(&self, sequence: usize, total_items: usize, name: &str, error: &str) {
        let _ = (sequence, total_items, name, error);
    }

    /// Rasterisation only: the run-wide page total crossed a milestone.
    ///
    /// Best-effort; under contention a milestone may be observed late.
    fn on_pages_milestone(&self, pages_written: usize) {
        let _ = pages_written;
    }

    /// Called once after the completion barrier released.
    fn on_batch_complete(&self, succeeded: usize, failed: usize, abandoned: usize) {
        let _ = (succeeded, failed, abandoned);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgress;

impl BatchProgress for NoopProgress {}

/// Convenience alias for the shared callback handle.
pub type ProgressHandle = Arc<dyn BatchProgress>;

/// The default handle used when the caller passes none.
pub fn noop() -> ProgressHandle {
    Arc::new(NoopProgress)
}
