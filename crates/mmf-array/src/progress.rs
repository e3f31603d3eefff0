//! Progress reporting and cooperative cancellation for long operations.
//!
//! Chunked operations (front truncation, migration) call [`Progress::begin`]
//! once, [`Progress::update`] between chunks, and [`Progress::end`] when they
//! finish. Returning `true` from `update` cancels the operation at that
//! chunk boundary.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

/// Receiver of progress updates.
pub trait Progress {
    /// Work is starting. `base` is the index the operation starts from,
    /// when it has one.
    fn begin(&mut self, total: u64, label: Option<&str>, base: Option<u64>);

    /// `done` items are complete. Return `true` to cancel.
    fn update(&mut self, done: u64) -> bool;

    /// Work is over, successfully or not. Every `begin` is matched by one
    /// `end`; `message` is set when the work did not complete.
    fn end(&mut self, final_count: u64, message: Option<&str>);
}

/// Progress sink that logs through `tracing` and can be cancelled from
/// another thread.
#[derive(Debug, Clone, Default)]
pub struct LoggingProgress {
    cancelled: Arc<AtomicBool>,
    label: String,
    total: u64,
}

impl LoggingProgress {
    /// Create a sink that never cancels on its own.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle that cancels this sink when set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Request cancellation at the next chunk boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

impl Progress for LoggingProgress {
    fn begin(&mut self, total: u64, label: Option<&str>, base: Option<u64>) {
        self.label = label.unwrap_or("progress").to_string();
        self.total = total;
        match base {
            Some(base) => debug!("{}: starting {total} items from {base}", self.label),
            None => debug!("{}: starting {total} items", self.label),
        }
    }

    fn update(&mut self, done: u64) -> bool {
        debug!("{}: {done}/{}", self.label, self.total);
        self.cancelled.load(Ordering::Relaxed)
    }

    fn end(&mut self, final_count: u64, message: Option<&str>) {
        match message {
            Some(message) => info!("{}: {message} ({final_count} items)", self.label),
            None => info!("{}: finished with {final_count} items", self.label),
        }
    }
}
