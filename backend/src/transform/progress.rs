//! Progress reporting and cooperative cancellation for long calculations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::api::logs::log_info_indent;

/// Receives `(current, total, message)` notifications.
pub trait ProgressSink: Send + Sync {
    fn report(&self, current: usize, total: usize, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(usize, usize, &str) + Send + Sync,
{
    fn report(&self, current: usize, total: usize, message: &str) {
        self(current, total, message)
    }
}

/// Discards notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _current: usize, _total: usize, _message: &str) {}
}

/// Forwards notifications to the log broadcaster.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, current: usize, total: usize, message: &str) {
        let percent = if total > 0 {
            current as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        log_info_indent(format!("{:>5.1}% ({}/{}) {}", percent, current, total, message), 1);
    }
}

/// Shared cancellation flag, checked by the engine between row batches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag so the token can be reused for another run.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}
