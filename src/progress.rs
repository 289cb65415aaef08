//! Progress reporting for pipeline runs.
//!
//! The orchestrator reports coarse percentages with a named stage at each
//! step. Sinks must tolerate repeated reports; the monotonic wrapper drops
//! anything that would move progress backwards.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Receiver of pipeline progress updates.
pub trait ProgressSink: Send + Sync {
    /// Report progress as a percentage (0-100) with a stage label.
    fn report(&self, progress: u8, stage: &str);
}

/// A sink that discards all updates.
#[derive(Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn report(&self, _progress: u8, _stage: &str) {}
}

/// A sink that logs every update via tracing.
#[derive(Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn report(&self, progress: u8, stage: &str) {
        debug!(progress, stage, "pipeline progress");
    }
}

/// Wraps another sink and filters out non-increasing updates.
///
/// Concurrent stage reports can arrive out of order; observers only ever see
/// progress move forward.
pub struct MonotonicSink<S> {
    inner: S,
    high_water: AtomicU8,
}

impl<S: ProgressSink> MonotonicSink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            high_water: AtomicU8::new(0),
        }
    }

    /// The highest progress value reported so far.
    pub fn current(&self) -> u8 {
        self.high_water.load(Ordering::SeqCst)
    }
}

impl<S: ProgressSink> ProgressSink for MonotonicSink<S> {
    fn report(&self, progress: u8, stage: &str) {
        let progress = progress.min(100);
        let prev = self.high_water.fetch_max(progress, Ordering::SeqCst);
        if progress > prev {
            self.inner.report(progress, stage);
        }
    }
}

impl<T: ProgressSink + ?Sized> ProgressSink for Arc<T> {
    fn report(&self, progress: u8, stage: &str) {
        (**self).report(progress, stage);
    }
}
