//! Progress reporting for batch runs.
//!
//! The orchestrator reports through [`ProgressCallback`] so it does not
//! depend on a rendering backend. The CLI plugs in `indicatif` bars;
//! tests and library callers use [`NullProgress`].

use std::sync::Arc;

/// Receives progress updates from a running batch.
///
/// `Send + Sync` so one instance can be shared behind an `Arc`.
pub trait ProgressCallback: Send + Sync {
    /// Sets the number of work items in the batch.
    fn set_total(&self, total: u64);

    /// Sets the number of finished work items (absolute).
    fn set_position(&self, pos: u64);

    /// Advances by `delta` finished work items.
    fn inc(&self, delta: u64);

    /// Shows `msg` next to the indicator, typically the current item label.
    fn set_message(&self, msg: String);

    /// Completes the indicator with a final message.
    fn finish(&self, msg: String);

    /// Completes the indicator and removes it.
    fn finish_and_clear(&self);
}

/// A [`ProgressCallback`] that ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn set_position(&self, _pos: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
    fn finish_and_clear(&self) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
