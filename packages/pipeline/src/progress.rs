//! Progress reporting and the per-run context handed to each stage.
//!
//! Defines a [`ProgressCallback`] trait that decouples progress reporting
//! from any specific rendering backend (e.g., `indicatif` progress bars,
//! log-only reporting, or silence). Implementations are provided upstream
//! in crates that choose a rendering strategy.

use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Trait for reporting progress from long-running operations.
///
/// Implementations must be `Send + Sync` to support `Arc`-based sharing.
pub trait ProgressCallback: Send + Sync {
    /// Set the total expected units of work (enables percentage/ETA).
    fn set_total(&self, total: u64);

    /// Advance progress by `delta` units.
    fn inc(&self, delta: u64);

    /// Update the message displayed alongside the progress indicator.
    fn set_message(&self, msg: String);

    /// Mark progress as complete with a final message.
    fn finish(&self, msg: String);
}

/// A no-op implementation of [`ProgressCallback`] that silently ignores
/// all progress updates.
///
/// Useful for tests and for library callers that do not need visual
/// progress reporting.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`] instance for convenient use.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

/// Explicit per-run state passed into every stage.
///
/// Carries the progress sink and the reference time used for membership
/// recency checks, so stages never consult globals or the system clock.
#[derive(Clone)]
pub struct PipelineContext {
    progress: Arc<dyn ProgressCallback>,
    now: DateTime<Utc>,
}

impl PipelineContext {
    /// Creates a context reporting to `progress` with `now` as the
    /// reference time.
    #[must_use]
    pub fn new(progress: Arc<dyn ProgressCallback>, now: DateTime<Utc>) -> Self {
        Self { progress, now }
    }

    /// A context with no progress output.
    #[must_use]
    pub fn silent(now: DateTime<Utc>) -> Self {
        Self::new(null_progress(), now)
    }

    /// Reference time for the run.
    #[must_use]
    pub const fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Declares how many steps the run will report.
    pub fn begin(&self, total_steps: u64) {
        self.progress.set_total(total_steps);
    }

    /// Records completion of one pipeline step.
    pub fn report_step(&self, label: &str) {
        log::info!("{label}");
        self.progress.set_message(label.to_string());
        self.progress.inc(1);
    }

    /// Marks the run complete.
    pub fn finish(&self, label: &str) {
        self.progress.finish(label.to_string());
    }
}
