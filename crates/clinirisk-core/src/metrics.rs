//! Global atomic counters for Clinirisk observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (end of a batch, daemon tick).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    assessments_saved: AtomicU64,
    batch_failures: AtomicU64,
    model_reloads: AtomicU64,
    model_reload_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            assessments_saved: AtomicU64::new(0),
            batch_failures: AtomicU64::new(0),
            model_reloads: AtomicU64::new(0),
            model_reload_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_assessments(&self) {
        self.assessments_saved.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "assessments_saved", "counter incremented");
    }

    pub fn inc_batch_failures(&self) {
        self.batch_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "batch_failures", "counter incremented");
    }

    /// Successful artifact swaps.
    pub fn inc_model_reloads(&self) {
        self.model_reloads.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "model_reloads", "counter incremented");
    }

    pub fn inc_model_reload_failures(&self) {
        self.model_reload_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "model_reload_failures", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            assessments_saved = self.assessments_saved(),
            batch_failures = self.batch_failures(),
            model_reloads = self.model_reloads(),
            model_reload_failures = self.model_reload_failures(),
        );
    }

    pub fn assessments_saved(&self) -> u64 {
        self.assessments_saved.load(Ordering::Relaxed)
    }

    pub fn batch_failures(&self) -> u64 {
        self.batch_failures.load(Ordering::Relaxed)
    }

    pub fn model_reloads(&self) -> u64 {
        self.model_reloads.load(Ordering::Relaxed)
    }

    pub fn model_reload_failures(&self) -> u64 {
        self.model_reload_failures.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.assessments_saved.store(0, Ordering::Relaxed);
        self.batch_failures.store(0, Ordering::Relaxed);
        self.model_reloads.store(0, Ordering::Relaxed);
        self.model_reload_failures.store(0, Ordering::Relaxed);
    }
}
