//! Structured observability hooks for model lifecycle and batch runs.
//!
//! This module provides:
//! - A batch-scoped tracing span via [`batch_span`]
//! - Emission functions for model swaps, reload failures, batch progress,
//!   scorer disagreement and saved assessments
//!
//! Events are emitted at `info!` level, failures at `warn!`.
//! For JSON output, set `CLINIRISK_LOG_FORMAT=json`.

use tracing::{info, warn};

/// Span carrying `run_id` for every event of one batch run.
///
/// ```ignore
/// run_inner().instrument(batch_span("3f1c...")).await
/// ```
///
/// Attach with `tracing::Instrument` rather than `entered()`: the run
/// future crosses await points and may move between worker threads.
pub fn batch_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("clinirisk.batch", run_id = %run_id)
}

/// Emit event: a new model artifact became active.
pub fn emit_model_swapped(model_name: &str, version: &str, digest: &str, trees: usize) {
    info!(
        event = "model.swapped",
        model_name = %model_name,
        version = %version,
        digest = %digest,
        trees = trees,
    );
}

/// Emit event: a reload attempt failed and the previous artifact stays.
pub fn emit_model_reload_failed(error: &dyn std::fmt::Display, previous_version: Option<&str>) {
    warn!(
        event = "model.reload_failed",
        error = %error,
        previous_version = previous_version.unwrap_or("none"),
    );
}

pub fn emit_batch_started(run_id: &str, population: usize, commit_mode: &str) {
    info!(
        event = "batch.started",
        run_id = %run_id,
        population = population,
        commit_mode = %commit_mode,
    );
}

/// Emit event: one patient failed inside a batch (warning level).
pub fn emit_batch_item_failed(run_id: &str, patient_id: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "batch.item_failed",
        run_id = %run_id,
        patient_id = %patient_id,
        error = %error,
    );
}

pub fn emit_batch_finished(
    run_id: &str,
    processed: usize,
    failed: usize,
    duration_ms: u64,
    cancelled: bool,
) {
    info!(
        event = "batch.finished",
        run_id = %run_id,
        processed = processed,
        failed = failed,
        duration_ms = duration_ms,
        cancelled = cancelled,
    );
}

/// Emit event: ensemble and rule scorers land in different tiers.
pub fn emit_scorer_disagreement(patient_id: &str, ensemble_score: u8, axes_score: u8) {
    warn!(
        event = "scorer.disagreement",
        patient_id = %patient_id,
        ensemble_score = ensemble_score,
        axes_score = axes_score,
        delta = (i16::from(ensemble_score) - i16::from(axes_score)).abs(),
    );
}

pub fn emit_assessment_saved(patient_id: &str, assessment_id: &str, score: u8, source: &str) {
    info!(
        event = "assessment.saved",
        patient_id = %patient_id,
        assessment_id = %assessment_id,
        score = score,
        source = %source,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_span_create() {
        let span = batch_span("test-run-id");
        let _guard = span.enter();
        emit_batch_item_failed("test-run-id", "p1", &"malformed age");
    }
}
