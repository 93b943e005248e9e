//! Structured observability hooks for the audit run lifecycle.
//!
//! This module provides:
//! - Run-scoped tracing spans via the `RunSpan` RAII guard
//! - Emission functions for key lifecycle events: run start/finish, phase
//!   transitions, stage attempts and failures, routing and verdicts
//!
//! Verbosity follows `RUST_LOG`; see [`crate::telemetry::init_tracing`].

use tracing::{debug, info, warn};

use crate::domain::CriterionVerdict;
use crate::router::Route;
use crate::state::{StageErrorKind, StageErrorRecord};

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// # Example
///
/// ```ignore
/// let _span = RunSpan::enter("0b9c...");
/// // every event below is tagged with run_id
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the run_id.
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("auditor.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: run started.
pub fn emit_run_started(run_id: &str, dimensions: usize, stages: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        dimensions = dimensions,
        stages = stages,
    );
}

/// Emit event: run finished with overall score and error count.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, overall_score: f64, errors: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        overall_score = overall_score,
        errors = errors,
    );
}

/// Emit event: executor entered a new phase.
pub fn emit_phase(run_id: &str, phase: &dyn std::fmt::Display, version: u64) {
    debug!(event = "executor.phase", run_id = %run_id, phase = %phase, state_version = version);
}

/// Emit event: a stage finished successfully.
pub fn emit_stage_completed(stage: &str, attempt: u32, duration_ms: u64) {
    debug!(
        event = "stage.completed",
        stage = %stage,
        attempt = attempt,
        duration_ms = duration_ms,
    );
}

/// Emit event: a stage attempt failed and may be retried (warning level).
pub fn emit_stage_attempt_failed(stage: &str, attempt: u32, kind: StageErrorKind, error: &str) {
    warn!(
        event = "stage.attempt_failed",
        stage = %stage,
        attempt = attempt,
        kind = ?kind,
        error = %error,
    );
}

/// Emit event: a stage failed permanently and was recorded.
pub fn emit_stage_failed(record: &StageErrorRecord) {
    warn!(
        event = "stage.failed",
        stage = %record.stage,
        kind = ?record.kind,
        attempts = record.attempts,
        error = %record.message,
    );
}

/// Emit event: router selected a continuation.
pub fn emit_route(run_id: &str, route: Route, errors: usize, evidence: usize) {
    info!(
        event = "router.selected",
        run_id = %run_id,
        route = ?route,
        errors = errors,
        evidence = evidence,
    );
}

/// Emit event: one dimension's verdict.
pub fn emit_verdict(verdict: &CriterionVerdict) {
    info!(
        event = "arbitration.verdict",
        dimension = %verdict.dimension_id,
        final_score = verdict.final_score,
        rule = %verdict.resolution_rule,
        dissent = verdict.dissent,
        inconclusive = verdict.inconclusive,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let _span = RunSpan::enter("test-run-id");
    }
}
