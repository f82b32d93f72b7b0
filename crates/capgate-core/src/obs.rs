//! Structured observability hooks for gate run lifecycle events.
//!
//! This module provides:
//! - Run-scoped tracing spans via the `RunSpan` RAII guard
//! - Emission functions for key lifecycle events: run start, trial drop,
//!   suite barrier, run commit, summary, gate decision, rollout plan
//!
//! Events are emitted at `info!` level (trial drops at `warn!`). Verbosity is
//! controlled by `RUST_LOG`; JSON output via the CLI `--json` flag.

use tracing::{info, warn};

/// RAII guard that enters a run-scoped tracing span.
///
/// ```ignore
/// let _span = RunSpan::enter("gate-2026-10-18T09-15-02-123Z");
/// // every event below carries run_id
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("capgate.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: eval run started.
pub fn emit_run_started(run_id: &str, candidate_tag: &str, suites: usize) {
    info!(event = "run.started", run_id = %run_id, candidate_tag = %candidate_tag, suites = suites);
}

/// Emit event: a trial was dropped from its task's average.
pub fn emit_trial_dropped(suite: &str, task: &str, trial: u32, error: &dyn std::fmt::Display) {
    warn!(
        event = "trial.dropped",
        suite = %suite,
        task = %task,
        trial = trial,
        error = %error,
    );
}

/// Emit event: every trial of a suite has completed or been accounted for.
pub fn emit_suite_finished(suite: &str, tasks: usize, collected: u64, dropped: u64) {
    info!(
        event = "suite.finished",
        suite = %suite,
        tasks = tasks,
        collected = collected,
        dropped = dropped,
    );
}

/// Emit event: the EvalRun artifact was committed.
pub fn emit_run_committed(run_id: &str, complete: bool, duration_ms: u64) {
    info!(
        event = "run.committed",
        run_id = %run_id,
        complete = complete,
        duration_ms = duration_ms,
    );
}

/// Emit event: summary written for a run.
pub fn emit_summary_written(run_id: &str, suites: usize) {
    info!(event = "summary.written", run_id = %run_id, suites = suites);
}

/// Emit event: gate decided.
pub fn emit_gate_decided(run_id: &str, decision: &str, failed_suites: usize) {
    info!(
        event = "gate.decided",
        run_id = %run_id,
        decision = %decision,
        failed_suites = failed_suites,
    );
}

/// Emit event: rollout plan computed.
pub fn emit_rollout_planned(run_id: &str, canary_percent: f64, stages: usize) {
    info!(
        event = "rollout.planned",
        run_id = %run_id,
        canary_percent = canary_percent,
        stages = stages,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let _span = RunSpan::enter("gate-test");
        emit_run_started("gate-test", "candidate@local", 3);
    }
}
