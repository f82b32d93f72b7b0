//! Stage-per-command pipeline.
//!
//! Each stage reads the artifact written by the previous one from an
//! [`ArtifactStore`], does its work, and writes one artifact. Stages share no
//! process state; the run id is the only handle between them.

use std::path::Path;
use std::time::Instant;

use tracing::{info, Instrument};

use capgate_core::{
    emit_gate_decided, emit_rollout_planned, emit_run_committed, emit_run_started,
    emit_summary_written, get_json, put_json, ArtifactStore, EvalRun, GateConfig, GateOutcome,
    PutOutcome, Result, RolloutPlan, RolloutPolicy, RunId, SuiteSpec, Summary, Thresholds,
};

use crate::gate::GateDecision;
use crate::loader::SuiteLoader;
use crate::rollout::RolloutStager;
use crate::runner::EvalRunner;
use crate::summary::SummaryAggregator;

fn log_put(key: &str, outcome: PutOutcome) {
    match outcome {
        PutOutcome::Written => info!(artifact = %key, "artifact written"),
        PutOutcome::Unchanged => info!(artifact = %key, "identical artifact already present"),
    }
}

/// `run-evals`: load the configured suites, run them and commit the EvalRun.
///
/// Suites are loaded and every endpoint resolved before the first trial,
/// so configuration errors leave no artifact behind.
pub async fn run_evals(
    store: &dyn ArtifactStore,
    runner: &EvalRunner,
    config: &GateConfig,
    suites_dir: &Path,
    candidate_tag: &str,
    run_id: RunId,
) -> Result<EvalRun> {
    let suites = SuiteLoader::load_all(suites_dir, &config.suites)?;
    let span = tracing::info_span!("capgate.run", run_id = %run_id);
    execute_and_commit(store, runner, &suites, candidate_tag, &run_id)
        .instrument(span)
        .await
}

async fn execute_and_commit(
    store: &dyn ArtifactStore,
    runner: &EvalRunner,
    suites: &[SuiteSpec],
    candidate_tag: &str,
    run_id: &RunId,
) -> Result<EvalRun> {
    let started = Instant::now();
    emit_run_started(run_id.as_str(), candidate_tag, suites.len());
    let run = runner.run_all(suites, candidate_tag, run_id).await?;

    let key = run_id.eval_key();
    log_put(&key, put_json(store, &key, &run).await?);
    emit_run_committed(
        run_id.as_str(),
        run.is_complete(),
        started.elapsed().as_millis() as u64,
    );
    Ok(run)
}

/// `summarize-evals`: reduce a committed EvalRun to a Summary.
pub async fn summarize_evals(
    store: &dyn ArtifactStore,
    run_id: &RunId,
    baseline_tag: Option<&str>,
) -> Result<Summary> {
    let run: EvalRun = get_json(store, &run_id.eval_key()).await?;
    let summary = SummaryAggregator::summarize(&run, baseline_tag)?;

    let key = run_id.summary_key();
    log_put(&key, put_json(store, &key, &summary).await?);
    emit_summary_written(run_id.as_str(), summary.scores.len());
    Ok(summary)
}

/// `compare-runs`: gate a Summary against the thresholds.
///
/// Both promote and reject are successful outcomes.
pub async fn compare_runs(
    store: &dyn ArtifactStore,
    run_id: &RunId,
    thresholds: &Thresholds,
) -> Result<GateOutcome> {
    let summary_key = run_id.summary_key();
    let summary: Summary = get_json(store, &summary_key).await?;
    let outcome = GateDecision::decide(&summary, thresholds, &summary_key);

    let key = run_id.gate_key();
    log_put(&key, put_json(store, &key, &outcome).await?);
    emit_gate_decided(
        run_id.as_str(),
        &outcome.decision.to_string(),
        GateDecision::failed_suites(&summary, thresholds).len(),
    );
    Ok(outcome)
}

/// `stage-rollout`: plan the rollout of a promoted run. Nothing is written.
pub async fn stage_rollout(
    store: &dyn ArtifactStore,
    run_id: &RunId,
    policy: &RolloutPolicy,
) -> Result<RolloutPlan> {
    let outcome: GateOutcome = get_json(store, &run_id.gate_key()).await?;
    let plan = RolloutStager::plan(&outcome, policy)?;
    emit_rollout_planned(run_id.as_str(), plan.canary_percent, plan.stages.len());
    Ok(plan)
}
