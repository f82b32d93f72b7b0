//! capgate - Capability Gate CLI
//!
//! Gates a candidate model build on eval scores and stages its rollout. Each
//! command is one pipeline stage; the run id printed by `run-evals` is the
//! only handle passed between them.
//!
//! ## Commands
//!
//! - `run-evals`: Run every configured suite against the candidate
//! - `summarize-evals`: Reduce an eval run to one score per suite
//! - `compare-runs`: Apply the score thresholds and decide promote/reject
//! - `stage-rollout`: Print the staged rollout plan of a promoted run

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info, warn, Level};

use capgate_core::config::DEFAULT_ROOT;
use capgate_core::{
    ArtifactStore, FsArtifactStore, GateConfig, GateLayout, ModelEnv, RunId,
    DEFAULT_CANDIDATE_TAG,
};
use capgate_eval::{
    compare_runs, run_evals, stage_rollout, summarize_evals, DeterministicModelAdapter,
    EvalRunner, HttpAdapterFactory, ModelAdapterFactory, RolloutStager, StaticAdapterFactory,
};

#[derive(Parser)]
#[command(name = "capgate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Capability gate: eval suites -> summary -> gate -> staged rollout",
    long_about = None
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Gate root containing gate.config.json and evals/
    #[arg(long, global = true, env = "CAPGATE_ROOT", default_value = DEFAULT_ROOT)]
    root: PathBuf,

    /// Gate config file (default: <root>/gate.config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all configured suites against the candidate and write the eval run
    RunEvals {
        /// Tag of the candidate build
        #[arg(long, env = "CANDIDATE_TAG", default_value = DEFAULT_CANDIDATE_TAG)]
        candidate_tag: String,

        /// Score trials with the offline hash scorer instead of the model endpoint
        #[arg(long)]
        deterministic: bool,
    },

    /// Summarize an eval run into one score per suite
    SummarizeEvals {
        /// Run id printed by run-evals
        run_id: String,
    },

    /// Compare a run's summary against the configured thresholds
    CompareRuns {
        /// Run id printed by run-evals
        run_id: String,
    },

    /// Print the staged rollout plan of a promoted run
    StageRollout {
        /// Run id printed by run-evals
        run_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    capgate_core::init_tracing(cli.json, level);

    let layout = GateLayout::new(&cli.root);
    let config_path = cli.config.clone().unwrap_or_else(|| layout.config_path());
    let config = GateConfig::load(&config_path)
        .with_context(|| format!("Failed to load gate config {}", config_path.display()))?;
    let store = FsArtifactStore::new(layout.out_dir());

    match cli.command {
        Commands::RunEvals {
            candidate_tag,
            deterministic,
        } => {
            let factory: Arc<dyn ModelAdapterFactory> = if deterministic {
                Arc::new(StaticAdapterFactory::new(Arc::new(
                    DeterministicModelAdapter::new(),
                )))
            } else {
                Arc::new(HttpAdapterFactory::new()?)
            };
            let (cancel_tx, cancel_rx) = watch::channel(false);
            tokio::spawn(async move {
                if forward_interrupts(tokio::signal::ctrl_c, cancel_tx).await {
                    error!("second interrupt received; aborting without waiting for trials");
                    std::process::exit(130);
                }
            });
            let runner = EvalRunner::new(
                factory,
                config.runner.clone(),
                ModelEnv::from_process_env(),
            )
            .with_cancellation(cancel_rx);
            cmd_run_evals(&store, &runner, &config, &layout.suites_dir(), &candidate_tag).await
        }
        Commands::SummarizeEvals { run_id } => cmd_summarize_evals(&store, &config, &run_id).await,
        Commands::CompareRuns { run_id } => cmd_compare_runs(&store, &config, &run_id).await,
        Commands::StageRollout { run_id } => cmd_stage_rollout(&store, &config, &run_id).await,
    }
}

/// Turns the first interrupt into a cancellation request.
///
/// Returns `true` once a second interrupt arrives while in-flight trials are
/// still draining, and `false` if the signal source fails.
async fn forward_interrupts<F, Fut>(mut next_signal: F, cancel: watch::Sender<bool>) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if next_signal().await.is_err() {
        return false;
    }
    warn!("interrupt received; finishing in-flight trials (interrupt again to abort)");
    let _ = cancel.send(true);
    next_signal().await.is_ok()
}

fn parse_run_id(raw: &str) -> Result<RunId> {
    RunId::parse(raw).with_context(|| format!("Invalid run id '{}'", raw))
}

/// Run every suite and print the run id.
async fn cmd_run_evals(
    store: &dyn ArtifactStore,
    runner: &EvalRunner,
    config: &GateConfig,
    suites_dir: &Path,
    candidate_tag: &str,
) -> Result<()> {
    let run_id = RunId::generate();
    let run = run_evals(store, runner, config, suites_dir, candidate_tag, run_id)
        .await
        .context("run-evals failed")?;

    println!("{}", run.run_id);
    if !run.is_complete() {
        anyhow::bail!(
            "run {} was cancelled; an incomplete eval run was written and cannot be gated",
            run.run_id
        );
    }
    Ok(())
}

async fn cmd_summarize_evals(
    store: &dyn ArtifactStore,
    config: &GateConfig,
    run_id: &str,
) -> Result<()> {
    let run_id = parse_run_id(run_id)?;
    let summary = summarize_evals(store, &run_id, config.baseline_tag.as_deref())
        .await
        .with_context(|| format!("summarize-evals failed for {}", run_id))?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Decide promote/reject. Both are a successful exit.
async fn cmd_compare_runs(
    store: &dyn ArtifactStore,
    config: &GateConfig,
    run_id: &str,
) -> Result<()> {
    let run_id = parse_run_id(run_id)?;
    let outcome = compare_runs(store, &run_id, &config.eval_thresholds)
        .await
        .with_context(|| format!("compare-runs failed for {}", run_id))?;
    info!(decision = %outcome.decision, "gate outcome written");
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn cmd_stage_rollout(
    store: &dyn ArtifactStore,
    config: &GateConfig,
    run_id: &str,
) -> Result<()> {
    let run_id = parse_run_id(run_id)?;
    let plan = stage_rollout(store, &run_id, &config.rollout)
        .await
        .with_context(|| format!("stage-rollout failed for {}", run_id))?;

    for line in RolloutStager::render(&plan) {
        println!("{}", line);
    }
    let report = serde_json::json!({
        "ok": true,
        "runId": run_id,
        "plan": plan,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
