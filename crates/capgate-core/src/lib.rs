//! capgate core library
//!
//! Domain model, configuration, artifact storage and observability for the
//! capability gate: eval suites are run against a candidate build, reduced to
//! one score per suite, gated against per-suite floors, and turned into a
//! staged rollout plan.

pub mod config;
pub mod domain;
pub mod obs;
pub mod store;
pub mod telemetry;

pub use config::{GateConfig, GateLayout, ModelEnv, RunnerSettings, DEFAULT_CANDIDATE_TAG};
pub use domain::{
    round_score, trial_prompt, Decision, EvalRun, GateArtifacts, GateError, GateOutcome,
    ModelRef, ReleaseLifecycle, ReleaseState, Result, RolloutPlan, RolloutPolicy, RunId,
    RunStatus, SuiteResult, SuiteSpec, Summary, TaskResult, TaskSpec, Threshold, Thresholds,
    TrialError,
};
pub use obs::{
    emit_gate_decided, emit_rollout_planned, emit_run_committed, emit_run_started,
    emit_suite_finished, emit_summary_written, emit_trial_dropped, RunSpan,
};
pub use store::fs::FsArtifactStore;
pub use store::memory::MemoryArtifactStore;
pub use store::{get_json, put_json, ArtifactStore, PutOutcome};
pub use telemetry::init_tracing;

/// capgate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
