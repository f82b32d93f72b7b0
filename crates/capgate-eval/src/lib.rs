//! capgate eval pipeline
//!
//! Suite loading, trial execution, summary aggregation, the threshold gate
//! and rollout staging, plus the stage functions the CLI drives.

pub mod adapter;
pub mod fakes;
pub mod gate;
pub mod loader;
pub mod pipeline;
pub mod rollout;
pub mod runner;
pub mod summary;

pub use adapter::{
    HttpAdapterFactory, HttpModelAdapter, ModelAdapter, ModelAdapterFactory, ModelTarget,
};
pub use fakes::{DeterministicModelAdapter, StaticAdapterFactory};
pub use gate::GateDecision;
pub use loader::SuiteLoader;
pub use pipeline::{compare_runs, run_evals, stage_rollout, summarize_evals};
pub use rollout::RolloutStager;
pub use runner::EvalRunner;
pub use summary::SummaryAggregator;
