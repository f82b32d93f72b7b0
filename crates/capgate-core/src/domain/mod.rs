//! Domain models for the capability gate.
//!
//! Canonical definitions for the pipeline artifacts:
//! - `SuiteSpec`: Typed eval suite definition
//! - `EvalRun`: Per-task trial results of one run
//! - `Summary`: One score per suite
//! - `GateOutcome`: Promote/reject decision
//! - `RolloutPlan`: Staged canary rollout for a promoted candidate

pub mod error;
pub mod lifecycle;
pub mod outcome;
pub mod rollout;
pub mod run;
pub mod suite;
pub mod summary;

// Re-export main types and errors
pub use error::{GateError, Result, TrialError};
pub use lifecycle::{ReleaseLifecycle, ReleaseState};
pub use outcome::{Decision, GateArtifacts, GateOutcome, Threshold, Thresholds};
pub use rollout::{RolloutPlan, RolloutPolicy};
pub use run::{EvalRun, RunId, RunStatus, SuiteResult, TaskResult};
pub use suite::{trial_prompt, ModelRef, SuiteSpec, TaskSpec};
pub use summary::{round_score, Summary};
