//! Eval suite definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Trials sampled for a task whose definition omits `points`.
pub const DEFAULT_POINTS: u32 = 50;

/// Metric recorded for a task whose definition omits `metric`.
pub const DEFAULT_METRIC: &str = "score";

/// Names of the environment variables holding the model endpoint and token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelRef {
    /// Variable holding the endpoint URL. Required.
    pub endpoint_env: String,

    /// Variable holding the bearer token, if the endpoint needs one.
    pub token_env: Option<String>,
}

/// A single task within a suite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskSpec {
    pub name: String,
    pub metric: String,
    /// Number of trials to sample. Always > 0.
    pub points: u32,
}

/// A validated suite definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuiteSpec {
    /// Suite name; becomes the key in `Summary::scores`.
    pub name: String,

    pub model: ModelRef,

    /// Opaque limits carried through for the adapter.
    pub limits: BTreeMap<String, String>,

    /// Tasks in declaration order.
    pub tasks: Vec<TaskSpec>,
}

impl SuiteSpec {
    /// Total number of trials this suite will issue.
    pub fn total_trials(&self) -> u64 {
        self.tasks.iter().map(|t| u64::from(t.points)).sum()
    }
}

/// The identifier handed to the model adapter for one trial.
///
/// Deterministic in `(suite, task, trial_index, candidate_tag)`.
pub fn trial_prompt(suite: &str, task: &str, trial_index: u32, candidate_tag: &str) -> String {
    format!("{}:{}:{}:{}", suite, task, trial_index, candidate_tag)
}
