//! Eval run artifacts and run identity.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::{GateError, Result};

/// Prefix shared by every run id.
pub const RUN_ID_PREFIX: &str = "gate-";

/// Identifier of one gate run, `gate-<ISO8601 with ':' and '.' replaced by '-'>`.
///
/// Also the stem of every artifact file produced for the run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Derive the run id for a run started at `at`.
    pub fn at(at: DateTime<Utc>) -> Self {
        let stamp = at
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace([':', '.'], "-");
        RunId(format!("{}{}", RUN_ID_PREFIX, stamp))
    }

    /// Run id for a run starting now.
    pub fn generate() -> Self {
        Self::at(Utc::now())
    }

    /// Validate a user-supplied run id.
    ///
    /// Rejects anything that could escape the artifact directory.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if !raw.starts_with(RUN_ID_PREFIX) || raw.len() == RUN_ID_PREFIX.len() {
            return Err(GateError::config(format!(
                "run id must look like '{}<timestamp>', got '{}'",
                RUN_ID_PREFIX, raw
            )));
        }
        if raw.contains(['/', '\\']) || raw.contains("..") {
            return Err(GateError::config(format!(
                "run id contains path characters: '{}'",
                raw
            )));
        }
        Ok(RunId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Artifact key of the EvalRun: `<runId>.json`.
    pub fn eval_key(&self) -> String {
        format!("{}.json", self.0)
    }

    /// Artifact key of the Summary: `<runId>.summary.json`.
    pub fn summary_key(&self) -> String {
        format!("{}.summary.json", self.0)
    }

    /// Artifact key of the GateOutcome: `<runId>.gate.json`.
    pub fn gate_key(&self) -> String {
        format!("{}.gate.json", self.0)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether every trial of the run was issued.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Complete,
    /// The run was cancelled; its scores must never reach the gate.
    Incomplete,
}

/// Aggregated trials of one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskResult {
    pub task: String,
    pub metric: String,
    /// Mean of the collected trial scores; 0.0 when nothing was collected.
    pub avg: f64,
    /// Trials counted toward `avg`.
    #[serde(rename = "N")]
    pub n: u32,
    /// Trials that failed, timed out, or were never issued.
    #[serde(default)]
    pub dropped: u32,
}

impl TaskResult {
    /// Build a result from the collected scores of a task.
    pub fn from_scores(task: &str, metric: &str, scores: &[f64], dropped: u32) -> Self {
        let n = scores.len() as u32;
        let avg = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        Self {
            task: task.to_string(),
            metric: metric.to_string(),
            avg,
            n,
            dropped,
        }
    }
}

/// Results of one suite, one entry per task in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuiteResult {
    pub suite: String,
    pub results: Vec<TaskResult>,
}

/// The persisted output of `run-evals`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvalRun {
    pub run_id: RunId,
    pub candidate_tag: String,
    #[serde(default)]
    pub status: RunStatus,
    pub suites: Vec<SuiteResult>,
}

impl EvalRun {
    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Complete
    }
}
