//! Gate configuration.
//!
//! Built once by the composition root (the CLI) and passed by parameter into
//! every component. Nothing below the root reads the process environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::error::{GateError, Result};
use crate::domain::outcome::Thresholds;
use crate::domain::rollout::RolloutPolicy;

/// Default gate root, relative to the working directory.
pub const DEFAULT_ROOT: &str = "capability-gate";

/// Suite files run when the config does not list any.
pub const DEFAULT_SUITES: [&str; 3] = [
    "core_capabilities.yml",
    "safety_alignment.yml",
    "robustness.yml",
];

/// Candidate tag used when `CANDIDATE_TAG` is unset.
pub const DEFAULT_CANDIDATE_TAG: &str = "candidate@local";

fn default_suites() -> Vec<String> {
    DEFAULT_SUITES.iter().map(|s| s.to_string()).collect()
}

/// Trial scheduling limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerSettings {
    /// Upper bound on in-flight model calls across all suites.
    pub max_concurrent_trials: usize,
    /// Per-trial timeout for the model call.
    pub trial_timeout_secs: u64,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            max_concurrent_trials: 8,
            trial_timeout_secs: 30,
        }
    }
}

impl RunnerSettings {
    pub fn trial_timeout(&self) -> Duration {
        Duration::from_secs(self.trial_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_trials == 0 {
            return Err(GateError::config("runner.max_concurrent_trials must be >= 1"));
        }
        if self.trial_timeout_secs == 0 {
            return Err(GateError::config("runner.trial_timeout_secs must be >= 1"));
        }
        Ok(())
    }
}

/// Contents of `gate.config.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateConfig {
    /// Tag of the build currently serving traffic. Informational.
    #[serde(default)]
    pub baseline_tag: Option<String>,

    /// Suite files under `evals/suites`, run in this order.
    #[serde(default = "default_suites")]
    pub suites: Vec<String>,

    /// Score floors keyed by suite name.
    #[serde(default)]
    pub eval_thresholds: Thresholds,

    pub rollout: RolloutPolicy,

    #[serde(default)]
    pub runner: RunnerSettings,
}

impl GateConfig {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GateError::config(format!("cannot read gate config {}: {}", path.display(), e))
        })?;
        let config: GateConfig = serde_json::from_str(&raw).map_err(|e| {
            GateError::config(format!("malformed gate config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate config JSON.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: GateConfig = serde_json::from_str(raw)
            .map_err(|e| GateError::config(format!("malformed gate config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.suites.is_empty() {
            return Err(GateError::config("no suites configured"));
        }
        for (suite, threshold) in &self.eval_thresholds {
            let floor = threshold.min_absolute;
            if !floor.is_finite() || !(0.0..=1.0).contains(&floor) {
                return Err(GateError::config(format!(
                    "eval_thresholds.{}.min_absolute must be within 0..=1, got {}",
                    suite, floor
                )));
            }
        }
        self.rollout.validate()?;
        self.runner.validate()
    }
}

/// Filesystem layout of a gate root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateLayout {
    root: PathBuf,
}

impl GateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("gate.config.json")
    }

    pub fn suites_dir(&self) -> PathBuf {
        self.root.join("evals").join("suites")
    }

    pub fn out_dir(&self) -> PathBuf {
        self.root.join("evals").join("out")
    }
}

impl Default for GateLayout {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

/// Snapshot of the environment variables suites may reference.
///
/// Empty values are treated as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelEnv {
    vars: BTreeMap<String, String>,
}

impl ModelEnv {
    /// Capture the current process environment.
    pub fn from_process_env() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}
