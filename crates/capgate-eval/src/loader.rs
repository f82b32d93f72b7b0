//! Suite definition loading.
//!
//! Suites are YAML documents with four recognized blocks:
//!
//! ```yaml
//! suite: core
//! model:
//!   endpoint_env: MODEL_ENDPOINT
//!   token_env: MODEL_TOKEN
//! limits:
//!   max_tokens: 512
//! tasks:
//!   - name: reasoning
//!     metric: accuracy
//!     points: 20
//!   - name:extraction metric:f1 points:10
//! ```
//!
//! Tasks may be mappings or compact `key:value` strings (the format of the
//! existing suite files). Unknown keys are ignored. A missing suite name or
//! endpoint variable is a config error.

use std::collections::BTreeMap;
use std::path::Path;

use capgate_core::domain::suite::{DEFAULT_METRIC, DEFAULT_POINTS};
use capgate_core::{GateError, ModelRef, Result, SuiteSpec, TaskSpec};
use serde::Deserialize;
use serde_yaml::Value;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct RawSuite {
    suite: Option<String>,
    model: Option<RawModel>,
    #[serde(default)]
    limits: BTreeMap<String, Value>,
    #[serde(default)]
    tasks: Vec<RawTask>,
}

#[derive(Debug, Deserialize)]
struct RawModel {
    endpoint_env: Option<String>,
    token_env: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTask {
    Entry {
        name: Option<String>,
        metric: Option<String>,
        points: Option<Value>,
    },
    Compact(String),
}

/// Parses suite definitions into validated [`SuiteSpec`]s.
pub struct SuiteLoader;

impl SuiteLoader {
    /// Parse a suite from YAML source. `origin` names the source in errors.
    pub fn load(source: &str, origin: &str) -> Result<SuiteSpec> {
        if source.trim().is_empty() {
            return Err(GateError::config(format!("{}: suite definition is empty", origin)));
        }
        let raw: RawSuite = serde_yaml::from_str(source)
            .map_err(|e| GateError::config(format!("{}: malformed suite: {}", origin, e)))?;

        let name = non_blank(raw.suite)
            .ok_or_else(|| GateError::config(format!("{}: missing 'suite' name", origin)))?;

        let model = raw.model.ok_or_else(|| {
            GateError::config(format!("{}: suite '{}' has no 'model' block", origin, name))
        })?;
        let endpoint_env = non_blank(model.endpoint_env).ok_or_else(|| {
            GateError::config(format!(
                "{}: suite '{}' has no model.endpoint_env",
                origin, name
            ))
        })?;

        let limits = raw
            .limits
            .into_iter()
            .filter_map(|(k, v)| scalar_to_string(&v).map(|s| (k, s)))
            .collect();

        let tasks = raw
            .tasks
            .into_iter()
            .enumerate()
            .map(|(i, task)| parse_task(task, i, origin, &name))
            .collect::<Result<Vec<_>>>()?;

        if tasks.is_empty() {
            warn!(suite = %name, origin = %origin, "suite defines no tasks");
        }
        debug!(suite = %name, tasks = tasks.len(), "suite loaded");

        Ok(SuiteSpec {
            name,
            model: ModelRef {
                endpoint_env,
                token_env: non_blank(model.token_env),
            },
            limits,
            tasks,
        })
    }

    /// Read and parse a suite file.
    pub fn load_file(path: &Path) -> Result<SuiteSpec> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            GateError::config(format!("cannot read suite {}: {}", path.display(), e))
        })?;
        Self::load(&source, &path.display().to_string())
    }

    /// Load `files` from `dir`, in order. Fails on the first bad suite.
    pub fn load_all(dir: &Path, files: &[String]) -> Result<Vec<SuiteSpec>> {
        let suites = files
            .iter()
            .map(|f| Self::load_file(&dir.join(f)))
            .collect::<Result<Vec<_>>>()?;

        let mut seen = std::collections::BTreeSet::new();
        for suite in &suites {
            if !seen.insert(suite.name.as_str()) {
                return Err(GateError::config(format!(
                    "suite name '{}' is defined more than once",
                    suite.name
                )));
            }
        }
        Ok(suites)
    }
}

fn parse_task(task: RawTask, index: usize, origin: &str, suite: &str) -> Result<TaskSpec> {
    let (name, metric, points) = match task {
        RawTask::Entry {
            name,
            metric,
            points,
        } => (name, metric, points.as_ref().and_then(scalar_to_string)),
        RawTask::Compact(line) => {
            let mut fields: BTreeMap<&str, &str> = BTreeMap::new();
            for pair in line.split_whitespace() {
                if let Some((k, v)) = pair.split_once(':') {
                    if !k.is_empty() && !v.is_empty() {
                        fields.insert(k, v);
                    }
                }
            }
            (
                fields.get("name").map(|s| s.to_string()),
                fields.get("metric").map(|s| s.to_string()),
                fields.get("points").map(|s| s.to_string()),
            )
        }
    };

    let name = non_blank(name).ok_or_else(|| {
        GateError::config(format!(
            "{}: suite '{}' task #{} has no name",
            origin, suite, index
        ))
    })?;

    let points = match points {
        None => DEFAULT_POINTS,
        Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
            GateError::config(format!(
                "{}: task '{}' has non-numeric points '{}'",
                origin, name, raw
            ))
        })?,
    };
    if points == 0 {
        return Err(GateError::config(format!(
            "{}: task '{}' must have points > 0",
            origin, name
        )));
    }

    Ok(TaskSpec {
        name,
        metric: non_blank(metric).unwrap_or_else(|| DEFAULT_METRIC.to_string()),
        points,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
