//! Gate thresholds and decisions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::summary::Summary;

/// Score floor for one suite.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Threshold {
    pub min_absolute: f64,
}

/// Thresholds keyed by suite name.
pub type Thresholds = BTreeMap<String, Threshold>;

/// The promote/reject verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Promote,
    Reject,
}

impl Decision {
    pub fn from_passes(passes: bool) -> Self {
        if passes {
            Decision::Promote
        } else {
            Decision::Reject
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Promote => f.write_str("promote"),
            Decision::Reject => f.write_str("reject"),
        }
    }
}

/// Paths of the artifacts a gate outcome was derived from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateArtifacts {
    pub summary: String,
}

/// The persisted output of `compare-runs`.
///
/// Write-once: a run never gets a second outcome with a different decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateOutcome {
    #[serde(flatten)]
    pub summary: Summary,
    pub passes: bool,
    pub decision: Decision,
    pub artifacts: GateArtifacts,
}

impl GateOutcome {
    pub fn is_promote(&self) -> bool {
        self.decision == Decision::Promote
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::run::RunId;

    fn outcome(decision: Decision) -> GateOutcome {
        GateOutcome {
            summary: Summary {
                run_id: RunId::parse("gate-x").unwrap(),
                candidate_tag: "model@v2".to_string(),
                baseline_tag: Some("model@v1".to_string()),
                scores: BTreeMap::from([("core".to_string(), 0.62)]),
            },
            passes: decision == Decision::Promote,
            decision,
            artifacts: GateArtifacts {
                summary: "gate-x.summary.json".to_string(),
            },
        }
    }

    #[test]
    fn test_outcome_flattens_summary() {
        let value = serde_json::to_value(outcome(Decision::Reject)).unwrap();
        assert_eq!(value["runId"], "gate-x");
        assert_eq!(value["candidateTag"], "model@v2");
        assert_eq!(value["scores"]["core"], 0.62);
        assert_eq!(value["passes"], false);
        assert_eq!(value["decision"], "reject");
        assert_eq!(value["artifacts"]["summary"], "gate-x.summary.json");
    }

    #[test]
    fn test_outcome_reads_back() {
        let original = outcome(Decision::Promote);
        let json = serde_json::to_string(&original).unwrap();
        let parsed: GateOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, original);
        assert!(parsed.is_promote());
    }

    #[test]
    fn test_decision_from_passes() {
        assert_eq!(Decision::from_passes(true), Decision::Promote);
        assert_eq!(Decision::from_passes(false).to_string(), "reject");
    }
}
