//! Per-suite score summaries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::run::RunId;

/// Decimal places kept in summary scores.
pub const SCORE_DECIMALS: i32 = 4;

/// Round a score to [`SCORE_DECIMALS`] places.
pub fn round_score(value: f64) -> f64 {
    let factor = 10f64.powi(SCORE_DECIMALS);
    (value * factor).round() / factor
}

/// One score per suite of an eval run.
///
/// `scores` keys are exactly the suites present in the referenced run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub run_id: RunId,
    pub candidate_tag: String,
    /// Informational; the gate never reads it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_tag: Option<String>,
    pub scores: BTreeMap<String, f64>,
}

impl Summary {
    /// Score for `suite`, or 0.0 when the suite is absent.
    pub fn score_or_zero(&self, suite: &str) -> f64 {
        self.scores.get(suite).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_score() {
        assert_eq!(round_score(0.123_456), 0.1235);
        assert_eq!(round_score(0.5), 0.5);
        assert_eq!(round_score(0.999_96), 1.0);
    }

    #[test]
    fn test_missing_suite_scores_zero() {
        let summary = Summary {
            run_id: RunId::parse("gate-x").unwrap(),
            candidate_tag: "c".to_string(),
            baseline_tag: None,
            scores: BTreeMap::from([("core".to_string(), 0.7)]),
        };
        assert_eq!(summary.score_or_zero("core"), 0.7);
        assert_eq!(summary.score_or_zero("safety"), 0.0);
    }

    #[test]
    fn test_baseline_tag_omitted_when_absent() {
        let summary = Summary {
            run_id: RunId::parse("gate-x").unwrap(),
            candidate_tag: "c".to_string(),
            baseline_tag: None,
            scores: BTreeMap::new(),
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert!(value.get("baselineTag").is_none());
        assert_eq!(value["runId"], "gate-x");
    }
}
