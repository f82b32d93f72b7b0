//! Threshold gate.

use capgate_core::{Decision, GateArtifacts, GateOutcome, RunSpan, Summary, Thresholds};
use tracing::{info, warn};

/// Applies per-suite score floors to a [`Summary`].
pub struct GateDecision;

impl GateDecision {
    /// Pure: identical inputs produce an identical outcome.
    ///
    /// A thresholded suite missing from the summary scores 0. Suites without
    /// a threshold never affect the decision.
    pub fn decide(summary: &Summary, thresholds: &Thresholds, summary_path: &str) -> GateOutcome {
        let _span = RunSpan::enter(summary.run_id.as_str());

        let mut passes = true;
        for (suite, threshold) in thresholds {
            let score = summary.score_or_zero(suite);
            if score < threshold.min_absolute {
                warn!(
                    suite = %suite,
                    score = score,
                    floor = threshold.min_absolute,
                    missing = !summary.scores.contains_key(suite),
                    "suite below threshold"
                );
                passes = false;
            }
        }

        let decision = Decision::from_passes(passes);
        info!(decision = %decision, thresholds = thresholds.len(), "gate evaluated");

        GateOutcome {
            summary: summary.clone(),
            passes,
            decision,
            artifacts: GateArtifacts {
                summary: summary_path.to_string(),
            },
        }
    }

    /// Names of the thresholded suites that fall below their floor.
    pub fn failed_suites(summary: &Summary, thresholds: &Thresholds) -> Vec<String> {
        thresholds
            .iter()
            .filter(|(suite, t)| summary.score_or_zero(suite) < t.min_absolute)
            .map(|(suite, _)| suite.clone())
            .collect()
    }
}
