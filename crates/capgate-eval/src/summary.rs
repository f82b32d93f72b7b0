//! Reduction of an EvalRun to one score per suite.

use std::collections::BTreeMap;

use capgate_core::{round_score, EvalRun, GateError, Result, RunSpan, Summary};
use tracing::debug;

/// Reduces an [`EvalRun`] to a [`Summary`].
pub struct SummaryAggregator;

impl SummaryAggregator {
    /// Per suite, the unweighted mean of its task averages rounded to four
    /// decimals. A suite without tasks scores 0.
    ///
    /// Incomplete runs are refused so a cancelled run can never be gated.
    pub fn summarize(run: &EvalRun, baseline_tag: Option<&str>) -> Result<Summary> {
        let _span = RunSpan::enter(run.run_id.as_str());

        if !run.is_complete() {
            return Err(GateError::invalid_state(format!(
                "run {} is incomplete and cannot be summarized",
                run.run_id
            )));
        }

        let mut scores = BTreeMap::new();
        for suite in &run.suites {
            let mean = if suite.results.is_empty() {
                0.0
            } else {
                suite.results.iter().map(|r| r.avg).sum::<f64>() / suite.results.len() as f64
            };
            let score = round_score(mean);
            debug!(
                suite = %suite.suite,
                tasks = suite.results.len(),
                score = score,
                "suite summarized"
            );
            scores.insert(suite.suite.clone(), score);
        }

        Ok(Summary {
            run_id: run.run_id.clone(),
            candidate_tag: run.candidate_tag.clone(),
            baseline_tag: baseline_tag.map(str::to_string),
            scores,
        })
    }
}
