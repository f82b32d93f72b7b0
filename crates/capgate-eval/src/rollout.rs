//! Rollout staging for promoted candidates.

use capgate_core::{
    GateError, GateOutcome, ReleaseLifecycle, ReleaseState, Result, RolloutPlan, RolloutPolicy,
    RunSpan,
};

/// Turns a promote outcome into a [`RolloutPlan`].
pub struct RolloutStager;

impl RolloutStager {
    /// Canary first, then the configured stages unchanged and in order.
    ///
    /// Fails with `InvalidState` unless the outcome is a promote.
    pub fn plan(outcome: &GateOutcome, policy: &RolloutPolicy) -> Result<RolloutPlan> {
        let run_id = &outcome.summary.run_id;
        let _span = RunSpan::enter(run_id.as_str());

        let lifecycle = ReleaseLifecycle::from_outcome(outcome)?;
        if lifecycle.state != ReleaseState::Promoted {
            return Err(GateError::invalid_state(format!(
                "run {} was not promoted (decision: {}); refusing to stage rollout",
                run_id, outcome.decision
            )));
        }

        let mut stages = Vec::with_capacity(policy.stages.len() + 1);
        stages.push(policy.canary_percent);
        stages.extend_from_slice(&policy.stages);

        let plan = RolloutPlan {
            run_id: run_id.clone(),
            canary_percent: policy.canary_percent,
            canary_hours: policy.canary_hours,
            stages,
            kill_switch_route: policy.kill_switch_route.clone(),
        };
        if !plan.is_monotonic() {
            return Err(GateError::config(
                "rollout stages are not monotonic; policy was not validated",
            ));
        }
        Ok(plan)
    }

    /// Human-readable plan lines for operators.
    pub fn render(plan: &RolloutPlan) -> Vec<String> {
        let stages = plan
            .post_canary_stages()
            .iter()
            .map(|s| format!("{}%", s))
            .collect::<Vec<_>>()
            .join(" → ");
        vec![
            format!(
                "[rollout] canary {}% for {}h then stages: {}",
                plan.canary_percent, plan.canary_hours, stages
            ),
            format!("[rollout] kill switch route: {}", plan.kill_switch_route),
        ]
    }
}
