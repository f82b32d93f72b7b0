//! Rollout policy and staged rollout plans.

use serde::{Deserialize, Serialize};

use crate::domain::error::{GateError, Result};
use crate::domain::run::RunId;

/// Configured traffic progression for a promoted candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RolloutPolicy {
    /// Traffic share of the canary phase.
    pub canary_percent: f64,
    /// How long the canary runs before the first stage.
    pub canary_hours: f64,
    /// Traffic share of each stage after the canary, in order.
    pub stages: Vec<f64>,
    /// Route the traffic executor wires to the kill switch.
    pub kill_switch_route: String,
}

impl RolloutPolicy {
    /// Reject policies that could produce an out-of-range or non-monotonic plan.
    ///
    /// Called when the configuration is loaded, never mid-rollout.
    pub fn validate(&self) -> Result<()> {
        check_percent("canary_percent", self.canary_percent)?;
        if !self.canary_hours.is_finite() || self.canary_hours < 0.0 {
            return Err(GateError::config(format!(
                "rollout.canary_hours must be >= 0, got {}",
                self.canary_hours
            )));
        }
        if self.kill_switch_route.trim().is_empty() {
            return Err(GateError::config("rollout.kill_switch_route is empty"));
        }

        let mut previous = self.canary_percent;
        for (i, &stage) in self.stages.iter().enumerate() {
            check_percent(&format!("stages[{}]", i), stage)?;
            if stage < previous {
                return Err(GateError::config(format!(
                    "rollout.stages[{}] = {}% is below the preceding {}%",
                    i, stage, previous
                )));
            }
            previous = stage;
        }
        Ok(())
    }
}

fn check_percent(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(GateError::config(format!(
            "rollout.{} must be within 0..=100, got {}",
            field, value
        )));
    }
    Ok(())
}

/// Advisory plan handed to the external traffic executor. Never persisted.
///
/// `stages[0]` is the canary percentage; the configured stages follow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RolloutPlan {
    pub run_id: RunId,
    pub canary_percent: f64,
    pub canary_hours: f64,
    pub stages: Vec<f64>,
    pub kill_switch_route: String,
}

impl RolloutPlan {
    /// Stages after the canary.
    pub fn post_canary_stages(&self) -> &[f64] {
        self.stages.get(1..).unwrap_or(&[])
    }

    pub fn is_monotonic(&self) -> bool {
        self.stages.windows(2).all(|w| w[0] <= w[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(canary: f64, stages: Vec<f64>) -> RolloutPolicy {
        RolloutPolicy {
            canary_percent: canary,
            canary_hours: 24.0,
            stages,
            kill_switch_route: "/ops/kill".to_string(),
        }
    }

    #[test]
    fn test_valid_policy() {
        assert!(policy(1.0, vec![5.0, 25.0, 50.0, 100.0]).validate().is_ok());
    }

    #[test]
    fn test_stage_over_100_rejected() {
        let err = policy(1.0, vec![5.0, 150.0]).validate().unwrap_err();
        assert!(matches!(err, GateError::Config(_)));
        assert!(err.to_string().contains("stages[1]"));
    }

    #[test]
    fn test_decreasing_stages_rejected() {
        let err = policy(1.0, vec![50.0, 25.0]).validate().unwrap_err();
        assert!(err.to_string().contains("below the preceding"));
    }

    #[test]
    fn test_canary_above_first_stage_rejected() {
        assert!(policy(10.0, vec![5.0, 100.0]).validate().is_err());
    }

    #[test]
    fn test_negative_canary_rejected() {
        assert!(policy(-1.0, vec![5.0]).validate().is_err());
    }

    #[test]
    fn test_empty_kill_switch_rejected() {
        let mut p = policy(1.0, vec![100.0]);
        p.kill_switch_route = "  ".to_string();
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_post_canary_stages() {
        let plan = RolloutPlan {
            run_id: RunId::parse("gate-x").unwrap(),
            canary_percent: 1.0,
            canary_hours: 24.0,
            stages: vec![1.0, 5.0, 100.0],
            kill_switch_route: "/ops/kill".to_string(),
        };
        assert_eq!(plan.post_canary_stages(), &[5.0, 100.0]);
        assert!(plan.is_monotonic());
    }
}
