//! Release lifecycle of a candidate tag.
//!
//! ```text
//! Draft -> Evaluating -> Promoted | Rejected
//! Promoted -> Canary -> Stage(1) -> ... -> Stage(k) -> Full
//! any non-terminal -> RolledBack (kill switch)
//! ```
//!
//! `Rejected`, `RolledBack` and `Full` are terminal. Retrying a rejected or
//! rolled-back candidate requires a new eval run under a new candidate tag.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::error::{GateError, Result};
use crate::domain::outcome::{Decision, GateOutcome};
use crate::domain::rollout::RolloutPlan;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum ReleaseState {
    Draft,
    Evaluating,
    Promoted,
    Rejected,
    Canary,
    /// 1-based index into the post-canary stages.
    Stage(usize),
    Full,
    RolledBack,
}

impl ReleaseState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReleaseState::Rejected | ReleaseState::RolledBack | ReleaseState::Full
        )
    }
}

impl fmt::Display for ReleaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseState::Draft => f.write_str("DRAFT"),
            ReleaseState::Evaluating => f.write_str("EVALUATING"),
            ReleaseState::Promoted => f.write_str("PROMOTED"),
            ReleaseState::Rejected => f.write_str("REJECTED"),
            ReleaseState::Canary => f.write_str("CANARY"),
            ReleaseState::Stage(i) => write!(f, "STAGE_{}", i),
            ReleaseState::Full => f.write_str("FULL"),
            ReleaseState::RolledBack => f.write_str("ROLLED_BACK"),
        }
    }
}

/// Tracks one candidate tag through its release states.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReleaseLifecycle {
    pub candidate_tag: String,
    pub state: ReleaseState,
    /// Every state entered, starting with `Draft`.
    pub history: Vec<ReleaseState>,
}

impl ReleaseLifecycle {
    pub fn new(candidate_tag: impl Into<String>) -> Self {
        Self {
            candidate_tag: candidate_tag.into(),
            state: ReleaseState::Draft,
            history: vec![ReleaseState::Draft],
        }
    }

    /// Rebuild the lifecycle of a candidate whose gate has already decided.
    pub fn from_outcome(outcome: &GateOutcome) -> Result<Self> {
        let mut lifecycle = Self::new(outcome.summary.candidate_tag.clone());
        lifecycle.begin_evaluation()?;
        lifecycle.record_decision(outcome.decision)?;
        Ok(lifecycle)
    }

    pub fn begin_evaluation(&mut self) -> Result<()> {
        match self.state {
            ReleaseState::Draft => self.enter(ReleaseState::Evaluating),
            other => return Err(self.illegal(other, "begin evaluation")),
        }
        Ok(())
    }

    pub fn record_decision(&mut self, decision: Decision) -> Result<()> {
        match (self.state, decision) {
            (ReleaseState::Evaluating, Decision::Promote) => self.enter(ReleaseState::Promoted),
            (ReleaseState::Evaluating, Decision::Reject) => self.enter(ReleaseState::Rejected),
            (other, _) => return Err(self.illegal(other, "record a gate decision")),
        }
        Ok(())
    }

    /// Move to the next rollout step of `plan`.
    pub fn advance(&mut self, plan: &RolloutPlan) -> Result<ReleaseState> {
        let stage_count = plan.post_canary_stages().len();
        let next = match self.state {
            ReleaseState::Promoted => ReleaseState::Canary,
            ReleaseState::Canary if stage_count == 0 => ReleaseState::Full,
            ReleaseState::Canary => ReleaseState::Stage(1),
            ReleaseState::Stage(i) if i < stage_count => ReleaseState::Stage(i + 1),
            ReleaseState::Stage(_) => ReleaseState::Full,
            other => return Err(self.illegal(other, "advance the rollout")),
        };
        self.enter(next);
        Ok(next)
    }

    /// Kill switch: roll back from any non-terminal state.
    pub fn kill(&mut self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(self.illegal(self.state, "trigger the kill switch"));
        }
        self.enter(ReleaseState::RolledBack);
        Ok(())
    }

    /// Traffic share the candidate should receive in the current state.
    pub fn traffic_percent(&self, plan: &RolloutPlan) -> f64 {
        match self.state {
            ReleaseState::Canary => plan.canary_percent,
            ReleaseState::Stage(i) => i
                .checked_sub(1)
                .and_then(|idx| plan.post_canary_stages().get(idx).copied())
                .unwrap_or(0.0),
            ReleaseState::Full => 100.0,
            _ => 0.0,
        }
    }

    fn enter(&mut self, state: ReleaseState) {
        self.state = state;
        self.history.push(state);
    }

    fn illegal(&self, from: ReleaseState, action: &str) -> GateError {
        GateError::invalid_state(format!(
            "candidate '{}' in state {} cannot {}",
            self.candidate_tag, from, action
        ))
    }
}
