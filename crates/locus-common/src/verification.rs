//! Verification session state: per-step lifecycle, summary and events.
//!
//! Step lifecycle:
//! `pending -> verifying -> verified | flagged`, `flagged -> repaired`,
//! and `pending -> skipped` for navigation steps.

use crate::chain::FallbackChain;
use crate::evaluation::StrategyEvaluation;
use crate::step::{RecordedStep, StepKind};
use crate::strategy::LocatorStrategy;
use crate::time::now_millis;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Verifying,
    Verified,
    Flagged,
    Repaired,
    Skipped,
}

impl StepState {
    /// Verified, flagged, repaired or skipped.
    pub fn is_processed(&self) -> bool {
        !matches!(self, StepState::Pending | StepState::Verifying)
    }

    /// Verified, repaired or skipped: nothing left for the operator to fix.
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            StepState::Verified | StepState::Repaired | StepState::Skipped
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid step transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: StepState,
    pub to: StepState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlagReason {
    /// The step has no strategies and none could be synthesized.
    NoStrategies,
    /// Every strategy failed with an error.
    AllErrored { first_error: String, count: usize },
    /// Something ran cleanly but nothing reached the threshold.
    #[serde(rename_all = "camelCase")]
    BelowThreshold {
        best_confidence: f64,
        min_confidence: f64,
    },
}

impl fmt::Display for FlagReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagReason::NoStrategies => write!(f, "No locator strategies available"),
            FlagReason::AllErrored { first_error, count } => {
                write!(f, "All {} strategies failed (first: {})", count, first_error)
            }
            FlagReason::BelowThreshold {
                best_confidence,
                min_confidence,
            } => write!(
                f,
                "Best confidence {:.2} is below the {:.2} threshold",
                best_confidence, min_confidence
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRepair {
    pub new_strategy: LocatorStrategy,
    /// Live confidence the repair strategy achieved when it was tested.
    pub confidence: f64,
    pub applied_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepVerification {
    pub step_index: usize,
    pub step_id: String,
    pub step_kind: StepKind,
    pub state: StepState,
    /// The chain under test. Repairs merge their strategy into it.
    pub chain: FallbackChain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_strategy: Option<LocatorStrategy>,
    pub confidence: f64,
    #[serde(default)]
    pub strategy_results: Vec<StrategyEvaluation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag_reason: Option<FlagReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repair: Option<StepRepair>,
}

impl StepVerification {
    pub fn pending(step_index: usize, step: &RecordedStep, chain: FallbackChain) -> Self {
        Self {
            step_index,
            step_id: step.id.clone(),
            step_kind: step.kind,
            state: StepState::Pending,
            chain,
            working_strategy: None,
            confidence: 0.0,
            strategy_results: vec![],
            flag_reason: None,
            repair: None,
        }
    }

    fn transition(&mut self, from: &[StepState], to: StepState) -> Result<(), TransitionError> {
        if !from.contains(&self.state) {
            return Err(TransitionError {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    pub fn begin(&mut self) -> Result<(), TransitionError> {
        self.transition(&[StepState::Pending], StepState::Verifying)
    }

    /// Drop an in-flight verification, e.g. after a stop. Results are discarded.
    pub fn abandon(&mut self) -> Result<(), TransitionError> {
        self.transition(&[StepState::Verifying], StepState::Pending)
    }

    pub fn skip(&mut self) -> Result<(), TransitionError> {
        self.transition(&[StepState::Pending], StepState::Skipped)
    }

    pub fn mark_verified(
        &mut self,
        winner: &StrategyEvaluation,
        results: Vec<StrategyEvaluation>,
    ) -> Result<(), TransitionError> {
        self.transition(&[StepState::Verifying], StepState::Verified)?;
        self.working_strategy = Some(winner.strategy.clone());
        self.confidence = winner.confidence;
        self.strategy_results = results;
        self.flag_reason = None;
        Ok(())
    }

    pub fn mark_flagged(
        &mut self,
        reason: FlagReason,
        results: Vec<StrategyEvaluation>,
    ) -> Result<(), TransitionError> {
        self.transition(&[StepState::Verifying], StepState::Flagged)?;
        self.working_strategy = None;
        self.confidence = results.iter().map(|r| r.confidence).fold(0.0, f64::max);
        self.strategy_results = results;
        self.flag_reason = Some(reason);
        Ok(())
    }

    /// Promote a flagged step. The flag reason is kept for the record.
    pub fn apply_repair(
        &mut self,
        repair: StepRepair,
        chain: FallbackChain,
    ) -> Result<(), TransitionError> {
        self.transition(&[StepState::Flagged], StepState::Repaired)?;
        self.working_strategy = Some(repair.new_strategy.clone());
        self.confidence = repair.confidence;
        self.chain = chain;
        self.repair = Some(StepRepair {
            applied_at: if repair.applied_at == 0 {
                now_millis()
            } else {
                repair.applied_at
            },
            ..repair
        });
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSummary {
    pub total_steps: usize,
    pub verified_count: usize,
    pub flagged_count: usize,
    pub repaired_count: usize,
    pub skipped_count: usize,
    /// `(verified + repaired) / (total - skipped)`; 0 when nothing was checkable.
    pub verification_rate: f64,
    pub can_save: bool,
}

impl VerificationSummary {
    pub fn from_steps(steps: &[StepVerification]) -> Self {
        let count = |state: StepState| steps.iter().filter(|s| s.state == state).count();
        let verified_count = count(StepState::Verified);
        let flagged_count = count(StepState::Flagged);
        let repaired_count = count(StepState::Repaired);
        let skipped_count = count(StepState::Skipped);
        let processed = steps.iter().filter(|s| s.state.is_processed()).count();

        let checkable = steps.len() - skipped_count;
        let verification_rate = if checkable == 0 {
            0.0
        } else {
            (verified_count + repaired_count) as f64 / checkable as f64
        };

        Self {
            total_steps: steps.len(),
            verified_count,
            flagged_count,
            repaired_count,
            skipped_count,
            verification_rate,
            can_save: flagged_count == 0 && processed > 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Paused,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSession {
    pub id: String,
    pub status: SessionStatus,
    pub steps: Vec<StepVerification>,
    pub summary: VerificationSummary,
    pub started_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<u64>,
    /// Completed because of an explicit stop rather than by running out of steps.
    #[serde(default)]
    pub cancelled: bool,
}

impl VerificationSession {
    pub fn new(id: impl Into<String>, steps: Vec<StepVerification>) -> Self {
        let summary = VerificationSummary::from_steps(&steps);
        Self {
            id: id.into(),
            status: SessionStatus::Running,
            steps,
            summary,
            started_at: now_millis(),
            ended_at: None,
            cancelled: false,
        }
    }

    pub fn refresh_summary(&mut self) -> &VerificationSummary {
        self.summary = VerificationSummary::from_steps(&self.steps);
        &self.summary
    }

    pub fn is_complete(&self) -> bool {
        self.status == SessionStatus::Complete
    }

    /// Terminal. Later calls keep the first `ended_at`.
    pub fn complete(&mut self, cancelled: bool) {
        if self.is_complete() {
            return;
        }
        self.status = SessionStatus::Complete;
        self.cancelled = cancelled;
        self.ended_at = Some(now_millis());
        self.refresh_summary();
    }

    /// Chains of repaired steps, ready to be written back by the persistence layer.
    pub fn repaired_chains(&self) -> Vec<(usize, &FallbackChain)> {
        self.steps
            .iter()
            .filter(|s| s.state == StepState::Repaired)
            .map(|s| (s.step_index, &s.chain))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationEventKind {
    StepStarted,
    StepComplete,
    SessionComplete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationEvent {
    #[serde(rename = "type")]
    pub kind: VerificationEventKind,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_state: Option<StepVerification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<VerificationSummary>,
}
