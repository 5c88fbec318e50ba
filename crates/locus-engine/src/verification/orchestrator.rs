use super::listeners::{ListenerId, ListenerSet};
use crate::chain_builder::ChainBuilder;
use crate::config::VerificationConfig;
use crate::control::RunControl;
use crate::evaluators::EvaluatorRegistry;
use futures::future::join_all;
use locus_common::time::now_millis;
use locus_common::{
    DevToolsClient, FallbackChain, FlagReason, LocatorStrategy, RecordedStep, SessionStatus,
    StepRepair, StepState, StepVerification, StrategyEvaluation, TransitionError,
    VerificationEvent, VerificationEventKind, VerificationSession, VerificationSummary,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Verification cancelled")]
    Cancelled,

    #[error("A verification session is already running")]
    AlreadyRunning,

    #[error("No verification session")]
    NoSession,

    #[error("Step index {index} out of range ({len} steps)")]
    StepOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// How one step came out of an exhaustive chain evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Verified {
        winner: StrategyEvaluation,
        results: Vec<StrategyEvaluation>,
    },
    Flagged {
        reason: FlagReason,
        results: Vec<StrategyEvaluation>,
    },
}

/// The working strategy is the first qualifying one in chain order, i.e.
/// the one replay would pick.
pub fn classify(results: Vec<StrategyEvaluation>, min_confidence: f64) -> StepOutcome {
    if let Some(winner) = results.iter().find(|r| r.qualifies(min_confidence)) {
        return StepOutcome::Verified {
            winner: winner.clone(),
            results,
        };
    }

    let reason = if results.is_empty() {
        FlagReason::NoStrategies
    } else if results.iter().all(StrategyEvaluation::is_error) {
        FlagReason::AllErrored {
            first_error: results[0].error.clone().unwrap_or_default(),
            count: results.len(),
        }
    } else {
        FlagReason::BelowThreshold {
            best_confidence: results.iter().map(|r| r.confidence).fold(0.0, f64::max),
            min_confidence,
        }
    };
    StepOutcome::Flagged { reason, results }
}

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_session_id() -> String {
    format!(
        "verify-{}-{}",
        now_millis(),
        SESSION_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// Re-checks every recorded step against the current page without acting,
/// and takes operator repairs for the steps that no longer resolve.
///
/// Steps run in recorded order. Within a step every strategy is evaluated,
/// concurrently unless configured otherwise. Pause and stop are observed at
/// step boundaries; an evaluation already in flight when stop arrives is
/// allowed to finish and its results are dropped.
pub struct VerificationOrchestrator {
    registry: Arc<EvaluatorRegistry>,
    config: VerificationConfig,
    builder: ChainBuilder,
    control: RunControl,
    session: Mutex<Option<VerificationSession>>,
    listeners: ListenerSet,
}

impl VerificationOrchestrator {
    pub fn new(registry: Arc<EvaluatorRegistry>, config: VerificationConfig) -> Self {
        Self {
            registry,
            config,
            builder: ChainBuilder::default(),
            control: RunControl::new(),
            session: Mutex::new(None),
            listeners: ListenerSet::default(),
        }
    }

    /// Builder used for chains synthesized from raw evidence and for repairs.
    pub fn with_chain_builder(mut self, builder: ChainBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Handle for pausing or stopping from another task.
    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    pub fn subscribe(
        &self,
        listener: impl Fn(&VerificationEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.listeners.subscribe(Arc::new(listener))
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Snapshot of the current (or last) session.
    pub fn session(&self) -> Option<VerificationSession> {
        self.lock().clone()
    }

    pub fn summary(&self) -> Option<VerificationSummary> {
        self.lock().as_ref().map(|s| s.summary.clone())
    }

    pub fn can_save(&self) -> bool {
        self.lock().as_ref().is_some_and(|s| s.summary.can_save)
    }

    pub fn pause(&self) -> bool {
        if !self.control.pause() {
            return false;
        }
        self.set_status(SessionStatus::Paused);
        tracing::info!("Verification paused");
        true
    }

    pub fn resume(&self) -> bool {
        if !self.control.resume() {
            return false;
        }
        self.set_status(SessionStatus::Running);
        tracing::info!("Verification resumed");
        true
    }

    pub fn stop(&self) {
        tracing::info!("Verification stop requested");
        self.control.stop();
    }

    pub async fn start_verification(
        &self,
        steps: &[RecordedStep],
        page: &dyn DevToolsClient,
    ) -> Result<VerificationSession, VerificationError> {
        {
            let mut guard = self.lock();
            if guard.as_ref().is_some_and(|s| !s.is_complete()) {
                return Err(VerificationError::AlreadyRunning);
            }
            let states = steps
                .iter()
                .enumerate()
                .map(|(index, step)| StepVerification::pending(index, step, self.chain_for(step)))
                .collect();
            let session = VerificationSession::new(next_session_id(), states);
            tracing::info!(
                "Verification session {} started with {} steps",
                session.id,
                steps.len()
            );
            *guard = Some(session);
        }
        self.control.reset();

        for (index, step) in steps.iter().enumerate() {
            if self.control.checkpoint().await.is_err() {
                return Err(self.cancel());
            }

            if step.is_navigation() {
                self.transition(index, VerificationEventKind::StepComplete, |s| Ok(s.skip()?))?;
                tracing::info!("Step {} ({}) skipped: navigation", index, step.id);
                continue;
            }

            let chain = self.transition(index, VerificationEventKind::StepStarted, |s| {
                s.begin()?;
                Ok(s.chain.clone())
            })?;

            let results = self.evaluate_chain(page, &chain).await;

            if self.control.is_stopped() {
                self.with_session(|session| {
                    session.steps[index].abandon()?;
                    Ok(())
                })?;
                return Err(self.cancel());
            }

            let outcome = classify(results, self.config.min_confidence);
            let state = self.transition(index, VerificationEventKind::StepComplete, |s| {
                match outcome {
                    StepOutcome::Verified { winner, results } => {
                        s.mark_verified(&winner, results)?
                    }
                    StepOutcome::Flagged { reason, results } => s.mark_flagged(reason, results)?,
                }
                Ok(s.state)
            })?;
            tracing::info!("Step {} ({}) {:?}", index, step.id, state);
        }

        let session = self.finish(false)?;
        tracing::info!(
            "Verification session {} complete: {}/{} verified, {} flagged",
            session.id,
            session.summary.verified_count,
            session.summary.total_steps,
            session.summary.flagged_count
        );
        Ok(session)
    }

    /// Test an operator-supplied strategy for a step.
    ///
    /// Steps that are already verified, repaired or skipped are left alone
    /// and report `true`. A flagged step is promoted only if the strategy is
    /// found with at least the repair threshold; otherwise it stays flagged
    /// and this returns `false`.
    pub async fn repair_step(
        &self,
        index: usize,
        strategy: LocatorStrategy,
        page: &dyn DevToolsClient,
    ) -> Result<bool, VerificationError> {
        let chain = self.with_session(|session| {
            let step = step_at(session, index)?;
            Ok(match step.state {
                state if state.is_resolved() => None,
                StepState::Flagged => Some(Some(step.chain.clone())),
                _ => Some(None),
            })
        })?;
        let chain = match chain {
            None => return Ok(true),
            Some(None) => return Ok(false),
            Some(Some(chain)) => chain,
        };

        let evaluation = self.registry.evaluate(page, &strategy).await;
        if !evaluation.qualifies(self.config.repair_min_confidence) {
            tracing::info!(
                "Repair of step {} rejected: {} (found={}, confidence {:.2})",
                index,
                strategy.describe(),
                evaluation.found,
                evaluation.confidence
            );
            return Ok(false);
        }

        let merged = self.builder.merge(&chain, strategy.clone());
        let repair = StepRepair {
            new_strategy: strategy,
            confidence: evaluation.confidence,
            applied_at: now_millis(),
        };
        let applied = self.transition(index, VerificationEventKind::StepComplete, |s| {
            if s.state == StepState::Repaired {
                return Ok(true);
            }
            s.apply_repair(repair, merged)?;
            s.strategy_results.push(evaluation);
            Ok(true)
        });
        match applied {
            Ok(done) => {
                tracing::info!("Step {} repaired", index);
                Ok(done)
            }
            Err(VerificationError::Transition(e)) => {
                tracing::warn!("Repair of step {} not applied: {}", index, e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn chain_for(&self, step: &RecordedStep) -> FallbackChain {
        match &step.fallback_chain {
            Some(chain) => chain.clone(),
            None if step.is_navigation() => FallbackChain::empty(),
            None => {
                tracing::debug!("Step {} has no chain; synthesizing from evidence", step.id);
                self.builder.build(&step.evidence)
            }
        }
    }

    async fn evaluate_chain(
        &self,
        page: &dyn DevToolsClient,
        chain: &FallbackChain,
    ) -> Vec<StrategyEvaluation> {
        if self.config.concurrent_strategies {
            join_all(chain.iter().map(|s| self.registry.evaluate(page, s))).await
        } else {
            let mut results = Vec::with_capacity(chain.len());
            for strategy in chain {
                results.push(self.registry.evaluate(page, strategy).await);
            }
            results
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<VerificationSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_session<T>(
        &self,
        f: impl FnOnce(&mut VerificationSession) -> Result<T, VerificationError>,
    ) -> Result<T, VerificationError> {
        let mut guard = self.lock();
        let session = guard.as_mut().ok_or(VerificationError::NoSession)?;
        f(session)
    }

    fn set_status(&self, status: SessionStatus) {
        if let Some(session) = self.lock().as_mut()
            && !session.is_complete()
        {
            session.status = status;
        }
    }

    /// Apply a step change, refresh the summary and notify listeners.
    fn transition<T>(
        &self,
        index: usize,
        kind: VerificationEventKind,
        change: impl FnOnce(&mut StepVerification) -> Result<T, VerificationError>,
    ) -> Result<T, VerificationError> {
        let (value, event) = self.with_session(|session| {
            let value = change(step_at(session, index)?)?;
            session.refresh_summary();
            let event = VerificationEvent {
                kind,
                session_id: session.id.clone(),
                step_index: Some(index),
                step_state: Some(session.steps[index].clone()),
                summary: Some(session.summary.clone()),
            };
            Ok((value, event))
        })?;
        self.listeners.emit(&event);
        Ok(value)
    }

    fn finish(&self, cancelled: bool) -> Result<VerificationSession, VerificationError> {
        let session = self.with_session(|session| {
            session.complete(cancelled);
            Ok(session.clone())
        })?;
        self.listeners.emit(&VerificationEvent {
            kind: VerificationEventKind::SessionComplete,
            session_id: session.id.clone(),
            step_index: None,
            step_state: None,
            summary: Some(session.summary.clone()),
        });
        Ok(session)
    }

    fn cancel(&self) -> VerificationError {
        match self.finish(true) {
            Ok(session) => {
                tracing::info!("Verification session {} cancelled", session.id);
                VerificationError::Cancelled
            }
            Err(e) => e,
        }
    }
}

fn step_at(
    session: &mut VerificationSession,
    index: usize,
) -> Result<&mut StepVerification, VerificationError> {
    let len = session.steps.len();
    session
        .steps
        .get_mut(index)
        .ok_or(VerificationError::StepOutOfRange { index, len })
}
