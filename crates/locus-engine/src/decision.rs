//! Replay-time resolution: first qualifying strategy wins.

use crate::evaluators::EvaluatorRegistry;
use locus_common::{DevToolsClient, DevToolsError, FallbackChain, StrategyEvaluation};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Fallback chain is empty")]
    EmptyChain,

    #[error("Click failed: {0}")]
    Click(#[from] DevToolsError),
}

/// Walks a chain in order and stops at the first strategy that is found
/// with enough confidence. Evaluation is strictly sequential.
///
/// When nothing qualifies, the last attempted result comes back with
/// `below_threshold` set and its raw `found` flag untouched; callers decide
/// whether a found-but-weak result is good enough.
pub struct DecisionEngine {
    registry: Arc<EvaluatorRegistry>,
}

impl DecisionEngine {
    pub fn new(registry: Arc<EvaluatorRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<EvaluatorRegistry> {
        &self.registry
    }

    pub async fn resolve(
        &self,
        page: &dyn DevToolsClient,
        chain: &FallbackChain,
        min_confidence: f64,
    ) -> Result<StrategyEvaluation, ResolveError> {
        let mut last = None;

        for (position, strategy) in chain.iter().enumerate() {
            let evaluation = self.registry.evaluate(page, strategy).await;
            if evaluation.qualifies(min_confidence) {
                tracing::info!(
                    "Resolved with {} at position {} (confidence {:.2})",
                    strategy.kind(),
                    position,
                    evaluation.confidence
                );
                return Ok(evaluation);
            }
            last = Some(evaluation);
        }

        let mut last = last.ok_or(ResolveError::EmptyChain)?;
        last.below_threshold = true;
        tracing::warn!(
            "No strategy reached {:.2}; returning {} result (found={}, confidence {:.2})",
            min_confidence,
            last.strategy.kind(),
            last.found,
            last.confidence
        );
        Ok(last)
    }

    /// Resolve, then click the qualifying point. Below-threshold results are
    /// returned without clicking.
    pub async fn resolve_and_click(
        &self,
        page: &dyn DevToolsClient,
        chain: &FallbackChain,
        min_confidence: f64,
    ) -> Result<StrategyEvaluation, ResolveError> {
        let evaluation = self.resolve(page, chain, min_confidence).await?;
        if !evaluation.below_threshold
            && let Some(point) = evaluation.click_point
        {
            page.click_at(point).await?;
        }
        Ok(evaluation)
    }
}
