use super::{StrategyEvaluator, wrong_kind};
use crate::config::CoordinatesConfig;
use crate::scoring::coordinates_confidence;
use async_trait::async_trait;
use locus_common::{
    CoordinatesMetadata, DevToolsClient, LocatorStrategy, StrategyEvaluation, StrategyKind,
    StrategyTarget,
};
use std::time::Duration;

/// Terminal fallback: always found at the stored point.
///
/// With validation on, a live node under the point earns a small boost.
/// A failed or slow hit-test only loses the boost.
pub struct CoordinatesEvaluator {
    config: CoordinatesConfig,
    hit_test_timeout: Duration,
}

impl CoordinatesEvaluator {
    pub fn new(config: CoordinatesConfig, hit_test_timeout: Duration) -> Self {
        Self {
            config,
            hit_test_timeout,
        }
    }

    async fn evaluate_point(
        &self,
        page: &dyn DevToolsClient,
        strategy: &LocatorStrategy,
        metadata: &CoordinatesMetadata,
    ) -> StrategyEvaluation {
        let point = metadata.point();
        let validate = metadata.validate_element_exists || self.config.validate_element_exists;
        if !validate {
            return StrategyEvaluation::found(
                strategy,
                coordinates_confidence(false, self.config.boost, self.config.cap),
                point,
            );
        }

        let hit = tokio::time::timeout(self.hit_test_timeout, page.node_at_point(point)).await;
        let (handle, problem) = match hit {
            Ok(Ok(handle)) => (handle, None),
            Ok(Err(e)) => (None, Some(e.to_string())),
            Err(_) => (None, Some("hit-test timed out".to_string())),
        };

        let confidence =
            coordinates_confidence(handle.is_some(), self.config.boost, self.config.cap);
        let mut evaluation = StrategyEvaluation::found(strategy, confidence, point)
            .with_diagnostic("validated", handle.is_some());
        if let Some(handle) = handle {
            evaluation = evaluation.with_handle(handle);
        }
        if let Some(problem) = problem {
            tracing::warn!(
                "Coordinates validation failed at ({}, {}): {}",
                point.x,
                point.y,
                problem
            );
            evaluation = evaluation.with_diagnostic("validationError", problem);
        }
        evaluation
    }
}

#[async_trait]
impl StrategyEvaluator for CoordinatesEvaluator {
    fn name(&self) -> &'static str {
        "coordinates"
    }

    fn handles(&self, kind: StrategyKind) -> bool {
        kind == StrategyKind::Coordinates
    }

    async fn evaluate(
        &self,
        page: &dyn DevToolsClient,
        strategy: &LocatorStrategy,
    ) -> StrategyEvaluation {
        match &strategy.target {
            StrategyTarget::Coordinates(metadata) => {
                self.evaluate_point(page, strategy, metadata).await
            }
            _ => StrategyEvaluation::failed(strategy, wrong_kind(self.name(), strategy)),
        }
    }
}
