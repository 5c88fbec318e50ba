//! Strategy evaluators and the registry that dispatches to them.
//!
//! An evaluator never fails: every failure mode ends up as `found = false`
//! plus an error on the returned `StrategyEvaluation`.

pub mod coordinates;
pub mod evidence;
pub mod semantic;
pub mod structural;
pub mod visual;

pub use coordinates::CoordinatesEvaluator;
pub use evidence::EvidenceEvaluator;
pub use semantic::SemanticEvaluator;
pub use structural::StructuralEvaluator;
pub use visual::VisualTextEvaluator;

use crate::config::LocusConfig;
use crate::ocr_service::OcrService;
use async_trait::async_trait;
use locus_common::{
    DevToolsClient, DevToolsError, LocateError, LocatorStrategy, StrategyEvaluation, StrategyKind,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[async_trait]
pub trait StrategyEvaluator: Send + Sync {
    fn name(&self) -> &'static str;

    fn handles(&self, kind: StrategyKind) -> bool;

    async fn evaluate(
        &self,
        page: &dyn DevToolsClient,
        strategy: &LocatorStrategy,
    ) -> StrategyEvaluation;
}

/// Dispatches strategies to evaluators by kind, with a per-call timeout.
///
/// Custom evaluators registered with `register` are consulted before the
/// defaults, so they can take over a kind.
pub struct EvaluatorRegistry {
    evaluators: Vec<Arc<dyn StrategyEvaluator>>,
    timeout: Duration,
}

impl EvaluatorRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            evaluators: Vec::new(),
            timeout,
        }
    }

    pub fn with_defaults(config: &LocusConfig, ocr: Option<Arc<OcrService>>) -> Self {
        let timeout = Duration::from_millis(config.resolution.evaluator_timeout_ms);
        let mut registry = Self::new(timeout);
        registry.evaluators = vec![
            Arc::new(StructuralEvaluator),
            Arc::new(SemanticEvaluator),
            Arc::new(VisualTextEvaluator::new(ocr, config.vision.use_cache)),
            // Hit-testing must finish well inside the registry timeout:
            // coordinates never fail.
            Arc::new(CoordinatesEvaluator::new(
                config.coordinates.clone(),
                timeout / 2,
            )),
            Arc::new(EvidenceEvaluator::new(config.evidence.clone())),
        ];
        registry
    }

    /// Register an evaluator ahead of everything already registered.
    pub fn register(&mut self, evaluator: Arc<dyn StrategyEvaluator>) {
        self.evaluators.insert(0, evaluator);
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn find(&self, kind: StrategyKind) -> Option<&Arc<dyn StrategyEvaluator>> {
        self.evaluators.iter().find(|e| e.handles(kind))
    }

    pub async fn evaluate(
        &self,
        page: &dyn DevToolsClient,
        strategy: &LocatorStrategy,
    ) -> StrategyEvaluation {
        let kind = strategy.kind();
        let Some(evaluator) = self.find(kind) else {
            return StrategyEvaluation::failed(
                strategy,
                LocateError::Configuration(format!("No evaluator handles {}", kind)),
            );
        };

        let started = Instant::now();
        let attempt = tokio::time::timeout(self.timeout, evaluator.evaluate(page, strategy));
        let evaluation = match attempt.await {
            Ok(evaluation) => evaluation,
            Err(_) => {
                let ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!("{} evaluator timed out after {} ms", evaluator.name(), ms);
                StrategyEvaluation::failed(strategy, LocateError::Timeout(ms))
            }
        }
        .with_duration(started.elapsed());

        tracing::debug!(
            "{} -> found={} confidence={:.2} ({} ms){}",
            strategy.describe(),
            evaluation.found,
            evaluation.confidence,
            evaluation.duration_ms,
            evaluation
                .error
                .as_deref()
                .map(|e| format!(" error: {}", e))
                .unwrap_or_default()
        );
        evaluation
    }
}

/// Invalid selectors are the strategy's fault, everything else is transport.
pub(crate) fn devtools_failure(error: DevToolsError) -> LocateError {
    match error {
        DevToolsError::SelectorInvalid { selector } => {
            LocateError::Configuration(format!("Invalid selector: {}", selector))
        }
        other => LocateError::Transport(other),
    }
}

pub(crate) fn wrong_kind(evaluator: &str, strategy: &LocatorStrategy) -> LocateError {
    LocateError::Configuration(format!(
        "{} evaluator cannot handle {} strategies",
        evaluator,
        strategy.kind()
    ))
}

/// CSS attribute value, double-quoted.
pub(crate) fn css_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// XPath string literal. XPath 1.0 has no escapes, so mixed quotes need `concat`.
pub(crate) fn xpath_literal(value: &str) -> String {
    if !value.contains('"') {
        return format!("\"{}\"", value);
    }
    if !value.contains('\'') {
        return format!("'{}'", value);
    }
    let parts: Vec<String> = value
        .split('"')
        .map(|part| format!("\"{}\"", part))
        .collect();
    format!("concat({})", parts.join(", '\"', "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_css_string_escapes_quotes() {
        assert_eq!(css_string("save"), "\"save\"");
        assert_eq!(css_string("a\"b"), "\"a\\\"b\"");
    }

    #[test]
    fn test_xpath_literal_quoting() {
        assert_eq!(xpath_literal("Checkout"), "\"Checkout\"");
        assert_eq!(xpath_literal("say \"hi\""), "'say \"hi\"'");
        assert_eq!(
            xpath_literal("it's \"x\""),
            "concat(\"it's \", '\"', \"x\", '\"', \"\")"
        );
    }
}
