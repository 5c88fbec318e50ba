use crate::devtools::ElementHandle;
use crate::error::{FailureKind, LocateError};
use crate::geometry::Point;
use crate::strategy::LocatorStrategy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Outcome of evaluating one strategy against the live page.
///
/// Ephemeral: consumed by the decision engine, or kept for diagnostics by a
/// verification session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyEvaluation {
    pub strategy: LocatorStrategy,
    pub found: bool,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_handle: Option<ElementHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_point: Option<Point>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Set by the decision engine when no strategy qualified and this is the
    /// last attempted result handed back for diagnostics.
    #[serde(default)]
    pub below_threshold: bool,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl StrategyEvaluation {
    pub fn found(strategy: &LocatorStrategy, confidence: f64, click_point: Point) -> Self {
        Self {
            strategy: strategy.clone(),
            found: true,
            confidence: confidence.clamp(0.0, 1.0),
            resolved_handle: None,
            click_point: Some(click_point),
            duration_ms: 0,
            match_count: None,
            error: None,
            failure: None,
            below_threshold: false,
            metadata: Map::new(),
        }
    }

    pub fn failed(strategy: &LocatorStrategy, error: LocateError) -> Self {
        Self {
            strategy: strategy.clone(),
            found: false,
            confidence: 0.0,
            resolved_handle: None,
            click_point: None,
            duration_ms: 0,
            match_count: None,
            error: Some(error.to_string()),
            failure: Some(error.kind()),
            below_threshold: false,
            metadata: Map::new(),
        }
    }

    pub fn with_handle(mut self, handle: ElementHandle) -> Self {
        self.resolved_handle = Some(handle);
        self
    }

    pub fn with_match_count(mut self, count: usize) -> Self {
        self.match_count = Some(count);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_diagnostic(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// `found && confidence >= min_confidence`.
    pub fn qualifies(&self, min_confidence: f64) -> bool {
        self.found && self.confidence >= min_confidence
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
