use crate::strategy::{LocatorStrategy, StrategyKind};
use crate::time::now_millis;
use serde::{Deserialize, Serialize};

/// Upper bound on strategies kept per step, to bound replay cost.
pub const MAX_CHAIN_LENGTH: usize = 7;

/// Strategies for one recorded step, tried in order.
///
/// Built by the chain builder so that confidences are non-increasing,
/// near-duplicates are removed and a coordinates strategy sits at the tail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackChain {
    pub strategies: Vec<LocatorStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_strategy: Option<StrategyKind>,
    /// Milliseconds since the Unix epoch.
    pub recorded_at: u64,
}

impl FallbackChain {
    /// Wrap an already-ordered list of strategies.
    pub fn from_ordered(strategies: Vec<LocatorStrategy>) -> Self {
        let primary_strategy = strategies.first().map(LocatorStrategy::kind);
        Self {
            strategies,
            primary_strategy,
            recorded_at: now_millis(),
        }
    }

    pub fn empty() -> Self {
        Self::from_ordered(vec![])
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocatorStrategy> {
        self.strategies.iter()
    }

    pub fn is_ordered(&self) -> bool {
        self.strategies
            .windows(2)
            .all(|w| w[0].confidence >= w[1].confidence)
    }

    pub fn ends_with_coordinates(&self) -> bool {
        self.strategies
            .last()
            .is_some_and(|s| s.kind() == StrategyKind::Coordinates)
    }
}

impl<'a> IntoIterator for &'a FallbackChain {
    type Item = &'a LocatorStrategy;
    type IntoIter = std::slice::Iter<'a, LocatorStrategy>;

    fn into_iter(self) -> Self::IntoIter {
        self.strategies.iter()
    }
}
