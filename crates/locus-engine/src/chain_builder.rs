//! Capture-time fallback chain construction.

use crate::scoring::{penalize_matches, structural_base};
use locus_common::ceiling;
use locus_common::{
    AttributeQuery, CapturedEvidence, CoordinatesMetadata, EvidenceMetadata, FallbackChain,
    LocatorStrategy, MAX_CHAIN_LENGTH, RoleQuery, SelectorMetadata, StrategyKind,
    StrategyTarget, VisualTextQuery,
};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Builds chains that are ordered by non-increasing confidence, free of
/// near-duplicates, capped in length, and terminated by a coordinates strategy.
#[derive(Debug, Clone)]
pub struct ChainBuilder {
    max_length: usize,
}

impl Default for ChainBuilder {
    fn default() -> Self {
        Self::new(MAX_CHAIN_LENGTH)
    }
}

impl ChainBuilder {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length: max_length.max(1),
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Build a chain from everything the capture layer observed.
    pub fn build(&self, evidence: &CapturedEvidence) -> FallbackChain {
        self.assemble(strategies_from_evidence(evidence))
    }

    /// Merge an operator-supplied strategy into an existing chain.
    /// The new strategy wins over an existing near-duplicate. A new point
    /// replaces the recorded coordinates fallback outright.
    pub fn merge(&self, chain: &FallbackChain, strategy: LocatorStrategy) -> FallbackChain {
        let replaces_point = strategy.kind() == StrategyKind::Coordinates;
        let mut strategies = Vec::with_capacity(chain.len() + 1);
        strategies.push(strategy);
        strategies.extend(
            chain
                .strategies
                .iter()
                .filter(|s| !(replaces_point && s.kind() == StrategyKind::Coordinates))
                .cloned(),
        );
        self.assemble(strategies)
    }

    /// Sort, dedupe, truncate and pin the coordinates fallback to the tail.
    pub fn assemble(&self, strategies: Vec<LocatorStrategy>) -> FallbackChain {
        let (coordinates, mut rest): (Vec<_>, Vec<_>) = strategies
            .into_iter()
            .partition(|s| s.kind() == StrategyKind::Coordinates);

        // Stable: on equal confidence, earlier (preferred) evidence stays first.
        rest.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut seen = HashSet::new();
        rest.retain(|s| seen.insert(dedupe_key(s)));

        // On a tie the earliest point wins.
        let tail = coordinates
            .into_iter()
            .reduce(|best, next| if next.confidence > best.confidence { next } else { best });

        let room = if tail.is_some() {
            self.max_length - 1
        } else {
            self.max_length
        };
        rest.truncate(room);

        if let Some(mut tail) = tail {
            // Keep the ordering invariant; the coordinates evaluator scores
            // live from its own base, not from the recorded value.
            if let Some(prev) = rest.last() {
                tail.confidence = tail.confidence.min(prev.confidence);
            }
            rest.push(tail);
        } else if !rest.is_empty() {
            tracing::warn!("Chain built without a coordinates fallback: no interaction point");
        }

        FallbackChain::from_ordered(rest)
    }
}

/// One strategy per available evidence source, in preference order for ties.
pub fn strategies_from_evidence(evidence: &CapturedEvidence) -> Vec<LocatorStrategy> {
    let mut strategies = Vec::new();

    if let Some(id) = non_empty(&evidence.element_id) {
        strategies.push(structural(&id_selector(id), Some(1)));
    }
    for selector in [&evidence.css_selector, &evidence.xpath]
        .into_iter()
        .filter_map(non_empty)
    {
        strategies.push(structural(selector, evidence.selector_match_count));
    }

    if let Some(role) = non_empty(&evidence.role) {
        let name = non_empty(&evidence.accessible_name).map(str::to_string);
        let query = RoleQuery {
            role: role.to_string(),
            exact: name.is_some(),
            name,
            states: evidence.states.clone(),
        };
        let confidence = query.ceiling();
        strategies.push(LocatorStrategy::role(query, confidence));
    }

    let attributes = AttributeQuery {
        test_id: evidence.test_id.clone(),
        label: evidence.label.clone(),
        placeholder: evidence.placeholder.clone(),
        text: evidence.text.clone(),
        alt_text: evidence.alt_text.clone(),
        title: evidence.title.clone(),
        exact: true,
    };
    if let Some(confidence) = attributes.ceiling() {
        strategies.push(LocatorStrategy::attribute(attributes, confidence));
    }

    let point = evidence.interaction_point();

    if let Some(endpoint) = point {
        let metadata = EvidenceMetadata {
            endpoint,
            expected_tag: non_empty(&evidence.tag).map(str::to_lowercase),
            expected_id: non_empty(&evidence.element_id).map(str::to_string),
            expected_classes: evidence.classes.clone(),
            trail_direction: evidence.trail_direction(),
        };
        if metadata.has_attribute_evidence() || metadata.trail_direction.is_some() {
            strategies.push(LocatorStrategy::evidence(
                metadata,
                ceiling::EVIDENCE_SCORED,
            ));
        }
    }

    if let Some(text) = non_empty(&evidence.visual_text).or_else(|| non_empty(&evidence.text)) {
        strategies.push(LocatorStrategy::visual_text(
            VisualTextQuery::new(text),
            ceiling::VISUAL_TEXT,
        ));
    }

    if let Some(point) = point {
        strategies.push(LocatorStrategy::new(
            StrategyTarget::Coordinates(CoordinatesMetadata {
                x: point.x,
                y: point.y,
                bounding_rect: evidence.bounding_rect,
                validate_element_exists: false,
            }),
            None,
            ceiling::COORDINATES,
        ));
    }

    strategies
}

fn structural(selector: &str, match_count: Option<usize>) -> LocatorStrategy {
    let base = structural_base(selector);
    let confidence = match match_count {
        Some(count) if count > 0 => penalize_matches(base, count),
        _ => base,
    };
    LocatorStrategy::new(
        StrategyTarget::StructuralSelector(SelectorMetadata {
            capture_match_count: match_count,
        }),
        Some(selector.trim().to_string()),
        confidence,
    )
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn id_selector(id: &str) -> String {
    let plain = id
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if plain {
        format!("#{}", id)
    } else {
        format!("[id=\"{}\"]", id.replace('"', "\\\""))
    }
}

fn id_only_selector() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r#"^(?:#([A-Za-z_][\w\-]*)"#,
            r#"|\[\s*id\s*=\s*["']?([^"'\]]+)["']?\s*\]"#,
            r#"|//\*\[\s*@id\s*=\s*["']([^"']+)["']\s*\])$"#,
        ))
        .expect("valid regex")
    })
}

/// Identity used to detect near-duplicate strategies.
///
/// `#x`, `[id="x"]` and `//*[@id='x']` are the same selector.
fn dedupe_key(strategy: &LocatorStrategy) -> (StrategyKind, String) {
    let key = match &strategy.target {
        StrategyTarget::StructuralSelector(_) => {
            let selector = strategy
                .selector
                .as_deref()
                .unwrap_or_default()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            match id_only_selector().captures(&selector) {
                Some(caps) => {
                    let id = caps
                        .get(1)
                        .or_else(|| caps.get(2))
                        .or_else(|| caps.get(3))
                        .map(|m| m.as_str())
                        .unwrap_or_default();
                    format!("id={}", id)
                }
                None => selector,
            }
        }
        StrategyTarget::SemanticRole(q) => format!(
            "{}|{}",
            q.role.to_lowercase(),
            q.name.as_deref().unwrap_or_default().trim().to_lowercase()
        ),
        StrategyTarget::SemanticAttribute(q) => q
            .lookups()
            .iter()
            .map(|(lookup, value)| format!("{}={}", lookup.as_str(), value.to_lowercase()))
            .collect::<Vec<_>>()
            .join("|"),
        StrategyTarget::VisualText(q) => q.target_text.trim().to_lowercase(),
        StrategyTarget::Coordinates(c) => format!("{:.0},{:.0}", c.x, c.y),
        StrategyTarget::EvidenceScored(e) => format!("{:.0},{:.0}", e.endpoint.x, e.endpoint.y),
    };
    (strategy.kind(), key)
}
