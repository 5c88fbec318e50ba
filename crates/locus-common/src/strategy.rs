//! Locator strategies: one recorded way of re-finding an element.
//!
//! A strategy's payload is determined by its kind, so the kind and the
//! metadata travel together as one tagged enum (`StrategyTarget`). On the wire
//! this is `{ "type": "...", "metadata": {...}, "selector": ..., "confidence": ... }`.

use crate::geometry::{Point, Rect, Vector};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Confidence ceilings per strategy kind (and sub-kind).
///
/// Shared by capture-time chain building and live evaluation so a strategy's
/// recorded confidence and its live confidence are on the same scale.
pub mod ceiling {
    /// Id / test-id / attribute-anchored selectors.
    pub const STRUCTURAL_ATTRIBUTE: f64 = 0.95;
    /// Positional paths (`/html/body/div[3]/...`, `:nth-child`).
    pub const STRUCTURAL_POSITIONAL: f64 = 0.80;
    /// Floor applied after the multiple-match penalty.
    pub const STRUCTURAL_FLOOR: f64 = 0.30;
    /// Subtracted per additional match beyond the first.
    pub const AMBIGUITY_PENALTY: f64 = 0.20;

    pub const ROLE_WITH_NAME: f64 = 0.90;
    pub const ROLE_ONLY: f64 = 0.80;

    pub const TEST_ID: f64 = 0.90;
    pub const LABEL: f64 = 0.85;
    pub const PLACEHOLDER: f64 = 0.80;
    pub const TEXT: f64 = 0.75;
    pub const ALT_TEXT: f64 = 0.75;
    pub const TITLE: f64 = 0.70;

    pub const VISUAL_TEXT: f64 = 0.85;
    pub const EVIDENCE_SCORED: f64 = 0.85;

    pub const COORDINATES: f64 = 0.60;
    pub const COORDINATES_BOOST: f64 = 0.10;
    pub const COORDINATES_CAP: f64 = 0.70;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    StructuralSelector,
    SemanticRole,
    SemanticAttribute,
    VisualText,
    Coordinates,
    EvidenceScored,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 6] = [
        StrategyKind::StructuralSelector,
        StrategyKind::SemanticRole,
        StrategyKind::SemanticAttribute,
        StrategyKind::VisualText,
        StrategyKind::Coordinates,
        StrategyKind::EvidenceScored,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::StructuralSelector => "structural_selector",
            StrategyKind::SemanticRole => "semantic_role",
            StrategyKind::SemanticAttribute => "semantic_attribute",
            StrategyKind::VisualText => "visual_text",
            StrategyKind::Coordinates => "coordinates",
            StrategyKind::EvidenceScored => "evidence_scored",
        }
    }

    /// Highest confidence any strategy of this kind can report.
    pub fn ceiling(&self) -> f64 {
        match self {
            StrategyKind::StructuralSelector => ceiling::STRUCTURAL_ATTRIBUTE,
            StrategyKind::SemanticRole => ceiling::ROLE_WITH_NAME,
            StrategyKind::SemanticAttribute => ceiling::TEST_ID,
            StrategyKind::VisualText => ceiling::VISUAL_TEXT,
            StrategyKind::Coordinates => ceiling::COORDINATES_CAP,
            StrategyKind::EvidenceScored => ceiling::EVIDENCE_SCORED,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural selectors carry their selector in `LocatorStrategy::selector`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorMetadata {
    /// Matches observed by the capture layer when the selector was generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_match_count: Option<usize>,
}

/// Accessibility state filters. `None` means "don't care".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleStates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
}

impl RoleStates {
    pub fn is_empty(&self) -> bool {
        *self == RoleStates::default()
    }

    /// True if every filter set on `self` agrees with `actual`.
    /// A filter on a state the node doesn't report never matches.
    pub fn accepts(&self, actual: &RoleStates) -> bool {
        fn agrees<T: PartialEq>(wanted: &Option<T>, actual: &Option<T>) -> bool {
            match wanted {
                None => true,
                Some(w) => actual.as_ref() == Some(w),
            }
        }
        // An absent disabled/pressed/selected/checked flag means "false" in the AX tree.
        fn agrees_flag(wanted: &Option<bool>, actual: &Option<bool>) -> bool {
            match wanted {
                None => true,
                Some(w) => actual.unwrap_or(false) == *w,
            }
        }
        agrees_flag(&self.checked, &actual.checked)
            && agrees_flag(&self.disabled, &actual.disabled)
            && agrees_flag(&self.expanded, &actual.expanded)
            && agrees_flag(&self.pressed, &actual.pressed)
            && agrees_flag(&self.selected, &actual.selected)
            && agrees(&self.level, &actual.level)
    }
}

/// Accessibility-tree query: role plus optional accessible name and state filters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleQuery {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Require the accessible name to match exactly instead of by substring.
    #[serde(default)]
    pub exact: bool,
    #[serde(flatten)]
    pub states: RoleStates,
}

impl RoleQuery {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn ceiling(&self) -> f64 {
        if self.name.as_deref().is_some_and(|n| !n.trim().is_empty()) {
            ceiling::ROLE_WITH_NAME
        } else {
            ceiling::ROLE_ONLY
        }
    }
}

/// One attribute-based lookup, in the order they are attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeLookup {
    TestId,
    Label,
    Placeholder,
    Text,
    AltText,
    Title,
}

impl AttributeLookup {
    pub fn ceiling(&self) -> f64 {
        match self {
            AttributeLookup::TestId => ceiling::TEST_ID,
            AttributeLookup::Label => ceiling::LABEL,
            AttributeLookup::Placeholder => ceiling::PLACEHOLDER,
            AttributeLookup::Text => ceiling::TEXT,
            AttributeLookup::AltText => ceiling::ALT_TEXT,
            AttributeLookup::Title => ceiling::TITLE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeLookup::TestId => "test_id",
            AttributeLookup::Label => "label",
            AttributeLookup::Placeholder => "placeholder",
            AttributeLookup::Text => "text",
            AttributeLookup::AltText => "alt_text",
            AttributeLookup::Title => "title",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub exact: bool,
}

impl AttributeQuery {
    /// Non-empty lookups in priority order:
    /// test-id, label, placeholder, visible text, alt text, title.
    pub fn lookups(&self) -> Vec<(AttributeLookup, &str)> {
        [
            (AttributeLookup::TestId, &self.test_id),
            (AttributeLookup::Label, &self.label),
            (AttributeLookup::Placeholder, &self.placeholder),
            (AttributeLookup::Text, &self.text),
            (AttributeLookup::AltText, &self.alt_text),
            (AttributeLookup::Title, &self.title),
        ]
        .into_iter()
        .filter_map(|(lookup, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (lookup, v))
        })
        .collect()
    }

    /// Ceiling of the highest-priority lookup present.
    pub fn ceiling(&self) -> Option<f64> {
        self.lookups().first().map(|(lookup, _)| lookup.ceiling())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualTextQuery {
    pub target_text: String,
    #[serde(default)]
    pub exact: bool,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default = "default_true")]
    pub use_cache: bool,
}

impl VisualTextQuery {
    pub fn new(target_text: impl Into<String>) -> Self {
        Self {
            target_text: target_text.into(),
            exact: false,
            case_sensitive: false,
            use_cache: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatesMetadata {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_rect: Option<Rect>,
    /// Hit-test the point at evaluation time and boost confidence if a node is there.
    #[serde(default)]
    pub validate_element_exists: bool,
}

impl CoordinatesMetadata {
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceMetadata {
    pub endpoint: Point,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expected_classes: Vec<String>,
    /// Unit vector of the cursor's final approach.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trail_direction: Option<Vector>,
}

impl EvidenceMetadata {
    pub fn has_attribute_evidence(&self) -> bool {
        self.expected_tag.is_some()
            || self.expected_id.is_some()
            || !self.expected_classes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "metadata", rename_all = "snake_case")]
pub enum StrategyTarget {
    StructuralSelector(SelectorMetadata),
    SemanticRole(RoleQuery),
    SemanticAttribute(AttributeQuery),
    VisualText(VisualTextQuery),
    Coordinates(CoordinatesMetadata),
    EvidenceScored(EvidenceMetadata),
}

impl StrategyTarget {
    pub fn kind(&self) -> StrategyKind {
        match self {
            StrategyTarget::StructuralSelector(_) => StrategyKind::StructuralSelector,
            StrategyTarget::SemanticRole(_) => StrategyKind::SemanticRole,
            StrategyTarget::SemanticAttribute(_) => StrategyKind::SemanticAttribute,
            StrategyTarget::VisualText(_) => StrategyKind::VisualText,
            StrategyTarget::Coordinates(_) => StrategyKind::Coordinates,
            StrategyTarget::EvidenceScored(_) => StrategyKind::EvidenceScored,
        }
    }
}

/// One recorded method of re-locating an element. Immutable once captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatorStrategy {
    #[serde(flatten)]
    pub target: StrategyTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Confidence recorded at capture time, in `[0, 1]`.
    pub confidence: f64,
}

impl LocatorStrategy {
    pub fn new(target: StrategyTarget, selector: Option<String>, confidence: f64) -> Self {
        Self {
            target,
            selector,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn structural(selector: impl Into<String>, confidence: f64) -> Self {
        Self::new(
            StrategyTarget::StructuralSelector(SelectorMetadata::default()),
            Some(selector.into()),
            confidence,
        )
    }

    pub fn role(query: RoleQuery, confidence: f64) -> Self {
        Self::new(StrategyTarget::SemanticRole(query), None, confidence)
    }

    pub fn attribute(query: AttributeQuery, confidence: f64) -> Self {
        Self::new(StrategyTarget::SemanticAttribute(query), None, confidence)
    }

    pub fn visual_text(query: VisualTextQuery, confidence: f64) -> Self {
        Self::new(StrategyTarget::VisualText(query), None, confidence)
    }

    pub fn coordinates(point: Point) -> Self {
        Self::new(
            StrategyTarget::Coordinates(CoordinatesMetadata {
                x: point.x,
                y: point.y,
                bounding_rect: None,
                validate_element_exists: false,
            }),
            None,
            ceiling::COORDINATES,
        )
    }

    pub fn evidence(metadata: EvidenceMetadata, confidence: f64) -> Self {
        Self::new(StrategyTarget::EvidenceScored(metadata), None, confidence)
    }

    pub fn kind(&self) -> StrategyKind {
        self.target.kind()
    }

    /// Short human-readable description for logs and reports.
    pub fn describe(&self) -> String {
        match &self.target {
            StrategyTarget::StructuralSelector(_) => {
                format!("selector {}", self.selector.as_deref().unwrap_or("<none>"))
            }
            StrategyTarget::SemanticRole(q) => match &q.name {
                Some(name) => format!("role {} named {:?}", q.role, name),
                None => format!("role {}", q.role),
            },
            StrategyTarget::SemanticAttribute(q) => {
                let parts: Vec<String> = q
                    .lookups()
                    .iter()
                    .map(|(lookup, value)| format!("{}={:?}", lookup.as_str(), value))
                    .collect();
                format!("attributes [{}]", parts.join(", "))
            }
            StrategyTarget::VisualText(q) => format!("visual text {:?}", q.target_text),
            StrategyTarget::Coordinates(c) => format!("point ({:.0}, {:.0})", c.x, c.y),
            StrategyTarget::EvidenceScored(e) => {
                format!("evidence near ({:.0}, {:.0})", e.endpoint.x, e.endpoint.y)
            }
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_wire_format() {
        let strategy = LocatorStrategy::structural("#submit", 0.95);
        let value = serde_json::to_value(&strategy).unwrap();
        assert_eq!(value["type"], "structural_selector");
        assert_eq!(value["selector"], "#submit");
        assert!(value.get("metadata").is_some());

        let back: LocatorStrategy = serde_json::from_value(value).unwrap();
        assert_eq!(back, strategy);
    }

    #[test]
    fn test_role_metadata_from_json() {
        let json = r#"{
            "type": "semantic_role",
            "confidence": 0.9,
            "metadata": { "role": "button", "name": "Sign in", "disabled": false }
        }"#;
        let strategy: LocatorStrategy = serde_json::from_str(json).unwrap();
        assert_eq!(strategy.kind(), StrategyKind::SemanticRole);
        match strategy.target {
            StrategyTarget::SemanticRole(q) => {
                assert_eq!(q.role, "button");
                assert_eq!(q.name.as_deref(), Some("Sign in"));
                assert_eq!(q.states.disabled, Some(false));
                assert!(!q.exact);
            }
            other => panic!("unexpected target {:?}", other),
        }
    }

    #[test]
    fn test_attribute_lookup_priority_skips_blank_values() {
        let query = AttributeQuery {
            title: Some("Close".into()),
            label: Some("   ".into()),
            placeholder: Some("Search".into()),
            test_id: Some("search-box".into()),
            ..Default::default()
        };
        let order: Vec<AttributeLookup> = query.lookups().into_iter().map(|(l, _)| l).collect();
        assert_eq!(
            order,
            vec![
                AttributeLookup::TestId,
                AttributeLookup::Placeholder,
                AttributeLookup::Title
            ]
        );
        assert_eq!(query.ceiling(), Some(ceiling::TEST_ID));
    }

    #[test]
    fn test_role_states_accept() {
        let wanted = RoleStates {
            checked: Some(true),
            level: Some(2),
            ..Default::default()
        };
        let actual = RoleStates {
            checked: Some(true),
            level: Some(2),
            disabled: Some(true),
            ..Default::default()
        };
        assert!(wanted.accepts(&actual));
        assert!(!wanted.accepts(&RoleStates::default()));

        let not_disabled = RoleStates {
            disabled: Some(false),
            ..Default::default()
        };
        assert!(not_disabled.accepts(&RoleStates::default()));
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(LocatorStrategy::structural("a", 1.7).confidence, 1.0);
        assert_eq!(LocatorStrategy::structural("a", -0.2).confidence, 0.0);
    }
}
