//! Confidence scoring.
//!
//! Turns raw signals (match counts, OCR confidence, evidence sub-scores) into
//! a single 0-1 confidence bounded by the per-kind ceilings in
//! `locus_common::ceiling`.

use crate::config::EvidenceWeights;
use locus_common::ceiling;
use locus_common::{Point, Vector};
use regex::Regex;
use std::sync::OnceLock;

/// Multiple matches lower confidence instead of failing:
/// `max(0.3, base - 0.2 * (count - 1))`. Zero matches scores 0.
pub fn penalize_matches(base: f64, match_count: usize) -> f64 {
    if match_count == 0 {
        return 0.0;
    }
    let extra = (match_count - 1) as f64;
    (base - ceiling::AMBIGUITY_PENALTY * extra).max(ceiling::STRUCTURAL_FLOOR)
}

/// Map an OCR engine confidence (0-100) onto the visual-text ceiling.
pub fn ocr_confidence(engine_confidence: f64) -> f64 {
    (engine_confidence / 100.0).clamp(0.0, 1.0).min(ceiling::VISUAL_TEXT)
}

/// Coordinates never fail; a live node under the point earns a small boost.
pub fn coordinates_confidence(node_present: bool, boost: f64, cap: f64) -> f64 {
    if node_present {
        (ceiling::COORDINATES + boost).min(cap)
    } else {
        ceiling::COORDINATES
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorSyntax {
    Css,
    XPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorClass {
    /// Anchored on an attribute (id, test id, name, aria-*).
    AttributeBased,
    /// Depends on document position (`div[3]`, `:nth-child`).
    Positional,
}

fn positional_xpath() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\s*\d+\s*\]|^/html|position\(\)").expect("valid regex"))
}

fn positional_css() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r":nth-(child|of-type|last-child|last-of-type)\(|:first-child|:last-child")
            .expect("valid regex")
    })
}

fn attribute_anchor() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"#[A-Za-z_\-\\]|\[\s*@?[A-Za-z_\-:]+\s*[~|^$*]?=").expect("valid regex")
    })
}

pub fn selector_syntax(selector: &str) -> SelectorSyntax {
    let trimmed = selector.trim_start();
    if trimmed.starts_with('/') || trimmed.starts_with("./") || trimmed.starts_with("(/") {
        SelectorSyntax::XPath
    } else {
        SelectorSyntax::Css
    }
}

pub fn classify_selector(selector: &str) -> SelectorClass {
    let positional = match selector_syntax(selector) {
        SelectorSyntax::XPath => positional_xpath().is_match(selector),
        SelectorSyntax::Css => positional_css().is_match(selector),
    };
    if positional || !attribute_anchor().is_match(selector) {
        SelectorClass::Positional
    } else {
        SelectorClass::AttributeBased
    }
}

pub fn structural_base(selector: &str) -> f64 {
    match classify_selector(selector) {
        SelectorClass::AttributeBased => ceiling::STRUCTURAL_ATTRIBUTE,
        SelectorClass::Positional => ceiling::STRUCTURAL_POSITIONAL,
    }
}

/// Neutral score for a signal with no evidence behind it.
pub const NEUTRAL: f64 = 0.5;

/// Independently weighted sub-scores for one evidence candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvidenceScore {
    pub tag: f64,
    pub id: f64,
    pub classes: f64,
    pub distance: f64,
    pub direction: f64,
}

impl EvidenceScore {
    pub fn weighted(&self, weights: &EvidenceWeights) -> f64 {
        let total =
            weights.tag + weights.id + weights.classes + weights.distance + weights.direction;
        if total <= 0.0 {
            return 0.0;
        }
        (self.tag * weights.tag
            + self.id * weights.id
            + self.classes * weights.classes
            + self.distance * weights.distance
            + self.direction * weights.direction)
            / total
    }
}

pub fn tag_score(expected: Option<&str>, actual: &str) -> f64 {
    match expected {
        None => NEUTRAL,
        Some(e) if e.eq_ignore_ascii_case(actual) => 1.0,
        Some(_) => 0.0,
    }
}

pub fn id_score(expected: Option<&str>, actual: Option<&str>) -> f64 {
    match expected {
        None => NEUTRAL,
        Some(e) if Some(e) == actual => 1.0,
        Some(_) => 0.0,
    }
}

/// Fraction of the expected classes present on the candidate.
pub fn class_overlap(expected: &[String], actual: &[&str]) -> f64 {
    if expected.is_empty() {
        return NEUTRAL;
    }
    let hits = expected
        .iter()
        .filter(|c| actual.contains(&c.as_str()))
        .count();
    hits as f64 / expected.len() as f64
}

/// 1 at the endpoint, falling linearly to 0 at `max_distance`.
pub fn distance_score(distance: f64, max_distance: f64) -> f64 {
    if max_distance <= 0.0 {
        return if distance <= 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - distance / max_distance).clamp(0.0, 1.0)
}

/// How well the candidate lies along the cursor's approach.
///
/// Dot product of the trail direction with the endpoint-to-candidate
/// direction, mapped from `[-1, 1]` to `[0, 1]`. No trail is neutral; a
/// candidate right under the endpoint is fully aligned.
pub fn direction_score(trail: Option<&Vector>, endpoint: &Point, candidate: &Point) -> f64 {
    let Some(direction) = trail.and_then(Vector::normalized) else {
        return NEUTRAL;
    };
    match Vector::between(endpoint, candidate).normalized() {
        Some(towards) => (direction.dot(&towards) + 1.0) / 2.0,
        None => 1.0,
    }
}

pub fn evidence_confidence(score: f64) -> f64 {
    score.clamp(0.0, 1.0).min(ceiling::EVIDENCE_SCORED)
}
