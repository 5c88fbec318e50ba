//! OCR engine contract.
//!
//! Engines only have to implement `recognize`; `find_text` has a default
//! matcher over the recognized fragments that engines may replace.

use crate::geometry::{Point, Rect};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Minimum normalized Levenshtein similarity for a fuzzy (non-exact) match.
pub const FUZZY_SIMILARITY: f64 = 0.8;

/// A recognized run of text. `confidence` is on the engine's 0-100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrFragment {
    pub text: String,
    pub bounds: Rect,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FindTextOptions {
    pub exact: bool,
    pub case_sensitive: bool,
    pub use_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMatch {
    pub text: String,
    pub bounds: Rect,
    /// 0-100.
    pub confidence: f64,
    pub click_point: Point,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TextSearchResult {
    pub found: bool,
    /// 0-100, of the best match.
    pub confidence: f64,
    pub matched_text: Option<String>,
    pub click_point: Option<Point>,
    /// Every match, best first.
    pub all_matches: Vec<TextMatch>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum OcrError {
    #[error("OCR engine not initialized")]
    NotInitialized,

    #[error("OCR engine error: {0}")]
    Engine(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn initialize(&mut self) -> Result<(), OcrError>;

    async fn terminate(&mut self) -> Result<(), OcrError>;

    async fn recognize(&self, image: &[u8]) -> Result<Vec<OcrFragment>, OcrError>;

    async fn find_text(
        &self,
        image: &[u8],
        target: &str,
        options: FindTextOptions,
    ) -> Result<TextSearchResult, OcrError> {
        let fragments = self.recognize(image).await?;
        Ok(match_fragments(&fragments, target, options))
    }
}

/// Match `target` against recognized fragments.
///
/// Multi-word targets are also tried against runs of consecutive fragments,
/// since engines usually report one fragment per word.
pub fn match_fragments(
    fragments: &[OcrFragment],
    target: &str,
    options: FindTextOptions,
) -> TextSearchResult {
    let wanted = normalize(target, options.case_sensitive);
    if wanted.is_empty() || fragments.is_empty() {
        return TextSearchResult::default();
    }

    let max_run = wanted.split(' ').count().max(1);
    let mut matches = Vec::new();

    for run in 1..=max_run.min(fragments.len()) {
        for window in fragments.windows(run) {
            let joined = window
                .iter()
                .map(|f| f.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            let candidate = normalize(&joined, options.case_sensitive);
            let Some(similarity) = similarity(&candidate, &wanted, options.exact) else {
                continue;
            };

            let bounds = union(window.iter().map(|f| f.bounds));
            let confidence = window
                .iter()
                .map(|f| f.confidence)
                .fold(f64::INFINITY, f64::min)
                * similarity;
            matches.push(TextMatch {
                text: joined,
                bounds,
                confidence,
                click_point: bounds.center(),
            });
        }
    }

    matches.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    match matches.first() {
        Some(best) => TextSearchResult {
            found: true,
            confidence: best.confidence,
            matched_text: Some(best.text.clone()),
            click_point: Some(best.click_point),
            all_matches: matches,
        },
        None => TextSearchResult::default(),
    }
}

fn normalize(text: &str, case_sensitive: bool) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if case_sensitive {
        collapsed
    } else {
        collapsed.to_lowercase()
    }
}

/// Similarity factor in `(0, 1]`, or `None` if the candidate doesn't match.
fn similarity(candidate: &str, wanted: &str, exact: bool) -> Option<f64> {
    if candidate == wanted {
        return Some(1.0);
    }
    if exact {
        return None;
    }
    if candidate.contains(wanted) {
        return Some(1.0);
    }
    let score = strsim::normalized_levenshtein(candidate, wanted);
    (score >= FUZZY_SIMILARITY).then_some(score)
}

fn union(rects: impl Iterator<Item = Rect>) -> Rect {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for r in rects {
        min_x = min_x.min(r.x);
        min_y = min_y.min(r.y);
        max_x = max_x.max(r.x + r.width);
        max_y = max_y.max(r.y + r.height);
    }
    if !min_x.is_finite() {
        return Rect::default();
    }
    Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
}
