//! Raw evidence captured alongside a recorded interaction.
//!
//! The capture layer fills in whatever it could observe; the chain builder
//! turns each available source into one strategy.

use crate::geometry::{Point, Rect, Vector};
use crate::strategy::RoleStates;
use serde::{Deserialize, Serialize};

/// Number of trailing cursor samples used to estimate the approach direction.
pub const TRAIL_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailSample {
    pub x: f64,
    pub y: f64,
    /// Milliseconds, monotonic within one trail.
    #[serde(default)]
    pub t: u64,
}

impl TrailSample {
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedEvidence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
    /// Elements the structural selectors matched at capture time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector_match_count: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessible_name: Option<String>,
    #[serde(default, skip_serializing_if = "RoleStates::is_empty")]
    pub states: RoleStates,

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

    /// Text visible on the element as rendered, used for OCR matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_rect: Option<Rect>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trail: Vec<TrailSample>,
}

impl CapturedEvidence {
    /// Where the interaction landed: the explicit point, else the rect center,
    /// else the final trail sample.
    pub fn interaction_point(&self) -> Option<Point> {
        self.point
            .or_else(|| {
                self.bounding_rect
                    .filter(|r| !r.is_empty())
                    .map(|r| r.center())
            })
            .or_else(|| self.trail.last().map(TrailSample::point))
    }

    /// Unit vector of the cursor's final approach over the last
    /// `TRAIL_WINDOW` samples. `None` if the cursor didn't move.
    pub fn trail_direction(&self) -> Option<Vector> {
        if self.trail.len() < 2 {
            return None;
        }
        let start = self.trail.len().saturating_sub(TRAIL_WINDOW);
        let window = &self.trail[start..];
        let first = window.first()?.point();
        let last = window.last()?.point();
        Vector::between(&first, &last).normalized()
    }

    pub fn is_empty(&self) -> bool {
        *self == CapturedEvidence::default()
    }
}
