use crate::devtools::DevToolsError;
use crate::ocr::OcrError;
use serde::{Deserialize, Serialize};

/// Why a strategy did not produce a usable location.
///
/// Evaluators never return these as `Err`; they are rendered into
/// `StrategyEvaluation::error` with `found = false`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LocateError {
    #[error("No element matches {0}")]
    NotFound(String),

    #[error("Ambiguous target '{target}' matches {count} elements")]
    Ambiguous { target: String, count: usize },

    #[error("Transport failure: {0}")]
    Transport(#[from] DevToolsError),

    #[error("OCR failure: {0}")]
    Ocr(#[from] OcrError),

    #[error("Invalid strategy: {0}")]
    Configuration(String),

    #[error("Evaluation timed out after {0} ms")]
    Timeout(u64),

    #[error("No strategy reached confidence {min_confidence:.2}")]
    Exhausted { min_confidence: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    Ambiguous,
    Transport,
    Configuration,
    Timeout,
    Exhausted,
}

impl LocateError {
    pub fn kind(&self) -> FailureKind {
        match self {
            LocateError::NotFound(_) => FailureKind::NotFound,
            LocateError::Ambiguous { .. } => FailureKind::Ambiguous,
            LocateError::Transport(_) | LocateError::Ocr(_) => FailureKind::Transport,
            LocateError::Configuration(_) => FailureKind::Configuration,
            LocateError::Timeout(_) => FailureKind::Timeout,
            LocateError::Exhausted { .. } => FailureKind::Exhausted,
        }
    }
}
