use crate::chain::FallbackChain;
use crate::evidence::CapturedEvidence;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Click,
    DoubleClick,
    Input,
    Select,
    Hover,
    Scroll,
    KeyPress,
    Navigation,
}

/// One recorded interaction as handed over by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedStep {
    pub id: String,
    pub kind: StepKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Absent for recordings made before chains were captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_chain: Option<FallbackChain>,
    /// Raw attributes stored with the step; used to synthesize a chain when
    /// `fallback_chain` is missing.
    #[serde(default)]
    pub evidence: CapturedEvidence,
}

impl RecordedStep {
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            kind,
            description: None,
            fallback_chain: None,
            evidence: CapturedEvidence::default(),
        }
    }

    pub fn with_chain(mut self, chain: FallbackChain) -> Self {
        self.fallback_chain = Some(chain);
        self
    }

    pub fn with_evidence(mut self, evidence: CapturedEvidence) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.kind == StepKind::Navigation
    }
}
