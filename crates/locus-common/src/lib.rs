pub mod chain;
pub mod devtools;
pub mod error;
pub mod evaluation;
pub mod evidence;
pub mod geometry;
pub mod ocr;
pub mod step;
pub mod strategy;
pub mod time;
pub mod verification;

pub use chain::{FallbackChain, MAX_CHAIN_LENGTH};
pub use devtools::{
    AxMatch, AxQuery, DevToolsClient, DevToolsError, ElementHandle, NodeDescription, NodeId,
    SearchSession,
};
pub use error::{FailureKind, LocateError};
pub use evaluation::StrategyEvaluation;
pub use evidence::{CapturedEvidence, TrailSample};
pub use geometry::{Point, Quad, Rect, Vector};
pub use ocr::{FindTextOptions, OcrEngine, OcrError, OcrFragment, TextMatch, TextSearchResult};
pub use step::{RecordedStep, StepKind};
pub use strategy::{
    AttributeLookup, AttributeQuery, CoordinatesMetadata, EvidenceMetadata, LocatorStrategy,
    RoleQuery, RoleStates, SelectorMetadata, StrategyKind, StrategyTarget, VisualTextQuery,
    ceiling,
};
pub use verification::{
    FlagReason, SessionStatus, StepRepair, StepState, StepVerification, TransitionError,
    VerificationEvent, VerificationEventKind, VerificationSession, VerificationSummary,
};
