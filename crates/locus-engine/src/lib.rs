pub mod chain_builder;
pub mod config;
pub mod control;
pub mod decision;
pub mod evaluators;
pub mod formatter;
pub mod ocr_service;
pub mod scoring;
pub mod verification;
pub mod vision_poll;

pub use chain_builder::ChainBuilder;
pub use control::{RunControl, RunState, Stopped};
pub use decision::{DecisionEngine, ResolveError};
pub use evaluators::{EvaluatorRegistry, StrategyEvaluator};
pub use ocr_service::OcrService;
pub use verification::{ListenerId, VerificationError, VerificationOrchestrator};
pub use vision_poll::{ConditionalPoll, PollClick, PollOutcome, PollStatus};

pub use locus_common as common;
