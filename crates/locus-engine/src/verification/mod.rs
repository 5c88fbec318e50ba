pub mod listeners;
pub mod orchestrator;

pub use listeners::{ListenerId, ListenerSet, VerificationListener};
pub use orchestrator::{StepOutcome, VerificationError, VerificationOrchestrator, classify};
