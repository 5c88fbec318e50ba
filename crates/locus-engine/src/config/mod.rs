pub mod loader;
pub mod schema;

pub use loader::{ConfigError, ConfigLoader};
pub use schema::{
    CoordinatesConfig, EvidenceConfig, EvidenceWeights, LocusConfig, ResolutionConfig,
    VerificationConfig, VisionConfig,
};
