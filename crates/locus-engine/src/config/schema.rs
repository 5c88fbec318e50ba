use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocusConfig {
    #[serde(default)]
    pub resolution: ResolutionConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub coordinates: CoordinatesConfig,
    #[serde(default)]
    pub evidence: EvidenceConfig,
    #[serde(default)]
    pub vision: VisionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    #[serde(default = "default_resolution_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_evaluator_timeout_ms")]
    pub evaluator_timeout_ms: u64,
    #[serde(default = "default_max_chain_length")]
    pub max_chain_length: usize,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_resolution_min_confidence(),
            evaluator_timeout_ms: default_evaluator_timeout_ms(),
            max_chain_length: default_max_chain_length(),
        }
    }
}

fn default_resolution_min_confidence() -> f64 {
    0.5
}

fn default_evaluator_timeout_ms() -> u64 {
    5000
}

fn default_max_chain_length() -> usize {
    locus_common::MAX_CHAIN_LENGTH
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Above the unvalidated coordinates confidence, so a step only verifies
    /// when something other than a bare point still resolves.
    #[serde(default = "default_verification_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_repair_min_confidence")]
    pub repair_min_confidence: f64,
    /// Evaluate a step's strategies concurrently (steps stay sequential).
    #[serde(default = "default_concurrent_strategies")]
    pub concurrent_strategies: bool,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_verification_min_confidence(),
            repair_min_confidence: default_repair_min_confidence(),
            concurrent_strategies: default_concurrent_strategies(),
        }
    }
}

fn default_verification_min_confidence() -> f64 {
    0.65
}

fn default_repair_min_confidence() -> f64 {
    0.5
}

fn default_concurrent_strategies() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatesConfig {
    /// Force hit-test validation even when the strategy didn't ask for it.
    #[serde(default)]
    pub validate_element_exists: bool,
    #[serde(default = "default_coordinates_boost")]
    pub boost: f64,
    #[serde(default = "default_coordinates_cap")]
    pub cap: f64,
}

impl Default for CoordinatesConfig {
    fn default() -> Self {
        Self {
            validate_element_exists: false,
            boost: default_coordinates_boost(),
            cap: default_coordinates_cap(),
        }
    }
}

fn default_coordinates_boost() -> f64 {
    locus_common::ceiling::COORDINATES_BOOST
}

fn default_coordinates_cap() -> f64 {
    locus_common::ceiling::COORDINATES_CAP
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceConfig {
    /// Ring radii in CSS pixels, sampled around the endpoint after the endpoint itself.
    #[serde(default = "default_ring_radii")]
    pub ring_radii: Vec<f64>,
    #[serde(default = "default_ring_samples")]
    pub ring_samples: usize,
    /// Distance at which the distance sub-score reaches 0.
    #[serde(default = "default_max_distance")]
    pub max_distance: f64,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    #[serde(default)]
    pub weights: EvidenceWeights,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            ring_radii: default_ring_radii(),
            ring_samples: default_ring_samples(),
            max_distance: default_max_distance(),
            min_score: default_min_score(),
            max_candidates: default_max_candidates(),
            weights: EvidenceWeights::default(),
        }
    }
}

fn default_ring_radii() -> Vec<f64> {
    vec![8.0, 16.0, 32.0]
}

fn default_ring_samples() -> usize {
    8
}

fn default_max_distance() -> f64 {
    64.0
}

fn default_min_score() -> f64 {
    0.4
}

fn default_max_candidates() -> usize {
    16
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceWeights {
    pub tag: f64,
    pub id: f64,
    pub classes: f64,
    pub distance: f64,
    pub direction: f64,
}

impl Default for EvidenceWeights {
    fn default() -> Self {
        Self {
            tag: 0.25,
            id: 0.20,
            classes: 0.15,
            distance: 0.20,
            direction: 0.20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Pause after a click before the next capture, so the page can react.
    #[serde(default = "default_post_click_delay_ms")]
    pub post_click_delay_ms: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            use_cache: default_use_cache(),
            poll_interval_ms: default_poll_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            post_click_delay_ms: default_post_click_delay_ms(),
        }
    }
}

fn default_use_cache() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_idle_timeout_ms() -> u64 {
    30000
}

fn default_post_click_delay_ms() -> u64 {
    250
}
