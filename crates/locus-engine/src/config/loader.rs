use super::schema::LocusConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from default locations:
    /// 1. ./locus.yaml
    /// 2. ~/.locus/config.yaml
    /// 3. Default configuration
    pub async fn load_default() -> Result<LocusConfig, ConfigError> {
        let local_config = PathBuf::from("./locus.yaml");
        if local_config.exists() {
            return Self::load_from(&local_config).await;
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".locus").join("config.yaml");
            if home_config.exists() {
                return Self::load_from(&home_config).await;
            }
        }

        Ok(LocusConfig::default())
    }

    pub async fn load_from(path: &Path) -> Result<LocusConfig, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: LocusConfig = serde_yaml::from_str(&content)?;
        Self::validate(&config)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn validate(config: &LocusConfig) -> Result<(), ConfigError> {
        let thresholds = [
            ("resolution.min_confidence", config.resolution.min_confidence),
            (
                "verification.min_confidence",
                config.verification.min_confidence,
            ),
            (
                "verification.repair_min_confidence",
                config.verification.repair_min_confidence,
            ),
            ("evidence.min_score", config.evidence.min_score),
        ];
        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if config.resolution.max_chain_length == 0 {
            return Err(ConfigError::Invalid(
                "resolution.max_chain_length must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
