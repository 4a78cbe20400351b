//! Configuration loading and validation.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::DraftsmithConfig;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Load and validate full configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<DraftsmithConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: DraftsmithConfig = serde_yaml::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &DraftsmithConfig) -> Result<(), ConfigError> {
    if config.version == 0 {
        return Err(ConfigError::Invalid(
            "version must be greater than 0".to_string(),
        ));
    }

    if config.app.name.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "app.name must not be empty".to_string(),
        ));
    }

    if config.worker.stage_timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "worker.stage_timeout_secs must be > 0".to_string(),
        ));
    }

    if config.worker.task_timeout_secs < config.worker.stage_timeout_secs {
        return Err(ConfigError::Invalid(
            "worker.task_timeout_secs must be >= worker.stage_timeout_secs".to_string(),
        ));
    }

    if config.worker.scan_interval_secs == 0 {
        return Err(ConfigError::Invalid(
            "worker.scan_interval_secs must be > 0".to_string(),
        ));
    }

    if config.worker.max_parallel_stages == 0 {
        return Err(ConfigError::Invalid(
            "worker.max_parallel_stages must be > 0".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&config.resolver.confidence_floor) {
        return Err(ConfigError::Invalid(
            "resolver.confidence_floor must be in [0, 1]".to_string(),
        ));
    }

    Ok(())
}
