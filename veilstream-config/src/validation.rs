use thiserror::Error;

use crate::model::ModerationConfig;

/// Errors surfaced while loading or validating a [`ModerationConfig`].
#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to load .env file: {0}")]
    EnvFile(#[from] dotenvy::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Enforces the constructor-time invariants the config must hold before a
/// `Session` is built from it: `max_pending_batches >= 1` and `decay_rate`
/// strictly inside `(0, 1)`.
pub fn validate(config: &ModerationConfig) -> Result<(), ConfigLoadError> {
    if config.batch.max_pending_batches == 0 {
        return Err(ConfigLoadError::Invalid(
            "batch.max_pending_batches must be at least 1".to_string(),
        ));
    }

    let decay = config.confidence.decay_rate;
    if !(decay > 0.0 && decay < 1.0) {
        return Err(ConfigLoadError::Invalid(format!(
            "confidence.decay_rate must be strictly between 0 and 1, got {decay}"
        )));
    }

    if !(0.0..=1.0).contains(&config.confidence.min_confidence_floor) {
        return Err(ConfigLoadError::Invalid(format!(
            "confidence.min_confidence_floor must be in [0, 1], got {}",
            config.confidence.min_confidence_floor
        )));
    }

    if config.batch.max_batch_size == 0 {
        return Err(ConfigLoadError::Invalid(
            "batch.max_batch_size must be at least 1".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&config.tracker.iou_assoc_threshold) {
        return Err(ConfigLoadError::Invalid(format!(
            "tracker.iou_assoc_threshold must be in [0, 1], got {}",
            config.tracker.iou_assoc_threshold
        )));
    }

    if !(0.0..=1.0).contains(&config.tracker.position_gain) {
        return Err(ConfigLoadError::Invalid(format!(
            "tracker.position_gain must be in [0, 1], got {}",
            config.tracker.position_gain
        )));
    }

    if !(0.0..=1.0).contains(&config.tracker.velocity_gain) {
        return Err(ConfigLoadError::Invalid(format!(
            "tracker.velocity_gain must be in [0, 1], got {}",
            config.tracker.velocity_gain
        )));
    }

    if config.inference.worker_count == 0 {
        return Err(ConfigLoadError::Invalid(
            "inference.worker_count must be at least 1".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&ModerationConfig::default()).is_ok());
    }

    #[test]
    fn zero_pending_batches_is_rejected() {
        let mut config = ModerationConfig::default();
        config.batch.max_pending_batches = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn decay_rate_of_one_is_rejected() {
        let mut config = ModerationConfig::default();
        config.confidence.decay_rate = 1.0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn decay_rate_of_zero_is_rejected() {
        let mut config = ModerationConfig::default();
        config.confidence.decay_rate = 0.0;
        assert!(validate(&config).is_err());
    }
}
