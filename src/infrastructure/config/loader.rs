use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid normalizer: {0}. Must be one of: min_max_clip, percentile_rank")]
    InvalidNormalizer(String),

    #[error("Invalid trust weight: {0}. Must be in (0, 1]")]
    InvalidTrustWeight(f64),

    #[error("Invalid success threshold: {0}. Must be in (0, 1)")]
    InvalidSuccessThreshold(f64),

    #[error("Invalid pooling dampening: {0}. Must be in [0, 1]")]
    InvalidPoolingDampening(f64),

    #[error("Invalid winner probability: {0}. Must be in (0.5, 1)")]
    InvalidWinnerProbability(f64),

    #[error("Invalid monte_carlo_draws: {0}. Must be at least 1000")]
    InvalidMonteCarloDraws(u32),

    #[error("Invalid max_iteration_rounds: {0}. Cannot be 0")]
    InvalidIterationRounds(u32),

    #[error("Invalid max_threshold_delta: {0}. Must be positive and at most 10")]
    InvalidThresholdDelta(f64),

    #[error("Invalid grid_step: {0}. Must be positive and no larger than max_threshold_delta")]
    InvalidGridStep(f64),

    #[error("Invalid lease_seconds: {0}. Cannot be 0")]
    InvalidLeaseSeconds(u64),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .adlearn/config.yaml (project config)
    /// 3. .adlearn/local.yaml (local overrides, optional)
    /// 4. Environment variables (ADLEARN_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".adlearn/config.yaml"))
            .merge(Yaml::file(".adlearn/local.yaml"))
            .merge(Env::prefixed("ADLEARN_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_normalizers = ["min_max_clip", "percentile_rank"];
        if !valid_normalizers.contains(&config.reward.normalizer.as_str()) {
            return Err(ConfigError::InvalidNormalizer(config.reward.normalizer.clone()));
        }

        for weight in [config.scoring.native_weight, config.scoring.imported_weight] {
            if weight <= 0.0 || weight > 1.0 {
                return Err(ConfigError::InvalidTrustWeight(weight));
            }
        }
        if config.scoring.success_threshold <= 0.0 || config.scoring.success_threshold >= 1.0 {
            return Err(ConfigError::InvalidSuccessThreshold(config.scoring.success_threshold));
        }

        if !(0.0..=1.0).contains(&config.bandit.pooling_dampening) {
            return Err(ConfigError::InvalidPoolingDampening(config.bandit.pooling_dampening));
        }

        if config.experiment.winner_probability <= 0.5
            || config.experiment.winner_probability >= 1.0
        {
            return Err(ConfigError::InvalidWinnerProbability(
                config.experiment.winner_probability,
            ));
        }
        if config.experiment.monte_carlo_draws < 1000 {
            return Err(ConfigError::InvalidMonteCarloDraws(config.experiment.monte_carlo_draws));
        }

        if config.evolution.max_iteration_rounds == 0 {
            return Err(ConfigError::InvalidIterationRounds(config.evolution.max_iteration_rounds));
        }

        if config.calibration.max_threshold_delta <= 0.0
            || config.calibration.max_threshold_delta > 10.0
        {
            return Err(ConfigError::InvalidThresholdDelta(config.calibration.max_threshold_delta));
        }
        if config.calibration.grid_step <= 0.0
            || config.calibration.grid_step > config.calibration.max_threshold_delta
        {
            return Err(ConfigError::InvalidGridStep(config.calibration.grid_step));
        }

        if config.job_lock.lease_seconds == 0 {
            return Err(ConfigError::InvalidLeaseSeconds(config.job_lock.lease_seconds));
        }

        Ok(())
    }
}
