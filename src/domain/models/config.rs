//! Configuration model with serde defaults, loaded hierarchically by the
//! config loader (defaults -> yaml -> env).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub reward: RewardConfig,
    pub scoring: ScoringConfig,
    pub bandit: BanditConfig,
    pub interaction: InteractionConfig,
    pub experiment: ExperimentConfig,
    pub evolution: EvolutionConfig,
    pub calibration: CalibrationConfig,
    pub job_lock: JobLockConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            reward: RewardConfig::default(),
            scoring: ScoringConfig::default(),
            bandit: BanditConfig::default(),
            interaction: InteractionConfig::default(),
            experiment: ExperimentConfig::default(),
            evolution: EvolutionConfig::default(),
            calibration: CalibrationConfig::default(),
            job_lock: JobLockConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: ".adlearn/adlearn.db".to_string(), max_connections: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace | debug | info | warn | error
    pub level: String,
    /// json | pretty
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// min_max_clip | percentile_rank
    pub normalizer: String,
    /// Objective-dependent minimum impressions before a creative matures.
    pub maturity_impressions_conversions: u64,
    pub maturity_impressions_traffic: u64,
    pub maturity_impressions_awareness: u64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            normalizer: "min_max_clip".to_string(),
            maturity_impressions_conversions: 1000,
            maturity_impressions_traffic: 500,
            maturity_impressions_awareness: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub native_weight: f64,
    pub imported_weight: f64,
    /// Rewards at or above this count toward alpha.
    pub success_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self { native_weight: 1.0, imported_weight: 0.3, success_threshold: 0.5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BanditConfig {
    /// Below this weighted observation mass per dimension, blend the global
    /// (opt-in) pooled prior.
    pub pooling_floor: f64,
    /// Dampening on the pooled prior so brand evidence dominates.
    pub pooling_dampening: f64,
    /// Seed for reproducible sampling; 0 means derive from entropy.
    pub seed: u64,
    /// Known values per element dimension. Untested values enter the
    /// candidate set at the Beta(1, 1) prior so a cold start still explores.
    pub candidate_values: BTreeMap<String, Vec<String>>,
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            pooling_floor: 10.0,
            pooling_dampening: 0.3,
            seed: 0,
            candidate_values: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    pub window_days: u32,
    pub min_pair_samples: u64,
    /// z value for the normal-approximation confidence interval.
    pub z_score: f64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self { window_days: 90, min_pair_samples: 5, z_score: 1.96 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub monte_carlo_draws: u32,
    pub winner_probability: f64,
    /// Minimum meaningful absolute difference on the primary metric.
    pub meaningful_difference: f64,
    pub seed: u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            monte_carlo_draws: 10_000,
            winner_probability: 0.95,
            meaningful_difference: 0.002,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Reward a creative must reach to be a parent candidate.
    pub parent_reward_threshold: f64,
    /// Maximum iteration rounds from any single root ancestor.
    pub max_iteration_rounds: u32,
    /// Relative CTR decline (recent vs earlier window) that flags fatigue.
    pub fatigue_decline_ratio: f64,
    /// Days of daily snapshots examined for the fatigue trend.
    pub fatigue_window_days: u32,
    /// Canvas sizes eligible for cross-size expansion.
    pub expansion_canvas_sizes: Vec<String>,
    /// Parents evolved per run per brand.
    pub max_parents_per_run: usize,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            parent_reward_threshold: 0.75,
            max_iteration_rounds: 3,
            fatigue_decline_ratio: 0.25,
            fatigue_window_days: 14,
            expansion_canvas_sizes: vec![
                "1080x1080".to_string(),
                "1080x1350".to_string(),
                "1080x1920".to_string(),
            ],
            max_parents_per_run: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub window_days: u32,
    pub min_overrides: u64,
    /// Maximum per-step threshold change on the 0-10 scale.
    pub max_threshold_delta: f64,
    /// Grid step when scanning candidate thresholds.
    pub grid_step: f64,
    pub false_positive_cost: f64,
    pub false_negative_cost: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            window_days: 90,
            min_overrides: 30,
            max_threshold_delta: 1.0,
            grid_step: 0.25,
            false_positive_cost: 1.0,
            false_negative_cost: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobLockConfig {
    /// Lease duration in seconds; expired leases are reclaimable.
    pub lease_seconds: u64,
}

impl Default for JobLockConfig {
    fn default() -> Self {
        Self { lease_seconds: 3600 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.calibration.min_overrides, 30);
        assert!((config.calibration.max_threshold_delta - 1.0).abs() < 1e-12);
        assert_eq!(config.experiment.monte_carlo_draws, 10_000);
        assert!((config.scoring.imported_weight - 0.3).abs() < 1e-12);
        assert_eq!(config.interaction.window_days, 90);
    }

    #[test]
    fn test_serde_round_trip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
