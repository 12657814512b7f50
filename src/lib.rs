//! adlearn - learning core for ad-creative optimization
//!
//! Closes the loop between delivered ad performance and the next generation
//! of creatives: composite rewards, event-sourced element scores, Thompson
//! sampling, pairwise interaction analysis, controlled experiments, winner
//! evolution, and quality-threshold calibration.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Pure business logic, models, and ports
//! - **Service Layer** (`services`): Batch jobs coordinating the domain
//! - **Adapter Layer** (`adapters`): SQLite implementations of the ports
//! - **Infrastructure Layer** (`infrastructure`): Configuration loading
//! - **CLI Layer** (`cli`): Command-line interface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    AdLineage, CalibrationProposal, CampaignObjective, Config, Creative, Experiment,
    ExperimentStatus, Reward, Score, ScoreEvent,
};
pub use domain::ports::{
    CalibrationRepository, CreativeRepository, ExperimentRepository, InteractionRepository,
    LineageRepository, LockRepository, RewardRepository, ScoreRepository, SnapshotRepository,
};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    BanditSampler, CalibrationEngine, ExperimentEngine, InteractionAnalyzer, RewardCalculator,
    ScoreProcessor, WinnerEvolution,
};
