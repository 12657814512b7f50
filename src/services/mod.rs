//! Service layer implementing the learning-core business logic.

pub mod bandit_sampler;
pub mod calibration_engine;
pub mod experiment_engine;
pub mod interaction_analyzer;
pub mod reward_calculator;
pub mod score_processor;
pub mod winner_evolution;

pub use bandit_sampler::{BanditSampler, SampledValue};
pub use calibration_engine::CalibrationEngine;
pub use experiment_engine::ExperimentEngine;
pub use interaction_analyzer::{InteractionAnalyzer, InteractionRunSummary};
pub use reward_calculator::{RewardCalculator, RewardRunSummary};
pub use score_processor::{ScoreProcessor, ScoreRunSummary};
pub use winner_evolution::{EvolutionRunSummary, WinnerEvolution};
