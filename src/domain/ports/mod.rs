//! Port trait definitions (Hexagonal Architecture)
//!
//! Async trait interfaces the storage adapters implement. The domain and
//! services stay independent of the concrete store; tests swap in the
//! in-memory SQLite pool.

pub mod calibration_repository;
pub mod creative_repository;
pub mod experiment_repository;
pub mod interaction_repository;
pub mod lineage_repository;
pub mod lock_repository;
pub mod reward_repository;
pub mod score_repository;
pub mod snapshot_repository;

pub use calibration_repository::CalibrationRepository;
pub use creative_repository::CreativeRepository;
pub use experiment_repository::ExperimentRepository;
pub use interaction_repository::InteractionRepository;
pub use lineage_repository::LineageRepository;
pub use lock_repository::LockRepository;
pub use reward_repository::{RewardRepository, RewardWithElements};
pub use score_repository::{PooledPosterior, ScoreRepository};
pub use snapshot_repository::SnapshotRepository;
