//! SQLite-backed persistence for the learning store.

pub mod calibration_repository;
pub mod connection;
pub mod creative_repository;
pub mod experiment_repository;
pub mod interaction_repository;
pub mod lineage_repository;
pub mod lock_repository;
pub mod migrations;
pub mod reward_repository;
pub mod score_repository;
pub mod snapshot_repository;

pub use calibration_repository::SqliteCalibrationRepository;
pub use connection::{create_pool, create_test_pool, ConnectionError, PoolConfig};
pub use creative_repository::SqliteCreativeRepository;
pub use experiment_repository::SqliteExperimentRepository;
pub use interaction_repository::SqliteInteractionRepository;
pub use lineage_repository::SqliteLineageRepository;
pub use lock_repository::SqliteLockRepository;
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use reward_repository::SqliteRewardRepository;
pub use score_repository::SqliteScoreRepository;
pub use snapshot_repository::SqliteSnapshotRepository;
