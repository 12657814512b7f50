mod common;

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use adlearn::adapters::sqlite::{
    SqliteCreativeRepository, SqliteLockRepository, SqliteRewardRepository,
    SqliteSnapshotRepository,
};
use adlearn::domain::models::Config;
use adlearn::domain::ports::LockRepository;
use adlearn::domain::DomainError;
use adlearn::services::{reward_calculator, RewardCalculator};

use common::setup_pool;

#[tokio::test]
async fn test_lock_is_mutually_exclusive_per_brand_and_job() {
    let pool = setup_pool().await;
    let locks = SqliteLockRepository::new(pool.clone());
    let brand_a = Uuid::new_v4();
    let brand_b = Uuid::new_v4();
    let lease = Duration::from_secs(3600);

    assert!(locks.try_acquire(brand_a, "reward_calculator", lease).await.expect("acquire"));
    assert!(!locks.try_acquire(brand_a, "reward_calculator", lease).await.expect("reacquire"));

    // Other brands and other job types are independent.
    assert!(locks.try_acquire(brand_b, "reward_calculator", lease).await.expect("other brand"));
    assert!(locks.try_acquire(brand_a, "score_processor", lease).await.expect("other job"));

    locks.release(brand_a, "reward_calculator").await.expect("release");
    assert!(locks.try_acquire(brand_a, "reward_calculator", lease).await.expect("after release"));
}

#[tokio::test]
async fn test_expired_lease_is_reclaimed() {
    let pool = setup_pool().await;
    let locks = SqliteLockRepository::new(pool.clone());
    let brand_id = Uuid::new_v4();

    // A zero-length lease expires immediately, as after a worker crash.
    assert!(locks
        .try_acquire(brand_id, "winner_evolution", Duration::from_secs(0))
        .await
        .expect("acquire"));
    assert!(locks
        .try_acquire(brand_id, "winner_evolution", Duration::from_secs(3600))
        .await
        .expect("reclaim"));
}

#[tokio::test]
async fn test_held_lock_blocks_the_batch_job() {
    let pool = setup_pool().await;
    let locks = Arc::new(SqliteLockRepository::new(pool.clone()));
    let brand_id = Uuid::new_v4();

    assert!(locks
        .try_acquire(brand_id, reward_calculator::JOB_TYPE, Duration::from_secs(3600))
        .await
        .expect("hold lock"));

    let calculator = RewardCalculator::new(
        Arc::new(SqliteCreativeRepository::new(pool.clone())),
        Arc::new(SqliteSnapshotRepository::new(pool.clone())),
        Arc::new(SqliteRewardRepository::new(pool.clone())),
        locks.clone(),
        Config::default(),
    );

    let err = calculator.run(brand_id).await.expect_err("run under held lock");
    assert!(matches!(err, DomainError::LockUnavailable { .. }));

    // Releasing unblocks the job.
    locks.release(brand_id, reward_calculator::JOB_TYPE).await.expect("release");
    calculator.run(brand_id).await.expect("run after release");
}
