mod common;

use std::sync::Arc;

use uuid::Uuid;

use adlearn::adapters::sqlite::{
    SqliteCreativeRepository, SqliteLockRepository, SqliteRewardRepository, SqliteScoreRepository,
};
use adlearn::domain::models::{CampaignObjective, Config, Provenance, Score, ScoreEvent};
use adlearn::domain::ports::{RewardRepository, ScoreRepository};
use adlearn::services::ScoreProcessor;

use common::{elements, insert_creative, insert_reward, setup_pool};

fn event_for(reward_id: Uuid, brand_id: Uuid, value: &str, reward_value: f64) -> ScoreEvent {
    ScoreEvent::from_reward(reward_id, brand_id, "hook_type", value, reward_value, 1.0, 0.5)
}

#[tokio::test]
async fn test_record_event_is_exactly_once() {
    let pool = setup_pool().await;
    let scores = SqliteScoreRepository::new(pool.clone());
    let brand_id = Uuid::new_v4();

    let creative_id =
        insert_creative(&pool, brand_id, &elements(&[("hook_type", "urgency")]), Provenance::Native)
            .await;
    let reward_id =
        insert_reward(&pool, creative_id, brand_id, CampaignObjective::Traffic, 0.8).await;

    let event = event_for(reward_id, brand_id, "urgency", 0.8);
    assert!(scores.record_event(&event).await.expect("first record"));

    // Retrying the same logical event is a no-op, even with a fresh event id.
    let retry = event_for(reward_id, brand_id, "urgency", 0.8);
    assert!(!scores.record_event(&retry).await.expect("retry record"));

    let score = scores
        .get(brand_id, "hook_type", "urgency")
        .await
        .expect("get score")
        .expect("score exists");
    assert!((score.alpha - 2.0).abs() < 1e-9);
    assert!((score.beta - 1.0).abs() < 1e-9);
    assert!((score.observations - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_stored_score_equals_event_replay() {
    let pool = setup_pool().await;
    let scores = SqliteScoreRepository::new(pool.clone());
    let brand_id = Uuid::new_v4();
    let tags = elements(&[("hook_type", "curiosity_gap")]);

    for reward_value in [0.9, 0.2, 0.7, 0.4, 0.55] {
        let creative_id = insert_creative(&pool, brand_id, &tags, Provenance::Native).await;
        let reward_id =
            insert_reward(&pool, creative_id, brand_id, CampaignObjective::Conversions, reward_value)
                .await;
        let event = event_for(reward_id, brand_id, "curiosity_gap", reward_value);
        assert!(scores.record_event(&event).await.expect("record"));
    }

    let stored = scores
        .get(brand_id, "hook_type", "curiosity_gap")
        .await
        .expect("get")
        .expect("exists");
    let events = scores
        .list_events(brand_id, "hook_type", "curiosity_gap")
        .await
        .expect("list events");
    assert_eq!(events.len(), 5);

    let replayed =
        Score::replay(brand_id, "hook_type", "curiosity_gap", &events).expect("replay");
    assert!((stored.alpha - replayed.alpha).abs() < 1e-9);
    assert!((stored.beta - replayed.beta).abs() < 1e-9);
    assert!((stored.observations - replayed.observations).abs() < 1e-9);
    assert!((stored.mean_reward - replayed.mean_reward).abs() < 1e-9);
}

#[tokio::test]
async fn test_delete_stale_removes_orphan_scores() {
    let pool = setup_pool().await;
    let scores = SqliteScoreRepository::new(pool.clone());
    let brand_id = Uuid::new_v4();

    // A backed score.
    let creative_id =
        insert_creative(&pool, brand_id, &elements(&[("hook_type", "urgency")]), Provenance::Native)
            .await;
    let reward_id =
        insert_reward(&pool, creative_id, brand_id, CampaignObjective::Traffic, 0.8).await;
    assert!(scores
        .record_event(&event_for(reward_id, brand_id, "urgency", 0.8))
        .await
        .expect("record"));

    // An orphan score row with no events behind it.
    sqlx::query(
        "INSERT INTO scores (id, brand_id, element_name, element_value, alpha, beta,
                             observations, mean_reward, updated_at)
         VALUES (?, ?, 'hook_type', 'stale_value', 3.0, 2.0, 4.0, 0.6, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(brand_id.to_string())
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(&pool)
    .await
    .expect("insert orphan");

    let deleted = scores.delete_stale().await.expect("delete stale");
    assert_eq!(deleted, 1);
    assert!(scores
        .get(brand_id, "hook_type", "stale_value")
        .await
        .expect("get")
        .is_none());
    assert!(scores
        .get(brand_id, "hook_type", "urgency")
        .await
        .expect("get")
        .is_some());
}

#[tokio::test]
async fn test_processor_fans_reward_into_events_and_marks_processed() {
    let pool = setup_pool().await;
    let creatives = Arc::new(SqliteCreativeRepository::new(pool.clone()));
    let rewards = Arc::new(SqliteRewardRepository::new(pool.clone()));
    let scores = Arc::new(SqliteScoreRepository::new(pool.clone()));
    let locks = Arc::new(SqliteLockRepository::new(pool.clone()));
    let processor = ScoreProcessor::new(
        creatives,
        rewards.clone(),
        scores.clone(),
        locks,
        Config::default(),
    );

    let brand_id = Uuid::new_v4();
    let tags = elements(&[("hook_type", "urgency"), ("cta", "shop_now")]);
    let creative_id = insert_creative(&pool, brand_id, &tags, Provenance::Native).await;
    insert_reward(&pool, creative_id, brand_id, CampaignObjective::Traffic, 0.8).await;

    let summary = processor.run(brand_id, 100).await.expect("run");
    assert_eq!(summary.rewards_processed, 1);
    assert_eq!(summary.events_recorded, 2);
    assert_eq!(summary.events_duplicate, 0);
    assert_eq!(summary.failed, 0);

    // Both element tags got their own posterior.
    assert!(scores.get(brand_id, "hook_type", "urgency").await.expect("get").is_some());
    assert!(scores.get(brand_id, "cta", "shop_now").await.expect("get").is_some());

    // The reward drained; a rerun finds nothing.
    assert!(rewards.list_unprocessed(brand_id, 100).await.expect("list").is_empty());
    let rerun = processor.run(brand_id, 100).await.expect("rerun");
    assert_eq!(rerun.rewards_processed, 0);
    assert_eq!(rerun.events_recorded, 0);
}

#[tokio::test]
async fn test_processor_recovers_from_partial_failure() {
    let pool = setup_pool().await;
    let creatives = Arc::new(SqliteCreativeRepository::new(pool.clone()));
    let rewards = Arc::new(SqliteRewardRepository::new(pool.clone()));
    let scores = Arc::new(SqliteScoreRepository::new(pool.clone()));
    let locks = Arc::new(SqliteLockRepository::new(pool.clone()));
    let processor = ScoreProcessor::new(
        creatives,
        rewards,
        scores.clone(),
        locks,
        Config::default(),
    );

    let brand_id = Uuid::new_v4();
    let tags = elements(&[("hook_type", "urgency"), ("cta", "shop_now")]);
    let creative_id = insert_creative(&pool, brand_id, &tags, Provenance::Native).await;
    let reward_id =
        insert_reward(&pool, creative_id, brand_id, CampaignObjective::Traffic, 0.8).await;

    // Simulate a crash after the first event was durable but before
    // mark_processed: the event exists, the reward is still unprocessed.
    let first = ScoreEvent::from_reward(
        reward_id, brand_id, "cta", "shop_now", 0.8, 1.0, 0.5,
    );
    assert!(scores.record_event(&first).await.expect("pre-record"));

    let summary = processor.run(brand_id, 100).await.expect("run");
    assert_eq!(summary.rewards_processed, 1);
    assert_eq!(summary.events_recorded, 1);
    assert_eq!(summary.events_duplicate, 1);

    // The pre-recorded event was not double counted.
    let cta = scores.get(brand_id, "cta", "shop_now").await.expect("get").expect("exists");
    assert!((cta.observations - 1.0).abs() < 1e-9);
}
