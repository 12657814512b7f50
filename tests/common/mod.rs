//! Shared helpers for integration tests: in-memory store and seed data.
#![allow(dead_code)]

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use adlearn::adapters::sqlite::{
    all_embedded_migrations, create_test_pool, Migrator, SqliteScoreRepository,
};
use adlearn::domain::models::{CampaignObjective, Provenance, RewardComponents, ScoreEvent};
use adlearn::domain::ports::ScoreRepository;

pub async fn setup_pool() -> SqlitePool {
    let pool = create_test_pool().await.expect("test pool");
    Migrator::new(pool.clone())
        .run_embedded_migrations(all_embedded_migrations())
        .await
        .expect("migrations");
    pool
}

pub fn elements(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

pub async fn insert_creative(
    pool: &SqlitePool,
    brand_id: Uuid,
    elements: &BTreeMap<String, String>,
    provenance: Provenance,
) -> Uuid {
    insert_creative_with_id(pool, Uuid::new_v4(), brand_id, elements, provenance).await
}

pub async fn insert_creative_with_id(
    pool: &SqlitePool,
    id: Uuid,
    brand_id: Uuid,
    elements: &BTreeMap<String, String>,
    provenance: Provenance,
) -> Uuid {
    sqlx::query(
        "INSERT INTO creatives (id, brand_id, elements, provenance, canvas_size, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(brand_id.to_string())
    .bind(serde_json::to_string(elements).unwrap())
    .bind(provenance.as_str())
    .bind("1080x1080")
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .expect("insert creative");
    id
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_snapshot(
    pool: &SqlitePool,
    creative_id: Uuid,
    platform_ad_id: Option<&str>,
    objective: CampaignObjective,
    date: NaiveDate,
    impressions: i64,
    clicks: i64,
    conversions: i64,
    spend: f64,
    revenue: f64,
) {
    sqlx::query(
        "INSERT INTO performance_snapshots
         (id, creative_id, platform_ad_id, objective, snapshot_date,
          impressions, clicks, conversions, spend, revenue)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(creative_id.to_string())
    .bind(platform_ad_id)
    .bind(objective.as_str())
    .bind(date.format("%Y-%m-%d").to_string())
    .bind(impressions)
    .bind(clicks)
    .bind(conversions)
    .bind(spend)
    .bind(revenue)
    .execute(pool)
    .await
    .expect("insert snapshot");
}

pub async fn set_brand_sharing(pool: &SqlitePool, brand_id: Uuid, shares: bool) {
    sqlx::query(
        "INSERT INTO brand_settings (brand_id, share_cross_brand_data) VALUES (?, ?)
         ON CONFLICT (brand_id) DO UPDATE SET share_cross_brand_data = excluded.share_cross_brand_data",
    )
    .bind(brand_id.to_string())
    .bind(i64::from(shares))
    .execute(pool)
    .await
    .expect("brand settings");
}

pub async fn insert_reward(
    pool: &SqlitePool,
    creative_id: Uuid,
    brand_id: Uuid,
    objective: CampaignObjective,
    composite_score: f64,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO rewards
         (id, creative_id, brand_id, objective, composite_score, components,
          impressions_at_maturity, created_at, processed_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL)",
    )
    .bind(id.to_string())
    .bind(creative_id.to_string())
    .bind(brand_id.to_string())
    .bind(objective.as_str())
    .bind(composite_score)
    .bind(serde_json::to_string(&RewardComponents::default()).unwrap())
    .bind(1000_i64)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .expect("insert reward");
    id
}

/// Build real score evidence for one element value: one creative + reward +
/// recorded event per observation, wins at 0.9 and losses at 0.1.
pub async fn seed_score(
    pool: &SqlitePool,
    brand_id: Uuid,
    element_name: &str,
    element_value: &str,
    wins: u32,
    losses: u32,
) {
    let scores = SqliteScoreRepository::new(pool.clone());
    let tags = elements(&[(element_name, element_value)]);
    for i in 0..(wins + losses) {
        let reward_value = if i < wins { 0.9 } else { 0.1 };
        let creative_id = insert_creative(pool, brand_id, &tags, Provenance::Native).await;
        let reward_id = insert_reward(
            pool,
            creative_id,
            brand_id,
            CampaignObjective::Conversions,
            reward_value,
        )
        .await;
        let event = ScoreEvent::from_reward(
            reward_id,
            brand_id,
            element_name,
            element_value,
            reward_value,
            1.0,
            0.5,
        );
        assert!(scores.record_event(&event).await.expect("record event"));
    }
}

pub async fn insert_override(
    pool: &SqlitePool,
    brand_id: Uuid,
    decision: &str,
    ai_score: f64,
    threshold_in_effect: f64,
) {
    sqlx::query(
        "INSERT INTO quality_overrides
         (id, creative_id, brand_id, decision, ai_score, threshold_in_effect, decided_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(Uuid::new_v4().to_string())
    .bind(brand_id.to_string())
    .bind(decision)
    .bind(ai_score)
    .bind(threshold_in_effect)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .expect("insert override");
}
