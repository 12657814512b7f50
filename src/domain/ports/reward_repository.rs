//! Port for the immutable reward ledger.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::Reward;

/// A reward joined with its creative's element tags, for interaction and
/// evolution analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardWithElements {
    pub reward: Reward,
    pub elements: BTreeMap<String, String>,
    pub canvas_size: String,
}

#[async_trait]
pub trait RewardRepository: Send + Sync {
    /// Insert the reward unless the creative already has one. Returns true
    /// when a row was written (maturity is a one-way transition; re-scoring
    /// is a no-op, not an update).
    async fn create_if_absent(&self, reward: &Reward) -> DomainResult<bool>;

    async fn get_by_creative(&self, creative_id: Uuid) -> DomainResult<Option<Reward>>;

    /// Rewards not yet converted into score events, oldest first.
    async fn list_unprocessed(&self, brand_id: Uuid, limit: usize) -> DomainResult<Vec<Reward>>;

    async fn mark_processed(&self, reward_id: Uuid) -> DomainResult<()>;

    /// Rewards created since `since`, joined with element tags.
    async fn list_with_elements(
        &self,
        brand_id: Uuid,
        since: DateTime<Utc>,
    ) -> DomainResult<Vec<RewardWithElements>>;

    /// Matured creatives whose composite reward meets the threshold.
    async fn list_high_performers(
        &self,
        brand_id: Uuid,
        threshold: f64,
    ) -> DomainResult<Vec<RewardWithElements>>;
}
