//! Port for ad lineage edges.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::AdLineage;

#[async_trait]
pub trait LineageRepository: Send + Sync {
    async fn insert(&self, lineage: &AdLineage) -> DomainResult<()>;

    /// Highest iteration round recorded under a root ancestor (0 when none).
    async fn max_round_for_ancestor(&self, root_ancestor_id: Uuid) -> DomainResult<u32>;

    /// Lineage row for a creative that is itself a child, if any.
    async fn get_by_child(&self, child_creative_id: Uuid) -> DomainResult<Option<AdLineage>>;

    /// Edges whose child outcome fields are still null.
    async fn list_unmatured(&self, brand_id: Uuid) -> DomainResult<Vec<AdLineage>>;

    /// Fill child_reward_score / outperformed_parent once the child matures.
    async fn record_maturation(
        &self,
        lineage_id: Uuid,
        child_reward_score: f64,
        outperformed_parent: bool,
    ) -> DomainResult<()>;

    async fn list_for_brand(&self, brand_id: Uuid) -> DomainResult<Vec<AdLineage>>;
}
