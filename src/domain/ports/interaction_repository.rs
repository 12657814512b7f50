//! Port for pairwise element-interaction rows.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::ElementInteraction;

#[async_trait]
pub trait InteractionRepository: Send + Sync {
    /// Atomically replace all interaction rows for a brand. The reference
    /// population shifts every run, so partial updates are never valid.
    async fn replace_for_brand(
        &self,
        brand_id: Uuid,
        interactions: &[ElementInteraction],
    ) -> DomainResult<()>;

    async fn list_for_brand(&self, brand_id: Uuid) -> DomainResult<Vec<ElementInteraction>>;
}
