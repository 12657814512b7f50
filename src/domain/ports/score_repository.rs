//! Port for the event-sourced score store.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Score, ScoreEvent};

/// Pooled posterior mass across opt-in brands for one element value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PooledPosterior {
    pub alpha: f64,
    pub beta: f64,
    pub observations: f64,
}

#[async_trait]
pub trait ScoreRepository: Send + Sync {
    /// Persist one event and apply its deltas to the derived Score in a
    /// single transaction (event + score update is the atomic unit).
    ///
    /// Returns false when the event already exists -- the (reward, element,
    /// value) key makes retries exactly-once.
    async fn record_event(&self, event: &ScoreEvent) -> DomainResult<bool>;

    async fn get(
        &self,
        brand_id: Uuid,
        element_name: &str,
        element_value: &str,
    ) -> DomainResult<Option<Score>>;

    /// All scores for one element dimension of a brand.
    async fn list_dimension(&self, brand_id: Uuid, element_name: &str)
        -> DomainResult<Vec<Score>>;

    /// Element dimensions with at least one score for the brand.
    async fn list_dimensions(&self, brand_id: Uuid) -> DomainResult<Vec<String>>;

    /// Full event set for one (brand, element, value), for replay.
    async fn list_events(
        &self,
        brand_id: Uuid,
        element_name: &str,
        element_value: &str,
    ) -> DomainResult<Vec<ScoreEvent>>;

    /// Summed posterior deltas across brands that opted in to sharing,
    /// excluding the requesting brand.
    async fn pooled_posterior(
        &self,
        element_name: &str,
        element_value: &str,
        exclude_brand: Uuid,
    ) -> DomainResult<PooledPosterior>;

    /// Values observed across opt-in brands for a dimension (cold-start
    /// candidates), excluding the requesting brand.
    async fn pooled_values(
        &self,
        element_name: &str,
        exclude_brand: Uuid,
    ) -> DomainResult<Vec<String>>;

    /// Remove scores with no backing events. Returns rows deleted.
    async fn delete_stale(&self) -> DomainResult<u64>;
}
