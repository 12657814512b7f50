//! Port for the performance-ingestion collaborator's snapshot feed
//! (read-only from this subsystem's point of view).

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{BrandReference, DailySnapshot, SnapshotAggregate};

#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Lifetime aggregate for one creative; None when no snapshots exist yet
    /// (transient ingestion gap -- skip and retry next run).
    async fn aggregate_for(&self, creative_id: Uuid) -> DomainResult<Option<SnapshotAggregate>>;

    /// Lifetime aggregate for one deployed platform ad (experiment arms).
    async fn aggregate_for_platform_ad(
        &self,
        platform_ad_id: &str,
    ) -> DomainResult<Option<SnapshotAggregate>>;

    /// Recent per-day series for fatigue trend detection, newest last.
    async fn daily_series(&self, creative_id: Uuid, days: u32) -> DomainResult<Vec<DailySnapshot>>;

    /// Brand-level reference distributions of raw metrics for normalization.
    async fn brand_reference(&self, brand_id: Uuid) -> DomainResult<BrandReference>;

    /// Whether the brand opted in to cross-brand data sharing.
    async fn brand_shares_data(&self, brand_id: Uuid) -> DomainResult<bool>;
}
