//! Port for the job-level mutual-exclusion lease.

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::errors::DomainResult;

#[async_trait]
pub trait LockRepository: Send + Sync {
    /// Try to take the (brand, job_type) lease. Returns false when a live
    /// lease is already held; expired leases are reclaimed.
    async fn try_acquire(
        &self,
        brand_id: Uuid,
        job_type: &str,
        lease: Duration,
    ) -> DomainResult<bool>;

    async fn release(&self, brand_id: Uuid, job_type: &str) -> DomainResult<()>;
}
