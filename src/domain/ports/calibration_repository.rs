//! Port for human override records (read) and calibration proposals (write).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{CalibrationProposal, QualityOverride};

#[async_trait]
pub trait CalibrationRepository: Send + Sync {
    async fn list_overrides_since(
        &self,
        brand_id: Uuid,
        since: DateTime<Utc>,
    ) -> DomainResult<Vec<QualityOverride>>;

    async fn insert_proposal(&self, proposal: &CalibrationProposal) -> DomainResult<()>;

    async fn list_proposals(&self, brand_id: Uuid) -> DomainResult<Vec<CalibrationProposal>>;
}
