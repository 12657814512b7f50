//! SQLite implementation of the CalibrationRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    CalibrationProposal, OverrideDecision, ProposalStatus, QualityOverride, ThresholdConfig,
};
use crate::domain::ports::CalibrationRepository;

#[derive(Clone)]
pub struct SqliteCalibrationRepository {
    pool: SqlitePool,
}

impl SqliteCalibrationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CalibrationRepository for SqliteCalibrationRepository {
    async fn list_overrides_since(
        &self,
        brand_id: Uuid,
        since: DateTime<Utc>,
    ) -> DomainResult<Vec<QualityOverride>> {
        let rows: Vec<OverrideRow> = sqlx::query_as(
            r#"SELECT * FROM quality_overrides
               WHERE brand_id = ? AND decided_at >= ?
               ORDER BY decided_at"#,
        )
        .bind(brand_id.to_string())
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn insert_proposal(&self, proposal: &CalibrationProposal) -> DomainResult<()> {
        let current_json = serde_json::to_string(&proposal.current)?;
        let proposed_json = serde_json::to_string(&proposal.proposed)?;
        sqlx::query(
            r#"INSERT INTO calibration_proposals
               (id, brand_id, current_config, proposed_config, false_positive_rate,
                false_negative_rate, approval_rate_shift, total_overrides_analyzed,
                meets_min_sample_size, within_delta_bounds, status, reason,
                window_days, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(proposal.id.to_string())
        .bind(proposal.brand_id.to_string())
        .bind(&current_json)
        .bind(&proposed_json)
        .bind(proposal.false_positive_rate)
        .bind(proposal.false_negative_rate)
        .bind(proposal.approval_rate_shift)
        .bind(i64::try_from(proposal.total_overrides_analyzed).unwrap_or(i64::MAX))
        .bind(i64::from(proposal.meets_min_sample_size))
        .bind(i64::from(proposal.within_delta_bounds))
        .bind(proposal.status.as_str())
        .bind(&proposal.reason)
        .bind(i64::from(proposal.window_days))
        .bind(proposal.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_proposals(&self, brand_id: Uuid) -> DomainResult<Vec<CalibrationProposal>> {
        let rows: Vec<ProposalRow> = sqlx::query_as(
            "SELECT * FROM calibration_proposals WHERE brand_id = ? ORDER BY created_at",
        )
        .bind(brand_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct OverrideRow {
    id: String,
    creative_id: String,
    brand_id: String,
    decision: String,
    ai_score: f64,
    threshold_in_effect: f64,
    decided_at: String,
}

impl TryFrom<OverrideRow> for QualityOverride {
    type Error = DomainError;

    fn try_from(row: OverrideRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;
        let creative_id = Uuid::parse_str(&row.creative_id)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;
        let brand_id = Uuid::parse_str(&row.brand_id)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;
        let decision = OverrideDecision::from_str(&row.decision).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid decision: {}", row.decision))
        })?;
        let decided_at = chrono::DateTime::parse_from_rfc3339(&row.decided_at)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?
            .with_timezone(&Utc);

        Ok(QualityOverride {
            id,
            creative_id,
            brand_id,
            decision,
            ai_score: row.ai_score,
            threshold_in_effect: row.threshold_in_effect,
            decided_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProposalRow {
    id: String,
    brand_id: String,
    current_config: String,
    proposed_config: String,
    false_positive_rate: f64,
    false_negative_rate: f64,
    approval_rate_shift: f64,
    total_overrides_analyzed: i64,
    meets_min_sample_size: i64,
    within_delta_bounds: i64,
    status: String,
    reason: Option<String>,
    window_days: i64,
    created_at: String,
}

impl TryFrom<ProposalRow> for CalibrationProposal {
    type Error = DomainError;

    fn try_from(row: ProposalRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;
        let brand_id = Uuid::parse_str(&row.brand_id)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;
        let current: ThresholdConfig = serde_json::from_str(&row.current_config)?;
        let proposed: ThresholdConfig = serde_json::from_str(&row.proposed_config)?;
        let status = ProposalStatus::from_str(&row.status).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid status: {}", row.status))
        })?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?
            .with_timezone(&Utc);

        Ok(CalibrationProposal {
            id,
            brand_id,
            current,
            proposed,
            false_positive_rate: row.false_positive_rate,
            false_negative_rate: row.false_negative_rate,
            approval_rate_shift: row.approval_rate_shift,
            total_overrides_analyzed: u64::try_from(row.total_overrides_analyzed.max(0))
                .unwrap_or(0),
            meets_min_sample_size: row.meets_min_sample_size != 0,
            within_delta_bounds: row.within_delta_bounds != 0,
            status,
            reason: row.reason,
            window_days: u32::try_from(row.window_days.max(0)).unwrap_or(0),
            created_at,
        })
    }
}
