//! SQLite implementation of the RewardRepository.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CampaignObjective, Reward, RewardComponents};
use crate::domain::ports::{RewardRepository, RewardWithElements};

#[derive(Clone)]
pub struct SqliteRewardRepository {
    pool: SqlitePool,
}

impl SqliteRewardRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn joined(
        &self,
        brand_id: Uuid,
        condition: &str,
        bind_value: String,
    ) -> DomainResult<Vec<RewardWithElements>> {
        let query = format!(
            r#"SELECT r.*, c.elements AS creative_elements, c.canvas_size AS creative_canvas_size
               FROM rewards r
               JOIN creatives c ON c.id = r.creative_id
               WHERE r.brand_id = ? AND {condition}
               ORDER BY r.created_at"#
        );
        let rows: Vec<JoinedRow> = sqlx::query_as(&query)
            .bind(brand_id.to_string())
            .bind(bind_value)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[async_trait]
impl RewardRepository for SqliteRewardRepository {
    async fn create_if_absent(&self, reward: &Reward) -> DomainResult<bool> {
        let components_json = serde_json::to_string(&reward.components)?;
        let result = sqlx::query(
            r#"INSERT OR IGNORE INTO rewards
               (id, creative_id, brand_id, objective, composite_score, components,
                impressions_at_maturity, created_at, processed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(reward.id.to_string())
        .bind(reward.creative_id.to_string())
        .bind(reward.brand_id.to_string())
        .bind(reward.objective.as_str())
        .bind(reward.composite_score)
        .bind(&components_json)
        .bind(i64::try_from(reward.impressions_at_maturity).unwrap_or(i64::MAX))
        .bind(reward.created_at.to_rfc3339())
        .bind(reward.processed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_by_creative(&self, creative_id: Uuid) -> DomainResult<Option<Reward>> {
        let row: Option<RewardRow> = sqlx::query_as("SELECT * FROM rewards WHERE creative_id = ?")
            .bind(creative_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_unprocessed(&self, brand_id: Uuid, limit: usize) -> DomainResult<Vec<Reward>> {
        let rows: Vec<RewardRow> = sqlx::query_as(
            r#"SELECT * FROM rewards
               WHERE brand_id = ? AND processed_at IS NULL
               ORDER BY created_at
               LIMIT ?"#,
        )
        .bind(brand_id.to_string())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn mark_processed(&self, reward_id: Uuid) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE rewards SET processed_at = ? WHERE id = ? AND processed_at IS NULL",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(reward_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Already processed or unknown: retries land here harmlessly,
            // but an unknown id is a real error.
            let exists: Option<(i64,)> =
                sqlx::query_as("SELECT 1 FROM rewards WHERE id = ?")
                    .bind(reward_id.to_string())
                    .fetch_optional(&self.pool)
                    .await?;
            if exists.is_none() {
                return Err(DomainError::RewardNotFound(reward_id));
            }
        }
        Ok(())
    }

    async fn list_with_elements(
        &self,
        brand_id: Uuid,
        since: DateTime<Utc>,
    ) -> DomainResult<Vec<RewardWithElements>> {
        self.joined(brand_id, "r.created_at >= ?", since.to_rfc3339()).await
    }

    async fn list_high_performers(
        &self,
        brand_id: Uuid,
        threshold: f64,
    ) -> DomainResult<Vec<RewardWithElements>> {
        self.joined(brand_id, "r.composite_score >= ?", threshold.to_string()).await
    }
}

#[derive(sqlx::FromRow)]
struct RewardRow {
    id: String,
    creative_id: String,
    brand_id: String,
    objective: String,
    composite_score: f64,
    components: String,
    impressions_at_maturity: i64,
    created_at: String,
    processed_at: Option<String>,
}

impl TryFrom<RewardRow> for Reward {
    type Error = DomainError;

    fn try_from(row: RewardRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;
        let creative_id = Uuid::parse_str(&row.creative_id)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;
        let brand_id = Uuid::parse_str(&row.brand_id)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;
        let objective = CampaignObjective::from_str(&row.objective).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid objective: {}", row.objective))
        })?;
        let components: RewardComponents = serde_json::from_str(&row.components)?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?
            .with_timezone(&chrono::Utc);
        let processed_at = row
            .processed_at
            .map(|s| {
                chrono::DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&chrono::Utc))
            })
            .transpose()
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;

        Ok(Reward {
            id,
            creative_id,
            brand_id,
            objective,
            composite_score: row.composite_score,
            components,
            impressions_at_maturity: u64::try_from(row.impressions_at_maturity.max(0)).unwrap_or(0),
            created_at,
            processed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct JoinedRow {
    #[sqlx(flatten)]
    reward: RewardRow,
    creative_elements: String,
    creative_canvas_size: String,
}

impl TryFrom<JoinedRow> for RewardWithElements {
    type Error = DomainError;

    fn try_from(row: JoinedRow) -> Result<Self, Self::Error> {
        let elements: BTreeMap<String, String> = serde_json::from_str(&row.creative_elements)?;
        Ok(RewardWithElements {
            reward: row.reward.try_into()?,
            elements,
            canvas_size: row.creative_canvas_size,
        })
    }
}
