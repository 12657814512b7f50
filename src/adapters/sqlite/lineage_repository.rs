//! SQLite implementation of the LineageRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AdLineage, EvolutionMode};
use crate::domain::ports::LineageRepository;

#[derive(Clone)]
pub struct SqliteLineageRepository {
    pool: SqlitePool,
}

impl SqliteLineageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LineageRepository for SqliteLineageRepository {
    async fn insert(&self, lineage: &AdLineage) -> DomainResult<()> {
        lineage.validate()?;
        sqlx::query(
            r#"INSERT INTO ad_lineages
               (id, brand_id, root_ancestor_id, parent_creative_id, child_creative_id,
                mode, changed_element, old_value, new_value, iteration_round,
                parent_reward_score, child_reward_score, outperformed_parent,
                created_at, matured_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(lineage.id.to_string())
        .bind(lineage.brand_id.to_string())
        .bind(lineage.root_ancestor_id.to_string())
        .bind(lineage.parent_creative_id.to_string())
        .bind(lineage.child_creative_id.to_string())
        .bind(lineage.mode.as_str())
        .bind(&lineage.changed_element)
        .bind(&lineage.old_value)
        .bind(&lineage.new_value)
        .bind(i64::from(lineage.iteration_round))
        .bind(lineage.parent_reward_score)
        .bind(lineage.child_reward_score)
        .bind(lineage.outperformed_parent.map(i64::from))
        .bind(lineage.created_at.to_rfc3339())
        .bind(lineage.matured_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn max_round_for_ancestor(&self, root_ancestor_id: Uuid) -> DomainResult<u32> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT COALESCE(MAX(iteration_round), 0) FROM ad_lineages WHERE root_ancestor_id = ?",
        )
        .bind(root_ancestor_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map_or(0, |(round,)| u32::try_from(round.max(0)).unwrap_or(u32::MAX)))
    }

    async fn get_by_child(&self, child_creative_id: Uuid) -> DomainResult<Option<AdLineage>> {
        let row: Option<LineageRow> =
            sqlx::query_as("SELECT * FROM ad_lineages WHERE child_creative_id = ?")
                .bind(child_creative_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_unmatured(&self, brand_id: Uuid) -> DomainResult<Vec<AdLineage>> {
        let rows: Vec<LineageRow> = sqlx::query_as(
            r#"SELECT * FROM ad_lineages
               WHERE brand_id = ? AND matured_at IS NULL
               ORDER BY created_at"#,
        )
        .bind(brand_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn record_maturation(
        &self,
        lineage_id: Uuid,
        child_reward_score: f64,
        outperformed_parent: bool,
    ) -> DomainResult<()> {
        sqlx::query(
            r#"UPDATE ad_lineages
               SET child_reward_score = ?, outperformed_parent = ?, matured_at = ?
               WHERE id = ? AND matured_at IS NULL"#,
        )
        .bind(child_reward_score)
        .bind(i64::from(outperformed_parent))
        .bind(Utc::now().to_rfc3339())
        .bind(lineage_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_brand(&self, brand_id: Uuid) -> DomainResult<Vec<AdLineage>> {
        let rows: Vec<LineageRow> =
            sqlx::query_as("SELECT * FROM ad_lineages WHERE brand_id = ? ORDER BY created_at")
                .bind(brand_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct LineageRow {
    id: String,
    brand_id: String,
    root_ancestor_id: String,
    parent_creative_id: String,
    child_creative_id: String,
    mode: String,
    changed_element: Option<String>,
    old_value: Option<String>,
    new_value: Option<String>,
    iteration_round: i64,
    parent_reward_score: f64,
    child_reward_score: Option<f64>,
    outperformed_parent: Option<i64>,
    created_at: String,
    matured_at: Option<String>,
}

impl TryFrom<LineageRow> for AdLineage {
    type Error = DomainError;

    fn try_from(row: LineageRow) -> Result<Self, Self::Error> {
        let parse_uuid = |s: &str| {
            Uuid::parse_str(s).map_err(|e| DomainError::SerializationError(e.to_string()))
        };
        let parse_ts = |s: &str| {
            chrono::DateTime::parse_from_rfc3339(s)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| DomainError::SerializationError(e.to_string()))
        };
        let mode = EvolutionMode::from_str(&row.mode).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid evolution mode: {}", row.mode))
        })?;

        Ok(AdLineage {
            id: parse_uuid(&row.id)?,
            brand_id: parse_uuid(&row.brand_id)?,
            root_ancestor_id: parse_uuid(&row.root_ancestor_id)?,
            parent_creative_id: parse_uuid(&row.parent_creative_id)?,
            child_creative_id: parse_uuid(&row.child_creative_id)?,
            mode,
            changed_element: row.changed_element,
            old_value: row.old_value,
            new_value: row.new_value,
            iteration_round: u32::try_from(row.iteration_round.max(0)).unwrap_or(0),
            parent_reward_score: row.parent_reward_score,
            child_reward_score: row.child_reward_score,
            outperformed_parent: row.outperformed_parent.map(|v| v != 0),
            created_at: parse_ts(&row.created_at)?,
            matured_at: row.matured_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}
