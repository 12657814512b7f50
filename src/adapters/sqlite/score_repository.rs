//! SQLite implementation of the ScoreRepository.
//!
//! record_event writes the ledger row and the derived score in one
//! transaction; the UNIQUE (reward_id, element_name, element_value) key makes
//! the whole operation exactly-once under retries.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Score, ScoreEvent};
use crate::domain::ports::{PooledPosterior, ScoreRepository};

#[derive(Clone)]
pub struct SqliteScoreRepository {
    pool: SqlitePool,
}

impl SqliteScoreRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScoreRepository for SqliteScoreRepository {
    async fn record_event(&self, event: &ScoreEvent) -> DomainResult<bool> {
        event.validate()?;
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"INSERT OR IGNORE INTO score_events
               (id, reward_id, brand_id, element_name, element_value,
                alpha_delta, beta_delta, obs_delta, reward_value, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(event.id.to_string())
        .bind(event.reward_id.to_string())
        .bind(event.brand_id.to_string())
        .bind(&event.element_name)
        .bind(&event.element_value)
        .bind(event.alpha_delta)
        .bind(event.beta_delta)
        .bind(event.obs_delta)
        .bind(event.reward_value)
        .bind(event.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let existing: Option<ScoreRow> = sqlx::query_as(
            "SELECT * FROM scores WHERE brand_id = ? AND element_name = ? AND element_value = ?",
        )
        .bind(event.brand_id.to_string())
        .bind(&event.element_name)
        .bind(&event.element_value)
        .fetch_optional(&mut *tx)
        .await?;

        let mut score = match existing {
            Some(row) => row.try_into()?,
            None => Score::cold_start(event.brand_id, &event.element_name, &event.element_value),
        };
        score.apply(event)?;

        sqlx::query(
            r#"INSERT INTO scores
               (id, brand_id, element_name, element_value, alpha, beta,
                observations, mean_reward, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (brand_id, element_name, element_value) DO UPDATE SET
                   alpha = excluded.alpha,
                   beta = excluded.beta,
                   observations = excluded.observations,
                   mean_reward = excluded.mean_reward,
                   updated_at = excluded.updated_at"#,
        )
        .bind(score.id.to_string())
        .bind(score.brand_id.to_string())
        .bind(&score.element_name)
        .bind(&score.element_value)
        .bind(score.alpha)
        .bind(score.beta)
        .bind(score.observations)
        .bind(score.mean_reward)
        .bind(score.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn get(
        &self,
        brand_id: Uuid,
        element_name: &str,
        element_value: &str,
    ) -> DomainResult<Option<Score>> {
        let row: Option<ScoreRow> = sqlx::query_as(
            "SELECT * FROM scores WHERE brand_id = ? AND element_name = ? AND element_value = ?",
        )
        .bind(brand_id.to_string())
        .bind(element_name)
        .bind(element_value)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_dimension(
        &self,
        brand_id: Uuid,
        element_name: &str,
    ) -> DomainResult<Vec<Score>> {
        let rows: Vec<ScoreRow> = sqlx::query_as(
            r#"SELECT * FROM scores
               WHERE brand_id = ? AND element_name = ?
               ORDER BY element_value"#,
        )
        .bind(brand_id.to_string())
        .bind(element_name)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_dimensions(&self, brand_id: Uuid) -> DomainResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT element_name FROM scores WHERE brand_id = ? ORDER BY element_name",
        )
        .bind(brand_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn list_events(
        &self,
        brand_id: Uuid,
        element_name: &str,
        element_value: &str,
    ) -> DomainResult<Vec<ScoreEvent>> {
        let rows: Vec<ScoreEventRow> = sqlx::query_as(
            r#"SELECT * FROM score_events
               WHERE brand_id = ? AND element_name = ? AND element_value = ?
               ORDER BY created_at"#,
        )
        .bind(brand_id.to_string())
        .bind(element_name)
        .bind(element_value)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn pooled_posterior(
        &self,
        element_name: &str,
        element_value: &str,
        exclude_brand: Uuid,
    ) -> DomainResult<PooledPosterior> {
        let row: Option<(f64, f64, f64)> = sqlx::query_as(
            r#"SELECT COALESCE(SUM(e.alpha_delta), 0),
                      COALESCE(SUM(e.beta_delta), 0),
                      COALESCE(SUM(e.obs_delta), 0)
               FROM score_events e
               JOIN brand_settings bs ON bs.brand_id = e.brand_id
               WHERE bs.share_cross_brand_data = 1
                 AND e.brand_id != ?
                 AND e.element_name = ?
                 AND e.element_value = ?"#,
        )
        .bind(exclude_brand.to_string())
        .bind(element_name)
        .bind(element_value)
        .fetch_optional(&self.pool)
        .await?;

        // Pooled mass sits on top of the same Beta(1, 1) floor.
        let (alpha_mass, beta_mass, observations) = row.unwrap_or((0.0, 0.0, 0.0));
        Ok(PooledPosterior {
            alpha: 1.0 + alpha_mass,
            beta: 1.0 + beta_mass,
            observations,
        })
    }

    async fn pooled_values(
        &self,
        element_name: &str,
        exclude_brand: Uuid,
    ) -> DomainResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"SELECT DISTINCT e.element_value
               FROM score_events e
               JOIN brand_settings bs ON bs.brand_id = e.brand_id
               WHERE bs.share_cross_brand_data = 1
                 AND e.brand_id != ?
                 AND e.element_name = ?
               ORDER BY e.element_value"#,
        )
        .bind(exclude_brand.to_string())
        .bind(element_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(value,)| value).collect())
    }

    async fn delete_stale(&self) -> DomainResult<u64> {
        let result = sqlx::query(
            r#"DELETE FROM scores WHERE NOT EXISTS (
                   SELECT 1 FROM score_events e
                   WHERE e.brand_id = scores.brand_id
                     AND e.element_name = scores.element_name
                     AND e.element_value = scores.element_value
               )"#,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct ScoreRow {
    id: String,
    brand_id: String,
    element_name: String,
    element_value: String,
    alpha: f64,
    beta: f64,
    observations: f64,
    mean_reward: f64,
    updated_at: String,
}

impl TryFrom<ScoreRow> for Score {
    type Error = DomainError;

    fn try_from(row: ScoreRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;
        let brand_id = Uuid::parse_str(&row.brand_id)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;
        let updated_at = chrono::DateTime::parse_from_rfc3339(&row.updated_at)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?
            .with_timezone(&Utc);

        Ok(Score {
            id,
            brand_id,
            element_name: row.element_name,
            element_value: row.element_value,
            alpha: row.alpha,
            beta: row.beta,
            observations: row.observations,
            mean_reward: row.mean_reward,
            updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ScoreEventRow {
    id: String,
    reward_id: String,
    brand_id: String,
    element_name: String,
    element_value: String,
    alpha_delta: f64,
    beta_delta: f64,
    obs_delta: f64,
    reward_value: f64,
    created_at: String,
}

impl TryFrom<ScoreEventRow> for ScoreEvent {
    type Error = DomainError;

    fn try_from(row: ScoreEventRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;
        let reward_id = Uuid::parse_str(&row.reward_id)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;
        let brand_id = Uuid::parse_str(&row.brand_id)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?
            .with_timezone(&Utc);

        Ok(ScoreEvent {
            id,
            reward_id,
            brand_id,
            element_name: row.element_name,
            element_value: row.element_value,
            alpha_delta: row.alpha_delta,
            beta_delta: row.beta_delta,
            obs_delta: row.obs_delta,
            reward_value: row.reward_value,
            created_at,
        })
    }
}
