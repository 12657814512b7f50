//! SQLite implementation of the InteractionRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ElementInteraction, InteractionDirection};
use crate::domain::ports::InteractionRepository;

#[derive(Clone)]
pub struct SqliteInteractionRepository {
    pool: SqlitePool,
}

impl SqliteInteractionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InteractionRepository for SqliteInteractionRepository {
    async fn replace_for_brand(
        &self,
        brand_id: Uuid,
        interactions: &[ElementInteraction],
    ) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM element_interactions WHERE brand_id = ?")
            .bind(brand_id.to_string())
            .execute(&mut *tx)
            .await?;

        for interaction in interactions {
            sqlx::query(
                r#"INSERT INTO element_interactions
                   (id, brand_id, name_a, value_a, name_b, value_b, effect, direction,
                    ci_lower, ci_upper, sample_size, significant, computed_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(interaction.id.to_string())
            .bind(brand_id.to_string())
            .bind(&interaction.name_a)
            .bind(&interaction.value_a)
            .bind(&interaction.name_b)
            .bind(&interaction.value_b)
            .bind(interaction.effect)
            .bind(interaction.direction.as_str())
            .bind(interaction.ci_lower)
            .bind(interaction.ci_upper)
            .bind(i64::try_from(interaction.sample_size).unwrap_or(i64::MAX))
            .bind(i64::from(interaction.significant))
            .bind(interaction.computed_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_for_brand(&self, brand_id: Uuid) -> DomainResult<Vec<ElementInteraction>> {
        let rows: Vec<InteractionRow> = sqlx::query_as(
            r#"SELECT * FROM element_interactions
               WHERE brand_id = ?
               ORDER BY name_a, value_a, name_b, value_b"#,
        )
        .bind(brand_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct InteractionRow {
    id: String,
    brand_id: String,
    name_a: String,
    value_a: String,
    name_b: String,
    value_b: String,
    effect: f64,
    direction: String,
    ci_lower: f64,
    ci_upper: f64,
    sample_size: i64,
    significant: i64,
    computed_at: String,
}

impl TryFrom<InteractionRow> for ElementInteraction {
    type Error = DomainError;

    fn try_from(row: InteractionRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;
        let brand_id = Uuid::parse_str(&row.brand_id)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;
        let direction = InteractionDirection::from_str(&row.direction).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid direction: {}", row.direction))
        })?;
        let computed_at = chrono::DateTime::parse_from_rfc3339(&row.computed_at)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?
            .with_timezone(&Utc);

        Ok(ElementInteraction {
            id,
            brand_id,
            name_a: row.name_a,
            value_a: row.value_a,
            name_b: row.name_b,
            value_b: row.value_b,
            effect: row.effect,
            direction,
            ci_lower: row.ci_lower,
            ci_upper: row.ci_upper,
            sample_size: u64::try_from(row.sample_size.max(0)).unwrap_or(0),
            significant: row.significant != 0,
            computed_at,
        })
    }
}
