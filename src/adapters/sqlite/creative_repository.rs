//! SQLite implementation of the CreativeRepository.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Creative, GenerationRequest, Provenance};
use crate::domain::ports::CreativeRepository;

#[derive(Clone)]
pub struct SqliteCreativeRepository {
    pool: SqlitePool,
}

impl SqliteCreativeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CreativeRepository for SqliteCreativeRepository {
    async fn get(&self, id: Uuid) -> DomainResult<Option<Creative>> {
        let row: Option<CreativeRow> = sqlx::query_as("SELECT * FROM creatives WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_brands(&self) -> DomainResult<Vec<Uuid>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT brand_id FROM creatives ORDER BY brand_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().filter_map(|(id,)| Uuid::parse_str(&id).ok()).collect())
    }

    async fn list_by_brand(&self, brand_id: Uuid) -> DomainResult<Vec<Creative>> {
        let rows: Vec<CreativeRow> =
            sqlx::query_as("SELECT * FROM creatives WHERE brand_id = ? ORDER BY created_at")
                .bind(brand_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn submit_generation_request(&self, request: &GenerationRequest) -> DomainResult<()> {
        let elements_json = serde_json::to_string(&request.elements)?;
        sqlx::query(
            r#"INSERT INTO generation_requests (id, brand_id, ancestor_id, elements, canvas_size, mode, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(request.id.to_string())
        .bind(request.brand_id.to_string())
        .bind(request.ancestor_id.to_string())
        .bind(&elements_json)
        .bind(&request.canvas_size)
        .bind(&request.mode)
        .bind(request.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct CreativeRow {
    id: String,
    brand_id: String,
    elements: String,
    provenance: String,
    canvas_size: String,
    created_at: String,
}

impl TryFrom<CreativeRow> for Creative {
    type Error = DomainError;

    fn try_from(row: CreativeRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;
        let brand_id = Uuid::parse_str(&row.brand_id)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;
        let elements: BTreeMap<String, String> = serde_json::from_str(&row.elements)?;
        let provenance = Provenance::from_str(&row.provenance).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid provenance: {}", row.provenance))
        })?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?
            .with_timezone(&chrono::Utc);

        Ok(Creative { id, brand_id, elements, provenance, canvas_size: row.canvas_size, created_at })
    }
}
