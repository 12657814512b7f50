//! SQLite implementation of the LockRepository: a lease row per
//! (brand, job_type), reclaimable once expired.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::ports::LockRepository;

#[derive(Clone)]
pub struct SqliteLockRepository {
    pool: SqlitePool,
}

impl SqliteLockRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockRepository for SqliteLockRepository {
    async fn try_acquire(
        &self,
        brand_id: Uuid,
        job_type: &str,
        lease: Duration,
    ) -> DomainResult<bool> {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(lease).unwrap_or(chrono::Duration::hours(1));

        // Upsert wins only when no row exists or the held lease has expired;
        // the WHERE clause on the update arm makes this one atomic statement.
        let result = sqlx::query(
            r#"INSERT INTO job_locks (brand_id, job_type, acquired_at, expires_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT (brand_id, job_type) DO UPDATE SET
                   acquired_at = excluded.acquired_at,
                   expires_at = excluded.expires_at
               WHERE job_locks.expires_at <= ?"#,
        )
        .bind(brand_id.to_string())
        .bind(job_type)
        .bind(now.to_rfc3339())
        .bind(expires_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn release(&self, brand_id: Uuid, job_type: &str) -> DomainResult<()> {
        sqlx::query("DELETE FROM job_locks WHERE brand_id = ? AND job_type = ?")
            .bind(brand_id.to_string())
            .bind(job_type)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
