//! SQLite implementation of the SnapshotRepository (read-only views over the
//! ingestion collaborator's tables).

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    BrandReference, CampaignObjective, DailySnapshot, MetricReference, SnapshotAggregate,
};
use crate::domain::ports::SnapshotRepository;

#[derive(Clone)]
pub struct SqliteSnapshotRepository {
    pool: SqlitePool,
}

impl SqliteSnapshotRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn aggregate_from_row(creative_id: Uuid, row: AggregateRow) -> DomainResult<SnapshotAggregate> {
        let objective = CampaignObjective::from_str(&row.objective).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid objective: {}", row.objective))
        })?;
        Ok(SnapshotAggregate {
            creative_id,
            objective,
            impressions: u64::try_from(row.impressions.max(0)).unwrap_or(0),
            clicks: u64::try_from(row.clicks.max(0)).unwrap_or(0),
            conversions: u64::try_from(row.conversions.max(0)).unwrap_or(0),
            spend: row.spend,
            revenue: row.revenue,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AggregateRow {
    objective: String,
    impressions: i64,
    clicks: i64,
    conversions: i64,
    spend: f64,
    revenue: f64,
}

#[async_trait]
impl SnapshotRepository for SqliteSnapshotRepository {
    async fn aggregate_for(&self, creative_id: Uuid) -> DomainResult<Option<SnapshotAggregate>> {
        let row: Option<AggregateRow> = sqlx::query_as(
            r#"SELECT objective,
                      SUM(impressions) AS impressions,
                      SUM(clicks) AS clicks,
                      SUM(conversions) AS conversions,
                      SUM(spend) AS spend,
                      SUM(revenue) AS revenue
               FROM performance_snapshots
               WHERE creative_id = ?
               GROUP BY objective
               ORDER BY SUM(impressions) DESC
               LIMIT 1"#,
        )
        .bind(creative_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Self::aggregate_from_row(creative_id, r)).transpose()
    }

    async fn aggregate_for_platform_ad(
        &self,
        platform_ad_id: &str,
    ) -> DomainResult<Option<SnapshotAggregate>> {
        let row: Option<PlatformAggregateRow> = sqlx::query_as(
            r#"SELECT creative_id, objective,
                      SUM(impressions) AS impressions,
                      SUM(clicks) AS clicks,
                      SUM(conversions) AS conversions,
                      SUM(spend) AS spend,
                      SUM(revenue) AS revenue
               FROM performance_snapshots
               WHERE platform_ad_id = ?
               GROUP BY creative_id, objective
               ORDER BY SUM(impressions) DESC
               LIMIT 1"#,
        )
        .bind(platform_ad_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(platform_row) => {
                let creative_id = Uuid::parse_str(&platform_row.creative_id)
                    .map_err(|e| DomainError::SerializationError(e.to_string()))?;
                Ok(Some(Self::aggregate_from_row(creative_id, platform_row.into())?))
            }
            None => Ok(None),
        }
    }

    async fn daily_series(&self, creative_id: Uuid, days: u32) -> DomainResult<Vec<DailySnapshot>> {
        let rows: Vec<(String, i64, i64, i64)> = sqlx::query_as(
            r#"SELECT snapshot_date,
                      SUM(impressions), SUM(clicks), SUM(conversions)
               FROM performance_snapshots
               WHERE creative_id = ?
               GROUP BY snapshot_date
               ORDER BY snapshot_date DESC
               LIMIT ?"#,
        )
        .bind(creative_id.to_string())
        .bind(i64::from(days))
        .fetch_all(&self.pool)
        .await?;

        let mut series: Vec<DailySnapshot> = rows
            .into_iter()
            .map(|(date, impressions, clicks, conversions)| {
                let snapshot_date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                    .map_err(|e| DomainError::SerializationError(e.to_string()))?;
                Ok(DailySnapshot {
                    snapshot_date,
                    impressions: u64::try_from(impressions.max(0)).unwrap_or(0),
                    clicks: u64::try_from(clicks.max(0)).unwrap_or(0),
                    conversions: u64::try_from(conversions.max(0)).unwrap_or(0),
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;
        series.reverse(); // newest last
        Ok(series)
    }

    async fn brand_reference(&self, brand_id: Uuid) -> DomainResult<BrandReference> {
        // Per-creative lifetime rates across the brand form the reference
        // population each new reward is rescaled against.
        let rows: Vec<(i64, i64, i64, f64, f64)> = sqlx::query_as(
            r#"SELECT SUM(s.impressions), SUM(s.clicks), SUM(s.conversions),
                      SUM(s.spend), SUM(s.revenue)
               FROM performance_snapshots s
               JOIN creatives c ON c.id = s.creative_id
               WHERE c.brand_id = ?
               GROUP BY s.creative_id"#,
        )
        .bind(brand_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut ctr = Vec::with_capacity(rows.len());
        let mut cvr = Vec::with_capacity(rows.len());
        let mut roas = Vec::with_capacity(rows.len());
        for (impressions, clicks, conversions, spend, revenue) in rows {
            if impressions > 0 {
                ctr.push(clicks as f64 / impressions as f64);
            }
            if clicks > 0 {
                cvr.push(conversions as f64 / clicks as f64);
            }
            if spend > 0.0 {
                roas.push(revenue / spend);
            }
        }

        Ok(BrandReference {
            ctr: MetricReference::new(ctr),
            cvr: MetricReference::new(cvr),
            roas: MetricReference::new(roas),
        })
    }

    async fn brand_shares_data(&self, brand_id: Uuid) -> DomainResult<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT share_cross_brand_data FROM brand_settings WHERE brand_id = ?")
                .bind(brand_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        // Sharing is opt-in: absent settings mean no sharing.
        Ok(row.is_some_and(|(flag,)| flag != 0))
    }
}

#[derive(sqlx::FromRow)]
struct PlatformAggregateRow {
    creative_id: String,
    objective: String,
    impressions: i64,
    clicks: i64,
    conversions: i64,
    spend: f64,
    revenue: f64,
}

impl From<PlatformAggregateRow> for AggregateRow {
    fn from(row: PlatformAggregateRow) -> Self {
        Self {
            objective: row.objective,
            impressions: row.impressions,
            clicks: row.clicks,
            conversions: row.conversions,
            spend: row.spend,
            revenue: row.revenue,
        }
    }
}
