//! SQLite implementation of the ExperimentRepository.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AnalysisDecision, ArmResult, CausalEffect, EvidenceGrade, Experiment, ExperimentAnalysis,
    ExperimentArm, ExperimentProtocol, ExperimentStatus, PrimaryMetric,
};
use crate::domain::ports::ExperimentRepository;

const DATE_FMT: &str = "%Y-%m-%d";

#[derive(Clone)]
pub struct SqliteExperimentRepository {
    pool: SqlitePool,
}

impl SqliteExperimentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExperimentRepository for SqliteExperimentRepository {
    async fn create(&self, experiment: &Experiment) -> DomainResult<()> {
        let protocol_json = serde_json::to_string(&experiment.protocol)?;
        sqlx::query(
            r#"INSERT INTO experiments
               (id, brand_id, name, hypothesis, test_variable, primary_metric, status,
                protocol, created_at, updated_at, started_at, concluded_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(experiment.id.to_string())
        .bind(experiment.brand_id.to_string())
        .bind(&experiment.name)
        .bind(&experiment.hypothesis)
        .bind(&experiment.test_variable)
        .bind(experiment.primary_metric.as_str())
        .bind(experiment.status.as_str())
        .bind(&protocol_json)
        .bind(experiment.created_at.to_rfc3339())
        .bind(experiment.updated_at.to_rfc3339())
        .bind(experiment.started_at.map(|t| t.to_rfc3339()))
        .bind(experiment.concluded_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Experiment>> {
        let row: Option<ExperimentRow> =
            sqlx::query_as("SELECT * FROM experiments WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn update(&self, experiment: &Experiment) -> DomainResult<()> {
        let protocol_json = serde_json::to_string(&experiment.protocol)?;
        let result = sqlx::query(
            r#"UPDATE experiments SET
                   name = ?, hypothesis = ?, test_variable = ?, primary_metric = ?,
                   status = ?, protocol = ?, updated_at = ?, started_at = ?, concluded_at = ?
               WHERE id = ?"#,
        )
        .bind(&experiment.name)
        .bind(&experiment.hypothesis)
        .bind(&experiment.test_variable)
        .bind(experiment.primary_metric.as_str())
        .bind(experiment.status.as_str())
        .bind(&protocol_json)
        .bind(experiment.updated_at.to_rfc3339())
        .bind(experiment.started_at.map(|t| t.to_rfc3339()))
        .bind(experiment.concluded_at.map(|t| t.to_rfc3339()))
        .bind(experiment.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::ExperimentNotFound(experiment.id));
        }
        Ok(())
    }

    async fn list_by_status(&self, status: ExperimentStatus) -> DomainResult<Vec<Experiment>> {
        let rows: Vec<ExperimentRow> =
            sqlx::query_as("SELECT * FROM experiments WHERE status = ? ORDER BY created_at")
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn add_arm(&self, arm: &ExperimentArm) -> DomainResult<()> {
        let result = sqlx::query(
            r#"INSERT INTO experiment_arms
               (id, experiment_id, arm_index, variable_value, is_control,
                platform_ad_set_id, platform_ad_id)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(arm.id.to_string())
        .bind(arm.experiment_id.to_string())
        .bind(i64::from(arm.arm_index))
        .bind(&arm.variable_value)
        .bind(i64::from(arm.is_control))
        .bind(&arm.platform_ad_set_id)
        .bind(&arm.platform_ad_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            // The partial unique index on (experiment_id) WHERE is_control = 1
            // surfaces a second control arm as a unique violation.
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() && arm.is_control => {
                Err(DomainError::DuplicateControlArm(arm.experiment_id))
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(DomainError::ValidationFailed(format!(
                    "duplicate arm for experiment {}: {}",
                    arm.experiment_id, arm.variable_value
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_arms(&self, experiment_id: Uuid) -> DomainResult<Vec<ExperimentArm>> {
        let rows: Vec<ArmRow> = sqlx::query_as(
            "SELECT * FROM experiment_arms WHERE experiment_id = ? ORDER BY arm_index",
        )
        .bind(experiment_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn bind_arm_platform(
        &self,
        arm_id: Uuid,
        platform_ad_set_id: Option<&str>,
        platform_ad_id: Option<&str>,
    ) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE experiment_arms SET platform_ad_set_id = ?, platform_ad_id = ? WHERE id = ?",
        )
        .bind(platform_ad_set_id)
        .bind(platform_ad_id)
        .bind(arm_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::ValidationFailed(format!("unknown arm: {arm_id}")));
        }
        Ok(())
    }

    async fn insert_analysis(&self, analysis: &ExperimentAnalysis) -> DomainResult<bool> {
        let mut tx = self.pool.begin().await?;

        // A cancel that landed while this analysis was computed wins: the
        // result is discarded without a row.
        let status: Option<(String,)> =
            sqlx::query_as("SELECT status FROM experiments WHERE id = ?")
                .bind(analysis.experiment_id.to_string())
                .fetch_optional(&mut *tx)
                .await?;
        match status {
            None => {
                tx.rollback().await?;
                return Err(DomainError::ExperimentNotFound(analysis.experiment_id));
            }
            Some((s,)) if s == ExperimentStatus::Cancelled.as_str() => {
                tx.rollback().await?;
                return Ok(false);
            }
            Some(_) => {}
        }

        // MAX over an empty history yields a single NULL row.
        let (latest,): (Option<String>,) = sqlx::query_as(
            "SELECT MAX(analysis_date) FROM experiment_analyses WHERE experiment_id = ?",
        )
        .bind(analysis.experiment_id.to_string())
        .fetch_one(&mut *tx)
        .await?;

        if let Some(latest_date) = latest {
            let latest_date = NaiveDate::parse_from_str(&latest_date, DATE_FMT)
                .map_err(|e| DomainError::SerializationError(e.to_string()))?;
            if analysis.analysis_date <= latest_date {
                tx.rollback().await?;
                return Err(DomainError::AnalysisSuperseded {
                    experiment_id: analysis.experiment_id,
                    date: analysis.analysis_date.format(DATE_FMT).to_string(),
                });
            }
        }

        let arm_results_json = serde_json::to_string(&analysis.arm_results)?;
        sqlx::query(
            r#"INSERT INTO experiment_analyses
               (id, experiment_id, analysis_date, arm_results, decision,
                leading_arm_id, evidence_grade, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(analysis.id.to_string())
        .bind(analysis.experiment_id.to_string())
        .bind(analysis.analysis_date.format(DATE_FMT).to_string())
        .bind(&arm_results_json)
        .bind(analysis.decision.as_str())
        .bind(analysis.leading_arm_id.map(|id| id.to_string()))
        .bind(analysis.evidence_grade.as_str())
        .bind(analysis.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn latest_analysis(
        &self,
        experiment_id: Uuid,
    ) -> DomainResult<Option<ExperimentAnalysis>> {
        let row: Option<AnalysisRow> = sqlx::query_as(
            r#"SELECT * FROM experiment_analyses
               WHERE experiment_id = ?
               ORDER BY analysis_date DESC
               LIMIT 1"#,
        )
        .bind(experiment_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_analyses(&self, experiment_id: Uuid) -> DomainResult<Vec<ExperimentAnalysis>> {
        let rows: Vec<AnalysisRow> = sqlx::query_as(
            "SELECT * FROM experiment_analyses WHERE experiment_id = ? ORDER BY analysis_date",
        )
        .bind(experiment_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn analysis_exists(&self, experiment_id: Uuid, date: NaiveDate) -> DomainResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM experiment_analyses WHERE experiment_id = ? AND analysis_date = ?",
        )
        .bind(experiment_id.to_string())
        .bind(date.format(DATE_FMT).to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn insert_causal_effect(&self, effect: &CausalEffect) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO causal_effects
               (id, experiment_id, brand_id, element_name, winning_value, control_value,
                absolute_effect, relative_effect, ci_lower, ci_upper, evidence_grade, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(effect.id.to_string())
        .bind(effect.experiment_id.to_string())
        .bind(effect.brand_id.to_string())
        .bind(&effect.element_name)
        .bind(&effect.winning_value)
        .bind(&effect.control_value)
        .bind(effect.absolute_effect)
        .bind(effect.relative_effect)
        .bind(effect.ci_lower)
        .bind(effect.ci_upper)
        .bind(effect.evidence_grade.as_str())
        .bind(effect.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_causal_effect(&self, experiment_id: Uuid) -> DomainResult<Option<CausalEffect>> {
        let row: Option<CausalEffectRow> =
            sqlx::query_as("SELECT * FROM causal_effects WHERE experiment_id = ?")
                .bind(experiment_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_causal_effects(&self, brand_id: Uuid) -> DomainResult<Vec<CausalEffect>> {
        let rows: Vec<CausalEffectRow> =
            sqlx::query_as("SELECT * FROM causal_effects WHERE brand_id = ? ORDER BY created_at")
                .bind(brand_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

fn parse_uuid(s: &str) -> DomainResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DomainError::SerializationError(e.to_string()))
}

fn parse_timestamp(s: &str) -> DomainResult<chrono::DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| DomainError::SerializationError(e.to_string()))
}

#[derive(sqlx::FromRow)]
struct ExperimentRow {
    id: String,
    brand_id: String,
    name: String,
    hypothesis: String,
    test_variable: String,
    primary_metric: String,
    status: String,
    protocol: String,
    created_at: String,
    updated_at: String,
    started_at: Option<String>,
    concluded_at: Option<String>,
}

impl TryFrom<ExperimentRow> for Experiment {
    type Error = DomainError;

    fn try_from(row: ExperimentRow) -> Result<Self, Self::Error> {
        let primary_metric = PrimaryMetric::from_str(&row.primary_metric).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid metric: {}", row.primary_metric))
        })?;
        let status = ExperimentStatus::from_str(&row.status).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid status: {}", row.status))
        })?;
        let protocol: ExperimentProtocol = serde_json::from_str(&row.protocol)?;

        Ok(Experiment {
            id: parse_uuid(&row.id)?,
            brand_id: parse_uuid(&row.brand_id)?,
            name: row.name,
            hypothesis: row.hypothesis,
            test_variable: row.test_variable,
            primary_metric,
            status,
            protocol,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
            started_at: row.started_at.as_deref().map(parse_timestamp).transpose()?,
            concluded_at: row.concluded_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ArmRow {
    id: String,
    experiment_id: String,
    arm_index: i64,
    variable_value: String,
    is_control: i64,
    platform_ad_set_id: Option<String>,
    platform_ad_id: Option<String>,
}

impl TryFrom<ArmRow> for ExperimentArm {
    type Error = DomainError;

    fn try_from(row: ArmRow) -> Result<Self, Self::Error> {
        Ok(ExperimentArm {
            id: parse_uuid(&row.id)?,
            experiment_id: parse_uuid(&row.experiment_id)?,
            arm_index: u32::try_from(row.arm_index.max(0)).unwrap_or(0),
            variable_value: row.variable_value,
            is_control: row.is_control != 0,
            platform_ad_set_id: row.platform_ad_set_id,
            platform_ad_id: row.platform_ad_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AnalysisRow {
    id: String,
    experiment_id: String,
    analysis_date: String,
    arm_results: String,
    decision: String,
    leading_arm_id: Option<String>,
    evidence_grade: String,
    created_at: String,
}

impl TryFrom<AnalysisRow> for ExperimentAnalysis {
    type Error = DomainError;

    fn try_from(row: AnalysisRow) -> Result<Self, Self::Error> {
        let analysis_date = NaiveDate::parse_from_str(&row.analysis_date, DATE_FMT)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;
        let arm_results: Vec<ArmResult> = serde_json::from_str(&row.arm_results)?;
        let decision = AnalysisDecision::from_str(&row.decision).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid decision: {}", row.decision))
        })?;
        let evidence_grade = EvidenceGrade::from_str(&row.evidence_grade).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid grade: {}", row.evidence_grade))
        })?;

        Ok(ExperimentAnalysis {
            id: parse_uuid(&row.id)?,
            experiment_id: parse_uuid(&row.experiment_id)?,
            analysis_date,
            arm_results,
            decision,
            leading_arm_id: row.leading_arm_id.as_deref().map(parse_uuid).transpose()?,
            evidence_grade,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CausalEffectRow {
    id: String,
    experiment_id: String,
    brand_id: String,
    element_name: String,
    winning_value: String,
    control_value: String,
    absolute_effect: f64,
    relative_effect: f64,
    ci_lower: f64,
    ci_upper: f64,
    evidence_grade: String,
    created_at: String,
}

impl TryFrom<CausalEffectRow> for CausalEffect {
    type Error = DomainError;

    fn try_from(row: CausalEffectRow) -> Result<Self, Self::Error> {
        let evidence_grade = EvidenceGrade::from_str(&row.evidence_grade).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid grade: {}", row.evidence_grade))
        })?;
        Ok(CausalEffect {
            id: parse_uuid(&row.id)?,
            experiment_id: parse_uuid(&row.experiment_id)?,
            brand_id: parse_uuid(&row.brand_id)?,
            element_name: row.element_name,
            winning_value: row.winning_value,
            control_value: row.control_value,
            absolute_effect: row.absolute_effect,
            relative_effect: row.relative_effect,
            ci_lower: row.ci_lower,
            ci_upper: row.ci_upper,
            evidence_grade,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}
