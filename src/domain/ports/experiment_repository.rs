//! Port for experiments, arms, daily analyses, and causal effects.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    CausalEffect, Experiment, ExperimentAnalysis, ExperimentArm, ExperimentStatus,
};

#[async_trait]
pub trait ExperimentRepository: Send + Sync {
    async fn create(&self, experiment: &Experiment) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Experiment>>;

    async fn update(&self, experiment: &Experiment) -> DomainResult<()>;

    async fn list_by_status(&self, status: ExperimentStatus) -> DomainResult<Vec<Experiment>>;

    /// Insert an arm. Rejects a second control arm for the same experiment
    /// and duplicate (experiment, variable_value) pairs.
    async fn add_arm(&self, arm: &ExperimentArm) -> DomainResult<()>;

    async fn list_arms(&self, experiment_id: Uuid) -> DomainResult<Vec<ExperimentArm>>;

    /// Attach the platform objects created during deployment to an arm.
    async fn bind_arm_platform(
        &self,
        arm_id: Uuid,
        platform_ad_set_id: Option<&str>,
        platform_ad_id: Option<&str>,
    ) -> DomainResult<()>;

    /// Append one daily analysis. Rejects a date at or before the latest
    /// existing analysis (snapshots are append-only and date-ordered).
    /// Returns false, writing nothing, when the experiment was cancelled
    /// while the analysis was being computed.
    async fn insert_analysis(&self, analysis: &ExperimentAnalysis) -> DomainResult<bool>;

    async fn latest_analysis(
        &self,
        experiment_id: Uuid,
    ) -> DomainResult<Option<ExperimentAnalysis>>;

    async fn list_analyses(&self, experiment_id: Uuid) -> DomainResult<Vec<ExperimentAnalysis>>;

    /// Whether an analysis already exists for the given day.
    async fn analysis_exists(&self, experiment_id: Uuid, date: NaiveDate) -> DomainResult<bool>;

    async fn insert_causal_effect(&self, effect: &CausalEffect) -> DomainResult<()>;

    async fn get_causal_effect(&self, experiment_id: Uuid) -> DomainResult<Option<CausalEffect>>;

    async fn list_causal_effects(&self, brand_id: Uuid) -> DomainResult<Vec<CausalEffect>>;
}
