//! Experiment engine: lifecycle management plus the sequential daily
//! analysis that decides winner / futility / inconclusive.
//!
//! Decisions are monotonic: once a terminal decision is recorded, later
//! analyses carry it forward instead of re-deciding. Each (experiment, date)
//! is analyzed at most once.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AnalysisDecision, ArmResult, CausalEffect, Config, Experiment, ExperimentAnalysis,
    ExperimentArm, ExperimentProtocol, ExperimentStatus, PrimaryMetric,
};
use crate::domain::ports::{ExperimentRepository, LockRepository, SnapshotRepository};
use crate::domain::stats::{credible_interval_diff, probability_of_best};

pub const JOB_TYPE: &str = "experiment_engine";

/// Per-arm observed counts on the primary metric.
#[derive(Debug, Clone, Copy)]
struct ArmCounts {
    trials: u64,
    successes: u64,
}

pub struct ExperimentEngine<E, S, L>
where
    E: ExperimentRepository,
    S: SnapshotRepository,
    L: LockRepository,
{
    experiments: Arc<E>,
    snapshots: Arc<S>,
    locks: Arc<L>,
    config: Config,
}

impl<E, S, L> ExperimentEngine<E, S, L>
where
    E: ExperimentRepository,
    S: SnapshotRepository,
    L: LockRepository,
{
    pub fn new(experiments: Arc<E>, snapshots: Arc<S>, locks: Arc<L>, config: Config) -> Self {
        Self { experiments, snapshots, locks, config }
    }

    /// Create an experiment with its arms and move it to Ready. Exactly one
    /// arm must be the control.
    pub async fn create(
        &self,
        brand_id: Uuid,
        name: &str,
        hypothesis: &str,
        test_variable: &str,
        primary_metric: PrimaryMetric,
        protocol: ExperimentProtocol,
        arms: &[(String, bool)],
    ) -> DomainResult<Experiment> {
        protocol.validate()?;
        if arms.len() < 2 {
            return Err(DomainError::ValidationFailed(
                "an experiment needs at least two arms".to_string(),
            ));
        }
        let controls = arms.iter().filter(|(_, is_control)| *is_control).count();
        if controls != 1 {
            return Err(DomainError::ValidationFailed(format!(
                "exactly one control arm required, got {controls}"
            )));
        }

        let mut experiment =
            Experiment::new(brand_id, name, test_variable, primary_metric, protocol)
                .with_hypothesis(hypothesis);
        self.experiments.create(&experiment).await?;

        for (idx, (value, is_control)) in arms.iter().enumerate() {
            let arm = ExperimentArm::new(
                experiment.id,
                u32::try_from(idx).unwrap_or(u32::MAX),
                value,
                *is_control,
            );
            self.experiments.add_arm(&arm).await?;
        }

        experiment.transition_to(ExperimentStatus::Ready)?;
        self.experiments.update(&experiment).await?;
        info!(experiment_id = %experiment.id, name, "experiment created");
        Ok(experiment)
    }

    /// Advance through Deploying into Running once platform objects exist.
    pub async fn start(&self, experiment_id: Uuid) -> DomainResult<Experiment> {
        let mut experiment = self.get(experiment_id).await?;
        experiment.transition_to(ExperimentStatus::Deploying)?;
        experiment.transition_to(ExperimentStatus::Running)?;
        self.experiments.update(&experiment).await?;
        info!(experiment_id = %experiment_id, "experiment running");
        Ok(experiment)
    }

    pub async fn cancel(&self, experiment_id: Uuid) -> DomainResult<Experiment> {
        let mut experiment = self.get(experiment_id).await?;
        experiment.transition_to(ExperimentStatus::Cancelled)?;
        self.experiments.update(&experiment).await?;
        info!(experiment_id = %experiment_id, "experiment cancelled");
        Ok(experiment)
    }

    /// Analyze every running experiment for the given date.
    pub async fn run_daily(&self, date: NaiveDate) -> DomainResult<Vec<ExperimentAnalysis>> {
        let running = self.experiments.list_by_status(ExperimentStatus::Running).await?;
        let mut analyses = Vec::new();
        for experiment in running {
            match self.analyze(experiment.id, date).await {
                Ok(Some(analysis)) => analyses.push(analysis),
                Ok(None) => {}
                Err(e) => {
                    warn!(experiment_id = %experiment.id, error = %e, "daily analysis failed");
                }
            }
        }
        Ok(analyses)
    }

    /// One sequential analysis step. Returns None when this date was already
    /// analyzed.
    pub async fn analyze(
        &self,
        experiment_id: Uuid,
        date: NaiveDate,
    ) -> DomainResult<Option<ExperimentAnalysis>> {
        let mut experiment = self.get(experiment_id).await?;

        if experiment.status != ExperimentStatus::Running {
            return Err(DomainError::InvalidStateTransition {
                from: experiment.status.as_str().to_string(),
                to: ExperimentStatus::Analyzing.as_str().to_string(),
                reason: "only running experiments are analyzed".to_string(),
            });
        }
        if self.experiments.analysis_exists(experiment_id, date).await? {
            debug!(experiment_id = %experiment_id, %date, "analysis already exists");
            return Ok(None);
        }

        experiment.transition_to(ExperimentStatus::Analyzing)?;

        let brand_id = experiment.brand_id;
        let lease = Duration::from_secs(self.config.job_lock.lease_seconds);
        if !self.locks.try_acquire(brand_id, JOB_TYPE, lease).await? {
            return Err(DomainError::LockUnavailable {
                brand_id,
                job_type: JOB_TYPE.to_string(),
            });
        }

        let result = match self.experiments.update(&experiment).await {
            Ok(()) => match self.analyze_step(&experiment, date).await {
                Ok(analysis) => Ok(analysis),
                Err(e) => {
                    // The failed step wrote nothing; put the experiment back
                    // in its last good state.
                    if let Err(restore) = self.restore_running(experiment_id).await {
                        warn!(
                            experiment_id = %experiment_id,
                            error = %restore,
                            "failed to restore running state"
                        );
                    }
                    Err(e)
                }
            },
            Err(e) => Err(e),
        };
        self.locks.release(brand_id, JOB_TYPE).await?;
        result
    }

    /// Move an experiment stuck in Analyzing back to Running.
    async fn restore_running(&self, experiment_id: Uuid) -> DomainResult<()> {
        let mut current = self.get(experiment_id).await?;
        if current.status == ExperimentStatus::Analyzing {
            current.transition_to(ExperimentStatus::Running)?;
            self.experiments.update(&current).await?;
        }
        Ok(())
    }

    async fn analyze_step(
        &self,
        experiment: &Experiment,
        date: NaiveDate,
    ) -> DomainResult<Option<ExperimentAnalysis>> {
        let experiment_id = experiment.id;
        let arms = self.experiments.list_arms(experiment_id).await?;
        let mut counts = Vec::with_capacity(arms.len());
        for arm in &arms {
            counts.push(self.arm_counts(arm, experiment.primary_metric).await?);
        }

        let posteriors: Vec<(f64, f64)> = counts
            .iter()
            .map(|c| {
                (
                    1.0 + c.successes as f64,
                    1.0 + c.trials.saturating_sub(c.successes) as f64,
                )
            })
            .collect();

        let probs = probability_of_best(
            &posteriors,
            self.config.experiment.monte_carlo_draws,
            self.config.experiment.seed,
        );

        let prior_terminal = self
            .experiments
            .latest_analysis(experiment_id)
            .await?
            .filter(|a| a.decision.is_terminal())
            .map(|a| (a.decision, a.leading_arm_id));

        let run_days = experiment.run_days(date);
        let (decision, leading_arm_id) = match prior_terminal {
            // Monotonicity: a terminal decision never regresses.
            Some((decision, leading)) => (decision, leading),
            None => self.decide(experiment, &arms, &counts, &probs, &posteriors, run_days),
        };

        let arm_results: Vec<ArmResult> = arms
            .iter()
            .zip(&counts)
            .zip(&posteriors)
            .zip(&probs)
            .map(|(((arm, c), &(alpha, beta)), &prob)| ArmResult {
                arm_id: arm.id,
                variable_value: arm.variable_value.clone(),
                is_control: arm.is_control,
                impressions: c.trials,
                successes: c.successes,
                posterior_alpha: alpha,
                posterior_beta: beta,
                posterior_mean: alpha / (alpha + beta),
                probability_best: prob,
            })
            .collect();

        let analysis = ExperimentAnalysis {
            id: Uuid::new_v4(),
            experiment_id,
            analysis_date: date,
            arm_results,
            decision,
            leading_arm_id,
            evidence_grade: experiment.protocol.evidence_grade(),
            created_at: Utc::now(),
        };
        if !self.experiments.insert_analysis(&analysis).await? {
            info!(experiment_id = %experiment_id, "cancelled during analysis, result discarded");
            return Ok(None);
        }

        let mut experiment = self.get(experiment_id).await?;
        if experiment.status == ExperimentStatus::Cancelled {
            return Ok(Some(analysis));
        }
        if decision.is_terminal() && prior_terminal.is_none() {
            if decision == AnalysisDecision::Winner {
                self.record_causal_effect(&experiment, &arms, &posteriors, leading_arm_id)
                    .await?;
            }
            experiment.transition_to(ExperimentStatus::Concluded)?;
        } else {
            experiment.transition_to(ExperimentStatus::Running)?;
        }
        self.experiments.update(&experiment).await?;

        info!(
            experiment_id = %experiment_id,
            %date,
            decision = decision.as_str(),
            "analysis recorded"
        );
        Ok(Some(analysis))
    }

    async fn get(&self, experiment_id: Uuid) -> DomainResult<Experiment> {
        self.experiments
            .get(experiment_id)
            .await?
            .ok_or(DomainError::ExperimentNotFound(experiment_id))
    }

    async fn arm_counts(
        &self,
        arm: &ExperimentArm,
        metric: PrimaryMetric,
    ) -> DomainResult<ArmCounts> {
        let aggregate = match &arm.platform_ad_id {
            Some(ad_id) => self.snapshots.aggregate_for_platform_ad(ad_id).await?,
            None => None,
        };
        Ok(match aggregate {
            Some(agg) => match metric {
                PrimaryMetric::Ctr => ArmCounts { trials: agg.impressions, successes: agg.clicks },
                PrimaryMetric::ConversionRate => {
                    ArmCounts { trials: agg.clicks, successes: agg.conversions }
                }
            },
            None => ArmCounts { trials: 0, successes: 0 },
        })
    }

    /// Sequential decision rule, evaluated in priority order.
    fn decide(
        &self,
        experiment: &Experiment,
        arms: &[ExperimentArm],
        counts: &[ArmCounts],
        probs: &[f64],
        posteriors: &[(f64, f64)],
        run_days: u32,
    ) -> (AnalysisDecision, Option<Uuid>) {
        let protocol = &experiment.protocol;

        // Gate on data volume first.
        let min_impressions = protocol.min_impressions_per_arm;
        if counts.iter().any(|c| c.trials < min_impressions) {
            return (AnalysisDecision::Collecting, None);
        }

        let (best_idx, best_prob) = probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, p)| (i, *p))
            .unwrap_or((0, 0.0));
        let leading = Some(arms[best_idx].id);

        let past_min_run = run_days >= protocol.min_run_days;

        if past_min_run && best_prob >= self.config.experiment.winner_probability {
            return (AnalysisDecision::Winner, leading);
        }

        // Futility is only declared once the maximum run length has elapsed:
        // the full data collection still cannot show a meaningful edge over
        // control. Before that the experiment keeps collecting as Leading.
        if run_days >= protocol.max_run_days {
            if let Some(control_idx) = arms.iter().position(|a| a.is_control) {
                if best_idx != control_idx {
                    let (_, hi, _) = credible_interval_diff(
                        posteriors[best_idx],
                        posteriors[control_idx],
                        self.config.experiment.monte_carlo_draws,
                        self.config.experiment.seed,
                        0.95,
                    );
                    if hi < self.config.experiment.meaningful_difference {
                        return (AnalysisDecision::Futility, leading);
                    }
                }
            }
            return (AnalysisDecision::Inconclusive, leading);
        }

        (AnalysisDecision::Leading, leading)
    }

    /// Persist the causal-effect record for a confirmed winner.
    async fn record_causal_effect(
        &self,
        experiment: &Experiment,
        arms: &[ExperimentArm],
        posteriors: &[(f64, f64)],
        leading_arm_id: Option<Uuid>,
    ) -> DomainResult<()> {
        let Some(winner_id) = leading_arm_id else { return Ok(()) };
        let Some(winner_idx) = arms.iter().position(|a| a.id == winner_id) else {
            return Ok(());
        };
        let Some(control_idx) = arms.iter().position(|a| a.is_control) else {
            return Ok(());
        };
        if winner_idx == control_idx {
            // The control winning confirms the status quo; there is no new
            // effect to record.
            return Ok(());
        }

        let (lo, hi, mean) = credible_interval_diff(
            posteriors[winner_idx],
            posteriors[control_idx],
            self.config.experiment.monte_carlo_draws,
            self.config.experiment.seed,
            0.95,
        );
        let control_mean =
            posteriors[control_idx].0 / (posteriors[control_idx].0 + posteriors[control_idx].1);

        let effect = CausalEffect {
            id: Uuid::new_v4(),
            experiment_id: experiment.id,
            brand_id: experiment.brand_id,
            element_name: experiment.test_variable.clone(),
            winning_value: arms[winner_idx].variable_value.clone(),
            control_value: arms[control_idx].variable_value.clone(),
            absolute_effect: mean,
            relative_effect: if control_mean > 0.0 { mean / control_mean } else { 0.0 },
            ci_lower: lo,
            ci_upper: hi,
            evidence_grade: experiment.protocol.evidence_grade(),
            created_at: Utc::now(),
        };
        self.experiments.insert_causal_effect(&effect).await?;
        info!(
            experiment_id = %experiment.id,
            element = %effect.element_name,
            winner = %effect.winning_value,
            grade = effect.evidence_grade.as_str(),
            "causal effect recorded"
        );
        Ok(())
    }
}
