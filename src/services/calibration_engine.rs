//! Quality-threshold calibration from human override history.
//!
//! Scans a bounded grid of candidate approval thresholds around the current
//! one, scoring each by weighted disagreement with the human verdicts in the
//! window. The engine only ever writes advisory proposals; activation is a
//! separate human/policy action outside this subsystem.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    CalibrationConfig, CalibrationProposal, Config, ProposalStatus, QualityOverride,
    ThresholdConfig,
};
use crate::domain::ports::{CalibrationRepository, LockRepository};

pub const JOB_TYPE: &str = "calibration_engine";

pub struct CalibrationEngine<C, L>
where
    C: CalibrationRepository,
    L: LockRepository,
{
    overrides: Arc<C>,
    locks: Arc<L>,
    config: Config,
}

impl<C, L> CalibrationEngine<C, L>
where
    C: CalibrationRepository,
    L: LockRepository,
{
    pub fn new(overrides: Arc<C>, locks: Arc<L>, config: Config) -> Self {
        Self { overrides, locks, config }
    }

    /// Analyze the override window for a brand and persist one proposal,
    /// which may carry InsufficientEvidence status when the sample gate
    /// fails.
    pub async fn run(
        &self,
        brand_id: Uuid,
        current: ThresholdConfig,
    ) -> DomainResult<CalibrationProposal> {
        let lease = Duration::from_secs(self.config.job_lock.lease_seconds);
        if !self.locks.try_acquire(brand_id, JOB_TYPE, lease).await? {
            return Err(DomainError::LockUnavailable {
                brand_id,
                job_type: JOB_TYPE.to_string(),
            });
        }

        let result = self.run_locked(brand_id, current).await;
        self.locks.release(brand_id, JOB_TYPE).await?;
        result
    }

    async fn run_locked(
        &self,
        brand_id: Uuid,
        current: ThresholdConfig,
    ) -> DomainResult<CalibrationProposal> {
        let cfg = &self.config.calibration;
        let since = Utc::now() - chrono::Duration::days(i64::from(cfg.window_days));
        let overrides = self.overrides.list_overrides_since(brand_id, since).await?;

        let proposal = build_proposal(brand_id, &overrides, current, cfg);
        self.overrides.insert_proposal(&proposal).await?;
        info!(
            brand_id = %brand_id,
            status = proposal.status.as_str(),
            analyzed = proposal.total_overrides_analyzed,
            proposed = proposal.proposed.approve_threshold,
            "calibration proposal recorded"
        );
        Ok(proposal)
    }
}

/// Pure proposal construction over the override window.
fn build_proposal(
    brand_id: Uuid,
    overrides: &[QualityOverride],
    current: ThresholdConfig,
    cfg: &CalibrationConfig,
) -> CalibrationProposal {
    let total = overrides.len() as u64;

    if total < cfg.min_overrides {
        debug!(total, required = cfg.min_overrides, "override sample below gate");
        return CalibrationProposal {
            id: Uuid::new_v4(),
            brand_id,
            proposed: current.clone(),
            current,
            false_positive_rate: 0.0,
            false_negative_rate: 0.0,
            approval_rate_shift: 0.0,
            total_overrides_analyzed: total,
            meets_min_sample_size: false,
            within_delta_bounds: true,
            status: ProposalStatus::InsufficientEvidence,
            reason: Some(format!(
                "only {total} overrides in window, {} required",
                cfg.min_overrides
            )),
            window_days: cfg.window_days,
            created_at: Utc::now(),
        };
    }

    // Candidate thresholds are bounded to current +/- max_threshold_delta,
    // so the safety gate holds by construction.
    let best = candidate_grid(current.approve_threshold, cfg)
        .into_iter()
        .map(|candidate| (candidate, disagreement_cost(overrides, candidate, cfg)))
        .min_by(|a, b| {
            a.1.total_cmp(&b.1).then_with(|| {
                // Tie: prefer the candidate closest to the current threshold.
                (a.0 - current.approve_threshold)
                    .abs()
                    .total_cmp(&(b.0 - current.approve_threshold).abs())
            })
        })
        .map(|(candidate, _)| candidate)
        .unwrap_or(current.approve_threshold);

    let (fp_rate, fn_rate) = error_rates(overrides, best);
    let shift = approval_rate(overrides, best) - approval_rate(overrides, current.approve_threshold);

    // Auto-reject hard checks are never altered by calibration.
    let proposed = ThresholdConfig {
        approve_threshold: best,
        auto_reject_checks: current.auto_reject_checks.clone(),
    };

    CalibrationProposal {
        id: Uuid::new_v4(),
        brand_id,
        current,
        proposed,
        false_positive_rate: fp_rate,
        false_negative_rate: fn_rate,
        approval_rate_shift: shift,
        total_overrides_analyzed: total,
        meets_min_sample_size: true,
        within_delta_bounds: true,
        status: ProposalStatus::Proposed,
        reason: None,
        window_days: cfg.window_days,
        created_at: Utc::now(),
    }
}

/// Thresholds from current - max_delta to current + max_delta at grid_step,
/// clamped to the 0-10 score scale.
fn candidate_grid(current: f64, cfg: &CalibrationConfig) -> Vec<f64> {
    let mut grid = Vec::new();
    let steps = (cfg.max_threshold_delta / cfg.grid_step).round() as i64;
    for i in -steps..=steps {
        let candidate = current + i as f64 * cfg.grid_step;
        if (0.0..=10.0).contains(&candidate) {
            grid.push(candidate);
        }
    }
    grid
}

/// Weighted count of disagreements between the AI verdict at `threshold` and
/// the human verdict.
fn disagreement_cost(overrides: &[QualityOverride], threshold: f64, cfg: &CalibrationConfig) -> f64 {
    overrides
        .iter()
        .map(|o| {
            let ai_approves = o.ai_score >= threshold;
            match (ai_approves, o.human_approved()) {
                (true, false) => cfg.false_positive_cost,
                (false, true) => cfg.false_negative_cost,
                _ => 0.0,
            }
        })
        .sum()
}

fn error_rates(overrides: &[QualityOverride], threshold: f64) -> (f64, f64) {
    if overrides.is_empty() {
        return (0.0, 0.0);
    }
    let n = overrides.len() as f64;
    let mut fp = 0.0;
    let mut fn_ = 0.0;
    for o in overrides {
        let ai_approves = o.ai_score >= threshold;
        match (ai_approves, o.human_approved()) {
            (true, false) => fp += 1.0,
            (false, true) => fn_ += 1.0,
            _ => {}
        }
    }
    (fp / n, fn_ / n)
}

fn approval_rate(overrides: &[QualityOverride], threshold: f64) -> f64 {
    if overrides.is_empty() {
        return 0.0;
    }
    overrides.iter().filter(|o| o.ai_score >= threshold).count() as f64 / overrides.len() as f64
}
