//! Reward calculator: turns matured performance snapshots into immutable
//! composite rewards.
//!
//! A creative matures once, when its lifetime impressions cross the
//! objective-dependent threshold. The reward row is created exactly once;
//! reruns and backfills are no-ops thanks to the UNIQUE creative_id key.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    compute_reward, CampaignObjective, Config, MinMaxClip, Normalizer, PercentileRank, Reward,
};
use crate::domain::ports::{CreativeRepository, LockRepository, RewardRepository, SnapshotRepository};

pub const JOB_TYPE: &str = "reward_calculator";

/// Outcome counters for one reward run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewardRunSummary {
    pub examined: usize,
    pub created: usize,
    pub already_rewarded: usize,
    pub immature: usize,
    pub no_snapshots: usize,
    pub failed: usize,
}

pub struct RewardCalculator<C, S, R, L>
where
    C: CreativeRepository,
    S: SnapshotRepository,
    R: RewardRepository,
    L: LockRepository,
{
    creatives: Arc<C>,
    snapshots: Arc<S>,
    rewards: Arc<R>,
    locks: Arc<L>,
    config: Config,
}

impl<C, S, R, L> RewardCalculator<C, S, R, L>
where
    C: CreativeRepository,
    S: SnapshotRepository,
    R: RewardRepository,
    L: LockRepository,
{
    pub fn new(
        creatives: Arc<C>,
        snapshots: Arc<S>,
        rewards: Arc<R>,
        locks: Arc<L>,
        config: Config,
    ) -> Self {
        Self { creatives, snapshots, rewards, locks, config }
    }

    fn normalizer(&self) -> Box<dyn Normalizer> {
        match self.config.reward.normalizer.as_str() {
            "percentile_rank" => Box::new(PercentileRank),
            _ => Box::new(MinMaxClip),
        }
    }

    fn maturity_threshold(&self, objective: CampaignObjective) -> u64 {
        match objective {
            CampaignObjective::Conversions => self.config.reward.maturity_impressions_conversions,
            CampaignObjective::Traffic => self.config.reward.maturity_impressions_traffic,
            CampaignObjective::Awareness => self.config.reward.maturity_impressions_awareness,
        }
    }

    /// Examine every creative of the brand and create rewards for the newly
    /// matured ones. Per-creative failures are logged and skipped so one bad
    /// row never stalls the batch.
    pub async fn run(&self, brand_id: Uuid) -> DomainResult<RewardRunSummary> {
        let lease = Duration::from_secs(self.config.job_lock.lease_seconds);
        if !self.locks.try_acquire(brand_id, JOB_TYPE, lease).await? {
            return Err(DomainError::LockUnavailable {
                brand_id,
                job_type: JOB_TYPE.to_string(),
            });
        }

        let result = self.run_locked(brand_id).await;
        self.locks.release(brand_id, JOB_TYPE).await?;
        result
    }

    async fn run_locked(&self, brand_id: Uuid) -> DomainResult<RewardRunSummary> {
        let creatives = self.creatives.list_by_brand(brand_id).await?;
        let reference = self.snapshots.brand_reference(brand_id).await?;
        let normalizer = self.normalizer();

        let mut summary = RewardRunSummary { examined: creatives.len(), ..Default::default() };

        for creative in creatives {
            match self
                .process_creative(brand_id, creative.id, &reference, normalizer.as_ref())
                .await
            {
                Ok(outcome) => match outcome {
                    CreativeOutcome::Created => summary.created += 1,
                    CreativeOutcome::AlreadyRewarded => summary.already_rewarded += 1,
                    CreativeOutcome::Immature => summary.immature += 1,
                    CreativeOutcome::NoSnapshots => summary.no_snapshots += 1,
                },
                Err(e) => {
                    warn!(creative_id = %creative.id, error = %e, "reward computation failed");
                    summary.failed += 1;
                }
            }
        }

        info!(
            brand_id = %brand_id,
            created = summary.created,
            immature = summary.immature,
            failed = summary.failed,
            "reward run complete"
        );
        Ok(summary)
    }

    async fn process_creative(
        &self,
        brand_id: Uuid,
        creative_id: Uuid,
        reference: &crate::domain::models::BrandReference,
        normalizer: &dyn Normalizer,
    ) -> DomainResult<CreativeOutcome> {
        if self.rewards.get_by_creative(creative_id).await?.is_some() {
            return Ok(CreativeOutcome::AlreadyRewarded);
        }

        let Some(aggregate) = self.snapshots.aggregate_for(creative_id).await? else {
            return Ok(CreativeOutcome::NoSnapshots);
        };

        let threshold = self.maturity_threshold(aggregate.objective);
        if aggregate.impressions < threshold {
            debug!(
                creative_id = %creative_id,
                impressions = aggregate.impressions,
                threshold,
                "creative not yet mature"
            );
            return Ok(CreativeOutcome::Immature);
        }

        let (composite, components) = compute_reward(&aggregate, reference, normalizer);
        let reward = Reward {
            id: Uuid::new_v4(),
            creative_id,
            brand_id,
            objective: aggregate.objective,
            composite_score: composite,
            components,
            impressions_at_maturity: aggregate.impressions,
            created_at: Utc::now(),
            processed_at: None,
        };

        if self.rewards.create_if_absent(&reward).await? {
            debug!(creative_id = %creative_id, score = composite, "reward created");
            Ok(CreativeOutcome::Created)
        } else {
            // Lost a race with a concurrent run; the other row is identical
            // because computation is deterministic.
            Ok(CreativeOutcome::AlreadyRewarded)
        }
    }
}

enum CreativeOutcome {
    Created,
    AlreadyRewarded,
    Immature,
    NoSnapshots,
}
