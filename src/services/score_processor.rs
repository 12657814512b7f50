//! Score event processor: fans each unprocessed reward out into one score
//! event per element tag of its creative.
//!
//! The ledger key (reward_id, element_name, element_value) makes every event
//! exactly-once, so a crash between events or before mark_processed is
//! recovered by simply rerunning: already-recorded events are skipped and the
//! remaining ones are appended.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Config, Reward, ScoreEvent, TrustPolicy};
use crate::domain::ports::{CreativeRepository, LockRepository, RewardRepository, ScoreRepository};

pub const JOB_TYPE: &str = "score_processor";

/// Outcome counters for one processing run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreRunSummary {
    pub rewards_processed: usize,
    pub events_recorded: usize,
    pub events_duplicate: usize,
    pub failed: usize,
}

pub struct ScoreProcessor<C, R, S, L>
where
    C: CreativeRepository,
    R: RewardRepository,
    S: ScoreRepository,
    L: LockRepository,
{
    creatives: Arc<C>,
    rewards: Arc<R>,
    scores: Arc<S>,
    locks: Arc<L>,
    config: Config,
}

impl<C, R, S, L> ScoreProcessor<C, R, S, L>
where
    C: CreativeRepository,
    R: RewardRepository,
    S: ScoreRepository,
    L: LockRepository,
{
    pub fn new(
        creatives: Arc<C>,
        rewards: Arc<R>,
        scores: Arc<S>,
        locks: Arc<L>,
        config: Config,
    ) -> Self {
        Self { creatives, rewards, scores, locks, config }
    }

    fn trust_policy(&self) -> TrustPolicy {
        TrustPolicy {
            native_weight: self.config.scoring.native_weight,
            imported_weight: self.config.scoring.imported_weight,
        }
    }

    /// Drain up to `limit` unprocessed rewards for the brand.
    pub async fn run(&self, brand_id: Uuid, limit: usize) -> DomainResult<ScoreRunSummary> {
        let lease = Duration::from_secs(self.config.job_lock.lease_seconds);
        if !self.locks.try_acquire(brand_id, JOB_TYPE, lease).await? {
            return Err(DomainError::LockUnavailable {
                brand_id,
                job_type: JOB_TYPE.to_string(),
            });
        }

        let result = self.run_locked(brand_id, limit).await;
        self.locks.release(brand_id, JOB_TYPE).await?;
        result
    }

    async fn run_locked(&self, brand_id: Uuid, limit: usize) -> DomainResult<ScoreRunSummary> {
        let pending = self.rewards.list_unprocessed(brand_id, limit).await?;
        let mut summary = ScoreRunSummary::default();

        for reward in pending {
            match self.process_reward(&reward).await {
                Ok((recorded, duplicate)) => {
                    summary.rewards_processed += 1;
                    summary.events_recorded += recorded;
                    summary.events_duplicate += duplicate;
                }
                Err(e) => {
                    warn!(reward_id = %reward.id, error = %e, "score processing failed");
                    summary.failed += 1;
                }
            }
        }

        info!(
            brand_id = %brand_id,
            rewards = summary.rewards_processed,
            events = summary.events_recorded,
            duplicates = summary.events_duplicate,
            "score run complete"
        );
        Ok(summary)
    }

    /// Record one event per element tag, then mark the reward processed.
    /// Marking happens strictly after the last event is durable.
    async fn process_reward(&self, reward: &Reward) -> DomainResult<(usize, usize)> {
        let creative = self
            .creatives
            .get(reward.creative_id)
            .await?
            .ok_or(DomainError::CreativeNotFound(reward.creative_id))?;

        let weight = self.trust_policy().weight(creative.provenance);
        let threshold = self.config.scoring.success_threshold;

        let mut recorded = 0;
        let mut duplicate = 0;
        for (element_name, element_value) in &creative.elements {
            let event = ScoreEvent::from_reward(
                reward.id,
                reward.brand_id,
                element_name,
                element_value,
                reward.composite_score,
                weight,
                threshold,
            );
            if self.scores.record_event(&event).await? {
                recorded += 1;
            } else {
                debug!(
                    reward_id = %reward.id,
                    element = %element_name,
                    "event already recorded, skipping"
                );
                duplicate += 1;
            }
        }

        self.rewards.mark_processed(reward.id).await?;
        Ok((recorded, duplicate))
    }
}
