//! Pairwise element-interaction analysis.
//!
//! For every unordered pair of element tags co-occurring in a brand's recent
//! rewards, compares the pair's mean reward against the additive expectation
//! (overall mean plus each tag's own deviation). A confidence interval that
//! excludes zero marks the pair as synergy or conflict.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Config, ElementInteraction};
use crate::domain::ports::{InteractionRepository, LockRepository, RewardRepository};
use crate::domain::stats::{mean_and_std, normal_ci_half_width};

pub const JOB_TYPE: &str = "interaction_analyzer";

/// Outcome counters for one analysis run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InteractionRunSummary {
    pub rewards_in_window: usize,
    pub pairs_examined: usize,
    pub pairs_kept: usize,
    pub significant: usize,
}

type TagPair = ((String, String), (String, String));

pub struct InteractionAnalyzer<R, I, L>
where
    R: RewardRepository,
    I: InteractionRepository,
    L: LockRepository,
{
    rewards: Arc<R>,
    interactions: Arc<I>,
    locks: Arc<L>,
    config: Config,
}

impl<R, I, L> InteractionAnalyzer<R, I, L>
where
    R: RewardRepository,
    I: InteractionRepository,
    L: LockRepository,
{
    pub fn new(rewards: Arc<R>, interactions: Arc<I>, locks: Arc<L>, config: Config) -> Self {
        Self { rewards, interactions, locks, config }
    }

    /// Recompute the full interaction table for a brand. The previous table
    /// is replaced wholesale; the reference population shifts every run so
    /// partial updates would mix incompatible baselines.
    pub async fn run(&self, brand_id: Uuid) -> DomainResult<InteractionRunSummary> {
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

    async fn run_locked(&self, brand_id: Uuid) -> DomainResult<InteractionRunSummary> {
        let since = Utc::now() - chrono::Duration::days(i64::from(self.config.interaction.window_days));
        let rewards = self.rewards.list_with_elements(brand_id, since).await?;

        let samples: Vec<(Vec<(String, String)>, f64)> = rewards
            .iter()
            .map(|r| {
                let tags: Vec<(String, String)> =
                    r.elements.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                (tags, r.reward.composite_score)
            })
            .collect();

        let (interactions, examined) = compute_interactions(
            brand_id,
            &samples,
            self.config.interaction.min_pair_samples,
            self.config.interaction.z_score,
        );

        let summary = InteractionRunSummary {
            rewards_in_window: rewards.len(),
            pairs_examined: examined,
            pairs_kept: interactions.len(),
            significant: interactions.iter().filter(|i| i.significant).count(),
        };

        self.interactions.replace_for_brand(brand_id, &interactions).await?;
        info!(
            brand_id = %brand_id,
            pairs = summary.pairs_kept,
            significant = summary.significant,
            "interaction run complete"
        );
        Ok(summary)
    }
}

/// Pure pair-effect computation over (tags, reward) samples.
///
/// Returns the kept interactions and the number of distinct pairs examined
/// (including those dropped for thin samples).
fn compute_interactions(
    brand_id: Uuid,
    samples: &[(Vec<(String, String)>, f64)],
    min_pair_samples: u64,
    z: f64,
) -> (Vec<ElementInteraction>, usize) {
    if samples.is_empty() {
        return (Vec::new(), 0);
    }

    let overall_mean =
        samples.iter().map(|(_, r)| r).sum::<f64>() / samples.len() as f64;

    // Per-tag reward samples for the singleton deviations.
    let mut tag_rewards: BTreeMap<(String, String), Vec<f64>> = BTreeMap::new();
    // Per-pair reward samples.
    let mut pair_rewards: BTreeMap<TagPair, Vec<f64>> = BTreeMap::new();

    for (tags, reward) in samples {
        for tag in tags {
            tag_rewards.entry(tag.clone()).or_default().push(*reward);
        }
        for i in 0..tags.len() {
            for j in (i + 1)..tags.len() {
                let (a, b) = if tags[i] <= tags[j] {
                    (tags[i].clone(), tags[j].clone())
                } else {
                    (tags[j].clone(), tags[i].clone())
                };
                pair_rewards.entry((a, b)).or_default().push(*reward);
            }
        }
    }

    let tag_deviation = |tag: &(String, String)| -> f64 {
        tag_rewards
            .get(tag)
            .map(|rs| rs.iter().sum::<f64>() / rs.len() as f64 - overall_mean)
            .unwrap_or(0.0)
    };

    let examined = pair_rewards.len();
    let mut interactions = Vec::new();

    for ((tag_a, tag_b), rewards) in &pair_rewards {
        let n = rewards.len() as u64;
        if n < min_pair_samples {
            debug!(pair = ?(&tag_a.0, &tag_b.0), n, "pair below sample floor, dropped");
            continue;
        }

        let (pair_mean, pair_std) = mean_and_std(rewards);
        let expected = overall_mean + tag_deviation(tag_a) + tag_deviation(tag_b);
        let effect = pair_mean - expected;
        let half_width = normal_ci_half_width(pair_std, n, z);

        interactions.push(ElementInteraction::new(
            brand_id,
            tag_a.0.clone(),
            tag_a.1.clone(),
            tag_b.0.clone(),
            tag_b.1.clone(),
            effect,
            effect - half_width,
            effect + half_width,
            n,
        ));
    }

    (interactions, examined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::InteractionDirection;

    fn tags(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_synergy_detected_over_additive_null() {
        // Pair (hook=urgency, color=red) consistently beats what each tag
        // earns on its own.
        let mut samples = Vec::new();
        for _ in 0..10 {
            samples.push((tags(&[("hook", "urgency"), ("color", "red")]), 0.9));
            samples.push((tags(&[("hook", "urgency"), ("color", "blue")]), 0.4));
            samples.push((tags(&[("hook", "question"), ("color", "red")]), 0.4));
            samples.push((tags(&[("hook", "question"), ("color", "blue")]), 0.4));
        }

        let (interactions, examined) = compute_interactions(Uuid::new_v4(), &samples, 5, 1.96);
        assert_eq!(examined, 4);

        let synergy = interactions
            .iter()
            .find(|i| i.value_a == "red" && i.value_b == "urgency")
            .expect("pair present");
        assert!(synergy.effect > 0.0);
        assert_eq!(synergy.direction, InteractionDirection::Synergy);
        assert!(synergy.significant);
    }

    #[test]
    fn test_thin_pairs_dropped() {
        let samples = vec![
            (tags(&[("hook", "urgency"), ("color", "red")]), 0.8),
            (tags(&[("hook", "urgency"), ("color", "red")]), 0.7),
        ];
        let (interactions, examined) = compute_interactions(Uuid::new_v4(), &samples, 5, 1.96);
        assert_eq!(examined, 1);
        assert!(interactions.is_empty());
    }

    #[test]
    fn test_empty_input() {
        let (interactions, examined) = compute_interactions(Uuid::new_v4(), &[], 5, 1.96);
        assert!(interactions.is_empty());
        assert_eq!(examined, 0);
    }
}
