//! Winner evolution: derives new generation requests from proven creatives.
//!
//! Three modes, picked per parent: anti-fatigue refresh when a winner's CTR
//! trend is declining, winner iteration (mutate exactly one element toward a
//! stronger value), and cross-size expansion when no better element exists.
//! Lineage is two-phase: the edge is written at request time with the child's
//! outcome fields null; a later maturation sweep fills them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AdLineage, Config, DailySnapshot, EvolutionMode, GenerationRequest,
};
use crate::domain::ports::{
    CreativeRepository, LineageRepository, LockRepository, RewardRepository, ScoreRepository,
    SnapshotRepository,
};

pub const JOB_TYPE: &str = "winner_evolution";

/// Outcome counters for one evolution run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvolutionRunSummary {
    pub parents_considered: usize,
    pub requests_submitted: usize,
    pub capped: usize,
    pub skipped: usize,
    pub matured: usize,
}

pub struct WinnerEvolution<C, S, R, Sc, Li, L>
where
    C: CreativeRepository,
    S: SnapshotRepository,
    R: RewardRepository,
    Sc: ScoreRepository,
    Li: LineageRepository,
    L: LockRepository,
{
    creatives: Arc<C>,
    snapshots: Arc<S>,
    rewards: Arc<R>,
    scores: Arc<Sc>,
    lineages: Arc<Li>,
    locks: Arc<L>,
    config: Config,
}

impl<C, S, R, Sc, Li, L> WinnerEvolution<C, S, R, Sc, Li, L>
where
    C: CreativeRepository,
    S: SnapshotRepository,
    R: RewardRepository,
    Sc: ScoreRepository,
    Li: LineageRepository,
    L: LockRepository,
{
    pub fn new(
        creatives: Arc<C>,
        snapshots: Arc<S>,
        rewards: Arc<R>,
        scores: Arc<Sc>,
        lineages: Arc<Li>,
        locks: Arc<L>,
        config: Config,
    ) -> Self {
        Self { creatives, snapshots, rewards, scores, lineages, locks, config }
    }

    /// Evolve up to `max_parents_per_run` high performers for the brand, then
    /// sweep unmatured lineage edges.
    pub async fn run(&self, brand_id: Uuid) -> DomainResult<EvolutionRunSummary> {
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

    async fn run_locked(&self, brand_id: Uuid) -> DomainResult<EvolutionRunSummary> {
        let mut summary = EvolutionRunSummary::default();

        let mut performers = self
            .rewards
            .list_high_performers(brand_id, self.config.evolution.parent_reward_threshold)
            .await?;
        performers.sort_by(|a, b| b.reward.composite_score.total_cmp(&a.reward.composite_score));
        performers.truncate(self.config.evolution.max_parents_per_run);
        summary.parents_considered = performers.len();

        for parent in &performers {
            match self.evolve_parent(brand_id, parent).await {
                Ok(ParentOutcome::Submitted) => summary.requests_submitted += 1,
                Ok(ParentOutcome::Capped) => summary.capped += 1,
                Ok(ParentOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    warn!(creative_id = %parent.reward.creative_id, error = %e, "evolution failed");
                    summary.skipped += 1;
                }
            }
        }

        summary.matured = self.mature_children(brand_id).await?;

        info!(
            brand_id = %brand_id,
            submitted = summary.requests_submitted,
            capped = summary.capped,
            matured = summary.matured,
            "evolution run complete"
        );
        Ok(summary)
    }

    async fn evolve_parent(
        &self,
        brand_id: Uuid,
        parent: &crate::domain::ports::RewardWithElements,
    ) -> DomainResult<ParentOutcome> {
        let parent_id = parent.reward.creative_id;

        // A creative that already spawned a child is not evolved again.
        let existing = self.lineages.list_for_brand(brand_id).await?;
        if existing.iter().any(|l| l.parent_creative_id == parent_id) {
            return Ok(ParentOutcome::Skipped);
        }

        // Chain bookkeeping: walk to the root ancestor and enforce the cap.
        let (root_ancestor_id, round) = match self.lineages.get_by_child(parent_id).await? {
            Some(edge) => (edge.root_ancestor_id, edge.iteration_round + 1),
            None => (parent_id, 1),
        };
        let cap = self.config.evolution.max_iteration_rounds;
        if round > cap {
            debug!(creative_id = %parent_id, round, cap, "iteration cap reached");
            return Ok(ParentOutcome::Capped);
        }

        let series = self
            .snapshots
            .daily_series(parent_id, self.config.evolution.fatigue_window_days)
            .await?;

        let (mode, elements, canvas_size, change) = if is_fatigued(
            &series,
            self.config.evolution.fatigue_decline_ratio,
        ) {
            // Same winning configuration, fresh render.
            (EvolutionMode::AntiFatigueRefresh, parent.elements.clone(), parent.canvas_size.clone(), None)
        } else if let Some((element, old, new)) =
            self.weakest_element_upgrade(brand_id, &parent.elements).await?
        {
            let mut mutated = parent.elements.clone();
            mutated.insert(element.clone(), new.clone());
            (EvolutionMode::WinnerIteration, mutated, parent.canvas_size.clone(), Some((element, old, new)))
        } else if let Some(size) = self.next_canvas_size(&parent.canvas_size) {
            (
                EvolutionMode::CrossSizeExpansion,
                parent.elements.clone(),
                size.clone(),
                Some(("canvas_size".to_string(), parent.canvas_size.clone(), size)),
            )
        } else {
            debug!(creative_id = %parent_id, "no evolution path, skipping");
            return Ok(ParentOutcome::Skipped);
        };

        // Phase one: the generation request id becomes the child creative id,
        // so the lineage edge can reference a child that does not exist yet.
        let request = GenerationRequest {
            id: Uuid::new_v4(),
            brand_id,
            ancestor_id: parent_id,
            elements,
            canvas_size,
            mode: mode.as_str().to_string(),
            created_at: Utc::now(),
        };

        let mut lineage = AdLineage::new(
            brand_id,
            root_ancestor_id,
            parent_id,
            request.id,
            mode,
            round,
            parent.reward.composite_score,
        );
        if let Some((element, old, new)) = change {
            lineage = lineage.with_change(element, old, new);
        }
        lineage.validate()?;

        self.creatives.submit_generation_request(&request).await?;
        self.lineages.insert(&lineage).await?;

        info!(
            parent = %parent_id,
            child = %request.id,
            mode = mode.as_str(),
            round,
            "evolution request submitted"
        );
        Ok(ParentOutcome::Submitted)
    }

    /// Find the parent element with the largest posterior-mean gap to a
    /// better value in the same dimension.
    async fn weakest_element_upgrade(
        &self,
        brand_id: Uuid,
        elements: &BTreeMap<String, String>,
    ) -> DomainResult<Option<(String, String, String)>> {
        let mut best: Option<(f64, String, String, String)> = None;

        for (name, current_value) in elements {
            let Some(current) = self.scores.get(brand_id, name, current_value).await? else {
                continue;
            };
            let alternatives = self.scores.list_dimension(brand_id, name).await?;
            let Some(top) = alternatives
                .iter()
                .filter(|s| &s.element_value != current_value)
                .max_by(|a, b| a.posterior_mean().total_cmp(&b.posterior_mean()))
            else {
                continue;
            };

            let gap = top.posterior_mean() - current.posterior_mean();
            if gap > 0.0 && best.as_ref().map_or(true, |(g, _, _, _)| gap > *g) {
                best = Some((
                    gap,
                    name.clone(),
                    current_value.clone(),
                    top.element_value.clone(),
                ));
            }
        }

        Ok(best.map(|(_, name, old, new)| (name, old, new)))
    }

    fn next_canvas_size(&self, current: &str) -> Option<String> {
        self.config
            .evolution
            .expansion_canvas_sizes
            .iter()
            .find(|s| s.as_str() != current)
            .cloned()
    }

    /// Fill outcome fields on lineage edges whose child now has a reward.
    /// One bad edge is logged and skipped; the sweep continues.
    async fn mature_children(&self, brand_id: Uuid) -> DomainResult<usize> {
        let mut matured = 0;
        for edge in self.lineages.list_unmatured(brand_id).await? {
            match self.mature_edge(&edge).await {
                Ok(true) => matured += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        lineage_id = %edge.id,
                        child = %edge.child_creative_id,
                        error = %e,
                        "lineage maturation failed"
                    );
                }
            }
        }
        Ok(matured)
    }

    async fn mature_edge(&self, edge: &AdLineage) -> DomainResult<bool> {
        let Some(child_reward) = self.rewards.get_by_creative(edge.child_creative_id).await?
        else {
            return Ok(false);
        };
        self.lineages
            .record_maturation(
                edge.id,
                child_reward.composite_score,
                child_reward.composite_score > edge.parent_reward_score,
            )
            .await?;
        Ok(true)
    }
}

enum ParentOutcome {
    Submitted,
    Capped,
    Skipped,
}

/// Fatigue check over the daily CTR series: the recent half of the window
/// declining by at least `decline_ratio` relative to the earlier half.
fn is_fatigued(series: &[DailySnapshot], decline_ratio: f64) -> bool {
    if series.len() < 4 {
        return false;
    }
    let mid = series.len() / 2;
    let half_ctr = |days: &[DailySnapshot]| -> f64 {
        let impressions: u64 = days.iter().map(|d| d.impressions).sum();
        let clicks: u64 = days.iter().map(|d| d.clicks).sum();
        if impressions == 0 {
            0.0
        } else {
            clicks as f64 / impressions as f64
        }
    };

    let earlier = half_ctr(&series[..mid]);
    let recent = half_ctr(&series[mid..]);
    if earlier <= 0.0 {
        return false;
    }
    (earlier - recent) / earlier >= decline_ratio
}
