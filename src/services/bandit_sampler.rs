//! Thompson-sampling selection over element-value posteriors.
//!
//! One draw per candidate value from its Beta posterior; the highest draw
//! wins. Thin dimensions (below the pooling floor) opt-in brands blend a
//! dampened cross-brand prior so cold values are neither ignored nor allowed
//! to dominate native evidence.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Config, Score};
use crate::domain::stats::sample_beta;
use crate::domain::ports::{ScoreRepository, SnapshotRepository};

/// One candidate's draw, with the posterior it was drawn from.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledValue {
    pub element_value: String,
    pub sampled: f64,
    pub alpha: f64,
    pub beta: f64,
    pub observations: f64,
    /// Whether the cross-brand pooled prior was blended in.
    pub pooled: bool,
}

pub struct BanditSampler<S, P>
where
    S: ScoreRepository,
    P: SnapshotRepository,
{
    scores: Arc<S>,
    snapshots: Arc<P>,
    config: Config,
}

impl<S, P> BanditSampler<S, P>
where
    S: ScoreRepository,
    P: SnapshotRepository,
{
    pub fn new(scores: Arc<S>, snapshots: Arc<P>, config: Config) -> Self {
        Self { scores, snapshots, config }
    }

    fn rng(&self) -> StdRng {
        if self.config.bandit.seed == 0 {
            StdRng::from_entropy()
        } else {
            StdRng::seed_from_u64(self.config.bandit.seed)
        }
    }

    /// Rank every known and configured value of one element dimension by a
    /// fresh Thompson draw. The first entry is the selection.
    pub async fn rank_dimension(
        &self,
        brand_id: Uuid,
        element_name: &str,
    ) -> DomainResult<Vec<SampledValue>> {
        let mut rng = self.rng();
        self.rank_dimension_with(brand_id, element_name, &mut rng).await
    }

    async fn rank_dimension_with(
        &self,
        brand_id: Uuid,
        element_name: &str,
        rng: &mut StdRng,
    ) -> DomainResult<Vec<SampledValue>> {
        let shares = self.snapshots.brand_shares_data(brand_id).await?;
        let mut scores = self.scores.list_dimension(brand_id, element_name).await?;

        // Opt-in cold start: values other sharing brands have evidence for
        // enter the candidate set at the prior.
        if shares {
            let known: Vec<String> = scores.iter().map(|s| s.element_value.clone()).collect();
            for value in self.scores.pooled_values(element_name, brand_id).await? {
                if !known.contains(&value) {
                    scores.push(Score::cold_start(brand_id, element_name, value));
                }
            }
        }

        // Configured catalog values the brand has never tried enter at the
        // Beta(1, 1) prior, so a brand with no history still explores them
        // near-uniformly.
        if let Some(catalog) = self.config.bandit.candidate_values.get(element_name) {
            for value in catalog {
                if !scores.iter().any(|s| &s.element_value == value) {
                    scores.push(Score::cold_start(brand_id, element_name, value.clone()));
                }
            }
        }

        let mut ranked = Vec::with_capacity(scores.len());
        for score in &scores {
            let (alpha, beta, pooled) =
                self.effective_posterior(brand_id, element_name, score, shares).await?;
            let sampled = sample_beta(rng, alpha, beta);
            ranked.push(SampledValue {
                element_value: score.element_value.clone(),
                sampled,
                alpha,
                beta,
                observations: score.observations,
                pooled,
            });
        }

        ranked.sort_by(|a, b| b.sampled.total_cmp(&a.sampled));
        debug!(
            brand_id = %brand_id,
            element = element_name,
            candidates = ranked.len(),
            winner = ranked.first().map(|v| v.element_value.as_str()).unwrap_or("-"),
            "dimension ranked"
        );
        Ok(ranked)
    }

    /// Select one value per element dimension known for the brand.
    pub async fn select_all(
        &self,
        brand_id: Uuid,
    ) -> DomainResult<BTreeMap<String, SampledValue>> {
        let mut rng = self.rng();
        let mut selections = BTreeMap::new();
        let mut dimensions = self.scores.list_dimensions(brand_id).await?;
        for dimension in self.config.bandit.candidate_values.keys() {
            if !dimensions.contains(dimension) {
                dimensions.push(dimension.clone());
            }
        }
        for dimension in dimensions {
            let ranked = self.rank_dimension_with(brand_id, &dimension, &mut rng).await?;
            if let Some(winner) = ranked.into_iter().next() {
                selections.insert(dimension, winner);
            }
        }
        info!(brand_id = %brand_id, dimensions = selections.len(), "element selection complete");
        Ok(selections)
    }

    /// Blend the dampened cross-brand prior below the pooling floor. Brand
    /// evidence always enters at full weight; pooled mass is scaled down and
    /// never re-applied once the brand has enough of its own observations.
    async fn effective_posterior(
        &self,
        brand_id: Uuid,
        element_name: &str,
        score: &Score,
        shares: bool,
    ) -> DomainResult<(f64, f64, bool)> {
        if !shares || score.observations >= self.config.bandit.pooling_floor {
            return Ok((score.alpha, score.beta, false));
        }

        let pooled = self
            .scores
            .pooled_posterior(element_name, &score.element_value, brand_id)
            .await?;
        if pooled.observations <= 0.0 {
            return Ok((score.alpha, score.beta, false));
        }

        let d = self.config.bandit.pooling_dampening;
        // Subtract the Beta(1,1) floor before dampening so only observed
        // pooled mass is transferred.
        let alpha = score.alpha + d * (pooled.alpha - 1.0);
        let beta = score.beta + d * (pooled.beta - 1.0);
        Ok((alpha, beta, true))
    }
}
