//! Element-value scores as event-sourced Beta posteriors.
//!
//! The score_events ledger is the source of truth; a Score row is a derived
//! snapshot that must always equal a full replay of its events. Events are
//! keyed uniquely per (reward, element_name, element_value), so duplicate or
//! out-of-order application converges to the same posterior.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::creative::Provenance;
use crate::domain::errors::{DomainError, DomainResult};

/// Jeffreys-like prior floor: posteriors start at Beta(1, 1).
pub const PRIOR_ALPHA: f64 = 1.0;
pub const PRIOR_BETA: f64 = 1.0;

/// Trust policy mapping creative provenance to an event weight multiplier.
/// Centralized here so imported "winners" inform priors without dominating
/// native signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustPolicy {
    pub native_weight: f64,
    pub imported_weight: f64,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self { native_weight: 1.0, imported_weight: 0.3 }
    }
}

impl TrustPolicy {
    pub fn weight(&self, provenance: Provenance) -> f64 {
        match provenance {
            Provenance::Native => self.native_weight,
            Provenance::Imported => self.imported_weight,
        }
    }
}

/// Immutable ledger entry: one (reward, element_name, element_value)
/// contribution with its alpha/beta/observation deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEvent {
    pub id: Uuid,
    pub reward_id: Uuid,
    pub brand_id: Uuid,
    pub element_name: String,
    pub element_value: String,
    pub alpha_delta: f64,
    pub beta_delta: f64,
    pub obs_delta: f64,
    pub reward_value: f64,
    pub created_at: DateTime<Utc>,
}

impl ScoreEvent {
    /// Build the event for one element tag of a reward. A reward at or above
    /// the success threshold counts toward alpha, otherwise toward beta; both
    /// carry the provenance weight.
    pub fn from_reward(
        reward_id: Uuid,
        brand_id: Uuid,
        element_name: impl Into<String>,
        element_value: impl Into<String>,
        reward_value: f64,
        weight: f64,
        success_threshold: f64,
    ) -> Self {
        let success = reward_value >= success_threshold;
        Self {
            id: Uuid::new_v4(),
            reward_id,
            brand_id,
            element_name: element_name.into(),
            element_value: element_value.into(),
            alpha_delta: if success { weight } else { 0.0 },
            beta_delta: if success { 0.0 } else { weight },
            obs_delta: weight,
            reward_value,
            created_at: Utc::now(),
        }
    }

    /// Integrity check used before persisting: deltas must be non-negative
    /// and exactly one of alpha/beta carries the weight.
    pub fn validate(&self) -> DomainResult<()> {
        if self.alpha_delta < 0.0 || self.beta_delta < 0.0 || self.obs_delta < 0.0 {
            return Err(DomainError::ValidationFailed(format!(
                "negative score event delta for reward {}",
                self.reward_id
            )));
        }
        if (self.alpha_delta + self.beta_delta - self.obs_delta).abs() > 1e-9 {
            return Err(DomainError::ValidationFailed(format!(
                "score event deltas do not sum to obs_delta for reward {}",
                self.reward_id
            )));
        }
        Ok(())
    }
}

/// Live Beta(alpha, beta) posterior for one (brand, element_name,
/// element_value), plus weighted observation count and running mean reward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub id: Uuid,
    pub brand_id: Uuid,
    pub element_name: String,
    pub element_value: String,
    pub alpha: f64,
    pub beta: f64,
    pub observations: f64,
    pub mean_reward: f64,
    pub updated_at: DateTime<Utc>,
}

impl Score {
    /// Fresh score at the prior floor, before any observations.
    pub fn cold_start(
        brand_id: Uuid,
        element_name: impl Into<String>,
        element_value: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            brand_id,
            element_name: element_name.into(),
            element_value: element_value.into(),
            alpha: PRIOR_ALPHA,
            beta: PRIOR_BETA,
            observations: 0.0,
            mean_reward: 0.0,
            updated_at: Utc::now(),
        }
    }

    pub fn posterior_mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    /// Incrementally apply one event. Invariant: identical to a full replay
    /// including this event.
    pub fn apply(&mut self, event: &ScoreEvent) -> DomainResult<()> {
        event.validate()?;
        self.alpha += event.alpha_delta;
        self.beta += event.beta_delta;
        let new_obs = self.observations + event.obs_delta;
        if event.obs_delta > 0.0 {
            self.mean_reward = (self.mean_reward * self.observations
                + event.reward_value * event.obs_delta)
                / new_obs;
        }
        self.observations = new_obs;
        self.updated_at = Utc::now();
        self.check_invariants()
    }

    /// Rebuild the posterior from the full event set, in any order.
    pub fn replay(
        brand_id: Uuid,
        element_name: &str,
        element_value: &str,
        events: &[ScoreEvent],
    ) -> DomainResult<Self> {
        let mut score = Self::cold_start(brand_id, element_name, element_value);
        // Order cannot matter: addition is commutative and the weighted mean
        // is a ratio of sums.
        let mut reward_mass = 0.0;
        for event in events {
            event.validate()?;
            score.alpha += event.alpha_delta;
            score.beta += event.beta_delta;
            score.observations += event.obs_delta;
            reward_mass += event.reward_value * event.obs_delta;
        }
        if score.observations > 0.0 {
            score.mean_reward = reward_mass / score.observations;
        }
        score.check_invariants()?;
        Ok(score)
    }

    fn check_invariants(&self) -> DomainResult<()> {
        if self.alpha < PRIOR_ALPHA || self.beta < PRIOR_BETA {
            return Err(DomainError::PosteriorInvariant { alpha: self.alpha, beta: self.beta });
        }
        Ok(())
    }
}
