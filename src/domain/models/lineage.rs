//! Winner-evolution lineage: parent -> child edges, bounded mutation chains.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// How a child was derived from its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionMode {
    /// Vary the one element underperforming relative to the best alternative
    WinnerIteration,
    /// Re-roll a declining creative without changing its winning elements
    AntiFatigueRefresh,
    /// Regenerate the same winning configuration at a new canvas size
    CrossSizeExpansion,
}

impl EvolutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WinnerIteration => "winner_iteration",
            Self::AntiFatigueRefresh => "anti_fatigue_refresh",
            Self::CrossSizeExpansion => "cross_size_expansion",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "winner_iteration" => Some(Self::WinnerIteration),
            "anti_fatigue_refresh" => Some(Self::AntiFatigueRefresh),
            "cross_size_expansion" => Some(Self::CrossSizeExpansion),
            _ => None,
        }
    }
}

/// One parent -> child evolution edge. Written at generation time with the
/// child's outcome fields null; a later maturation sweep fills them once the
/// child's own Reward exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdLineage {
    pub id: Uuid,
    pub brand_id: Uuid,
    pub root_ancestor_id: Uuid,
    pub parent_creative_id: Uuid,
    pub child_creative_id: Uuid,
    pub mode: EvolutionMode,
    pub changed_element: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub iteration_round: u32,
    pub parent_reward_score: f64,
    pub child_reward_score: Option<f64>,
    pub outperformed_parent: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub matured_at: Option<DateTime<Utc>>,
}

impl AdLineage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        brand_id: Uuid,
        root_ancestor_id: Uuid,
        parent_creative_id: Uuid,
        child_creative_id: Uuid,
        mode: EvolutionMode,
        iteration_round: u32,
        parent_reward_score: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            brand_id,
            root_ancestor_id,
            parent_creative_id,
            child_creative_id,
            mode,
            changed_element: None,
            old_value: None,
            new_value: None,
            iteration_round,
            parent_reward_score,
            child_reward_score: None,
            outperformed_parent: None,
            created_at: Utc::now(),
            matured_at: None,
        }
    }

    pub fn with_change(
        mut self,
        element: impl Into<String>,
        old_value: impl Into<String>,
        new_value: impl Into<String>,
    ) -> Self {
        self.changed_element = Some(element.into());
        self.old_value = Some(old_value.into());
        self.new_value = Some(new_value.into());
        self
    }

    /// Mutation attribution must be unambiguous: iteration and cross-size
    /// modes change exactly one element; a fatigue refresh changes none.
    pub fn validate(&self) -> DomainResult<()> {
        match self.mode {
            EvolutionMode::WinnerIteration | EvolutionMode::CrossSizeExpansion => {
                let (Some(element), Some(old), Some(new)) =
                    (&self.changed_element, &self.old_value, &self.new_value)
                else {
                    return Err(DomainError::ValidationFailed(format!(
                        "{} lineage requires a changed element",
                        self.mode.as_str()
                    )));
                };
                if old == new {
                    return Err(DomainError::ValidationFailed(format!(
                        "lineage change for {element} does not alter the value"
                    )));
                }
            }
            EvolutionMode::AntiFatigueRefresh => {
                if self.changed_element.is_some() {
                    return Err(DomainError::ValidationFailed(
                        "anti-fatigue refresh must not change elements".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Fill the outcome fields once the child has matured.
    pub fn mature(&mut self, child_reward_score: f64) {
        self.child_reward_score = Some(child_reward_score);
        self.outperformed_parent = Some(child_reward_score > self.parent_reward_score);
        self.matured_at = Some(Utc::now());
    }
}
