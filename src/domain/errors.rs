//! Domain errors for the adlearn learning core.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur in the adlearn system.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Creative not found: {0}")]
    CreativeNotFound(Uuid),

    #[error("Reward not found: {0}")]
    RewardNotFound(Uuid),

    #[error("Experiment not found: {0}")]
    ExperimentNotFound(Uuid),

    #[error("Score not found for {brand_id} {element_name}={element_value}")]
    ScoreNotFound { brand_id: Uuid, element_name: String, element_value: String },

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition { from: String, to: String, reason: String },

    #[error("Duplicate score event for reward {reward_id} ({element_name}={element_value})")]
    DuplicateScoreEvent { reward_id: Uuid, element_name: String, element_value: String },

    #[error("Posterior invariant violated: alpha={alpha}, beta={beta} (both must be >= 1)")]
    PosteriorInvariant { alpha: f64, beta: f64 },

    #[error("Experiment {0} already has a control arm")]
    DuplicateControlArm(Uuid),

    #[error("Analysis for {experiment_id} on {date} is superseded by a later analysis")]
    AnalysisSuperseded { experiment_id: Uuid, date: String },

    #[error("Lineage iteration cap reached for ancestor {root_ancestor_id} (round {round} >= cap {cap})")]
    IterationCapReached { root_ancestor_id: Uuid, round: u32, cap: u32 },

    #[error("Insufficient samples: required {required}, got {actual}")]
    InsufficientSamples { required: u64, actual: u64 },

    #[error("Job lock held: {job_type} for brand {brand_id}")]
    LockUnavailable { brand_id: Uuid, job_type: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
