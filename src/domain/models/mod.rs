pub mod calibration;
pub mod config;
pub mod creative;
pub mod experiment;
pub mod interaction;
pub mod lineage;
pub mod reward;
pub mod score;

pub use calibration::{
    CalibrationProposal, OverrideDecision, ProposalStatus, QualityOverride, ThresholdConfig,
};
pub use config::{
    BanditConfig, CalibrationConfig, Config, DatabaseConfig, EvolutionConfig, ExperimentConfig,
    InteractionConfig, JobLockConfig, LoggingConfig, RewardConfig, ScoringConfig,
};
pub use creative::{
    CampaignObjective, Creative, DailySnapshot, GenerationRequest, Provenance, SnapshotAggregate,
};
pub use experiment::{
    AnalysisDecision, ArmResult, AssignmentDesign, CausalEffect, EvidenceGrade, Experiment,
    ExperimentAnalysis, ExperimentArm, ExperimentProtocol, ExperimentStatus, PrimaryMetric,
};
pub use interaction::{ElementInteraction, InteractionDirection};
pub use lineage::{AdLineage, EvolutionMode};
pub use reward::{
    compute_reward, BrandReference, MetricReference, MinMaxClip, Normalizer, ObjectiveWeights,
    PercentileRank, Reward, RewardComponents,
};
pub use score::{Score, ScoreEvent, TrustPolicy, PRIOR_ALPHA, PRIOR_BETA};
