//! Quality-threshold calibration: human override records and advisory
//! proposals. The engine only proposes; activation is a separate, gated
//! action that never happens in this subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A human reviewer's decision relative to the AI quality verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideDecision {
    /// AI rejected, human approved
    OverrideApprove,
    /// AI approved, human rejected
    OverrideReject,
    /// Human agreed with the AI verdict
    Confirm,
}

impl OverrideDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OverrideApprove => "override_approve",
            Self::OverrideReject => "override_reject",
            Self::Confirm => "confirm",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "override_approve" => Some(Self::OverrideApprove),
            "override_reject" => Some(Self::OverrideReject),
            "confirm" => Some(Self::Confirm),
            _ => None,
        }
    }
}

/// One human override record with the AI score and threshold in effect at
/// decision time. Externally owned; read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityOverride {
    pub id: Uuid,
    pub creative_id: Uuid,
    pub brand_id: Uuid,
    pub decision: OverrideDecision,
    /// AI quality score on the 0-10 scale.
    pub ai_score: f64,
    pub threshold_in_effect: f64,
    pub decided_at: DateTime<Utc>,
}

impl QualityOverride {
    /// What the human's final verdict was, regardless of the AI's.
    pub fn human_approved(&self) -> bool {
        match self.decision {
            OverrideDecision::OverrideApprove => true,
            OverrideDecision::OverrideReject => false,
            OverrideDecision::Confirm => self.ai_score >= self.threshold_in_effect,
        }
    }
}

/// Quality-scoring configuration a proposal targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Approval threshold on the 0-10 scale.
    pub approve_threshold: f64,
    /// Named hard checks that auto-reject regardless of score. A proposal
    /// may never remove one of these without explicit justification.
    pub auto_reject_checks: Vec<String>,
}

/// Status of a calibration proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Proposed,
    Activated,
    Dismissed,
    InsufficientEvidence,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Activated => "activated",
            Self::Dismissed => "dismissed",
            Self::InsufficientEvidence => "insufficient_evidence",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "proposed" => Some(Self::Proposed),
            "activated" => Some(Self::Activated),
            "dismissed" => Some(Self::Dismissed),
            "insufficient_evidence" => Some(Self::InsufficientEvidence),
            _ => None,
        }
    }
}

/// A candidate change to the quality-scoring thresholds, with the evidence
/// that justifies it and the safety gates that must both pass before a human
/// or policy may activate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProposal {
    pub id: Uuid,
    pub brand_id: Uuid,
    pub current: ThresholdConfig,
    pub proposed: ThresholdConfig,
    /// Rate of AI-approved, human-rejected under the proposed config.
    pub false_positive_rate: f64,
    /// Rate of AI-rejected, human-approved under the proposed config.
    pub false_negative_rate: f64,
    /// Expected shift in overall approval rate.
    pub approval_rate_shift: f64,
    pub total_overrides_analyzed: u64,
    pub meets_min_sample_size: bool,
    pub within_delta_bounds: bool,
    pub status: ProposalStatus,
    /// Why no recommendation was made, when gates fail.
    pub reason: Option<String>,
    pub window_days: u32,
    pub created_at: DateTime<Utc>,
}

impl CalibrationProposal {
    /// Both safety gates must pass for the proposal to be activatable.
    pub fn gates_pass(&self) -> bool {
        self.meets_min_sample_size && self.within_delta_bounds
    }
}
