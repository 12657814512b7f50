//! Experiment domain model: lifecycle state machine, arms, daily analyses,
//! and the causal-effect knowledge records produced by confirmed winners.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Lifecycle state of an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    /// Hypothesis drafted, arms not yet configured
    Draft,
    /// Arms configured and power analysis satisfied
    Ready,
    /// External platform objects being created
    Deploying,
    /// Live and collecting data
    Running,
    /// Daily analysis in progress
    Analyzing,
    /// Terminal: winner or futility reached
    Concluded,
    /// Terminal: stopped by an operator before conclusion
    Cancelled,
}

impl Default for ExperimentStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl ExperimentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Ready => "ready",
            Self::Deploying => "deploying",
            Self::Running => "running",
            Self::Analyzing => "analyzing",
            Self::Concluded => "concluded",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "ready" => Some(Self::Ready),
            "deploying" => Some(Self::Deploying),
            "running" => Some(Self::Running),
            "analyzing" => Some(Self::Analyzing),
            "concluded" => Some(Self::Concluded),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Concluded | Self::Cancelled)
    }

    /// Valid transitions from this status. Cancellation is reachable from
    /// any non-terminal state.
    pub fn valid_transitions(&self) -> Vec<ExperimentStatus> {
        match self {
            Self::Draft => vec![Self::Ready, Self::Cancelled],
            Self::Ready => vec![Self::Deploying, Self::Cancelled],
            Self::Deploying => vec![Self::Running, Self::Cancelled],
            Self::Running => vec![Self::Analyzing, Self::Cancelled],
            Self::Analyzing => vec![Self::Running, Self::Concluded, Self::Cancelled],
            Self::Concluded | Self::Cancelled => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// How arm assignment was performed; determines the evidence-quality grade
/// independently of the statistical decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentDesign {
    /// Strict randomized assignment at the randomization unit
    Randomized,
    /// Pragmatic split (e.g. geo or time split) without strict randomization
    PragmaticSplit,
    /// No controlled assignment
    Observational,
}

/// Evidence-quality grade attached to analyses and causal effects. A winner
/// with an observational grade is weaker evidence than a causal winner and
/// must be surfaced as such.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceGrade {
    Causal,
    Quasi,
    Observational,
}

impl EvidenceGrade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Causal => "causal",
            Self::Quasi => "quasi",
            Self::Observational => "observational",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "causal" => Some(Self::Causal),
            "quasi" => Some(Self::Quasi),
            "observational" => Some(Self::Observational),
            _ => None,
        }
    }
}

/// Primary metric the arms are compared on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryMetric {
    Ctr,
    ConversionRate,
}

impl PrimaryMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ctr => "ctr",
            Self::ConversionRate => "conversion_rate",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ctr" => Some(Self::Ctr),
            "conversion_rate" => Some(Self::ConversionRate),
            _ => None,
        }
    }
}

/// Test protocol declared when the experiment is designed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentProtocol {
    pub assignment: AssignmentDesign,
    /// Unit at which randomization/split happens (e.g. "ad_set", "audience").
    pub randomization_unit: String,
    /// Whether arm audiences can overlap (confounds causal attribution).
    pub audience_overlap: bool,
    pub budget_strategy: String,
    pub min_run_days: u32,
    pub max_run_days: u32,
    pub min_impressions_per_arm: u64,
    /// Elements held constant across all arms.
    pub held_constant: BTreeMap<String, String>,
}

impl ExperimentProtocol {
    /// Grade the evidence this design can produce. Independent of any
    /// statistical outcome.
    pub fn evidence_grade(&self) -> EvidenceGrade {
        match self.assignment {
            AssignmentDesign::Randomized if !self.audience_overlap => EvidenceGrade::Causal,
            AssignmentDesign::Randomized | AssignmentDesign::PragmaticSplit => EvidenceGrade::Quasi,
            AssignmentDesign::Observational => EvidenceGrade::Observational,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.min_run_days == 0 || self.max_run_days < self.min_run_days {
            return Err(DomainError::ValidationFailed(format!(
                "invalid run-length bounds: min {} max {}",
                self.min_run_days, self.max_run_days
            )));
        }
        if self.min_impressions_per_arm == 0 {
            return Err(DomainError::ValidationFailed(
                "min_impressions_per_arm must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// A hypothesis-driven controlled test over one element dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: Uuid,
    pub brand_id: Uuid,
    pub name: String,
    pub hypothesis: String,
    /// The one element being varied.
    pub test_variable: String,
    pub primary_metric: PrimaryMetric,
    pub status: ExperimentStatus,
    pub protocol: ExperimentProtocol,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub concluded_at: Option<DateTime<Utc>>,
}

impl Experiment {
    pub fn new(
        brand_id: Uuid,
        name: impl Into<String>,
        test_variable: impl Into<String>,
        primary_metric: PrimaryMetric,
        protocol: ExperimentProtocol,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            brand_id,
            name: name.into(),
            hypothesis: String::new(),
            test_variable: test_variable.into(),
            primary_metric,
            status: ExperimentStatus::default(),
            protocol,
            created_at: now,
            updated_at: now,
            started_at: None,
            concluded_at: None,
        }
    }

    pub fn with_hypothesis(mut self, hypothesis: impl Into<String>) -> Self {
        self.hypothesis = hypothesis.into();
        self
    }

    pub fn transition_to(&mut self, new_status: ExperimentStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(new_status) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
                reason: "not a valid experiment lifecycle edge".to_string(),
            });
        }
        self.status = new_status;
        self.updated_at = Utc::now();
        match new_status {
            ExperimentStatus::Running if self.started_at.is_none() => {
                self.started_at = Some(Utc::now());
            }
            ExperimentStatus::Concluded | ExperimentStatus::Cancelled => {
                self.concluded_at = Some(Utc::now());
            }
            _ => {}
        }
        Ok(())
    }

    /// Days elapsed since the experiment went live.
    pub fn run_days(&self, today: NaiveDate) -> u32 {
        match self.started_at {
            Some(start) => {
                let days = (today - start.date_naive()).num_days();
                u32::try_from(days.max(0)).unwrap_or(u32::MAX)
            }
            None => 0,
        }
    }
}

/// One control or treatment arm, bound to exactly one concrete element value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentArm {
    pub id: Uuid,
    pub experiment_id: Uuid,
    pub arm_index: u32,
    pub variable_value: String,
    pub is_control: bool,
    pub platform_ad_set_id: Option<String>,
    pub platform_ad_id: Option<String>,
}

impl ExperimentArm {
    pub fn new(
        experiment_id: Uuid,
        arm_index: u32,
        variable_value: impl Into<String>,
        is_control: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            experiment_id,
            arm_index,
            variable_value: variable_value.into(),
            is_control,
            platform_ad_set_id: None,
            platform_ad_id: None,
        }
    }
}

/// Sequential decision label for one daily analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisDecision {
    /// Below the minimum-impressions gate
    Collecting,
    /// One arm ahead, thresholds not yet met
    Leading,
    /// Probability-of-best threshold and minimum run length both met
    Winner,
    /// Maximum plausible effect below the meaningful-difference floor
    Futility,
    /// Maximum run length reached without resolution
    Inconclusive,
}

impl AnalysisDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collecting => "collecting",
            Self::Leading => "leading",
            Self::Winner => "winner",
            Self::Futility => "futility",
            Self::Inconclusive => "inconclusive",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "collecting" => Some(Self::Collecting),
            "leading" => Some(Self::Leading),
            "winner" => Some(Self::Winner),
            "futility" => Some(Self::Futility),
            "inconclusive" => Some(Self::Inconclusive),
            _ => None,
        }
    }

    /// Terminal decisions end the sequential test; later days must never
    /// regress from them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Winner | Self::Futility | Self::Inconclusive)
    }
}

/// Per-arm posterior summary recorded in a daily analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmResult {
    pub arm_id: Uuid,
    pub variable_value: String,
    pub is_control: bool,
    pub impressions: u64,
    pub successes: u64,
    pub posterior_alpha: f64,
    pub posterior_beta: f64,
    pub posterior_mean: f64,
    pub probability_best: f64,
}

/// Append-only daily snapshot of an experiment's analysis. One row per
/// (experiment, date); never overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentAnalysis {
    pub id: Uuid,
    pub experiment_id: Uuid,
    pub analysis_date: NaiveDate,
    pub arm_results: Vec<ArmResult>,
    pub decision: AnalysisDecision,
    pub leading_arm_id: Option<Uuid>,
    pub evidence_grade: EvidenceGrade,
    pub created_at: DateTime<Utc>,
}

/// Durable knowledge-base record written when an experiment concludes with a
/// clear winner. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalEffect {
    pub id: Uuid,
    pub experiment_id: Uuid,
    pub brand_id: Uuid,
    pub element_name: String,
    pub winning_value: String,
    pub control_value: String,
    /// Average treatment effect on the primary metric.
    pub absolute_effect: f64,
    /// Effect relative to the control mean.
    pub relative_effect: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub evidence_grade: EvidenceGrade,
    pub created_at: DateTime<Utc>,
}
