//! Reward model: one immutable composite score per matured creative.
//!
//! Reward computation is pure and deterministic given the same snapshot
//! aggregate, reference distribution, and weights, so backfills reproduce
//! identical rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::creative::{CampaignObjective, SnapshotAggregate};

/// Per-metric normalized scores that make up a composite reward.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RewardComponents {
    pub ctr_score: f64,
    pub cvr_score: f64,
    pub roas_score: f64,
}

/// One row per matured creative. Created exactly once; never updated
/// (maturity is a one-way transition). `processed_at` is set by the score
/// event processor after all events for this reward are durable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    pub id: Uuid,
    pub creative_id: Uuid,
    pub brand_id: Uuid,
    pub objective: CampaignObjective,
    pub composite_score: f64,
    pub components: RewardComponents,
    pub impressions_at_maturity: u64,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Objective-dependent weights over the normalized metric scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveWeights {
    pub ctr: f64,
    pub cvr: f64,
    pub roas: f64,
}

impl ObjectiveWeights {
    /// Weight table per campaign objective. A CONVERSIONS objective weights
    /// conversion rate and ROAS heavily; TRAFFIC weights CTR heavily.
    pub fn for_objective(objective: CampaignObjective) -> Self {
        match objective {
            CampaignObjective::Conversions => Self { ctr: 0.2, cvr: 0.4, roas: 0.4 },
            CampaignObjective::Traffic => Self { ctr: 0.7, cvr: 0.15, roas: 0.15 },
            CampaignObjective::Awareness => Self { ctr: 0.5, cvr: 0.2, roas: 0.3 },
        }
    }

    fn total(&self) -> f64 {
        self.ctr + self.cvr + self.roas
    }
}

/// Brand-level reference distribution for one raw metric. Holds the raw
/// observed values the normalizer rescales against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricReference {
    pub samples: Vec<f64>,
}

impl MetricReference {
    pub fn new(mut samples: Vec<f64>) -> Self {
        samples.retain(|v| v.is_finite());
        samples.sort_by(|a, b| a.total_cmp(b));
        Self { samples }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn min(&self) -> f64 {
        self.samples.first().copied().unwrap_or(0.0)
    }

    pub fn max(&self) -> f64 {
        self.samples.last().copied().unwrap_or(0.0)
    }

    /// Fraction of reference samples strictly below `value` (ties count half).
    pub fn percentile_rank(&self, value: f64) -> f64 {
        if self.samples.is_empty() {
            return 0.5;
        }
        let below = self.samples.partition_point(|&s| s < value);
        let equal = self.samples[below..].iter().take_while(|&&s| s == value).count();
        (below as f64 + equal as f64 / 2.0) / self.samples.len() as f64
    }
}

/// Reference distributions for all reward metrics of one brand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrandReference {
    pub ctr: MetricReference,
    pub cvr: MetricReference,
    pub roas: MetricReference,
}

/// Pluggable normalization strategy (the exact method is configuration, not
/// a load-bearing business rule).
pub trait Normalizer: Send + Sync {
    /// Rescale a raw metric value into [0,1] against the brand reference.
    fn normalize(&self, value: f64, reference: &MetricReference) -> f64;
}

/// Min-max rescaling with clipping to suppress outliers.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinMaxClip;

impl Normalizer for MinMaxClip {
    fn normalize(&self, value: f64, reference: &MetricReference) -> f64 {
        if reference.is_empty() {
            // Cold start: no reference population yet, treat as median.
            return 0.5;
        }
        let (min, max) = (reference.min(), reference.max());
        if (max - min).abs() < f64::EPSILON {
            return 0.5;
        }
        ((value - min) / (max - min)).clamp(0.0, 1.0)
    }
}

/// Percentile rank against the brand reference distribution.
#[derive(Debug, Clone, Copy, Default)]
pub struct PercentileRank;

impl Normalizer for PercentileRank {
    fn normalize(&self, value: f64, reference: &MetricReference) -> f64 {
        reference.percentile_rank(value).clamp(0.0, 1.0)
    }
}

/// Pure composite reward computation. Output is always in [0,1].
pub fn compute_reward(
    aggregate: &SnapshotAggregate,
    reference: &BrandReference,
    normalizer: &dyn Normalizer,
) -> (f64, RewardComponents) {
    let components = RewardComponents {
        ctr_score: normalizer.normalize(aggregate.ctr(), &reference.ctr),
        cvr_score: normalizer.normalize(aggregate.conversion_rate(), &reference.cvr),
        roas_score: normalizer.normalize(aggregate.roas(), &reference.roas),
    };

    let weights = ObjectiveWeights::for_objective(aggregate.objective);
    let weighted = components.ctr_score * weights.ctr
        + components.cvr_score * weights.cvr
        + components.roas_score * weights.roas;

    let composite = (weighted / weights.total()).clamp(0.0, 1.0);
    (composite, components)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregate(objective: CampaignObjective) -> SnapshotAggregate {
        SnapshotAggregate {
            creative_id: Uuid::new_v4(),
            objective,
            impressions: 10_000,
            clicks: 300,
            conversions: 30,
            spend: 150.0,
            revenue: 600.0,
        }
    }

    fn reference() -> BrandReference {
        BrandReference {
            ctr: MetricReference::new(vec![0.005, 0.01, 0.02, 0.04]),
            cvr: MetricReference::new(vec![0.02, 0.05, 0.1, 0.2]),
            roas: MetricReference::new(vec![0.5, 1.0, 2.0, 5.0]),
        }
    }

    #[test]
    fn test_composite_always_in_unit_interval() {
        let extreme = SnapshotAggregate {
            creative_id: Uuid::new_v4(),
            objective: CampaignObjective::Conversions,
            impressions: 1,
            clicks: 1,
            conversions: 1,
            spend: 0.01,
            revenue: 1_000_000.0,
        };
        let (score, _) = compute_reward(&extreme, &reference(), &MinMaxClip);
        assert!((0.0..=1.0).contains(&score));

        let (score, _) = compute_reward(&extreme, &reference(), &PercentileRank);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_empty_reference_degrades_to_midpoint() {
        let (score, components) =
            compute_reward(&aggregate(CampaignObjective::Traffic), &BrandReference::default(), &MinMaxClip);
        assert!((score - 0.5).abs() < 1e-12);
        assert!((components.ctr_score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_objective_weights_shift_composite() {
        // High CTR, weak CVR/ROAS: traffic objective should score higher.
        let agg = SnapshotAggregate {
            creative_id: Uuid::new_v4(),
            objective: CampaignObjective::Traffic,
            impressions: 10_000,
            clicks: 400, // ctr 0.04 = reference max
            conversions: 4,
            spend: 150.0,
            revenue: 75.0,
        };
        let (traffic_score, _) = compute_reward(&agg, &reference(), &MinMaxClip);

        let conv_agg = SnapshotAggregate { objective: CampaignObjective::Conversions, ..agg };
        let (conv_score, _) = compute_reward(&conv_agg, &reference(), &MinMaxClip);

        assert!(traffic_score > conv_score);
    }

    #[test]
    fn test_determinism() {
        let agg = aggregate(CampaignObjective::Conversions);
        let r = reference();
        let first = compute_reward(&agg, &r, &MinMaxClip);
        let second = compute_reward(&agg, &r, &MinMaxClip);
        assert_eq!(first, second);
    }

    #[test]
    fn test_percentile_rank() {
        let reference = MetricReference::new(vec![1.0, 2.0, 3.0, 4.0]);
        assert!((reference.percentile_rank(0.5) - 0.0).abs() < 1e-12);
        assert!((reference.percentile_rank(2.5) - 0.5).abs() < 1e-12);
        assert!((reference.percentile_rank(10.0) - 1.0).abs() < 1e-12);
        // Ties count half.
        assert!((reference.percentile_rank(2.0) - 0.375).abs() < 1e-12);
    }
}
