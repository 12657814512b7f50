//! External entities this subsystem reads but does not own: creatives,
//! their performance snapshots, and brand-level data-sharing settings.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a creative came from; drives the trust weight applied to its
/// score events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Generated by our own pipeline.
    Native,
    /// Imported from an external advertising account.
    Imported,
}

impl Default for Provenance {
    fn default() -> Self {
        Self::Native
    }
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Imported => "imported",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "native" => Some(Self::Native),
            "imported" => Some(Self::Imported),
            _ => None,
        }
    }
}

/// Campaign objective; selects reward weighting and maturity thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignObjective {
    Conversions,
    Traffic,
    Awareness,
}

impl CampaignObjective {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversions => "conversions",
            Self::Traffic => "traffic",
            Self::Awareness => "awareness",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "conversions" => Some(Self::Conversions),
            "traffic" => Some(Self::Traffic),
            "awareness" => Some(Self::Awareness),
            _ => None,
        }
    }
}

/// An individually generated advertising asset, tagged at creation time with
/// a fixed set of categorical element attributes. Tags are immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creative {
    pub id: Uuid,
    pub brand_id: Uuid,
    /// element_name -> element_value, e.g. `hook_type -> curiosity_gap`.
    pub elements: BTreeMap<String, String>,
    pub provenance: Provenance,
    pub canvas_size: String,
    pub created_at: DateTime<Utc>,
}

/// Lifetime metric aggregate for one creative, summed over its snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotAggregate {
    pub creative_id: Uuid,
    pub objective: CampaignObjective,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
    pub spend: f64,
    pub revenue: f64,
}

impl SnapshotAggregate {
    /// Click-through rate; 0 when there are no impressions.
    pub fn ctr(&self) -> f64 {
        if self.impressions == 0 {
            0.0
        } else {
            self.clicks as f64 / self.impressions as f64
        }
    }

    /// Conversion rate per click; 0 when there are no clicks.
    pub fn conversion_rate(&self) -> f64 {
        if self.clicks == 0 {
            0.0
        } else {
            self.conversions as f64 / self.clicks as f64
        }
    }

    /// Return on ad spend; 0 when there is no spend.
    pub fn roas(&self) -> f64 {
        if self.spend <= 0.0 {
            0.0
        } else {
            self.revenue / self.spend
        }
    }
}

/// One day of metrics for a creative; used for fatigue trend detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySnapshot {
    pub snapshot_date: NaiveDate,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
}

impl DailySnapshot {
    pub fn ctr(&self) -> f64 {
        if self.impressions == 0 {
            0.0
        } else {
            self.clicks as f64 / self.impressions as f64
        }
    }
}

/// A request for the external generation pipeline to produce a new creative.
///
/// The request id becomes the child creative's id once generated, which lets
/// the lineage row be written before the child exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub id: Uuid,
    pub brand_id: Uuid,
    pub ancestor_id: Uuid,
    pub elements: BTreeMap<String, String>,
    pub canvas_size: String,
    pub mode: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregate(impressions: u64, clicks: u64, conversions: u64) -> SnapshotAggregate {
        SnapshotAggregate {
            creative_id: Uuid::new_v4(),
            objective: CampaignObjective::Conversions,
            impressions,
            clicks,
            conversions,
            spend: 100.0,
            revenue: 250.0,
        }
    }

    #[test]
    fn test_rates_guard_division_by_zero() {
        let empty = aggregate(0, 0, 0);
        assert_eq!(empty.ctr(), 0.0);
        assert_eq!(empty.conversion_rate(), 0.0);

        let zero_spend = SnapshotAggregate { spend: 0.0, ..aggregate(100, 10, 1) };
        assert_eq!(zero_spend.roas(), 0.0);
    }

    #[test]
    fn test_rates() {
        let agg = aggregate(1000, 20, 5);
        assert!((agg.ctr() - 0.02).abs() < 1e-12);
        assert!((agg.conversion_rate() - 0.25).abs() < 1e-12);
        assert!((agg.roas() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_objective_round_trip() {
        for obj in [CampaignObjective::Conversions, CampaignObjective::Traffic, CampaignObjective::Awareness] {
            assert_eq!(CampaignObjective::from_str(obj.as_str()), Some(obj));
        }
        assert_eq!(CampaignObjective::from_str("branding"), None);
    }
}
