//! Pairwise element-interaction effects (synergy / conflict / neutral).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a pairwise interaction effect relative to the additive null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionDirection {
    Synergy,
    Conflict,
    Neutral,
}

impl InteractionDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synergy => "synergy",
            Self::Conflict => "conflict",
            Self::Neutral => "neutral",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "synergy" => Some(Self::Synergy),
            "conflict" => Some(Self::Conflict),
            "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }

    /// Classify an effect from its confidence interval: significantly
    /// positive is synergy, significantly negative is conflict.
    pub fn classify(ci_lower: f64, ci_upper: f64) -> Self {
        if ci_lower > 0.0 {
            Self::Synergy
        } else if ci_upper < 0.0 {
            Self::Conflict
        } else {
            Self::Neutral
        }
    }
}

/// One row per unordered pair of (element_name, element_value) combinations
/// for a brand. Recomputed periodically via full per-brand replace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementInteraction {
    pub id: Uuid,
    pub brand_id: Uuid,
    pub name_a: String,
    pub value_a: String,
    pub name_b: String,
    pub value_b: String,
    pub effect: f64,
    pub direction: InteractionDirection,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub sample_size: u64,
    pub significant: bool,
    pub computed_at: DateTime<Utc>,
}

impl ElementInteraction {
    /// Construct with canonical pair ordering so (A,B) and (B,A) map to the
    /// same row.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        brand_id: Uuid,
        name_a: impl Into<String>,
        value_a: impl Into<String>,
        name_b: impl Into<String>,
        value_b: impl Into<String>,
        effect: f64,
        ci_lower: f64,
        ci_upper: f64,
        sample_size: u64,
    ) -> Self {
        let (mut na, mut va, mut nb, mut vb) =
            (name_a.into(), value_a.into(), name_b.into(), value_b.into());
        if (na.as_str(), va.as_str()) > (nb.as_str(), vb.as_str()) {
            std::mem::swap(&mut na, &mut nb);
            std::mem::swap(&mut va, &mut vb);
        }
        let direction = InteractionDirection::classify(ci_lower, ci_upper);
        Self {
            id: Uuid::new_v4(),
            brand_id,
            name_a: na,
            value_a: va,
            name_b: nb,
            value_b: vb,
            effect,
            direction,
            ci_lower,
            ci_upper,
            sample_size,
            significant: direction != InteractionDirection::Neutral,
            computed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(InteractionDirection::classify(0.01, 0.05), InteractionDirection::Synergy);
        assert_eq!(InteractionDirection::classify(-0.05, -0.01), InteractionDirection::Conflict);
        assert_eq!(InteractionDirection::classify(-0.01, 0.01), InteractionDirection::Neutral);
    }

    #[test]
    fn test_canonical_ordering() {
        let brand = Uuid::new_v4();
        let a = ElementInteraction::new(
            brand, "hook_type", "urgency", "color_mode", "complementary", 0.1, 0.05, 0.15, 20,
        );
        let b = ElementInteraction::new(
            brand, "color_mode", "complementary", "hook_type", "urgency", 0.1, 0.05, 0.15, 20,
        );
        assert_eq!((a.name_a, a.value_a, a.name_b), (b.name_a, b.value_a, b.name_b));
    }

    #[test]
    fn test_neutral_is_not_significant() {
        let row = ElementInteraction::new(
            Uuid::new_v4(), "a", "x", "b", "y", 0.02, -0.01, 0.05, 10,
        );
        assert_eq!(row.direction, InteractionDirection::Neutral);
        assert!(!row.significant);
    }
}
