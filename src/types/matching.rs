//! Matched-pair model — output of the anomaly matching stage

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{FeatureId, RunId, StandardsApplied};

/// How confident the ensemble is in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceCategory {
    /// Score ≥ 75
    High,
    /// Score ≥ 50
    Medium,
    /// Score < 50
    Low,
}

impl ConfidenceCategory {
    pub fn from_score(score: f64) -> Self {
        if score >= 75.0 {
            ConfidenceCategory::High
        } else if score >= 50.0 {
            ConfidenceCategory::Medium
        } else {
            ConfidenceCategory::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceCategory::High => "HIGH",
            ConfidenceCategory::Medium => "MEDIUM",
            ConfidenceCategory::Low => "LOW",
        }
    }
}

/// How the assignment stage classified a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchCategory {
    /// Only one candidate existed for the newer anomaly
    AutoMatched,
    /// Top two candidate scores within 10 points of each other
    Ambiguous,
    /// Won among multiple candidates with a clear margin
    BestMatch,
}

impl MatchCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchCategory::AutoMatched => "AUTO_MATCHED",
            MatchCategory::Ambiguous => "AMBIGUOUS",
            MatchCategory::BestMatch => "BEST_MATCH",
        }
    }
}

/// Per-year growth rates between the two matched observations.
///
/// Depth growth is %-of-wall per year; length/width are inches per year.
/// Years between observations is clamped to ≥ 0.01 before division.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GrowthRates {
    pub depth_pct_per_year: Option<f64>,
    pub length_in_per_year: Option<f64>,
    pub width_in_per_year: Option<f64>,
    pub years_between: f64,
}

/// A matched anomaly pair between an older run and the newer (baseline) run.
///
/// Standards output is attached as `standards_applied` and never modifies
/// the match fields themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedPair {
    pub job_id: Uuid,
    pub older_feature_id: FeatureId,
    pub newer_feature_id: FeatureId,
    pub older_run_id: RunId,
    pub newer_run_id: RunId,
    /// Corrected-distance residual (ft)
    pub distance_residual_ft: f64,
    /// Circular clock residual (hours, ∈ [0, 6]) when both clocks present
    pub clock_residual_hr: Option<f64>,
    /// Type-compatibility component ∈ [0, 1]
    pub type_compatibility: f64,
    /// Dimensional-similarity component ∈ [0, 1]
    pub dimensional_similarity: f64,
    /// Final ensemble confidence ∈ [0, 100]
    pub confidence_score: f64,
    pub confidence_category: ConfidenceCategory,
    pub match_category: MatchCategory,
    pub growth: GrowthRates,
    /// Older-feature ids that also competed for the newer anomaly,
    /// strongest first
    pub competing_older_ids: Vec<FeatureId>,
    /// Standards assessment block, attached after matching
    #[serde(default)]
    pub standards_applied: Option<StandardsApplied>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_thresholds_are_exact() {
        assert_eq!(ConfidenceCategory::from_score(75.0), ConfidenceCategory::High);
        assert_eq!(
            ConfidenceCategory::from_score(74.999),
            ConfidenceCategory::Medium
        );
        assert_eq!(ConfidenceCategory::from_score(50.0), ConfidenceCategory::Medium);
        assert_eq!(ConfidenceCategory::from_score(49.999), ConfidenceCategory::Low);
        assert_eq!(ConfidenceCategory::from_score(0.0), ConfidenceCategory::Low);
    }
}
