//! Exception records — the structured audit channel for every suppression,
//! warning, or finding

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{FeatureId, RunId};

/// Closed category set for exception records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExceptionCategory {
    Unmatched,
    LowConfidence,
    ClockMissing,
    SegmentDrift,
    TypeIncompatible,
    CutoutReset,
    NeighborhoodExcess,
    Run3Unsupported,
    MultiRunMatch,
    InteractionZone,
    ImmediateSeverity,
    AcceleratedGrowth,
}

impl ExceptionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionCategory::Unmatched => "UNMATCHED",
            ExceptionCategory::LowConfidence => "LOW_CONFIDENCE",
            ExceptionCategory::ClockMissing => "CLOCK_MISSING",
            ExceptionCategory::SegmentDrift => "SEGMENT_DRIFT",
            ExceptionCategory::TypeIncompatible => "TYPE_INCOMPATIBLE",
            ExceptionCategory::CutoutReset => "CUTOUT_RESET",
            ExceptionCategory::NeighborhoodExcess => "NEIGHBORHOOD_EXCESS",
            ExceptionCategory::Run3Unsupported => "RUN3_UNSUPPORTED",
            ExceptionCategory::MultiRunMatch => "MULTI_RUN_MATCH",
            ExceptionCategory::InteractionZone => "INTERACTION_ZONE",
            ExceptionCategory::ImmediateSeverity => "IMMEDIATE_SEVERITY",
            ExceptionCategory::AcceleratedGrowth => "ACCELERATED_GROWTH",
        }
    }
}

/// Exception severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExceptionSeverity {
    Low,
    Medium,
    High,
}

impl ExceptionSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionSeverity::Low => "LOW",
            ExceptionSeverity::Medium => "MEDIUM",
            ExceptionSeverity::High => "HIGH",
        }
    }
}

/// Audit record for an excluded or flagged feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exception {
    pub job_id: Uuid,
    pub category: ExceptionCategory,
    pub severity: ExceptionSeverity,
    /// Feature the exception concerns, when feature-scoped
    pub feature_id: Option<FeatureId>,
    /// Run context for the feature
    pub run_id: Option<RunId>,
    /// Opaque structured payload; schema is stable per category
    pub details: serde_json::Value,
}

impl Exception {
    pub fn new(
        job_id: Uuid,
        category: ExceptionCategory,
        severity: ExceptionSeverity,
        feature_id: Option<FeatureId>,
        run_id: Option<RunId>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            job_id,
            category,
            severity,
            feature_id,
            run_id,
            details,
        }
    }
}
