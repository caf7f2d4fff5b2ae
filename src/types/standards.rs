//! Standards-assessment result types (ASME B31.8S, API 1163, NACE SP0502,
//! 49 CFR 192/195)

use serde::{Deserialize, Serialize};

use super::ToolType;

/// ASME B31.8S response severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Informational,
    Monitoring,
    Scheduled,
    Immediate,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Informational => "INFORMATIONAL",
            Severity::Monitoring => "MONITORING",
            Severity::Scheduled => "SCHEDULED",
            Severity::Immediate => "IMMEDIATE",
        }
    }
}

/// Recommended remediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepairAction {
    Cutout,
    Sleeve,
    CompositeWrap,
    Grind,
    Monitor,
    None,
}

impl RepairAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairAction::Cutout => "CUTOUT",
            RepairAction::Sleeve => "SLEEVE",
            RepairAction::CompositeWrap => "COMPOSITE_WRAP",
            RepairAction::Grind => "GRIND",
            RepairAction::Monitor => "MONITOR",
            RepairAction::None => "NONE",
        }
    }
}

/// NACE SP0502 corrosion-growth class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GrowthClass {
    Accelerating,
    Growing,
    Stable,
    Undetermined,
}

impl GrowthClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrowthClass::Accelerating => "ACCELERATING",
            GrowthClass::Growing => "GROWING",
            GrowthClass::Stable => "STABLE",
            GrowthClass::Undetermined => "UNDETERMINED",
        }
    }
}

/// API 1163 accuracy bands for one tool family.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ToolQualBands {
    /// Baseline confidence weight ∈ [0, 1] for the tool family
    pub confidence_weight: f64,
    /// Depth sizing band (% of wall)
    pub depth_band_pct: f64,
    /// Axial location band (ft)
    pub distance_band_ft: f64,
    /// Circumferential location band (clock hours)
    pub clock_band_hr: f64,
}

/// ASME B31.8S severity assessment for one matched anomaly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsmeAssessment {
    pub severity: Severity,
    pub repair: RepairAction,
    /// Depth actually used (%), combined when inside an interaction zone
    pub depth_used_pct: f64,
    /// True when the depth came from an interaction-zone combination
    pub combined_in_zone: bool,
    /// (80 − depth) / growth rate, when computable
    pub remaining_life_years: Option<f64>,
    /// Remaining life < 5 years
    pub accelerated_growth: bool,
}

/// API 1163 tool-qualification assessment for one matched anomaly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolQualAssessment {
    pub tool_type: ToolType,
    pub bands: ToolQualBands,
    /// Signed adjustment applied to the match confidence
    pub adjustment: f64,
    /// Adjusted confidence clamped to [0, 100]; informational only —
    /// never written back to the match
    pub adjusted_confidence: f64,
}

/// NACE SP0502 growth assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowthAssessment {
    pub class: GrowthClass,
    pub rate_pct_per_year: Option<f64>,
    /// Recommended reassessment interval (years)
    pub reassessment_years: u32,
}

/// Standards block attached to a MatchedPair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardsApplied {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asme_b31_8s: Option<AsmeAssessment>,
    pub api_1163: ToolQualAssessment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nace_sp0502: Option<GrowthAssessment>,
}

/// Job-level PHMSA (49 CFR 192/195) compliance record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhmsaRecord {
    /// Start/end odometer documented for every run
    pub odometer_documented: bool,
    /// Ensemble scoring was part of the methodology
    pub ensemble_scoring_used: bool,
    /// Methodology steps actually executed
    pub methodology: Vec<String>,
    /// Standards applied during assessment
    pub standards_applied: Vec<String>,
    /// Summary of recommended remedial actions (action → count)
    pub remedial_actions: Vec<(String, usize)>,
    /// True when no documentation item is missing
    pub audit_ready: bool,
}
