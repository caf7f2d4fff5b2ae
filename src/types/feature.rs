//! Feature model — one normalized row of an inspection run sheet

use serde::{Deserialize, Serialize};

use super::{FeatureId, RunId};

/// Canonical event type — the closed set every free-form event string maps to.
///
/// Reference types (welds, fittings) anchor the alignment; corrosion types
/// drive the standards engine; everything else rides along for export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    GirthWeld,
    Valve,
    Tee,
    Tap,
    Flange,
    Launcher,
    Receiver,
    Support,
    MetalLoss,
    MetalLossMfg,
    Cluster,
    Dent,
    DentMetalLoss,
    Gouge,
    Crack,
    Lamination,
    Inclusion,
    SeamWeldAnomaly,
    GirthWeldAnomaly,
    Bend,
    FieldBend,
    Casing,
    Marker,
    Anode,
    Repair,
    Sleeve,
    WallThicknessChange,
    #[default]
    Other,
}

impl EventType {
    /// Stable wire/export token (`METAL_LOSS`, `GIRTH_WELD`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::GirthWeld => "GIRTH_WELD",
            EventType::Valve => "VALVE",
            EventType::Tee => "TEE",
            EventType::Tap => "TAP",
            EventType::Flange => "FLANGE",
            EventType::Launcher => "LAUNCHER",
            EventType::Receiver => "RECEIVER",
            EventType::Support => "SUPPORT",
            EventType::MetalLoss => "METAL_LOSS",
            EventType::MetalLossMfg => "METAL_LOSS_MFG",
            EventType::Cluster => "CLUSTER",
            EventType::Dent => "DENT",
            EventType::DentMetalLoss => "DENT_METAL_LOSS",
            EventType::Gouge => "GOUGE",
            EventType::Crack => "CRACK",
            EventType::Lamination => "LAMINATION",
            EventType::Inclusion => "INCLUSION",
            EventType::SeamWeldAnomaly => "SEAM_WELD_ANOMALY",
            EventType::GirthWeldAnomaly => "GIRTH_WELD_ANOMALY",
            EventType::Bend => "BEND",
            EventType::FieldBend => "FIELD_BEND",
            EventType::Casing => "CASING",
            EventType::Marker => "MARKER",
            EventType::Anode => "ANODE",
            EventType::Repair => "REPAIR",
            EventType::Sleeve => "SLEEVE",
            EventType::WallThicknessChange => "WALL_THICKNESS_CHANGE",
            EventType::Other => "OTHER",
        }
    }

    /// Parse a stable wire token back to its variant.
    pub fn from_token(token: &str) -> Option<Self> {
        let t = token.trim().to_ascii_uppercase();
        ALL_EVENT_TYPES.iter().find(|e| e.as_str() == t).copied()
    }

    /// Reference points are the stable fixtures used for run-to-run anchoring.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            EventType::GirthWeld
                | EventType::Valve
                | EventType::Tee
                | EventType::Tap
                | EventType::Flange
                | EventType::Launcher
                | EventType::Receiver
                | EventType::Support
        )
    }

    /// Corrosion-class anomalies assessed by ASME B31.8S / NACE SP0502.
    pub fn is_corrosion(&self) -> bool {
        matches!(
            self,
            EventType::MetalLoss | EventType::MetalLossMfg | EventType::Cluster | EventType::Dent
        )
    }
}

/// Every canonical event token, for closed-set iteration.
pub const ALL_EVENT_TYPES: [EventType; 28] = [
    EventType::GirthWeld,
    EventType::Valve,
    EventType::Tee,
    EventType::Tap,
    EventType::Flange,
    EventType::Launcher,
    EventType::Receiver,
    EventType::Support,
    EventType::MetalLoss,
    EventType::MetalLossMfg,
    EventType::Cluster,
    EventType::Dent,
    EventType::DentMetalLoss,
    EventType::Gouge,
    EventType::Crack,
    EventType::Lamination,
    EventType::Inclusion,
    EventType::SeamWeldAnomaly,
    EventType::GirthWeldAnomaly,
    EventType::Bend,
    EventType::FieldBend,
    EventType::Casing,
    EventType::Marker,
    EventType::Anode,
    EventType::Repair,
    EventType::Sleeve,
    EventType::WallThicknessChange,
    EventType::Other,
];

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized row of an inspection sheet.
///
/// Distances are feet, depths either percent-of-wall or inches, dimensions
/// inches, clock positions 12-hour decimal in (0, 12].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    /// Store-assigned identifier (0 until persisted)
    #[serde(default)]
    pub id: FeatureId,
    /// Owning run
    pub run_id: RunId,
    /// 1-based row index within the source sheet
    pub row_index: usize,
    /// Joint number, when the sheet carries one
    pub joint_number: Option<i64>,
    /// Joint length (ft)
    pub joint_length_ft: Option<f64>,
    /// Wall thickness (in)
    pub wall_thickness_in: Option<f64>,
    /// Event string exactly as reported
    pub raw_event: String,
    /// Canonical event type
    pub event_type: EventType,
    /// Odometer distance as logged by the tool (ft)
    pub log_distance_ft: f64,
    /// Distance remapped onto the baseline axis (ft); set by the
    /// correction stage, equal to the log distance for the baseline run
    #[serde(default)]
    pub corrected_distance_ft: Option<f64>,
    /// Depth as percent of wall
    pub depth_percent: Option<f64>,
    /// Depth (in)
    pub depth_in: Option<f64>,
    /// Axial length (in)
    pub length_in: Option<f64>,
    /// Circumferential width (in)
    pub width_in: Option<f64>,
    /// Clock position as reported
    pub clock_raw: String,
    /// Clock position as decimal hours in (0, 12]
    pub clock_decimal: Option<f64>,
    /// Elevation (ft)
    pub elevation_ft: Option<f64>,
    /// Free-text comments column
    pub comments: Option<String>,
    /// True iff the canonical type is a reference fixture
    pub is_reference_point: bool,
}

impl Feature {
    /// Distance on the baseline axis: corrected when set, logged otherwise.
    pub fn aligned_distance_ft(&self) -> f64 {
        self.corrected_distance_ft.unwrap_or(self.log_distance_ft)
    }

    /// Count of populated dimensional fields (depth%, depth, length, width).
    pub fn populated_dimensions(&self) -> usize {
        [
            self.depth_percent,
            self.depth_in,
            self.length_in,
            self.width_in,
        ]
        .iter()
        .filter(|d| d.is_some())
        .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_set_is_exactly_the_fixture_types() {
        let refs = [
            EventType::GirthWeld,
            EventType::Valve,
            EventType::Tee,
            EventType::Tap,
            EventType::Flange,
            EventType::Launcher,
            EventType::Receiver,
            EventType::Support,
        ];
        for t in refs {
            assert!(t.is_reference(), "{t} should be a reference type");
        }
        assert!(!EventType::MetalLoss.is_reference());
        assert!(!EventType::Bend.is_reference());
    }

    #[test]
    fn corrosion_set_for_standards() {
        assert!(EventType::MetalLoss.is_corrosion());
        assert!(EventType::Cluster.is_corrosion());
        assert!(EventType::MetalLossMfg.is_corrosion());
        assert!(EventType::Dent.is_corrosion());
        assert!(!EventType::Crack.is_corrosion());
    }

    #[test]
    fn wire_tokens_are_screaming_snake() {
        assert_eq!(EventType::GirthWeld.as_str(), "GIRTH_WELD");
        assert_eq!(EventType::MetalLossMfg.as_str(), "METAL_LOSS_MFG");
        let json = serde_json::to_string(&EventType::FieldBend).unwrap();
        assert_eq!(json, "\"FIELD_BEND\"");
    }
}
