//! API 1163 tool-qualification assessment
//!
//! Fixed per-tool accuracy bands drive a bounded confidence adjustment.
//! The adjusted confidence is informational — it never writes back into
//! the match.

use crate::types::{MatchedPair, ToolQualAssessment, ToolQualBands, ToolType};

/// Accuracy bands per tool family (confidence weight, depth % of wall,
/// axial ft, clock hours).
pub fn bands_for(tool: ToolType) -> ToolQualBands {
    let (confidence_weight, depth_band_pct, distance_band_ft, clock_band_hr) = match tool {
        ToolType::Mfl => (0.80, 10.0, 1.0, 1.0),
        ToolType::Ut => (0.85, 5.0, 0.5, 0.5),
        ToolType::Caliper => (0.80, 8.0, 1.0, 1.0),
        ToolType::Combo => (0.90, 8.0, 0.75, 0.75),
        ToolType::Unknown => (0.50, 15.0, 2.0, 2.0),
    };
    ToolQualBands {
        confidence_weight,
        depth_band_pct,
        distance_band_ft,
        clock_band_hr,
    }
}

/// Assess one matched pair against the newer run's tool bands.
///
/// Adjustment: +5 when the distance residual sits inside the band, −10
/// when it blows past 3× the band, +3 for an in-band clock residual, +3
/// for an in-band depth difference. Clamped to [0, 100].
pub fn assess(
    tool: ToolType,
    pair: &MatchedPair,
    depth_diff_pct: Option<f64>,
) -> ToolQualAssessment {
    let bands = bands_for(tool);
    let mut adjustment = 0.0;

    let distance = pair.distance_residual_ft.abs();
    if distance <= bands.distance_band_ft {
        adjustment += 5.0;
    } else if distance > 3.0 * bands.distance_band_ft {
        adjustment -= 10.0;
    }

    if pair
        .clock_residual_hr
        .is_some_and(|c| c <= bands.clock_band_hr)
    {
        adjustment += 3.0;
    }

    if depth_diff_pct.is_some_and(|d| d.abs() <= bands.depth_band_pct) {
        adjustment += 3.0;
    }

    ToolQualAssessment {
        tool_type: tool,
        bands,
        adjustment,
        adjusted_confidence: (pair.confidence_score + adjustment).clamp(0.0, 100.0),
    }
}
