//! ASME B31.8S severity and repair rules

use crate::types::{AsmeAssessment, EventType, RepairAction, Severity};

/// Remaining-life horizon considered accelerated (years).
const ACCELERATED_LIFE_YEARS: f64 = 5.0;

/// Depth at which metal loss mandates immediate response (% of wall).
const IMMEDIATE_DEPTH_PCT: f64 = 80.0;

/// Severity for one corrosion-class anomaly.
///
/// `depth_pct` is the assessment depth — the interaction-zone combined
/// depth when the anomaly sits in a zone, its own depth otherwise.
fn severity(event_type: EventType, depth_pct: f64) -> Severity {
    if event_type == EventType::Dent {
        if depth_pct > 6.0 {
            Severity::Immediate
        } else if depth_pct > 2.0 {
            Severity::Scheduled
        } else {
            Severity::Monitoring
        }
    } else if depth_pct >= IMMEDIATE_DEPTH_PCT {
        Severity::Immediate
    } else if depth_pct >= 60.0 {
        Severity::Scheduled
    } else if depth_pct >= 40.0 {
        Severity::Monitoring
    } else {
        Severity::Informational
    }
}

/// Repair recommendation given severity, depth, and axial length.
/// Missing lengths fail the length-based criteria.
fn repair(
    severity: Severity,
    event_type: EventType,
    depth_pct: f64,
    length_in: Option<f64>,
) -> RepairAction {
    match severity {
        Severity::Immediate => {
            if event_type == EventType::Dent || depth_pct >= IMMEDIATE_DEPTH_PCT {
                RepairAction::Cutout
            } else {
                RepairAction::Monitor
            }
        }
        Severity::Scheduled => {
            if length_in.is_some_and(|l| l > 6.0) {
                RepairAction::Sleeve
            } else {
                RepairAction::CompositeWrap
            }
        }
        Severity::Monitoring => {
            if depth_pct < 50.0 && length_in.is_some_and(|l| l < 3.0) {
                RepairAction::Grind
            } else {
                RepairAction::Monitor
            }
        }
        Severity::Informational => RepairAction::None,
    }
}

/// Full ASME assessment for one matched corrosion anomaly.
pub fn assess(
    event_type: EventType,
    feature_depth_pct: f64,
    length_in: Option<f64>,
    growth_rate_pct_per_year: Option<f64>,
    zone_combined_depth_pct: Option<f64>,
) -> AsmeAssessment {
    let combined_in_zone = zone_combined_depth_pct.is_some();
    let depth_used_pct = zone_combined_depth_pct.unwrap_or(feature_depth_pct);

    let severity = severity(event_type, depth_used_pct);
    let repair = repair(severity, event_type, depth_used_pct, length_in);

    let remaining_life_years = growth_rate_pct_per_year
        .filter(|rate| *rate > 0.0 && depth_used_pct < IMMEDIATE_DEPTH_PCT)
        .map(|rate| (IMMEDIATE_DEPTH_PCT - depth_used_pct) / rate);
    let accelerated_growth =
        remaining_life_years.is_some_and(|life| life < ACCELERATED_LIFE_YEARS);

    AsmeAssessment {
        severity,
        repair,
        depth_used_pct,
        combined_in_zone,
        remaining_life_years,
        accelerated_growth,
    }
}
