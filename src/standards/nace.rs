//! NACE SP0502 corrosion-growth classification

use crate::types::{GrowthAssessment, GrowthClass};

/// Classify a depth growth rate (% of wall per year) and recommend a
/// reassessment interval.
pub fn classify(rate_pct_per_year: Option<f64>) -> GrowthAssessment {
    let (class, reassessment_years) = match rate_pct_per_year {
        Some(rate) if rate > 2.0 => (GrowthClass::Accelerating, 3),
        Some(rate) if rate > 0.5 => (GrowthClass::Growing, 5),
        Some(rate) if rate > 0.0 => (GrowthClass::Stable, 7),
        _ => (GrowthClass::Undetermined, 5),
    };
    GrowthAssessment {
        class,
        rate_pct_per_year,
        reassessment_years,
    }
}
