//! Ensemble similarity scorer
//!
//! Blends seven similarity signals into one confidence ∈ [0, 100]. Signals
//! with defined fallbacks (dimensional, DTW, ICP, temporal) always
//! participate; the clock signal alone can be unavailable, in which case
//! its weight redistributes proportionally over the rest.

use crate::config::EnsembleWeights;
use crate::normalize::circular_distance;
use crate::types::{ConfidenceCategory, EventType};

/// Raw signal inputs for one candidate pair.
#[derive(Debug, Clone, Default)]
pub struct SignalInputs {
    pub distance_residual_ft: f64,
    pub older_clock: Option<f64>,
    pub newer_clock: Option<f64>,
    pub older_type: EventType,
    pub newer_type: EventType,
    pub older_depth_in: Option<f64>,
    pub newer_depth_in: Option<f64>,
    pub older_length_in: Option<f64>,
    pub newer_length_in: Option<f64>,
    pub older_width_in: Option<f64>,
    pub newer_width_in: Option<f64>,
    /// Segment DTW confidence ∈ [0, 100]
    pub dtw_confidence: Option<f64>,
    /// Segment ICP RMSE (ft)
    pub icp_rmse: Option<f64>,
    /// Runs in which this anomaly chain has been observed
    pub observed_run_count: Option<usize>,
    pub total_run_count: Option<usize>,
}

/// Individual component scores, each ∈ [0, 1]. `clock` is `None` when
/// either clock is missing.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ComponentScores {
    pub distance: f64,
    pub clock: Option<f64>,
    pub dimensional: f64,
    pub type_compat: f64,
    pub dtw: f64,
    pub icp: f64,
    pub temporal: f64,
}

/// Final ensemble output.
#[derive(Debug, Clone)]
pub struct EnsembleScore {
    /// Weighted total ∈ [0, 100]
    pub total: f64,
    pub category: ConfidenceCategory,
    pub components: ComponentScores,
    /// Circular clock residual (hours) when both clocks were present
    pub clock_residual_hr: Option<f64>,
    /// Names the two strongest and two weakest weighted components
    pub explanation: String,
}

/// Cross-type compatibility: identical types are 1.0; a metal-loss family
/// or bend family pairing is 0.7; anything else is incompatible.
pub fn type_compatibility(a: EventType, b: EventType) -> f64 {
    if a == b {
        return 1.0;
    }
    let metal_loss_family = |t: EventType| {
        matches!(
            t,
            EventType::MetalLoss | EventType::Cluster | EventType::MetalLossMfg
        )
    };
    let bend_family = |t: EventType| matches!(t, EventType::Bend | EventType::FieldBend);
    if (metal_loss_family(a) && metal_loss_family(b)) || (bend_family(a) && bend_family(b)) {
        0.7
    } else {
        0.0
    }
}

fn dimensional_similarity(inputs: &SignalInputs) -> f64 {
    const EPSILON: f64 = 1e-6;
    let dims = [
        (inputs.older_depth_in, inputs.newer_depth_in),
        (inputs.older_length_in, inputs.newer_length_in),
        (inputs.older_width_in, inputs.newer_width_in),
    ];
    let scores: Vec<f64> = dims
        .iter()
        .filter_map(|(old, new)| match (old, new) {
            (Some(o), Some(n)) => {
                let denom = o.abs().max(n.abs()).max(EPSILON);
                Some((1.0 - (o - n).abs() / denom).max(0.0))
            }
            _ => None,
        })
        .collect();
    if scores.is_empty() {
        0.5
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

fn temporal_persistence(observed: Option<usize>, total: Option<usize>) -> f64 {
    match (observed, total) {
        (Some(count), Some(total)) if total > 1 => {
            (0.1 + 0.9 * (count.saturating_sub(1) as f64) / ((total - 1) as f64)).min(1.0)
        }
        _ => 0.5,
    }
}

/// Score one candidate pair.
pub fn score(inputs: &SignalInputs, weights: &EnsembleWeights) -> EnsembleScore {
    let distance = (-inputs.distance_residual_ft.abs() / 3.0).exp();

    let clock_residual_hr = match (inputs.older_clock, inputs.newer_clock) {
        (Some(a), Some(b)) => Some(circular_distance(a, b)),
        _ => None,
    };
    let clock = clock_residual_hr.map(|d| (-d).exp());

    let dimensional = dimensional_similarity(inputs);
    let type_compat = type_compatibility(inputs.older_type, inputs.newer_type);
    let dtw = inputs
        .dtw_confidence
        .map_or(0.5, |c| (c / 100.0).clamp(0.0, 1.0));
    let icp = inputs.icp_rmse.map_or(0.5, |rmse| (-rmse / 3.0).exp());
    let temporal = temporal_persistence(inputs.observed_run_count, inputs.total_run_count);

    let components = ComponentScores {
        distance,
        clock,
        dimensional,
        type_compat,
        dtw,
        icp,
        temporal,
    };

    // Weighted mean over available components; a missing clock's weight
    // redistributes proportionally by falling out of both sums.
    let mut weighted: Vec<(&'static str, f64, f64)> = vec![
        ("distance", weights.distance, distance),
        ("dimensional", weights.dimensional, dimensional),
        ("type", weights.type_compat, type_compat),
        ("dtw", weights.dtw, dtw),
        ("icp", weights.icp, icp),
        ("temporal", weights.temporal, temporal),
    ];
    if let Some(clock_score) = clock {
        weighted.push(("clock", weights.clock, clock_score));
    }

    let weight_sum: f64 = weighted.iter().map(|(_, w, _)| w).sum();
    let total = if weight_sum > 0.0 {
        (100.0 * weighted.iter().map(|(_, w, s)| w * s).sum::<f64>() / weight_sum)
            .clamp(0.0, 100.0)
    } else {
        0.0
    };

    // Explanation: two highest and two lowest weighted contributions.
    weighted.sort_by(|a, b| (b.1 * b.2).total_cmp(&(a.1 * a.2)));
    let strongest: Vec<&str> = weighted.iter().take(2).map(|(name, _, _)| *name).collect();
    let weakest: Vec<&str> = weighted
        .iter()
        .rev()
        .take(2)
        .map(|(name, _, _)| *name)
        .collect();
    let explanation = format!(
        "strongest: {}; weakest: {}",
        strongest.join(", "),
        weakest.join(", ")
    );

    EnsembleScore {
        total,
        category: ConfidenceCategory::from_score(total),
        components,
        clock_residual_hr,
        explanation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_inputs() -> SignalInputs {
        SignalInputs {
            distance_residual_ft: 0.0,
            older_type: EventType::MetalLoss,
            newer_type: EventType::MetalLoss,
            ..SignalInputs::default()
        }
    }

    #[test]
    fn type_compatibility_table() {
        assert_eq!(type_compatibility(EventType::Dent, EventType::Dent), 1.0);
        assert_eq!(
            type_compatibility(EventType::MetalLoss, EventType::Cluster),
            0.7
        );
        assert_eq!(
            type_compatibility(EventType::Cluster, EventType::MetalLossMfg),
            0.7
        );
        assert_eq!(
            type_compatibility(EventType::Bend, EventType::FieldBend),
            0.7
        );
        assert_eq!(type_compatibility(EventType::Dent, EventType::Crack), 0.0);
    }

    #[test]
    fn missing_clock_redistributes_weight() {
        // Distance 0.5 ft, types equal, depths equal, clocks null,
        // DTW/ICP/temporal null → lands in 75–80, HIGH.
        let mut inputs = base_inputs();
        inputs.distance_residual_ft = 0.5;
        inputs.older_depth_in = Some(0.2);
        inputs.newer_depth_in = Some(0.2);

        let s = score(&inputs, &EnsembleWeights::default());
        assert!(s.components.clock.is_none());
        assert!(s.clock_residual_hr.is_none());
        assert!(
            (75.0..=80.0).contains(&s.total),
            "expected 75–80, got {}",
            s.total
        );
        assert_eq!(s.category, ConfidenceCategory::High);
    }

    #[test]
    fn perfect_match_with_clocks_scores_high() {
        let mut inputs = base_inputs();
        inputs.older_clock = Some(6.0);
        inputs.newer_clock = Some(6.0);
        inputs.older_depth_in = Some(0.1);
        inputs.newer_depth_in = Some(0.1);
        inputs.dtw_confidence = Some(100.0);
        inputs.icp_rmse = Some(0.0);
        inputs.observed_run_count = Some(3);
        inputs.total_run_count = Some(3);

        let s = score(&inputs, &EnsembleWeights::default());
        assert!((s.total - 100.0).abs() < 1e-9);
        assert_eq!(s.category, ConfidenceCategory::High);
        assert_eq!(s.clock_residual_hr, Some(0.0));
    }

    #[test]
    fn incompatible_types_drag_the_total() {
        let mut inputs = base_inputs();
        inputs.newer_type = EventType::Crack;
        let s = score(&inputs, &EnsembleWeights::default());
        assert_eq!(s.components.type_compat, 0.0);
        assert!(s.total < 75.0);
    }

    #[test]
    fn fallback_components_score_half() {
        let s = score(&base_inputs(), &EnsembleWeights::default());
        assert_eq!(s.components.dimensional, 0.5);
        assert_eq!(s.components.dtw, 0.5);
        assert_eq!(s.components.icp, 0.5);
        assert_eq!(s.components.temporal, 0.5);
    }

    #[test]
    fn temporal_scales_with_observed_runs() {
        assert_eq!(temporal_persistence(None, None), 0.5);
        assert_eq!(temporal_persistence(Some(2), Some(1)), 0.5);
        assert!((temporal_persistence(Some(1), Some(4)) - 0.1).abs() < 1e-12);
        assert!((temporal_persistence(Some(4), Some(4)) - 1.0).abs() < 1e-12);
        assert!((temporal_persistence(Some(3), Some(4)) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn explanation_names_extremes() {
        let s = score(&base_inputs(), &EnsembleWeights::default());
        assert!(s.explanation.starts_with("strongest: "));
        assert!(s.explanation.contains("; weakest: "));
    }

    #[test]
    fn total_stays_in_range_for_extreme_inputs() {
        let mut inputs = base_inputs();
        inputs.distance_residual_ft = 1000.0;
        inputs.icp_rmse = Some(1000.0);
        inputs.newer_type = EventType::Valve;
        let s = score(&inputs, &EnsembleWeights::default());
        assert!((0.0..=100.0).contains(&s.total));
        assert_eq!(s.category, ConfidenceCategory::Low);
    }
}
