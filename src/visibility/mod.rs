//! Visibility-confidence scoring — gates rendering per feature
//!
//! Four weighted components produce a score ∈ [0, 100] that maps onto
//! `full` / `dimmed` / `hidden` states. Control-point types and
//! baseline-run features bypass scoring entirely. Refinement exceptions
//! override afterwards: NEIGHBORHOOD_EXCESS always hides (even a
//! bypassed feature), RUN3_UNSUPPORTED dims a scored `full` (the
//! baseline bypass wins over dimming).

use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

use crate::config::defaults::{
    VISIBILITY_NEIGHBOR_RADIUS_FT, VISIBILITY_WEIGHT_COMPLETENESS, VISIBILITY_WEIGHT_MATCH,
    VISIBILITY_WEIGHT_SPATIAL, VISIBILITY_WEIGHT_TEMPORAL,
};
use crate::config::VisibilityConfig;
use crate::types::{Feature, FeatureId, RunId, VisibilityState};

/// Per-feature component breakdown, each ∈ [0, 100].
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct VisibilityComponents {
    pub match_confidence: f64,
    pub temporal_persistence: f64,
    pub spatial_reinforcement: f64,
    pub data_completeness: f64,
}

/// Scored visibility for one feature.
#[derive(Debug, Clone)]
pub struct FeatureVisibility {
    pub feature_id: FeatureId,
    pub score: f64,
    pub state: VisibilityState,
    pub components: VisibilityComponents,
    pub bypassed: bool,
}

/// Inputs to the visibility pass.
pub struct VisibilityInput<'a> {
    /// Every feature of every run in the job
    pub features: &'a [Feature],
    /// Feature id → match confidence, for matched features
    pub match_scores: &'a HashMap<FeatureId, f64>,
    /// Symmetric partner map over match links
    pub partner_map: &'a HashMap<FeatureId, Vec<FeatureId>>,
    pub baseline_run_id: RunId,
    pub total_runs: usize,
    /// Features carrying a NEIGHBORHOOD_EXCESS refinement exception
    pub neighborhood_excess: &'a HashSet<FeatureId>,
    /// Features carrying a RUN3_UNSUPPORTED refinement exception
    pub run3_unsupported: &'a HashSet<FeatureId>,
}

/// Distinct runs reachable from a feature over the partner map. The walk
/// carries an explicit seen set — partner maps can form cycles through
/// bad matches.
fn component_run_count(
    start: FeatureId,
    partner_map: &HashMap<FeatureId, Vec<FeatureId>>,
    run_of: &HashMap<FeatureId, RunId>,
) -> usize {
    let mut seen: HashSet<FeatureId> = HashSet::from([start]);
    let mut runs: HashSet<RunId> = HashSet::new();
    if let Some(run) = run_of.get(&start) {
        runs.insert(*run);
    }
    let mut queue = VecDeque::from([start]);
    while let Some(id) = queue.pop_front() {
        if let Some(partners) = partner_map.get(&id) {
            for partner in partners {
                if seen.insert(*partner) {
                    if let Some(run) = run_of.get(partner) {
                        runs.insert(*run);
                    }
                    queue.push_back(*partner);
                }
            }
        }
    }
    runs.len()
}

fn data_completeness(feature: &Feature) -> f64 {
    let populated = [
        feature.depth_percent.is_some(),
        feature.depth_in.is_some(),
        feature.length_in.is_some(),
        feature.width_in.is_some(),
        feature.clock_decimal.is_some(),
    ]
    .iter()
    .filter(|p| **p)
    .count();
    100.0 * populated as f64 / 5.0
}

/// Score every feature in the job.
pub fn score_features(input: &VisibilityInput<'_>, config: &VisibilityConfig) -> Vec<FeatureVisibility> {
    let run_of: HashMap<FeatureId, RunId> = input
        .features
        .iter()
        .map(|f| (f.id, f.run_id))
        .collect();

    // Per-run sorted distances for neighbor counting.
    let mut by_run: HashMap<RunId, Vec<(f64, FeatureId)>> = HashMap::new();
    for f in input.features {
        by_run
            .entry(f.run_id)
            .or_default()
            .push((f.aligned_distance_ft(), f.id));
    }
    for list in by_run.values_mut() {
        list.sort_by(|a, b| a.0.total_cmp(&b.0));
    }

    let mut out = Vec::with_capacity(input.features.len());
    for feature in input.features {
        let bypassed =
            feature.is_reference_point || feature.run_id == input.baseline_run_id;

        let components = if bypassed {
            VisibilityComponents {
                match_confidence: 100.0,
                temporal_persistence: 100.0,
                spatial_reinforcement: 100.0,
                data_completeness: 100.0,
            }
        } else {
            let match_confidence = input
                .match_scores
                .get(&feature.id)
                .copied()
                .unwrap_or(0.0);

            let runs_in_component =
                component_run_count(feature.id, input.partner_map, &run_of);
            let temporal_persistence = if runs_in_component >= 2 && input.total_runs > 0 {
                50.0 + 50.0 * runs_in_component as f64 / input.total_runs as f64
            } else {
                0.0
            };

            let neighbors = by_run
                .get(&feature.run_id)
                .map(|list| {
                    let d = feature.aligned_distance_ft();
                    list.iter()
                        .filter(|(dist, id)| {
                            *id != feature.id
                                && (dist - d).abs() <= VISIBILITY_NEIGHBOR_RADIUS_FT
                        })
                        .count()
                })
                .unwrap_or(0);
            let spatial_reinforcement = if neighbors == 0 {
                0.0
            } else {
                (20.0 + 20.0 * neighbors as f64).min(100.0)
            };

            VisibilityComponents {
                match_confidence,
                temporal_persistence,
                spatial_reinforcement,
                data_completeness: data_completeness(feature),
            }
        };

        let score = if bypassed {
            100.0
        } else {
            VISIBILITY_WEIGHT_MATCH * components.match_confidence
                + VISIBILITY_WEIGHT_TEMPORAL * components.temporal_persistence
                + VISIBILITY_WEIGHT_SPATIAL * components.spatial_reinforcement
                + VISIBILITY_WEIGHT_COMPLETENESS * components.data_completeness
        };

        let mut state = if bypassed || score >= config.full_threshold {
            VisibilityState::Full
        } else if score >= config.dimmed_threshold {
            VisibilityState::Dimmed
        } else {
            VisibilityState::Hidden
        };

        // Refinement overrides.
        if input.neighborhood_excess.contains(&feature.id) {
            state = VisibilityState::Hidden;
        } else if input.run3_unsupported.contains(&feature.id)
            && state == VisibilityState::Full
            && !bypassed
        {
            state = VisibilityState::Dimmed;
        }

        out.push(FeatureVisibility {
            feature_id: feature.id,
            score,
            state,
            components,
            bypassed,
        });
    }

    debug!(features = out.len(), "Visibility scoring complete");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventType;

    fn feature(id: u64, run_id: u64, dist: f64, reference: bool) -> Feature {
        Feature {
            id,
            run_id,
            row_index: id as usize,
            joint_number: None,
            joint_length_ft: None,
            wall_thickness_in: None,
            raw_event: String::new(),
            event_type: if reference {
                EventType::GirthWeld
            } else {
                EventType::MetalLoss
            },
            log_distance_ft: dist,
            corrected_distance_ft: Some(dist),
            depth_percent: Some(20.0),
            depth_in: Some(0.05),
            length_in: Some(2.0),
            width_in: Some(1.0),
            clock_raw: String::new(),
            clock_decimal: Some(6.0),
            elevation_ft: None,
            comments: None,
            is_reference_point: reference,
        }
    }

    fn empty_sets() -> (HashSet<FeatureId>, HashSet<FeatureId>) {
        (HashSet::new(), HashSet::new())
    }

    #[test]
    fn baseline_and_reference_features_bypass() {
        let features = vec![
            feature(1, 9, 100.0, false), // baseline anomaly
            feature(2, 1, 100.0, true),  // older-run weld
            feature(3, 1, 200.0, false), // older-run anomaly, unmatched
        ];
        let (ne, r3) = empty_sets();
        let scores = HashMap::new();
        let partners = HashMap::new();
        let out = score_features(
            &VisibilityInput {
                features: &features,
                match_scores: &scores,
                partner_map: &partners,
                baseline_run_id: 9,
                total_runs: 2,
                neighborhood_excess: &ne,
                run3_unsupported: &r3,
            },
            &VisibilityConfig::default(),
        );

        assert_eq!(out[0].state, VisibilityState::Full);
        assert_eq!(out[0].score, 100.0);
        assert_eq!(out[1].state, VisibilityState::Full);
        // Unmatched, no partners, no neighbors: only completeness counts.
        assert_eq!(out[2].state, VisibilityState::Hidden);
        assert!((out[2].score - 15.0).abs() < 1e-9);
    }

    #[test]
    fn matched_connected_feature_renders_fully() {
        let features = vec![feature(1, 1, 100.0, false), feature(2, 9, 100.2, false)];
        let scores: HashMap<FeatureId, f64> = [(1, 90.0)].into();
        let partners: HashMap<FeatureId, Vec<FeatureId>> =
            [(1, vec![2]), (2, vec![1])].into();
        let (ne, r3) = empty_sets();
        let out = score_features(
            &VisibilityInput {
                features: &features,
                match_scores: &scores,
                partner_map: &partners,
                baseline_run_id: 9,
                total_runs: 2,
                neighborhood_excess: &ne,
                run3_unsupported: &r3,
            },
            &VisibilityConfig::default(),
        );

        // 0.40·90 + 0.30·(50 + 50·2/2) + 0.15·0 + 0.15·100 = 36+30+0+15 = 81
        let f1 = &out[0];
        assert!((f1.score - 81.0).abs() < 1e-9);
        assert_eq!(f1.state, VisibilityState::Full);
    }

    #[test]
    fn neighborhood_excess_hides_even_the_baseline() {
        let features = vec![feature(1, 9, 100.0, false)];
        let (mut ne, r3) = empty_sets();
        ne.insert(1);
        let scores = HashMap::new();
        let partners = HashMap::new();
        let out = score_features(
            &VisibilityInput {
                features: &features,
                match_scores: &scores,
                partner_map: &partners,
                baseline_run_id: 9,
                total_runs: 2,
                neighborhood_excess: &ne,
                run3_unsupported: &r3,
            },
            &VisibilityConfig::default(),
        );
        assert!(out[0].bypassed);
        assert_eq!(out[0].state, VisibilityState::Hidden);
    }

    #[test]
    fn run3_unsupported_cannot_dim_a_bypassed_baseline() {
        let features = vec![feature(1, 9, 100.0, false)];
        let (ne, mut r3) = empty_sets();
        r3.insert(1);
        let scores = HashMap::new();
        let partners = HashMap::new();
        let out = score_features(
            &VisibilityInput {
                features: &features,
                match_scores: &scores,
                partner_map: &partners,
                baseline_run_id: 9,
                total_runs: 2,
                neighborhood_excess: &ne,
                run3_unsupported: &r3,
            },
            &VisibilityConfig::default(),
        );
        // Bypass wins: stays full.
        assert_eq!(out[0].state, VisibilityState::Full);
    }

    #[test]
    fn spatial_reinforcement_caps_at_one_hundred() {
        let mut features = vec![feature(1, 1, 100.0, false)];
        for i in 0..6 {
            features.push(feature(10 + i, 1, 100.5 + i as f64, false));
        }
        let scores = HashMap::new();
        let partners = HashMap::new();
        let (ne, r3) = empty_sets();
        let out = score_features(
            &VisibilityInput {
                features: &features,
                match_scores: &scores,
                partner_map: &partners,
                baseline_run_id: 9,
                total_runs: 2,
                neighborhood_excess: &ne,
                run3_unsupported: &r3,
            },
            &VisibilityConfig::default(),
        );
        // 6 neighbors → 20 + 120 → capped at 100
        assert!((out[0].components.spatial_reinforcement - 100.0).abs() < 1e-9);
    }
}
