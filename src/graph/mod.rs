//! Anomaly interaction analysis
//!
//! Builds the interaction graph over non-reference anomalies: MATCH_LINK
//! edges across runs, SPATIAL_PROXIMITY and ASME B31.8S §A-4.3
//! INTERACTION_ZONE edges within a run, union-find clusters over zone
//! edges, and temporal chains walked along match links. The zone detector
//! and clustering are pure functions — the standards engine reuses them
//! for combined-depth assessment before the full graph stage runs.

mod union_find;

pub use union_find::UnionFind;

use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::defaults::{
    CIRCUMFERENCE_IN_PER_CLOCK_HR, PROXIMITY_RADIUS_FT, TEMPORAL_CHAIN_MIN_LEN,
};
use crate::normalize::circular_distance;
use crate::types::{
    EdgeKind, Exception, ExceptionCategory, ExceptionSeverity, Feature, FeatureId,
    InteractionCluster, InteractionEdge, InteractionGraph, InteractionKind, MatchedPair, RunId,
    TemporalChain,
};

/// ASME B31.8S §A-4.3 interaction test for two same-run corrosion
/// anomalies.
///
/// Axial criterion: separation ≤ min(3t, min(L₁, L₂)) (inches → feet).
/// Circumferential criterion: clock distance · ~7.85 in/hr ≤
/// min(3t, min(W₁, W₂)). Either criterion alone creates a zone edge; the
/// kind records which fired. Candidates must sit within the spatial
/// proximity radius — without that gate every clock-aligned pair along
/// the line would chain into one cluster.
pub fn interaction_zone(a: &Feature, b: &Feature) -> Option<InteractionKind> {
    if !a.event_type.is_corrosion() || !b.event_type.is_corrosion() || a.run_id != b.run_id {
        return None;
    }
    if (a.aligned_distance_ft() - b.aligned_distance_ft()).abs() > PROXIMITY_RADIUS_FT {
        return None;
    }

    let three_t = match (a.wall_thickness_in, b.wall_thickness_in) {
        (Some(ta), Some(tb)) => Some(3.0 * ta.min(tb)),
        (Some(t), None) | (None, Some(t)) => Some(3.0 * t),
        (None, None) => None,
    };

    let axial_threshold_in = match (three_t, min_dim(a.length_in, b.length_in)) {
        (Some(t), Some(l)) => Some(t.min(l)),
        (Some(t), None) => Some(t),
        (None, Some(l)) => Some(l),
        (None, None) => None,
    };
    let circ_threshold_in = match (three_t, min_dim(a.width_in, b.width_in)) {
        (Some(t), Some(w)) => Some(t.min(w)),
        (Some(t), None) => Some(t),
        (None, Some(w)) => Some(w),
        (None, None) => None,
    };

    let axial_sep_ft = (a.aligned_distance_ft() - b.aligned_distance_ft()).abs();
    let axial_hit = axial_threshold_in.is_some_and(|t| axial_sep_ft <= t / 12.0);

    let circ_hit = match (a.clock_decimal, b.clock_decimal, circ_threshold_in) {
        (Some(ca), Some(cb), Some(t)) => {
            circular_distance(ca, cb) * CIRCUMFERENCE_IN_PER_CLOCK_HR <= t
        }
        _ => false,
    };

    match (axial_hit, circ_hit) {
        (true, true) => Some(InteractionKind::Combined),
        (true, false) => Some(InteractionKind::Axial),
        (false, true) => Some(InteractionKind::Circumferential),
        (false, false) => None,
    }
}

fn min_dim(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        _ => None,
    }
}

/// Union-find clusters over one run's zone edges.
///
/// Pure: callable before the graph stage (the standards engine uses it
/// for combined-depth assessment). Only clusters of two or more members
/// are returned.
pub fn detect_clusters(run_id: RunId, anomalies: &[&Feature]) -> Vec<InteractionCluster> {
    let mut uf = UnionFind::new(anomalies.len());
    let mut edge_kinds: Vec<(usize, usize, InteractionKind)> = Vec::new();

    for i in 0..anomalies.len() {
        for j in (i + 1)..anomalies.len() {
            if let Some(kind) = interaction_zone(anomalies[i], anomalies[j]) {
                uf.union(i, j);
                edge_kinds.push((i, j, kind));
            }
        }
    }

    let mut members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..anomalies.len() {
        members.entry(uf.find(i)).or_default().push(i);
    }

    let mut clusters = Vec::new();
    for (root, indices) in members {
        if indices.len() < 2 {
            continue;
        }
        let kinds: Vec<InteractionKind> = edge_kinds
            .iter()
            .filter(|(i, j, _)| uf.find(*i) == root && uf.find(*j) == root)
            .map(|(_, _, k)| *k)
            .collect();
        let interaction_kind = if kinds.iter().any(|k| *k == InteractionKind::Combined) {
            InteractionKind::Combined
        } else if kinds.iter().any(|k| *k == InteractionKind::Circumferential) {
            InteractionKind::Circumferential
        } else {
            InteractionKind::Axial
        };

        let distances: Vec<f64> = indices
            .iter()
            .map(|&i| anomalies[i].aligned_distance_ft())
            .collect();
        let span_ft = distances.iter().copied().fold(f64::NEG_INFINITY, f64::max)
            - distances.iter().copied().fold(f64::INFINITY, f64::min);
        let length_sum_in: f64 = indices
            .iter()
            .filter_map(|&i| anomalies[i].length_in)
            .sum();
        let combined_depth_pct = indices
            .iter()
            .filter_map(|&i| anomalies[i].depth_percent)
            .fold(0.0, f64::max);

        let mut member_ids: Vec<FeatureId> = indices.iter().map(|&i| anomalies[i].id).collect();
        member_ids.sort_unstable();

        clusters.push(InteractionCluster {
            run_id,
            members: member_ids,
            combined_length_in: length_sum_in + span_ft * 12.0,
            combined_depth_pct,
            interaction_kind,
        });
    }
    clusters
}

/// Build the full interaction graph for a job.
///
/// `anomalies_by_run` holds each run's non-reference features;
/// `run_order` is oldest → newest.
pub fn build_graph(
    job_id: Uuid,
    anomalies_by_run: &HashMap<RunId, Vec<Feature>>,
    matches: &[MatchedPair],
    run_order: &[RunId],
) -> (InteractionGraph, Vec<Exception>) {
    let mut graph = InteractionGraph::default();
    let mut exceptions = Vec::new();

    // MATCH_LINK edges across runs.
    for m in matches {
        graph.edges.push(InteractionEdge {
            kind: EdgeKind::MatchLink,
            a: m.older_feature_id,
            b: m.newer_feature_id,
            separation_ft: None,
            interaction: None,
        });
    }

    // Within-run proximity and interaction-zone edges.
    for run_id in run_order {
        let Some(features) = anomalies_by_run.get(run_id) else {
            continue;
        };
        let mut sorted: Vec<&Feature> = features.iter().collect();
        sorted.sort_by(|a, b| a.aligned_distance_ft().total_cmp(&b.aligned_distance_ft()));

        for i in 0..sorted.len() {
            for j in (i + 1)..sorted.len() {
                let sep =
                    (sorted[j].aligned_distance_ft() - sorted[i].aligned_distance_ft()).abs();
                if sep > PROXIMITY_RADIUS_FT {
                    break; // sorted by distance; nothing farther can qualify
                }
                graph.edges.push(InteractionEdge {
                    kind: EdgeKind::SpatialProximity,
                    a: sorted[i].id,
                    b: sorted[j].id,
                    separation_ft: Some(sep),
                    interaction: None,
                });
                if let Some(kind) = interaction_zone(sorted[i], sorted[j]) {
                    graph.edges.push(InteractionEdge {
                        kind: EdgeKind::InteractionZone,
                        a: sorted[i].id,
                        b: sorted[j].id,
                        separation_ft: Some(sep),
                        interaction: Some(kind),
                    });
                }
            }
        }

        for cluster in detect_clusters(*run_id, &sorted) {
            exceptions.push(Exception::new(
                job_id,
                ExceptionCategory::InteractionZone,
                ExceptionSeverity::Medium,
                cluster.members.first().copied(),
                Some(*run_id),
                serde_json::json!({
                    "members": cluster.members,
                    "combined_length_in": cluster.combined_length_in,
                    "combined_depth_pct": cluster.combined_depth_pct,
                    "interaction_kind": cluster.interaction_kind.as_str(),
                }),
            ));
            graph.clusters.push(cluster);
        }
    }

    graph.chains = build_temporal_chains(anomalies_by_run, matches, run_order);

    info!(
        edges = graph.edges.len(),
        clusters = graph.clusters.len(),
        chains = graph.chains.len(),
        "Interaction graph built"
    );
    (graph, exceptions)
}

/// Walk MATCH_LINK edges into per-anomaly chains, oldest run first. Only
/// chains covering at least three runs survive. The walk carries an
/// explicit seen set — partner maps can form cycles through bad matches.
fn build_temporal_chains(
    anomalies_by_run: &HashMap<RunId, Vec<Feature>>,
    matches: &[MatchedPair],
    run_order: &[RunId],
) -> Vec<TemporalChain> {
    let run_of: HashMap<FeatureId, RunId> = anomalies_by_run
        .iter()
        .flat_map(|(run_id, features)| features.iter().map(|f| (f.id, *run_id)))
        .collect();
    let rank: HashMap<RunId, usize> = run_order
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, i))
        .collect();

    // Symmetric adjacency over match links.
    let mut adjacency: HashMap<FeatureId, Vec<FeatureId>> = HashMap::new();
    for m in matches {
        adjacency
            .entry(m.older_feature_id)
            .or_default()
            .push(m.newer_feature_id);
        adjacency
            .entry(m.newer_feature_id)
            .or_default()
            .push(m.older_feature_id);
    }

    let mut seen: HashSet<FeatureId> = HashSet::new();
    let mut chains = Vec::new();
    let mut start_ids: Vec<FeatureId> = adjacency.keys().copied().collect();
    start_ids.sort_unstable();

    for start in start_ids {
        if seen.contains(&start) {
            continue;
        }
        // BFS over the component with an explicit seen set.
        let mut component = Vec::new();
        let mut queue = std::collections::VecDeque::from([start]);
        seen.insert(start);
        while let Some(id) = queue.pop_front() {
            component.push(id);
            if let Some(partners) = adjacency.get(&id) {
                for partner in partners {
                    if seen.insert(*partner) {
                        queue.push_back(*partner);
                    }
                }
            }
        }

        let mut links: Vec<(RunId, FeatureId)> = component
            .into_iter()
            .filter_map(|id| run_of.get(&id).map(|run| (*run, id)))
            .collect();
        let distinct_runs: HashSet<RunId> = links.iter().map(|(run, _)| *run).collect();
        if distinct_runs.len() < TEMPORAL_CHAIN_MIN_LEN {
            continue;
        }
        links.sort_by_key(|(run, id)| (rank.get(run).copied().unwrap_or(usize::MAX), *id));
        chains.push(TemporalChain { links });
    }

    debug!(chains = chains.len(), "Temporal chains discovered");
    chains
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfidenceCategory, EventType, GrowthRates, MatchCategory};

    fn corrosion(id: u64, run_id: u64, dist: f64, clock: Option<f64>) -> Feature {
        Feature {
            id,
            run_id,
            row_index: id as usize,
            joint_number: None,
            joint_length_ft: None,
            wall_thickness_in: Some(0.30),
            raw_event: "metal loss".into(),
            event_type: EventType::MetalLoss,
            log_distance_ft: dist,
            corrected_distance_ft: Some(dist),
            depth_percent: Some(30.0),
            depth_in: None,
            length_in: Some(2.0),
            width_in: Some(1.5),
            clock_raw: String::new(),
            clock_decimal: clock,
            elevation_ft: None,
            comments: None,
            is_reference_point: false,
        }
    }

    fn link(job: Uuid, older_run: u64, older: u64, newer_run: u64, newer: u64) -> MatchedPair {
        MatchedPair {
            job_id: job,
            older_feature_id: older,
            newer_feature_id: newer,
            older_run_id: older_run,
            newer_run_id: newer_run,
            distance_residual_ft: 0.0,
            clock_residual_hr: None,
            type_compatibility: 1.0,
            dimensional_similarity: 1.0,
            confidence_score: 90.0,
            confidence_category: ConfidenceCategory::High,
            match_category: MatchCategory::AutoMatched,
            growth: GrowthRates::default(),
            competing_older_ids: vec![],
            standards_applied: None,
        }
    }

    #[test]
    fn tight_pair_is_a_combined_zone() {
        // 3t = 0.9 in; min length 2 in → axial threshold 0.9 in = 0.075 ft.
        // Same clock → circumferential separation 0.
        let a = corrosion(1, 1, 100.0, Some(6.0));
        let b = corrosion(2, 1, 100.05, Some(6.0));
        assert_eq!(interaction_zone(&a, &b), Some(InteractionKind::Combined));
    }

    #[test]
    fn clock_separation_blocks_circumferential() {
        // Axially touching but 3 clock hours (~23.6 in) apart.
        let a = corrosion(1, 1, 100.0, Some(3.0));
        let b = corrosion(2, 1, 100.05, Some(6.0));
        assert_eq!(interaction_zone(&a, &b), Some(InteractionKind::Axial));
    }

    #[test]
    fn far_apart_is_no_zone() {
        // 50 ft axial separation is past the proximity gate even at the
        // same clock position.
        let a = corrosion(1, 1, 100.0, Some(6.0));
        let b = corrosion(2, 1, 150.0, Some(6.0));
        assert_eq!(interaction_zone(&a, &b), None);
    }

    #[test]
    fn clock_aligned_neighbors_interact_circumferentially() {
        // 2 ft apart (inside the proximity gate, past the axial
        // threshold), same clock → circumferential.
        let a = corrosion(1, 1, 100.0, Some(6.0));
        let b = corrosion(2, 1, 102.0, Some(6.0));
        assert_eq!(
            interaction_zone(&a, &b),
            Some(InteractionKind::Circumferential)
        );
    }

    #[test]
    fn reference_types_never_interact() {
        let mut a = corrosion(1, 1, 100.0, Some(6.0));
        a.event_type = EventType::GirthWeld;
        let b = corrosion(2, 1, 100.01, Some(6.0));
        assert_eq!(interaction_zone(&a, &b), None);
    }

    #[test]
    fn clusters_combine_length_and_depth() {
        let mut a = corrosion(1, 1, 100.0, Some(6.0));
        a.depth_percent = Some(20.0);
        let mut b = corrosion(2, 1, 100.05, Some(6.0));
        b.depth_percent = Some(45.0);
        let anomalies = vec![&a, &b];
        let clusters = detect_clusters(1, &anomalies);
        assert_eq!(clusters.len(), 1);
        let c = &clusters[0];
        assert_eq!(c.members, vec![1, 2]);
        // Σ lengths (4 in) + span 0.05 ft · 12 = 0.6 in
        assert!((c.combined_length_in - 4.6).abs() < 1e-9);
        assert!((c.combined_depth_pct - 45.0).abs() < 1e-12);
    }

    #[test]
    fn temporal_chain_needs_three_runs() {
        let job = Uuid::new_v4();
        let mut by_run: HashMap<RunId, Vec<Feature>> = HashMap::new();
        by_run.insert(1, vec![corrosion(11, 1, 100.0, None)]);
        by_run.insert(2, vec![corrosion(21, 2, 100.0, None)]);
        by_run.insert(3, vec![corrosion(31, 3, 100.0, None)]);

        // Chain across three runs: 11 → 31, 21 → 31.
        let matches = vec![link(job, 1, 11, 3, 31), link(job, 2, 21, 3, 31)];
        let (graph, _) = build_graph(job, &by_run, &matches, &[1, 2, 3]);
        assert_eq!(graph.chains.len(), 1);
        let chain = &graph.chains[0];
        assert_eq!(chain.links.len(), 3);
        // Oldest run first
        assert_eq!(chain.links[0], (1, 11));
        assert_eq!(chain.links[2], (3, 31));

        // A single match spans two runs only — no chain.
        let matches = vec![link(job, 1, 11, 3, 31)];
        let (graph, _) = build_graph(job, &by_run, &matches, &[1, 2, 3]);
        assert!(graph.chains.is_empty());
    }

    #[test]
    fn cyclic_partner_map_terminates() {
        let job = Uuid::new_v4();
        let mut by_run: HashMap<RunId, Vec<Feature>> = HashMap::new();
        by_run.insert(1, vec![corrosion(11, 1, 100.0, None)]);
        by_run.insert(2, vec![corrosion(21, 2, 100.0, None)]);
        by_run.insert(3, vec![corrosion(31, 3, 100.0, None)]);

        // Bad matches forming a cycle 11–21, 21–31, 31–11.
        let matches = vec![
            link(job, 1, 11, 2, 21),
            link(job, 2, 21, 3, 31),
            link(job, 1, 11, 3, 31),
        ];
        let (graph, _) = build_graph(job, &by_run, &matches, &[1, 2, 3]);
        assert_eq!(graph.chains.len(), 1);
        assert_eq!(graph.chains[0].links.len(), 3);
    }
}
