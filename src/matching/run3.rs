//! Run-3 refinement — post-match audit over baseline anomalies
//!
//! Runs once per job after matching. Flags likely duplicates and noise
//! among unmatched baseline anomalies, classifies the remainder, and
//! audits baseline features matched against more than one older run.
//! Nothing is deleted and no alignment math changes; every flag is an
//! exception plus an entry in the refinement report consumed by the
//! visibility scorer.

use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::info;
use uuid::Uuid;

use crate::config::defaults::MIN_DATA_COMPLETENESS_FIELDS;
use crate::config::RefinementConfig;
use crate::types::{
    Exception, ExceptionCategory, ExceptionSeverity, Feature, FeatureId, MatchedPair, RunId,
};

/// How refinement classified one baseline anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefinementFlag {
    /// Unmatched twin of a matched neighbor of the same type
    NeighborhoodDuplicate,
    /// Member of a dense unmatched cluster
    DenseCluster,
    /// Too little dimensional data to stand as a new anomaly
    Unsupported,
    /// A genuine new anomaly (retains its UNMATCHED exception)
    TrueNew,
}

/// Refinement output: per-feature flags plus audit exceptions.
#[derive(Debug, Default)]
pub struct RefinementReport {
    pub flags: HashMap<FeatureId, RefinementFlag>,
    pub exceptions: Vec<Exception>,
    pub multi_run_features: usize,
}

/// Refine baseline anomalies after matching.
///
/// `baseline_anomalies` are the baseline run's non-reference features;
/// `matches` every MatchedPair of the job (all older runs); `run_order`
/// the job's run ids oldest → newest.
pub fn refine(
    job_id: Uuid,
    baseline_anomalies: &[Feature],
    matches: &[MatchedPair],
    run_order: &[RunId],
    config: &RefinementConfig,
) -> RefinementReport {
    let mut report = RefinementReport::default();
    let radius = config.neighborhood_radius_ft;

    let matched_ids: HashSet<FeatureId> =
        matches.iter().map(|m| m.newer_feature_id).collect();
    let matched: Vec<&Feature> = baseline_anomalies
        .iter()
        .filter(|f| matched_ids.contains(&f.id))
        .collect();
    let unmatched: Vec<&Feature> = baseline_anomalies
        .iter()
        .filter(|f| !matched_ids.contains(&f.id))
        .collect();

    // Step 1: neighborhood duplicates — an unmatched anomaly shadowing a
    // matched anomaly of the same type within the radius.
    for feature in &unmatched {
        let twin = matched.iter().find(|m| {
            m.event_type == feature.event_type
                && (m.aligned_distance_ft() - feature.aligned_distance_ft()).abs() <= radius
        });
        if let Some(twin) = twin {
            report
                .flags
                .insert(feature.id, RefinementFlag::NeighborhoodDuplicate);
            report.exceptions.push(Exception::new(
                job_id,
                ExceptionCategory::NeighborhoodExcess,
                ExceptionSeverity::Low,
                Some(feature.id),
                Some(feature.run_id),
                serde_json::json!({
                    "classification": "NEIGHBORHOOD_DUPLICATE",
                    "matched_twin_id": twin.id,
                    "separation_ft":
                        (twin.aligned_distance_ft() - feature.aligned_distance_ft()).abs(),
                }),
            ));
        }
    }

    // Step 2: dense clusters among the still-unflagged unmatched.
    for feature in &unmatched {
        if report.flags.contains_key(&feature.id) {
            continue;
        }
        let d = feature.aligned_distance_ft();
        let unmatched_neighbors = unmatched
            .iter()
            .filter(|o| o.id != feature.id && (o.aligned_distance_ft() - d).abs() <= radius)
            .count();
        let matched_neighbors = matched
            .iter()
            .filter(|m| (m.aligned_distance_ft() - d).abs() <= radius)
            .count();
        if unmatched_neighbors >= config.cluster_unmatched_threshold && matched_neighbors <= 1 {
            report.flags.insert(feature.id, RefinementFlag::DenseCluster);
            report.exceptions.push(Exception::new(
                job_id,
                ExceptionCategory::NeighborhoodExcess,
                ExceptionSeverity::Medium,
                Some(feature.id),
                Some(feature.run_id),
                serde_json::json!({
                    "classification": "DENSE_CLUSTER",
                    "unmatched_neighbors": unmatched_neighbors,
                    "matched_neighbors": matched_neighbors,
                }),
            ));
        }
    }

    // Step 3: classify what is left — thin records cannot stand as new
    // anomalies; the rest are genuinely new and keep their UNMATCHED
    // exception from matching.
    for feature in &unmatched {
        if report.flags.contains_key(&feature.id) {
            continue;
        }
        if feature.populated_dimensions() < MIN_DATA_COMPLETENESS_FIELDS {
            report.flags.insert(feature.id, RefinementFlag::Unsupported);
            report.exceptions.push(Exception::new(
                job_id,
                ExceptionCategory::Run3Unsupported,
                ExceptionSeverity::Low,
                Some(feature.id),
                Some(feature.run_id),
                serde_json::json!({
                    "populated_dimensions": feature.populated_dimensions(),
                    "required": MIN_DATA_COMPLETENESS_FIELDS,
                }),
            ));
        } else {
            report.flags.insert(feature.id, RefinementFlag::TrueNew);
        }
    }

    // Step 4: multi-run audit — a baseline feature matched against more
    // than one older run. Primary is the temporally closest older run
    // (latest position in the oldest → newest order); the rest are
    // secondary.
    let rank: HashMap<RunId, usize> = run_order
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, i))
        .collect();
    let mut by_feature: BTreeMap<FeatureId, Vec<&MatchedPair>> = BTreeMap::new();
    for m in matches {
        by_feature.entry(m.newer_feature_id).or_default().push(m);
    }
    for (feature_id, feature_matches) in by_feature {
        let distinct_runs: HashSet<RunId> =
            feature_matches.iter().map(|m| m.older_run_id).collect();
        if distinct_runs.len() < 2 {
            continue;
        }
        report.multi_run_features += 1;
        let primary = feature_matches
            .iter()
            .max_by_key(|m| rank.get(&m.older_run_id).copied().unwrap_or(0))
            .map(|m| m.older_run_id);
        let secondary: Vec<RunId> = distinct_runs
            .iter()
            .copied()
            .filter(|r| Some(*r) != primary)
            .collect();
        let run_id = feature_matches.first().map(|m| m.newer_run_id);
        report.exceptions.push(Exception::new(
            job_id,
            ExceptionCategory::MultiRunMatch,
            ExceptionSeverity::Low,
            Some(feature_id),
            run_id,
            serde_json::json!({
                "primary_older_run": primary,
                "secondary_older_runs": secondary,
                "match_count": feature_matches.len(),
            }),
        ));
    }

    info!(
        flagged = report.flags.len(),
        exceptions = report.exceptions.len(),
        multi_run = report.multi_run_features,
        "Run-3 refinement complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfidenceCategory, EventType, GrowthRates, MatchCategory};

    fn anomaly(id: u64, dist: f64, dims: usize) -> Feature {
        Feature {
            id,
            run_id: 9,
            row_index: id as usize,
            joint_number: None,
            joint_length_ft: None,
            wall_thickness_in: None,
            raw_event: "metal loss".into(),
            event_type: EventType::MetalLoss,
            log_distance_ft: dist,
            corrected_distance_ft: None,
            depth_percent: (dims >= 1).then_some(20.0),
            depth_in: (dims >= 2).then_some(0.05),
            length_in: (dims >= 3).then_some(1.5),
            width_in: (dims >= 4).then_some(1.0),
            clock_raw: String::new(),
            clock_decimal: None,
            elevation_ft: None,
            comments: None,
            is_reference_point: false,
        }
    }

    fn matched_pair(job: Uuid, older_run: RunId, newer_feature: FeatureId) -> MatchedPair {
        MatchedPair {
            job_id: job,
            older_feature_id: 1000 + newer_feature,
            newer_feature_id: newer_feature,
            older_run_id: older_run,
            newer_run_id: 9,
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

    fn config() -> RefinementConfig {
        RefinementConfig::default()
    }

    #[test]
    fn neighborhood_duplicate_within_three_feet() {
        let job = Uuid::new_v4();
        // Matched METAL_LOSS at 1000.0, unmatched METAL_LOSS at 1001.5.
        let features = vec![anomaly(1, 1000.0, 4), anomaly(2, 1001.5, 4)];
        let matches = vec![matched_pair(job, 5, 1)];

        let report = refine(job, &features, &matches, &[5, 9], &config());
        assert_eq!(
            report.flags.get(&2),
            Some(&RefinementFlag::NeighborhoodDuplicate)
        );
        let e = report
            .exceptions
            .iter()
            .find(|e| e.category == ExceptionCategory::NeighborhoodExcess)
            .expect("duplicate exception");
        assert_eq!(e.severity, ExceptionSeverity::Low);
        assert_eq!(e.details["classification"], "NEIGHBORHOOD_DUPLICATE");
    }

    #[test]
    fn different_type_is_not_a_duplicate() {
        let job = Uuid::new_v4();
        let mut dent = anomaly(2, 1001.0, 4);
        dent.event_type = EventType::Dent;
        let features = vec![anomaly(1, 1000.0, 4), dent];
        let matches = vec![matched_pair(job, 5, 1)];

        let report = refine(job, &features, &matches, &[5, 9], &config());
        assert_ne!(
            report.flags.get(&2),
            Some(&RefinementFlag::NeighborhoodDuplicate)
        );
    }

    #[test]
    fn dense_cluster_of_unmatched() {
        let job = Uuid::new_v4();
        // Four unmatched anomalies packed into 2 ft, nothing matched nearby.
        let features = vec![
            anomaly(1, 500.0, 4),
            anomaly(2, 500.5, 4),
            anomaly(3, 501.0, 4),
            anomaly(4, 501.5, 4),
        ];
        let report = refine(job, &features, &[], &[5, 9], &config());
        assert!(report
            .flags
            .values()
            .any(|f| *f == RefinementFlag::DenseCluster));
        assert!(report
            .exceptions
            .iter()
            .any(|e| e.category == ExceptionCategory::NeighborhoodExcess
                && e.severity == ExceptionSeverity::Medium));
    }

    #[test]
    fn thin_records_are_unsupported_and_rich_ones_true_new() {
        let job = Uuid::new_v4();
        let features = vec![anomaly(1, 100.0, 1), anomaly(2, 900.0, 3)];
        let report = refine(job, &features, &[], &[5, 9], &config());
        assert_eq!(report.flags.get(&1), Some(&RefinementFlag::Unsupported));
        assert_eq!(report.flags.get(&2), Some(&RefinementFlag::TrueNew));
        assert!(report
            .exceptions
            .iter()
            .any(|e| e.category == ExceptionCategory::Run3Unsupported));
        // TrueNew produces no new exception
        assert_eq!(report.exceptions.len(), 1);
    }

    #[test]
    fn multi_run_match_picks_temporally_closest_primary() {
        let job = Uuid::new_v4();
        let features = vec![anomaly(1, 100.0, 4)];
        // Feature 1 matched from runs 5 (2007) and 7 (2015); baseline 9.
        let matches = vec![matched_pair(job, 5, 1), matched_pair(job, 7, 1)];

        let report = refine(job, &features, &matches, &[5, 7, 9], &config());
        assert_eq!(report.multi_run_features, 1);
        let e = report
            .exceptions
            .iter()
            .find(|e| e.category == ExceptionCategory::MultiRunMatch)
            .expect("multi-run exception");
        assert_eq!(e.severity, ExceptionSeverity::Low);
        assert_eq!(e.details["primary_older_run"], 7);
        assert_eq!(e.details["secondary_older_runs"][0], 5);
    }
}
