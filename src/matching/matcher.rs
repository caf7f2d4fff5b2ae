//! Per-segment anomaly matching
//!
//! For each anchor-induced segment on the baseline axis, builds the full
//! older×newer ensemble score matrix, solves the min-cost assignment, and
//! turns accepted assignments into MatchedPairs with growth rates and
//! competing-candidate lists. Anomalies no assignment accepts become
//! UNMATCHED exceptions. Segments are processed in segment-index order;
//! matrix rows are scored in parallel (row order is preserved).

use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use tracing::info;
use uuid::Uuid;

use super::ensemble::{score, SignalInputs};
use super::hungarian;
use crate::augment;
use crate::config::defaults::{MATCH_ACCEPT_SCORE, MATCH_AMBIGUITY_GAP, MIN_YEARS_BETWEEN};
use crate::config::EnsembleWeights;
use crate::types::{
    AnchorPair, ConfidenceCategory, Exception, ExceptionCategory, ExceptionSeverity, Feature,
    FeatureId, GrowthRates, MatchCategory, MatchedPair, Run,
};

/// Matching context for one older/newer run pair.
pub struct MatchContext<'a> {
    pub job_id: Uuid,
    pub older_run: &'a Run,
    pub newer_run: &'a Run,
    pub weights: &'a EnsembleWeights,
    /// Pair-level DTW confidence, fed to every segment's ensemble
    pub dtw_confidence: Option<f64>,
    /// Per-segment ICP RMSE (ft), keyed by segment index
    pub icp_rmse_by_segment: HashMap<usize, f64>,
    /// Blend accepted scores through the ML augmentation provider
    pub enable_ml: bool,
}

/// Matching output for one run pair.
#[derive(Debug, Default)]
pub struct MatchOutcome {
    pub matches: Vec<MatchedPair>,
    pub exceptions: Vec<Exception>,
    pub segments_processed: usize,
    pub ensemble_calls: usize,
}

/// Years between the two runs' inspection dates, clamped to ≥ 0.01.
/// Falls back to the year labels when either date is missing.
fn years_between(older: &Run, newer: &Run) -> f64 {
    let years = match (older.inspection_date.date, newer.inspection_date.date) {
        (Some(o), Some(n)) => (n - o).num_days() as f64 / 365.25,
        _ => f64::from(newer.year - older.year),
    };
    years.max(MIN_YEARS_BETWEEN)
}

fn signal_inputs(older: &Feature, newer: &Feature, ctx: &MatchContext<'_>, segment: usize) -> SignalInputs {
    SignalInputs {
        distance_residual_ft: newer.aligned_distance_ft() - older.aligned_distance_ft(),
        older_clock: older.clock_decimal,
        newer_clock: newer.clock_decimal,
        older_type: older.event_type,
        newer_type: newer.event_type,
        older_depth_in: older.depth_in,
        newer_depth_in: newer.depth_in,
        older_length_in: older.length_in,
        newer_length_in: newer.length_in,
        older_width_in: older.width_in,
        newer_width_in: newer.width_in,
        dtw_confidence: ctx.dtw_confidence,
        icp_rmse: ctx.icp_rmse_by_segment.get(&segment).copied(),
        // Temporal chains are discovered after matching; the signal rides
        // on its neutral fallback here.
        observed_run_count: None,
        total_run_count: None,
    }
}

fn growth(older: &Feature, newer: &Feature, years: f64) -> GrowthRates {
    let delta = |o: Option<f64>, n: Option<f64>| match (o, n) {
        (Some(o), Some(n)) => Some((n - o) / years),
        _ => None,
    };
    GrowthRates {
        depth_pct_per_year: delta(older.depth_percent, newer.depth_percent),
        length_in_per_year: delta(older.length_in, newer.length_in),
        width_in_per_year: delta(older.width_in, newer.width_in),
        years_between: years,
    }
}

/// Match anomalies between one older run and the baseline run.
///
/// `older_anomalies` / `newer_anomalies` are the runs' non-reference
/// features; older ones must already carry corrected distances.
pub async fn match_anomalies(
    ctx: &MatchContext<'_>,
    anchors: &[AnchorPair],
    older_anomalies: &[Feature],
    newer_anomalies: &[Feature],
) -> MatchOutcome {
    let mut outcome = MatchOutcome::default();
    let years = years_between(ctx.older_run, ctx.newer_run);

    let mut matched_older: HashSet<FeatureId> = HashSet::new();
    let mut matched_newer: HashSet<FeatureId> = HashSet::new();

    for window in anchors.windows(2) {
        let segment = window[0].segment_index;
        let lo = window[0].newer_distance_ft;
        let hi = window[1].newer_distance_ft;

        let older_in: Vec<&Feature> = older_anomalies
            .iter()
            .filter(|f| {
                let d = f.aligned_distance_ft();
                lo <= d && d < hi
            })
            .collect();
        let newer_in: Vec<&Feature> = newer_anomalies
            .iter()
            .filter(|f| {
                let d = f.aligned_distance_ft();
                lo <= d && d < hi
            })
            .collect();

        if older_in.is_empty() || newer_in.is_empty() {
            continue;
        }
        outcome.segments_processed += 1;

        // Full score matrix, rows scored in parallel.
        let weights = ctx.weights;
        let scores: Vec<Vec<super::ensemble::EnsembleScore>> = older_in
            .par_iter()
            .map(|older| {
                newer_in
                    .iter()
                    .map(|newer| score(&signal_inputs(older, newer, ctx, segment), weights))
                    .collect()
            })
            .collect();
        outcome.ensemble_calls += older_in.len() * newer_in.len();

        // Candidate lists per newer anomaly: every older candidate at or
        // above the acceptance score, strongest first.
        let mut candidates: Vec<Vec<(usize, f64)>> = vec![Vec::new(); newer_in.len()];
        for (oi, row) in scores.iter().enumerate() {
            for (ni, s) in row.iter().enumerate() {
                if s.total >= MATCH_ACCEPT_SCORE {
                    candidates[ni].push((oi, s.total));
                }
            }
        }
        for list in &mut candidates {
            list.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        }

        // Min-cost assignment over cost = 100 − score.
        let cost: Vec<Vec<f64>> = scores
            .iter()
            .map(|row| row.iter().map(|s| 100.0 - s.total).collect())
            .collect();

        for (oi, ni, _cost) in hungarian::solve(&cost) {
            let ensemble = &scores[oi][ni];
            if ensemble.total < MATCH_ACCEPT_SCORE {
                continue;
            }
            let older = older_in[oi];
            let newer = newer_in[ni];
            let list = &candidates[ni];

            let category = if list.len() == 1 {
                MatchCategory::AutoMatched
            } else if list.len() >= 2 && (list[0].1 - list[1].1) < MATCH_AMBIGUITY_GAP {
                MatchCategory::Ambiguous
            } else {
                MatchCategory::BestMatch
            };

            let confidence = if ctx.enable_ml {
                augment::augment_pair_score(older, newer, ensemble.total).await
            } else {
                ensemble.total
            };

            let competing: Vec<FeatureId> = list
                .iter()
                .filter(|(i, _)| *i != oi)
                .map(|(i, _)| older_in[*i].id)
                .collect();

            matched_older.insert(older.id);
            matched_newer.insert(newer.id);

            emit_match_side_exceptions(&mut outcome.exceptions, ctx.job_id, older, newer, ensemble);

            outcome.matches.push(MatchedPair {
                job_id: ctx.job_id,
                older_feature_id: older.id,
                newer_feature_id: newer.id,
                older_run_id: ctx.older_run.id,
                newer_run_id: ctx.newer_run.id,
                distance_residual_ft: newer.aligned_distance_ft() - older.aligned_distance_ft(),
                clock_residual_hr: ensemble.clock_residual_hr,
                type_compatibility: ensemble.components.type_compat,
                dimensional_similarity: ensemble.components.dimensional,
                confidence_score: confidence,
                confidence_category: ConfidenceCategory::from_score(confidence),
                match_category: category,
                growth: growth(older, newer, years),
                competing_older_ids: competing,
                standards_applied: None,
            });
        }
    }

    // Every anomaly no assignment accepted is an UNMATCHED exception:
    // MEDIUM for the older run (a feature disappeared), LOW for the
    // baseline (a new feature appeared).
    for older in older_anomalies {
        if !matched_older.contains(&older.id) {
            outcome.exceptions.push(Exception::new(
                ctx.job_id,
                ExceptionCategory::Unmatched,
                ExceptionSeverity::Medium,
                Some(older.id),
                Some(older.run_id),
                serde_json::json!({
                    "side": "older",
                    "distance_ft": older.aligned_distance_ft(),
                    "event_type": older.event_type.as_str(),
                }),
            ));
        }
    }
    for newer in newer_anomalies {
        if !matched_newer.contains(&newer.id) {
            outcome.exceptions.push(Exception::new(
                ctx.job_id,
                ExceptionCategory::Unmatched,
                ExceptionSeverity::Low,
                Some(newer.id),
                Some(newer.run_id),
                serde_json::json!({
                    "side": "newer",
                    "distance_ft": newer.aligned_distance_ft(),
                    "event_type": newer.event_type.as_str(),
                }),
            ));
        }
    }

    info!(
        older_run = ctx.older_run.id,
        newer_run = ctx.newer_run.id,
        matches = outcome.matches.len(),
        exceptions = outcome.exceptions.len(),
        segments = outcome.segments_processed,
        "Anomaly matching complete"
    );
    outcome
}

/// Accepted matches can still warrant audit exceptions: missing clocks,
/// incompatible types, low confidence.
fn emit_match_side_exceptions(
    exceptions: &mut Vec<Exception>,
    job_id: Uuid,
    older: &Feature,
    newer: &Feature,
    ensemble: &super::ensemble::EnsembleScore,
) {
    if ensemble.clock_residual_hr.is_none() {
        exceptions.push(Exception::new(
            job_id,
            ExceptionCategory::ClockMissing,
            ExceptionSeverity::Low,
            Some(newer.id),
            Some(newer.run_id),
            serde_json::json!({
                "older_feature_id": older.id,
                "older_clock": older.clock_decimal,
                "newer_clock": newer.clock_decimal,
            }),
        ));
    }
    if ensemble.components.type_compat == 0.0 {
        exceptions.push(Exception::new(
            job_id,
            ExceptionCategory::TypeIncompatible,
            ExceptionSeverity::Medium,
            Some(newer.id),
            Some(newer.run_id),
            serde_json::json!({
                "older_type": older.event_type.as_str(),
                "newer_type": newer.event_type.as_str(),
            }),
        ));
    }
    if ensemble.category == ConfidenceCategory::Low {
        exceptions.push(Exception::new(
            job_id,
            ExceptionCategory::LowConfidence,
            ExceptionSeverity::Low,
            Some(newer.id),
            Some(newer.run_id),
            serde_json::json!({
                "older_feature_id": older.id,
                "score": ensemble.total,
            }),
        ));
    }
}
