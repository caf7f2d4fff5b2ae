//! Girth-weld anchor matching between two runs
//!
//! Pairs the older run's welds with the newer run's, preferring same-joint
//! matches and otherwise targeting `older_distance + running median offset`.
//! Acceptance requires the newer distance to advance monotonically; a
//! second pass enforces strict monotonicity on both axes simultaneously.
//! Joint-count discontinuities mark cutout/resets, and spacing drift
//! between consecutive anchors raises SEGMENT_DRIFT exceptions.

use statrs::statistics::{Data, OrderStatistics};
use std::collections::HashSet;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::defaults::{
    ANCHOR_DRIFT_HIGH_FT, ANCHOR_DRIFT_WARN_FT, ANCHOR_RESET_JOINT_DELTA,
};
use crate::types::{
    AnchorPair, Exception, ExceptionCategory, ExceptionSeverity, Feature,
};

/// Anchor-matching output: the accepted pair list plus audit exceptions.
#[derive(Debug, Clone, Default)]
pub struct AnchorOutcome {
    pub anchors: Vec<AnchorPair>,
    pub exceptions: Vec<Exception>,
}

fn running_median(offsets: &[f64]) -> f64 {
    if offsets.is_empty() {
        return 0.0;
    }
    let mut data = Data::new(offsets.to_vec());
    data.median()
}

/// Candidate pair from the acceptance pass, prior to the monotonicity
/// filter.
struct Candidate {
    older_idx: usize,
    newer_idx: usize,
}

/// Match girth welds between an older and a newer run.
///
/// `older` and `newer` must be the runs' girth welds sorted ascending by
/// log distance. Returns an empty outcome when either side is empty.
pub fn match_anchors(job_id: Uuid, older: &[Feature], newer: &[Feature]) -> AnchorOutcome {
    if older.is_empty() || newer.is_empty() {
        debug!(
            older = older.len(),
            newer = newer.len(),
            "Anchor matching skipped: empty weld sequence"
        );
        return AnchorOutcome::default();
    }

    // --- acceptance pass --------------------------------------------------
    let mut accepted: Vec<Candidate> = Vec::new();
    let mut offsets: Vec<f64> = Vec::new();
    let mut used_newer: HashSet<usize> = HashSet::new();
    let mut prev_newer_dist = f64::NEG_INFINITY;

    for (older_idx, older_weld) in older.iter().enumerate() {
        let median = running_median(&offsets);
        let target = older_weld.log_distance_ft + median;

        // Preferred: the newer weld carrying the same joint number.
        let by_joint = older_weld.joint_number.and_then(|joint| {
            newer
                .iter()
                .enumerate()
                .find(|(i, n)| !used_newer.contains(i) && n.joint_number == Some(joint))
                .map(|(i, _)| i)
        });

        // Fallback: nearest unused newer weld to the drift-corrected target,
        // already constrained to advance past the last accepted distance.
        // A candidate whose joint number conflicts with the older weld's is
        // vetoed — it belongs to a different joint and stays available for
        // its own same-joint match.
        let by_target = || {
            newer
                .iter()
                .enumerate()
                .filter(|(i, n)| {
                    !used_newer.contains(i)
                        && n.log_distance_ft > prev_newer_dist
                        && match (older_weld.joint_number, n.joint_number) {
                            (Some(a), Some(b)) => a == b,
                            _ => true,
                        }
                })
                .min_by(|(_, a), (_, b)| {
                    (a.log_distance_ft - target)
                        .abs()
                        .total_cmp(&(b.log_distance_ft - target).abs())
                })
                .map(|(i, _)| i)
        };

        let Some(newer_idx) = by_joint.or_else(by_target) else {
            continue;
        };

        // Accept only while the newer axis advances.
        if newer[newer_idx].log_distance_ft <= prev_newer_dist {
            debug!(
                older_idx,
                newer_idx, "Anchor candidate rejected: newer distance does not advance"
            );
            continue;
        }

        prev_newer_dist = newer[newer_idx].log_distance_ft;
        offsets.push(newer[newer_idx].log_distance_ft - older_weld.log_distance_ft);
        used_newer.insert(newer_idx);
        accepted.push(Candidate {
            older_idx,
            newer_idx,
        });
    }

    // Reset/drift detection runs on the raw acceptance sequence, so an
    // anchor later dropped by the filter still leaves its exception behind.
    let mut exceptions = Vec::new();
    let mut reset_older_ids: HashSet<u64> = HashSet::new();
    detect_discontinuities(
        job_id,
        older,
        newer,
        &accepted,
        &mut exceptions,
        &mut reset_older_ids,
    );

    // --- strict both-axis monotonicity filter -----------------------------
    let mut anchors: Vec<AnchorPair> = Vec::new();
    let mut last_older = f64::NEG_INFINITY;
    let mut last_newer = f64::NEG_INFINITY;
    for candidate in &accepted {
        let o = &older[candidate.older_idx];
        let n = &newer[candidate.newer_idx];
        if o.log_distance_ft <= last_older || n.log_distance_ft <= last_newer {
            warn!(
                older_id = o.id,
                newer_id = n.id,
                "Anchor dropped by monotonicity filter"
            );
            continue;
        }
        last_older = o.log_distance_ft;
        last_newer = n.log_distance_ft;
        anchors.push(AnchorPair {
            older_feature_id: o.id,
            newer_feature_id: n.id,
            older_distance_ft: o.log_distance_ft,
            newer_distance_ft: n.log_distance_ft,
            older_joint: o.joint_number,
            newer_joint: n.joint_number,
            segment_index: anchors.len(),
            drift_ft: (n.log_distance_ft - o.log_distance_ft).abs(),
            is_reset_point: reset_older_ids.contains(&o.id),
        });
    }

    debug!(
        accepted = accepted.len(),
        kept = anchors.len(),
        exceptions = exceptions.len(),
        "Anchor matching complete"
    );

    AnchorOutcome {
        anchors,
        exceptions,
    }
}

/// Scan consecutive accepted pairs for joint cutouts and spacing drift.
fn detect_discontinuities(
    job_id: Uuid,
    older: &[Feature],
    newer: &[Feature],
    accepted: &[Candidate],
    exceptions: &mut Vec<Exception>,
    reset_older_ids: &mut HashSet<u64>,
) {
    for window in accepted.windows(2) {
        let (left, right) = (&window[0], &window[1]);
        let o_left = &older[left.older_idx];
        let o_right = &older[right.older_idx];
        let n_left = &newer[left.newer_idx];
        let n_right = &newer[right.newer_idx];

        // Joint cutout: the two runs skipped a different number of joints.
        if let (Some(jo_l), Some(jo_r), Some(jn_l), Some(jn_r)) = (
            o_left.joint_number,
            o_right.joint_number,
            n_left.joint_number,
            n_right.joint_number,
        ) {
            let delta_older = jo_r - jo_l;
            let delta_newer = jn_r - jn_l;
            if (delta_newer - delta_older).abs() >= ANCHOR_RESET_JOINT_DELTA {
                reset_older_ids.insert(o_right.id);
                exceptions.push(Exception::new(
                    job_id,
                    ExceptionCategory::CutoutReset,
                    ExceptionSeverity::Medium,
                    Some(o_right.id),
                    Some(o_right.run_id),
                    serde_json::json!({
                        "older_joint_delta": delta_older,
                        "newer_joint_delta": delta_newer,
                        "older_distance_ft": o_right.log_distance_ft,
                        "newer_distance_ft": n_right.log_distance_ft,
                    }),
                ));
            }
        }

        // Spacing drift between consecutive anchors, recorded as an
        // absolute value (negative drift is indistinguishable from
        // positive in the record).
        let spacing_older = (o_right.log_distance_ft - o_left.log_distance_ft).abs();
        let spacing_newer = (n_right.log_distance_ft - n_left.log_distance_ft).abs();
        let drift = (spacing_newer - spacing_older).abs();
        if drift > ANCHOR_DRIFT_WARN_FT {
            let severity = if drift > ANCHOR_DRIFT_HIGH_FT {
                ExceptionSeverity::High
            } else {
                ExceptionSeverity::Medium
            };
            exceptions.push(Exception::new(
                job_id,
                ExceptionCategory::SegmentDrift,
                severity,
                Some(o_right.id),
                Some(o_right.run_id),
                serde_json::json!({
                    "drift_ft": drift,
                    "older_spacing_ft": spacing_older,
                    "newer_spacing_ft": spacing_newer,
                }),
            ));
        }
    }
}
