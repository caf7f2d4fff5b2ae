//! Stage plan — the ordered stage list for one alignment job
//!
//! Each older-run / baseline pair contributes five stages; five global
//! stages follow. Stage names are stable identifiers for audit records
//! and the polling wire shape.

use crate::types::{StageState, StageStatus};

/// Per-pair stage kinds, in execution order.
pub const PAIR_STAGES: [&str; 5] = [
    "anchor_match",
    "distance_correction",
    "dtw_align",
    "icp_refine",
    "anomaly_match",
];

/// Global stage kinds, in execution order.
pub const GLOBAL_STAGES: [&str; 5] = [
    "run3_refinement",
    "standards_assessment",
    "interaction_graph",
    "visibility_scoring",
    "export",
];

/// Build the full stage-status skeleton for a job over `pair_years`
/// (older-run year per pair, oldest first).
pub fn build_plan(pair_years: &[i32]) -> Vec<StageStatus> {
    let mut plan = Vec::with_capacity(pair_years.len() * PAIR_STAGES.len() + GLOBAL_STAGES.len());
    let mut stage = 0usize;

    for year in pair_years {
        for kind in PAIR_STAGES {
            stage += 1;
            plan.push(StageStatus {
                stage,
                name: format!("{kind}[{year}]"),
                status: StageState::Pending,
                message: None,
                started_at: None,
                finished_at: None,
            });
        }
    }
    for kind in GLOBAL_STAGES {
        stage += 1;
        plan.push(StageStatus {
            stage,
            name: kind.to_string(),
            status: StageState::Pending,
            message: None,
            started_at: None,
            finished_at: None,
        });
    }
    plan
}
