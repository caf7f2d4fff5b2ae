//! Standards engine — ASME B31.8S, API 1163, NACE SP0502, PHMSA
//!
//! Attaches a `standards_applied` block to every matched pair and builds
//! the job-level PHMSA compliance record. Standards output never touches
//! `confidence_score`, `match_category`, or existing exception lists — it
//! only adds its own assessment exceptions (IMMEDIATE_SEVERITY,
//! ACCELERATED_GROWTH; interaction-zone exceptions come from the graph
//! stage).

pub mod api1163;
pub mod asme;
pub mod nace;
pub mod phmsa;

use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use crate::types::{
    Exception, ExceptionCategory, ExceptionSeverity, Feature, FeatureId, InteractionCluster,
    MatchedPair, PhmsaRecord, Run, RunId, StandardsApplied, Severity,
};

/// Standards-stage output: per-match standards blocks, assessment
/// exceptions, and the compliance record.
#[derive(Debug)]
pub struct StandardsOutcome {
    /// (older feature id, newer feature id, standards block)
    pub updates: Vec<(FeatureId, FeatureId, StandardsApplied)>,
    pub exceptions: Vec<Exception>,
    pub phmsa: PhmsaRecord,
}

/// Assess every match of a job.
///
/// `baseline_clusters` carries the interaction-zone combinations of the
/// baseline run (computed with the graph module's pure detector) so depth
/// assessment can use combined depths.
pub fn assess_job(
    job_id: Uuid,
    matches: &[MatchedPair],
    features: &HashMap<FeatureId, Feature>,
    runs: &HashMap<RunId, Run>,
    baseline_clusters: &[InteractionCluster],
    methodology: Vec<String>,
) -> StandardsOutcome {
    // Feature id → combined zone depth for the baseline run.
    let zone_depth: HashMap<FeatureId, f64> = baseline_clusters
        .iter()
        .flat_map(|c| c.members.iter().map(|id| (*id, c.combined_depth_pct)))
        .collect();

    let mut updates = Vec::with_capacity(matches.len());
    let mut exceptions = Vec::new();

    for pair in matches {
        let newer = features.get(&pair.newer_feature_id);
        let older = features.get(&pair.older_feature_id);
        let Some(newer) = newer else {
            continue;
        };

        let tool = runs
            .get(&pair.newer_run_id)
            .map(|r| r.tool_type)
            .unwrap_or_default();

        // ASME severity needs a corrosion-class anomaly with a depth.
        let asme = newer
            .event_type
            .is_corrosion()
            .then(|| newer.depth_percent)
            .flatten()
            .map(|depth| {
                asme::assess(
                    newer.event_type,
                    depth,
                    newer.length_in,
                    pair.growth.depth_pct_per_year,
                    zone_depth.get(&newer.id).copied(),
                )
            });

        if let Some(asme) = &asme {
            if asme.severity == Severity::Immediate {
                exceptions.push(Exception::new(
                    job_id,
                    ExceptionCategory::ImmediateSeverity,
                    ExceptionSeverity::High,
                    Some(newer.id),
                    Some(newer.run_id),
                    serde_json::json!({
                        "depth_used_pct": asme.depth_used_pct,
                        "combined_in_zone": asme.combined_in_zone,
                        "repair": asme.repair.as_str(),
                    }),
                ));
            }
            if asme.accelerated_growth {
                exceptions.push(Exception::new(
                    job_id,
                    ExceptionCategory::AcceleratedGrowth,
                    ExceptionSeverity::Medium,
                    Some(newer.id),
                    Some(newer.run_id),
                    serde_json::json!({
                        "remaining_life_years": asme.remaining_life_years,
                        "growth_pct_per_year": pair.growth.depth_pct_per_year,
                    }),
                ));
            }
        }

        let depth_diff = match (older.and_then(|o| o.depth_percent), newer.depth_percent) {
            (Some(o), Some(n)) => Some(n - o),
            _ => None,
        };
        let api_1163 = api1163::assess(tool, pair, depth_diff);

        let nace_sp0502 = newer
            .event_type
            .is_corrosion()
            .then(|| nace::classify(pair.growth.depth_pct_per_year));

        updates.push((
            pair.older_feature_id,
            pair.newer_feature_id,
            StandardsApplied {
                asme_b31_8s: asme,
                api_1163,
                nace_sp0502,
            },
        ));
    }

    let run_list: Vec<Run> = {
        let mut list: Vec<Run> = runs.values().cloned().collect();
        list.sort_by_key(|r| (r.year, r.id));
        list
    };
    let phmsa = phmsa::build_record(&run_list, matches, methodology);

    info!(
        assessed = updates.len(),
        exceptions = exceptions.len(),
        audit_ready = phmsa.audit_ready,
        "Standards assessment complete"
    );

    StandardsOutcome {
        updates,
        exceptions,
        phmsa,
    }
}
