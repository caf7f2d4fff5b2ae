//! Row flattening — nested records to flat string maps
//!
//! Nested `standards_applied` blocks flatten to dot-delimited keys;
//! arrays join with `';'`. Numbers print through the shortest f64 form so
//! repeated exports are byte-identical.

use std::collections::{BTreeMap, HashMap};

use crate::types::{Exception, Feature, FeatureId, MatchedPair, Run, RunId};

/// Flatten a JSON value into `out` under `prefix`.
///
/// Objects recurse with dot-delimited keys; arrays become `';'`-joined
/// strings; scalars stringify bare (no JSON quoting).
pub fn flatten_json(prefix: &str, value: &serde_json::Value, out: &mut BTreeMap<String, String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                let child_key = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_json(&child_key, child, out);
            }
        }
        serde_json::Value::Array(items) => {
            let joined = items
                .iter()
                .map(scalar_to_string)
                .collect::<Vec<_>>()
                .join(";");
            out.insert(prefix.to_string(), joined);
        }
        other => {
            out.insert(prefix.to_string(), scalar_to_string(other));
        }
    }
}

fn scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn opt(value: Option<f64>) -> String {
    value.map(|v| format!("{v}")).unwrap_or_default()
}

/// One match as a flat column → value map.
pub fn match_row(
    pair: &MatchedPair,
    features: &HashMap<FeatureId, Feature>,
    runs: &HashMap<RunId, Run>,
) -> BTreeMap<String, String> {
    let mut row = BTreeMap::new();
    let older = features.get(&pair.older_feature_id);
    let newer = features.get(&pair.newer_feature_id);

    row.insert("job_id".into(), pair.job_id.to_string());
    row.insert("older_run_id".into(), pair.older_run_id.to_string());
    row.insert("newer_run_id".into(), pair.newer_run_id.to_string());
    row.insert(
        "older_run_year".into(),
        runs.get(&pair.older_run_id)
            .map(|r| r.year.to_string())
            .unwrap_or_default(),
    );
    row.insert(
        "newer_run_year".into(),
        runs.get(&pair.newer_run_id)
            .map(|r| r.year.to_string())
            .unwrap_or_default(),
    );
    row.insert("older_feature_id".into(), pair.older_feature_id.to_string());
    row.insert("newer_feature_id".into(), pair.newer_feature_id.to_string());
    row.insert(
        "event_type".into(),
        newer
            .map(|f| f.event_type.as_str().to_string())
            .unwrap_or_default(),
    );
    row.insert(
        "older_distance_ft".into(),
        older.map(|f| format!("{}", f.aligned_distance_ft())).unwrap_or_default(),
    );
    row.insert(
        "newer_distance_ft".into(),
        newer.map(|f| format!("{}", f.aligned_distance_ft())).unwrap_or_default(),
    );
    row.insert(
        "distance_residual_ft".into(),
        format!("{}", pair.distance_residual_ft),
    );
    row.insert("clock_residual_hr".into(), opt(pair.clock_residual_hr));
    row.insert(
        "type_compatibility".into(),
        format!("{}", pair.type_compatibility),
    );
    row.insert(
        "dimensional_similarity".into(),
        format!("{}", pair.dimensional_similarity),
    );
    row.insert(
        "confidence_score".into(),
        format!("{}", pair.confidence_score),
    );
    row.insert(
        "confidence_category".into(),
        pair.confidence_category.as_str().into(),
    );
    row.insert("match_category".into(), pair.match_category.as_str().into());
    row.insert(
        "depth_growth_pct_per_year".into(),
        opt(pair.growth.depth_pct_per_year),
    );
    row.insert(
        "length_growth_in_per_year".into(),
        opt(pair.growth.length_in_per_year),
    );
    row.insert(
        "width_growth_in_per_year".into(),
        opt(pair.growth.width_in_per_year),
    );
    row.insert("years_between".into(), format!("{}", pair.growth.years_between));
    row.insert(
        "competing_older_ids".into(),
        pair.competing_older_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(";"),
    );

    if let Some(standards) = &pair.standards_applied {
        if let Ok(value) = serde_json::to_value(standards) {
            flatten_json("standards_applied", &value, &mut row);
        }
    }

    row
}

/// One exception as a flat column → value map: the match columns (mostly
/// empty), feature enrichment, run context, and the exception fields.
pub fn exception_row(
    exception: &Exception,
    features: &HashMap<FeatureId, Feature>,
    runs: &HashMap<RunId, Run>,
) -> BTreeMap<String, String> {
    let mut row = BTreeMap::new();
    row.insert("job_id".into(), exception.job_id.to_string());

    let feature = exception.feature_id.and_then(|id| features.get(&id));
    if let Some(feature) = feature {
        row.insert("feature_event_type".into(), feature.event_type.as_str().into());
        row.insert(
            "feature_log_distance_ft".into(),
            format!("{}", feature.log_distance_ft),
        );
        row.insert(
            "feature_corrected_distance_ft".into(),
            opt(feature.corrected_distance_ft),
        );
        row.insert("feature_depth_percent".into(), opt(feature.depth_percent));
        row.insert("feature_depth_in".into(), opt(feature.depth_in));
        row.insert("feature_length_in".into(), opt(feature.length_in));
        row.insert("feature_width_in".into(), opt(feature.width_in));
        row.insert(
            "feature_joint_number".into(),
            feature
                .joint_number
                .map(|j| j.to_string())
                .unwrap_or_default(),
        );
    }

    if let Some(run) = exception.run_id.and_then(|id| runs.get(&id)) {
        row.insert("run_year".into(), run.year.to_string());
        row.insert("run_label".into(), run.label.clone());
        row.insert("run_vendor".into(), run.vendor.clone());
        row.insert("run_tool".into(), run.tool_type.as_str().into());
    }

    row.insert(
        "exception_category".into(),
        exception.category.as_str().into(),
    );
    row.insert(
        "exception_severity".into(),
        exception.severity.as_str().into(),
    );
    row.insert("exception_details".into(), exception.details.to_string());

    row
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_objects_flatten_with_dots() {
        let value = serde_json::json!({
            "asme_b31_8s": { "severity": "IMMEDIATE", "remaining_life_years": null },
            "api_1163": { "adjustment": 11.0 }
        });
        let mut out = BTreeMap::new();
        flatten_json("standards_applied", &value, &mut out);
        assert_eq!(
            out.get("standards_applied.asme_b31_8s.severity"),
            Some(&"IMMEDIATE".to_string())
        );
        assert_eq!(
            out.get("standards_applied.api_1163.adjustment"),
            Some(&"11.0".to_string())
        );
        assert_eq!(
            out.get("standards_applied.asme_b31_8s.remaining_life_years"),
            Some(&String::new())
        );
    }

    #[test]
    fn arrays_join_with_semicolons() {
        let value = serde_json::json!({ "methodology": ["dtw", "icp", "ensemble"] });
        let mut out = BTreeMap::new();
        flatten_json("", &value, &mut out);
        assert_eq!(out.get("methodology"), Some(&"dtw;icp;ensemble".to_string()));
    }

    #[test]
    fn strings_are_unquoted_scalars() {
        let mut out = BTreeMap::new();
        flatten_json("k", &serde_json::json!("METAL_LOSS"), &mut out);
        assert_eq!(out.get("k"), Some(&"METAL_LOSS".to_string()));
    }
}
