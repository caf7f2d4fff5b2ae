//! Canonical export column order

/// Match-export columns, in canonical order. Flattened standards keys and
/// any other discovered keys follow, sorted lexicographically.
pub const MATCH_COLUMNS: [&str; 22] = [
    "job_id",
    "older_run_id",
    "newer_run_id",
    "older_run_year",
    "newer_run_year",
    "older_feature_id",
    "newer_feature_id",
    "event_type",
    "older_distance_ft",
    "newer_distance_ft",
    "distance_residual_ft",
    "clock_residual_hr",
    "type_compatibility",
    "dimensional_similarity",
    "confidence_score",
    "confidence_category",
    "match_category",
    "depth_growth_pct_per_year",
    "length_growth_in_per_year",
    "width_growth_in_per_year",
    "years_between",
    "competing_older_ids",
];

/// Feature/run/exception columns appended to the exceptions export after
/// the match columns.
pub const EXCEPTION_EXTRA_COLUMNS: [&str; 15] = [
    "feature_event_type",
    "feature_log_distance_ft",
    "feature_corrected_distance_ft",
    "feature_depth_percent",
    "feature_depth_in",
    "feature_length_in",
    "feature_width_in",
    "feature_joint_number",
    "run_year",
    "run_label",
    "run_vendor",
    "run_tool",
    "exception_category",
    "exception_severity",
    "exception_details",
];
