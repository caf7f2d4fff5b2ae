//! System-wide default constants.
//!
//! Centralises the tunable values of the alignment pipeline. Grouped by
//! subsystem for easy discovery.

// ============================================================================
// DTW
// ============================================================================

/// Sakoe–Chiba band width as a fraction of the longer sequence.
pub const DTW_BAND_FRACTION: f64 = 0.25;

/// Local-cost ceiling (ft) for extracting 1:1 anchor mappings from the
/// warp path.
pub const DTW_ANCHOR_COST_CEILING_FT: f64 = 10.0;

// ============================================================================
// ICP
// ============================================================================

/// Maximum ICP iterations.
pub const ICP_MAX_ITERATIONS: usize = 20;

/// Convergence threshold on |Δ mean residual| (ft).
pub const ICP_CONVERGENCE_FT: f64 = 0.01;

/// Maximum correspondence distance (ft).
pub const ICP_MAX_CORRESPONDENCE_FT: f64 = 5.0;

/// Clock weighting in the 2-D metric (ft per clock hour).
pub const ICP_CLOCK_WEIGHT_FT_PER_HR: f64 = 2.5;

// ============================================================================
// Anchor matching
// ============================================================================

/// Joint-count delta at or above which a cutout/reset is declared.
pub const ANCHOR_RESET_JOINT_DELTA: i64 = 2;

/// Spacing drift (ft) above which a SEGMENT_DRIFT exception is emitted.
pub const ANCHOR_DRIFT_WARN_FT: f64 = 5.0;

/// Spacing drift (ft) above which the SEGMENT_DRIFT exception is HIGH.
pub const ANCHOR_DRIFT_HIGH_FT: f64 = 10.0;

// ============================================================================
// Matching
// ============================================================================

/// Minimum ensemble score for an assignment to be accepted as a match.
pub const MATCH_ACCEPT_SCORE: f64 = 25.0;

/// Top-two score gap below which a match is AMBIGUOUS.
pub const MATCH_AMBIGUITY_GAP: f64 = 10.0;

/// Sentinel cost used to pad rectangular Hungarian matrices.
pub const HUNGARIAN_SENTINEL: f64 = 1_000_000.0;

/// Floor on years between runs when computing growth rates.
pub const MIN_YEARS_BETWEEN: f64 = 0.01;

// ============================================================================
// Run-3 refinement
// ============================================================================

/// Neighborhood radius (ft) for duplicate / cluster detection.
pub const NEIGHBORHOOD_RADIUS_FT: f64 = 3.0;

/// Unmatched-neighbor count at or above which a dense cluster is flagged.
pub const CLUSTER_UNMATCHED_THRESHOLD: usize = 3;

/// Populated dimensional fields needed for an unmatched baseline anomaly
/// to stand as a true new anomaly.
pub const MIN_DATA_COMPLETENESS_FIELDS: usize = 2;

// ============================================================================
// Visibility
// ============================================================================

/// Composite score at or above which a feature renders fully.
pub const VISIBILITY_FULL_THRESHOLD: f64 = 70.0;

/// Composite score at or above which a feature renders dimmed.
pub const VISIBILITY_DIMMED_THRESHOLD: f64 = 40.0;

/// Spatial-reinforcement neighbor radius (ft).
pub const VISIBILITY_NEIGHBOR_RADIUS_FT: f64 = 10.0;

/// Visibility component weights (match confidence, temporal persistence,
/// spatial reinforcement, data completeness).
pub const VISIBILITY_WEIGHT_MATCH: f64 = 0.40;
pub const VISIBILITY_WEIGHT_TEMPORAL: f64 = 0.30;
pub const VISIBILITY_WEIGHT_SPATIAL: f64 = 0.15;
pub const VISIBILITY_WEIGHT_COMPLETENESS: f64 = 0.15;

// ============================================================================
// Interaction graph
// ============================================================================

/// Spatial-proximity edge radius (ft).
pub const PROXIMITY_RADIUS_FT: f64 = 10.0;

/// Approximate circumference per clock hour for common line pipe (in/hr).
pub const CIRCUMFERENCE_IN_PER_CLOCK_HR: f64 = 7.85;

/// Minimum chain length for a TEMPORAL_CHAIN.
pub const TEMPORAL_CHAIN_MIN_LEN: usize = 3;

// ============================================================================
// Persistence & external calls
// ============================================================================

/// Bulk persistence batch size.
pub const PERSIST_BATCH_SIZE: usize = 1000;

/// Canonicalization-oracle timeout (ms).
pub const ORACLE_TIMEOUT_MS: u64 = 5000;

/// Oracle retry attempts after the first failure.
pub const ORACLE_MAX_RETRIES: u32 = 2;

/// Augmentation readiness-probe cache lifetime (seconds).
pub const AUGMENT_READINESS_CACHE_SECS: u64 = 30;

// ============================================================================
// Ensemble weights (distance, clock, dimensional, type, dtw, icp, temporal)
// ============================================================================

pub const ENSEMBLE_WEIGHT_DISTANCE: f64 = 0.25;
pub const ENSEMBLE_WEIGHT_CLOCK: f64 = 0.15;
pub const ENSEMBLE_WEIGHT_DIMENSIONAL: f64 = 0.15;
pub const ENSEMBLE_WEIGHT_TYPE: f64 = 0.15;
pub const ENSEMBLE_WEIGHT_DTW: f64 = 0.10;
pub const ENSEMBLE_WEIGHT_ICP: f64 = 0.10;
pub const ENSEMBLE_WEIGHT_TEMPORAL: f64 = 0.10;
