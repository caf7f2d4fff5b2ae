//! Anchor pairs and piecewise-linear correction segments

use serde::{Deserialize, Serialize};

use super::FeatureId;

/// A matched girth-weld (or other reference) pair between an older and a
/// newer run.
///
/// Within an accepted list, both `older_distance_ft` and
/// `newer_distance_ft` are strictly increasing; a reset flag terminates the
/// current correction block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorPair {
    pub older_feature_id: FeatureId,
    pub newer_feature_id: FeatureId,
    /// Older-run log distance (ft)
    pub older_distance_ft: f64,
    /// Newer-run log distance (ft)
    pub newer_distance_ft: f64,
    pub older_joint: Option<i64>,
    pub newer_joint: Option<i64>,
    /// Monotone index assigned by output order
    pub segment_index: usize,
    /// |newer − older| (ft)
    pub drift_ft: f64,
    /// True when a joint cutout/reset terminates the block at this anchor
    pub is_reset_point: bool,
}

/// One element of a piecewise-linear distance correction.
///
/// Maps older-run distances `x ∈ [x0, x1]` to
/// `x + offset0 + (x − x0) · slope`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionSegment {
    pub segment_index: usize,
    /// Left edge on the older-run axis (ft); strictly less than `x1`
    pub x0: f64,
    /// Right edge on the older-run axis (ft)
    pub x1: f64,
    /// Offset at `x0` (ft)
    pub offset0: f64,
    /// Offset at `x1` (ft)
    pub offset1: f64,
    /// (offset1 − offset0) / (x1 − x0)
    pub slope: f64,
}

impl CorrectionSegment {
    /// Offset interpolated at older-run distance `x`, clamped to the
    /// segment's endpoints outside [x0, x1].
    pub fn offset_at(&self, x: f64) -> f64 {
        if x <= self.x0 {
            self.offset0
        } else if x >= self.x1 {
            self.offset1
        } else {
            self.offset0 + (x - self.x0) * self.slope
        }
    }

    /// True when `x` falls inside this segment's span.
    pub fn contains(&self, x: f64) -> bool {
        self.x0 <= x && x <= self.x1
    }
}
