//! Piecewise-linear distance correction
//!
//! Consecutive anchors inside one reset block define linear interpolation
//! segments mapping older-run log distances onto the baseline axis. A
//! reset anchor terminates its block: no segment spans the discontinuity.
//! Features outside every segment take the nearest endpoint's offset.

use thiserror::Error;
use tracing::debug;

use crate::types::{AnchorPair, CorrectionSegment, Feature, FeatureId};

/// Correction errors. A negative corrected distance is an invariant
/// violation and fails the stage with the offending id.
#[derive(Debug, Error)]
pub enum CorrectionError {
    #[error("corrected distance for feature {feature_id} is negative ({corrected_ft} ft)")]
    NegativeCorrected {
        feature_id: FeatureId,
        corrected_ft: f64,
    },
}

/// The per-pair piecewise-linear model.
#[derive(Debug, Clone, Default)]
pub struct CorrectionModel {
    pub segments: Vec<CorrectionSegment>,
}

impl CorrectionModel {
    /// Offset to add to an older-run log distance.
    ///
    /// Inside a segment the offset interpolates linearly; outside all
    /// segments the nearest endpoint's offset applies.
    pub fn offset_at(&self, x: f64) -> f64 {
        if self.segments.is_empty() {
            return 0.0;
        }

        if let Some(segment) = self.segments.iter().find(|s| s.contains(x)) {
            return segment.offset_at(x);
        }

        // Outside every segment: nearest endpoint wins.
        let mut best = (f64::INFINITY, 0.0);
        for segment in &self.segments {
            for (edge, offset) in [(segment.x0, segment.offset0), (segment.x1, segment.offset1)] {
                let gap = (x - edge).abs();
                if gap < best.0 {
                    best = (gap, offset);
                }
            }
        }
        best.1
    }

    /// Corrected distance for an older-run log distance.
    pub fn correct(&self, x: f64) -> f64 {
        x + self.offset_at(x)
    }
}

/// Build interpolation segments from an accepted anchor list.
///
/// Anchors must already be strictly monotone in both axes. A pair whose
/// right anchor is a reset point produces no segment; the reset anchor
/// starts the next block.
pub fn build_segments(anchors: &[AnchorPair]) -> CorrectionModel {
    let mut segments = Vec::new();

    for window in anchors.windows(2) {
        let (left, right) = (&window[0], &window[1]);
        if right.is_reset_point {
            continue;
        }
        let x0 = left.older_distance_ft;
        let x1 = right.older_distance_ft;
        if x1 <= x0 {
            // Defensive: the monotonicity filter upstream forbids this.
            continue;
        }
        let offset0 = left.newer_distance_ft - left.older_distance_ft;
        let offset1 = right.newer_distance_ft - right.older_distance_ft;
        segments.push(CorrectionSegment {
            segment_index: segments.len(),
            x0,
            x1,
            offset0,
            offset1,
            slope: (offset1 - offset0) / (x1 - x0),
        });
    }

    debug!(
        anchors = anchors.len(),
        segments = segments.len(),
        "Correction model built"
    );
    CorrectionModel { segments }
}

/// Apply the model to older-run features, producing (feature id,
/// corrected distance) updates for bulk persistence.
pub fn apply_correction(
    features: &[Feature],
    model: &CorrectionModel,
) -> Result<Vec<(FeatureId, f64)>, CorrectionError> {
    let mut updates = Vec::with_capacity(features.len());
    for feature in features {
        let corrected = model.correct(feature.log_distance_ft);
        if corrected < 0.0 {
            return Err(CorrectionError::NegativeCorrected {
                feature_id: feature.id,
                corrected_ft: corrected,
            });
        }
        updates.push((feature.id, corrected));
    }
    Ok(updates)
}
