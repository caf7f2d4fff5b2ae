//! Iterative Closest Point refinement within a weld-to-weld segment
//!
//! Translation-only ICP over 2-D anomaly clouds (corrected distance,
//! clock hours). Clock values near the 0/12 boundary are unwrapped first;
//! the clock axis is weighted at 2.5 ft per hour in the correspondence
//! metric. Rotation and scaling are never applied.

use tracing::debug;

use crate::config::defaults::ICP_CLOCK_WEIGHT_FT_PER_HR;
use crate::config::IcpConfig;
use crate::types::FeatureId;

/// One point of an anomaly cloud.
#[derive(Debug, Clone, Copy)]
pub struct IcpPoint {
    pub feature_id: FeatureId,
    pub distance_ft: f64,
    /// Decimal clock hours; points without a clock participate on the
    /// distance axis only
    pub clock_hr: Option<f64>,
}

/// One iteration's log entry.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct IcpIteration {
    pub iteration: usize,
    pub correspondences: usize,
    pub mean_residual_ft: f64,
    pub delta_distance_ft: f64,
    pub delta_clock_hr: f64,
}

/// ICP output for one segment.
#[derive(Debug, Clone)]
pub struct IcpResult {
    /// Total translation applied to the source cloud (ft, clock hours)
    pub translation_ft: f64,
    pub translation_clock_hr: f64,
    pub iterations: Vec<IcpIteration>,
    /// Final correspondences (source id, target id, residual ft)
    pub correspondences: Vec<(FeatureId, FeatureId, f64)>,
    pub rmse: f64,
    pub converged: bool,
    /// 100 · exp(−RMSE/3)
    pub confidence: f64,
}

impl IcpResult {
    fn identity() -> Self {
        Self {
            translation_ft: 0.0,
            translation_clock_hr: 0.0,
            iterations: Vec::new(),
            correspondences: Vec::new(),
            rmse: 0.0,
            converged: false,
            confidence: 0.0,
        }
    }
}

/// Unwrap clocks when the cloud straddles the 0/12 boundary: if more than
/// 30% of clocked points sit near the boundary (< 2 or > 10), points past
/// 6 shift down by 12 so the cloud is contiguous.
fn unwrap_clocks(points: &mut [IcpPoint]) {
    let clocked: Vec<f64> = points.iter().filter_map(|p| p.clock_hr).collect();
    if clocked.is_empty() {
        return;
    }
    let near_boundary = clocked.iter().filter(|&&c| c < 2.0 || c > 10.0).count();
    if (near_boundary as f64) / (clocked.len() as f64) > 0.3 {
        for p in points.iter_mut() {
            if let Some(c) = p.clock_hr {
                if c > 6.0 {
                    p.clock_hr = Some(c - 12.0);
                }
            }
        }
    }
}

/// Weighted squared distance between two points. Clockless pairs compare
/// on the distance axis alone.
fn metric_sq(a: &IcpPoint, b: &IcpPoint) -> f64 {
    let dx = a.distance_ft - b.distance_ft;
    let dy = match (a.clock_hr, b.clock_hr) {
        (Some(ca), Some(cb)) => (ca - cb) * ICP_CLOCK_WEIGHT_FT_PER_HR,
        _ => 0.0,
    };
    dx * dx + dy * dy
}

/// Refine the source cloud against the target cloud.
///
/// Returns the identity result when either cloud is empty.
pub fn refine_segment(source: &[IcpPoint], target: &[IcpPoint], config: &IcpConfig) -> IcpResult {
    if source.is_empty() || target.is_empty() {
        return IcpResult::identity();
    }

    let mut moved: Vec<IcpPoint> = source.to_vec();
    let mut fixed: Vec<IcpPoint> = target.to_vec();
    unwrap_clocks(&mut moved);
    unwrap_clocks(&mut fixed);

    let max_corr_sq = config.max_correspondence_ft * config.max_correspondence_ft;
    let mut translation_ft = 0.0;
    let mut translation_clock_hr = 0.0;
    let mut iterations = Vec::new();
    let mut prev_mean_residual = f64::INFINITY;
    let mut converged = false;

    for iteration in 0..config.max_iterations {
        // Closest target per source point, gated by the correspondence
        // radius.
        let pairs: Vec<(usize, usize)> = moved
            .iter()
            .enumerate()
            .filter_map(|(si, s)| {
                fixed
                    .iter()
                    .enumerate()
                    .map(|(ti, t)| (ti, metric_sq(s, t)))
                    .min_by(|(_, a), (_, b)| a.total_cmp(b))
                    .filter(|(_, d2)| *d2 <= max_corr_sq)
                    .map(|(ti, _)| (si, ti))
            })
            .collect();

        if pairs.is_empty() {
            break;
        }

        // Centroid translation.
        let dx = pairs
            .iter()
            .map(|&(si, ti)| fixed[ti].distance_ft - moved[si].distance_ft)
            .sum::<f64>()
            / pairs.len() as f64;
        let clock_deltas: Vec<f64> = pairs
            .iter()
            .filter_map(|&(si, ti)| match (moved[si].clock_hr, fixed[ti].clock_hr) {
                (Some(cs), Some(ct)) => Some(ct - cs),
                _ => None,
            })
            .collect();
        let dy = if clock_deltas.is_empty() {
            0.0
        } else {
            clock_deltas.iter().sum::<f64>() / clock_deltas.len() as f64
        };

        for p in moved.iter_mut() {
            p.distance_ft += dx;
            if let Some(c) = p.clock_hr {
                p.clock_hr = Some(c + dy);
            }
        }
        translation_ft += dx;
        translation_clock_hr += dy;

        let mean_residual = pairs
            .iter()
            .map(|&(si, ti)| metric_sq(&moved[si], &fixed[ti]).sqrt())
            .sum::<f64>()
            / pairs.len() as f64;

        iterations.push(IcpIteration {
            iteration,
            correspondences: pairs.len(),
            mean_residual_ft: mean_residual,
            delta_distance_ft: dx,
            delta_clock_hr: dy,
        });

        if (prev_mean_residual - mean_residual).abs() < config.convergence_ft {
            converged = true;
            break;
        }
        prev_mean_residual = mean_residual;
    }

    // Final correspondences and RMSE from the settled cloud.
    let mut correspondences = Vec::new();
    let mut sq_sum = 0.0;
    for s in &moved {
        if let Some((t, d2)) = fixed
            .iter()
            .map(|t| (t, metric_sq(s, t)))
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .filter(|(_, d2)| *d2 <= max_corr_sq)
        {
            correspondences.push((s.feature_id, t.feature_id, d2.sqrt()));
            sq_sum += d2;
        }
    }
    let rmse = if correspondences.is_empty() {
        0.0
    } else {
        (sq_sum / correspondences.len() as f64).sqrt()
    };
    let confidence = if correspondences.is_empty() {
        0.0
    } else {
        100.0 * (-rmse / 3.0).exp()
    };

    debug!(
        iterations = iterations.len(),
        converged,
        rmse,
        translation_ft,
        translation_clock_hr,
        "ICP refinement complete"
    );

    IcpResult {
        translation_ft,
        translation_clock_hr,
        iterations,
        correspondences,
        rmse,
        converged,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: u64, dist: f64, clock: Option<f64>) -> IcpPoint {
        IcpPoint {
            feature_id: id,
            distance_ft: dist,
            clock_hr: clock,
        }
    }

    fn config() -> IcpConfig {
        IcpConfig::default()
    }

    #[test]
    fn empty_clouds_return_identity() {
        let r = refine_segment(&[], &[point(1, 0.0, None)], &config());
        assert_eq!(r.translation_ft, 0.0);
        assert_eq!(r.translation_clock_hr, 0.0);
        assert!(!r.converged);
        let r = refine_segment(&[point(1, 0.0, None)], &[], &config());
        assert_eq!(r.translation_ft, 0.0);
    }

    #[test]
    fn constant_shift_is_recovered() {
        // Source sits 2 ft behind the target everywhere.
        let source: Vec<IcpPoint> = (0..5)
            .map(|i| point(i, i as f64 * 10.0, Some(6.0)))
            .collect();
        let target: Vec<IcpPoint> = (0..5)
            .map(|i| point(100 + i, i as f64 * 10.0 + 2.0, Some(6.0)))
            .collect();

        let r = refine_segment(&source, &target, &config());
        assert!(r.converged);
        assert!((r.translation_ft - 2.0).abs() < 0.05);
        assert!(r.translation_clock_hr.abs() < 1e-9);
        assert!(r.rmse < 0.05);
        assert!(r.confidence > 95.0);
        assert_eq!(r.correspondences.len(), 5);
    }

    #[test]
    fn clock_shift_is_recovered_in_hours() {
        let source: Vec<IcpPoint> = (0..4)
            .map(|i| point(i, i as f64 * 20.0, Some(5.0)))
            .collect();
        let target: Vec<IcpPoint> = (0..4)
            .map(|i| point(100 + i, i as f64 * 20.0, Some(6.0)))
            .collect();

        let r = refine_segment(&source, &target, &config());
        assert!(r.converged);
        assert!((r.translation_clock_hr - 1.0).abs() < 0.05);
        assert!(r.translation_ft.abs() < 0.05);
    }

    #[test]
    fn boundary_clocks_unwrap_before_matching() {
        // Clouds straddling 12 o'clock: clocks {11.5, 0.5} ≈ the same spot.
        let mut pts = vec![point(1, 0.0, Some(11.5)), point(2, 10.0, Some(0.5))];
        unwrap_clocks(&mut pts);
        // 100% near boundary → 11.5 becomes −0.5
        assert_eq!(pts[0].clock_hr, Some(-0.5));
        assert_eq!(pts[1].clock_hr, Some(0.5));
    }

    #[test]
    fn interior_cloud_is_left_wrapped() {
        let mut pts = vec![
            point(1, 0.0, Some(5.0)),
            point(2, 10.0, Some(6.5)),
            point(3, 20.0, Some(7.0)),
        ];
        unwrap_clocks(&mut pts);
        assert_eq!(pts[1].clock_hr, Some(6.5));
    }

    #[test]
    fn far_points_are_not_corresponded() {
        // Target 50 ft away: outside the 5 ft gate, no correspondences.
        let r = refine_segment(
            &[point(1, 0.0, None)],
            &[point(2, 50.0, None)],
            &config(),
        );
        assert!(r.correspondences.is_empty());
        assert_eq!(r.translation_ft, 0.0);
        assert_eq!(r.confidence, 0.0);
    }

    #[test]
    fn rotation_is_never_applied() {
        // A cloud with structure: pure translation cannot reduce this
        // residual to zero, and the output only ever reports translation.
        let source = vec![point(1, 0.0, Some(3.0)), point(2, 4.0, Some(9.0))];
        let target = vec![point(3, 0.0, Some(9.0)), point(4, 4.0, Some(3.0))];
        let r = refine_segment(&source, &target, &config());
        // Whatever happened, the only degrees of freedom are two offsets.
        assert!(r.iterations.iter().all(|it| it.correspondences <= 2));
    }
}
