//! Dynamic Time Warping over reference-point spacing sequences
//!
//! Aligns the joint-spacing profiles of two runs under a Sakoe–Chiba band.
//! Costs are absolute spacing differences; the warp path, its normalized
//! cost, a per-step drift profile, and a confidence score come back
//! together with conservative 1:1 anchor mappings extracted from cheap
//! diagonal steps.

use tracing::debug;

use crate::config::defaults::DTW_ANCHOR_COST_CEILING_FT;

/// DTW output for one run pair.
#[derive(Debug, Clone)]
pub struct DtwResult {
    /// Warp path over spacing indices, (older, newer), start to end
    pub path: Vec<(usize, usize)>,
    pub total_cost: f64,
    /// Total cost divided by path length
    pub normalized_cost: f64,
    /// Per-step difference of mapped original distances (older − newer)
    pub drift_profile: Vec<f64>,
    /// 100 · exp(−normalized/3)
    pub confidence: f64,
    /// Conservative 1:1 spacing-index mappings from cheap diagonal steps
    pub anchor_mappings: Vec<(usize, usize)>,
}

impl DtwResult {
    fn empty(confidence: f64) -> Self {
        Self {
            path: Vec::new(),
            total_cost: 0.0,
            normalized_cost: 0.0,
            drift_profile: Vec::new(),
            confidence,
            anchor_mappings: Vec::new(),
        }
    }
}

fn spacings(distances: &[f64]) -> Vec<f64> {
    distances.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Align the spacing sequences of two sorted reference-point distance
/// lists.
///
/// Degenerate inputs recover in place: two empty sequences align
/// perfectly (confidence 100), a single empty side cannot align at all
/// (confidence 0).
pub fn align_spacings(older_dists: &[f64], newer_dists: &[f64], band_fraction: f64) -> DtwResult {
    let a = spacings(older_dists);
    let b = spacings(newer_dists);
    let (n, m) = (a.len(), b.len());

    if n == 0 && m == 0 {
        return DtwResult::empty(100.0);
    }
    if n == 0 || m == 0 {
        return DtwResult::empty(0.0);
    }

    // Sakoe–Chiba band, widened to keep the end cell reachable when the
    // sequences differ in length.
    let band = ((n.max(m) as f64) * band_fraction).ceil() as usize;
    let band = band.max(n.abs_diff(m));
    let in_band = |i: usize, j: usize| i.abs_diff(j) <= band;

    let cost = |i: usize, j: usize| (a[i] - b[j]).abs();

    let mut dp = vec![vec![f64::INFINITY; m]; n];
    dp[0][0] = cost(0, 0);
    for i in 0..n {
        for j in 0..m {
            if (i, j) == (0, 0) || !in_band(i, j) {
                continue;
            }
            let mut best = f64::INFINITY;
            if i > 0 && j > 0 {
                best = best.min(dp[i - 1][j - 1]);
            }
            if i > 0 {
                best = best.min(dp[i - 1][j]);
            }
            if j > 0 {
                best = best.min(dp[i][j - 1]);
            }
            if best.is_finite() {
                dp[i][j] = cost(i, j) + best;
            }
        }
    }

    // Backtrack, ties broken diag < up < left.
    let mut path = vec![(n - 1, m - 1)];
    let (mut i, mut j) = (n - 1, m - 1);
    while i > 0 || j > 0 {
        let diag = if i > 0 && j > 0 {
            dp[i - 1][j - 1]
        } else {
            f64::INFINITY
        };
        let up = if i > 0 { dp[i - 1][j] } else { f64::INFINITY };
        let left = if j > 0 { dp[i][j - 1] } else { f64::INFINITY };

        if diag <= up && diag <= left {
            i -= 1;
            j -= 1;
        } else if up <= left {
            i -= 1;
        } else {
            j -= 1;
        }
        path.push((i, j));
    }
    path.reverse();

    let total_cost = dp[n - 1][m - 1];
    let normalized_cost = total_cost / path.len() as f64;
    let confidence = 100.0 * (-normalized_cost / 3.0).exp();

    // Drift profile: difference of the original distances each step maps
    // together (right endpoint of each spacing).
    let drift_profile: Vec<f64> = path
        .iter()
        .map(|&(i, j)| older_dists[i + 1] - newer_dists[j + 1])
        .collect();

    let anchor_mappings = extract_anchor_mappings(&path, &a, &b);

    debug!(
        n,
        m,
        band,
        total_cost,
        normalized_cost,
        confidence,
        "DTW alignment complete"
    );

    DtwResult {
        path,
        total_cost,
        normalized_cost,
        drift_profile,
        confidence,
        anchor_mappings,
    }
}

/// Take diagonal steps whose local cost is at most the ceiling and whose
/// indices are both unused; (0, 0) is included whenever still unused.
fn extract_anchor_mappings(path: &[(usize, usize)], a: &[f64], b: &[f64]) -> Vec<(usize, usize)> {
    let mut used_i = vec![false; a.len()];
    let mut used_j = vec![false; b.len()];
    let mut mappings = Vec::new();

    if let Some(&(0, 0)) = path.first() {
        if (a[0] - b[0]).abs() <= DTW_ANCHOR_COST_CEILING_FT {
            used_i[0] = true;
            used_j[0] = true;
            mappings.push((0, 0));
        }
    }

    for window in path.windows(2) {
        let (pi, pj) = window[0];
        let (i, j) = window[1];
        let diagonal = i == pi + 1 && j == pj + 1;
        if !diagonal || used_i[i] || used_j[j] {
            continue;
        }
        if (a[i] - b[j]).abs() <= DTW_ANCHOR_COST_CEILING_FT {
            used_i[i] = true;
            used_j[j] = true;
            mappings.push((i, j));
        }
    }

    mappings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_empty_aligns_perfectly() {
        let r = align_spacings(&[], &[], 0.25);
        assert_eq!(r.confidence, 100.0);
        assert!(r.path.is_empty());
    }

    #[test]
    fn one_empty_cannot_align() {
        let r = align_spacings(&[0.0, 10.0, 20.0], &[], 0.25);
        assert_eq!(r.confidence, 0.0);
        let r = align_spacings(&[0.0], &[0.0, 10.0], 0.25);
        assert_eq!(r.confidence, 0.0);
    }

    #[test]
    fn identical_sequences_cost_nothing() {
        let dists = [0.0, 40.0, 80.0, 120.0];
        let r = align_spacings(&dists, &dists, 0.25);
        assert_eq!(r.total_cost, 0.0);
        assert_eq!(r.confidence, 100.0);
        // Pure diagonal path
        assert_eq!(r.path, vec![(0, 0), (1, 1), (2, 2)]);
        assert!(r.drift_profile.iter().all(|d| d.abs() < 1e-12));
    }

    #[test]
    fn stretch_scenario_matches_reference_numbers() {
        // Older spacings [10,10,10,10]; newer [10,15,10,5].
        let older = [0.0, 10.0, 20.0, 30.0, 40.0];
        let newer = [0.0, 10.0, 25.0, 35.0, 40.0];
        let r = align_spacings(&older, &newer, 0.25);

        // Diagonal path: |0| + |5| + |0| + |5| = 10 over 4 steps
        assert!((r.total_cost - 10.0).abs() < 1e-9);
        assert_eq!(r.path.len(), 4);
        assert!((r.normalized_cost - 2.5).abs() < 1e-9);
        // 100·exp(−2.5/3) ≈ 43.46
        assert!((r.confidence - 43.46).abs() < 0.05);
    }

    #[test]
    fn anchor_mappings_are_one_to_one_and_cheap() {
        let older = [0.0, 10.0, 20.0, 30.0, 40.0];
        let newer = [0.0, 10.0, 25.0, 35.0, 40.0];
        let r = align_spacings(&older, &newer, 0.25);

        // All diagonal steps cost ≤ 10 here, so all four map, (0,0) first.
        assert_eq!(r.anchor_mappings.first(), Some(&(0, 0)));
        let mut seen_i = std::collections::HashSet::new();
        let mut seen_j = std::collections::HashSet::new();
        for &(i, j) in &r.anchor_mappings {
            assert!(seen_i.insert(i), "duplicate older index {i}");
            assert!(seen_j.insert(j), "duplicate newer index {j}");
        }
    }

    #[test]
    fn expensive_diagonal_steps_are_not_anchors() {
        // Second spacing differs by 60 ft — never an anchor.
        let older = [0.0, 10.0, 20.0];
        let newer = [0.0, 10.0, 80.0];
        let r = align_spacings(&older, &newer, 1.0);
        assert!(r.anchor_mappings.iter().all(|&(i, j)| (i, j) == (0, 0)));
    }

    #[test]
    fn band_excludes_far_cells_but_end_is_reachable() {
        let older = [0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0];
        let newer = [0.0, 10.0, 20.0];
        let r = align_spacings(&older, &newer, 0.1);
        // Path must start at (0,0) and end at (n-1, m-1)
        assert_eq!(r.path.first(), Some(&(0, 0)));
        assert_eq!(r.path.last(), Some(&(6, 1)));
        assert!(r.total_cost.is_finite());
    }
}
