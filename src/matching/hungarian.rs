//! Minimum-cost bipartite assignment (Hungarian algorithm)
//!
//! Classic O(n³) potentials formulation over a square matrix. Rectangular
//! inputs are padded with a large sentinel cost; non-finite or oversized
//! entries are clamped to the sentinel so the potentials stay finite.
//! Assignments into padding are dropped from the output.

use crate::config::defaults::HUNGARIAN_SENTINEL;

/// One accepted assignment: (row, column, original cost).
pub type Assignment = (usize, usize, f64);

/// Solve the min-cost assignment over a rectangular cost matrix.
///
/// Returns assignments only for the original rows and columns, with
/// unique rows and unique columns. An empty matrix yields no assignments.
pub fn solve(cost: &[Vec<f64>]) -> Vec<Assignment> {
    let n_rows = cost.len();
    let n_cols = cost.first().map_or(0, Vec::len);
    if n_rows == 0 || n_cols == 0 {
        return Vec::new();
    }

    let n = n_rows.max(n_cols);
    let sentinel = HUNGARIAN_SENTINEL;

    // 1-indexed padded square matrix with sanitized entries.
    let at = |i: usize, j: usize| -> f64 {
        if i <= n_rows && j <= n_cols {
            let c = cost[i - 1][j - 1];
            if c.is_finite() {
                c.min(sentinel)
            } else {
                sentinel
            }
        } else {
            sentinel
        }
    };

    // Potentials u, v; p[j] = row matched to column j; way[j] = previous
    // column on the augmenting path.
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; n + 1];
    let mut p = vec![0usize; n + 1];
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;

            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let cur = at(i0, j) - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }

            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }

            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        // Unwind the augmenting path.
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut assignments = Vec::new();
    for j in 1..=n {
        let i = p[j];
        if i >= 1 && i <= n_rows && j <= n_cols {
            assignments.push((i - 1, j - 1, cost[i - 1][j - 1]));
        }
    }
    assignments.sort_by_key(|&(row, _, _)| row);
    assignments
}
