//! Held–Karp dynamic program: optimal closed tours for small frame counts.

use super::{require_square, Permutation, TourError, TourSolver};
use crate::distance::DistanceMatrix;

/// Exact in-process solver, O(2^n n^2).
#[derive(Clone, Copy, Debug)]
pub struct ExactSolver {
    pub max_frames: usize,
}

impl Default for ExactSolver {
    fn default() -> Self {
        Self { max_frames: 16 }
    }
}

impl TourSolver for ExactSolver {
    fn name(&self) -> &str {
        "exact"
    }

    fn solve_cyclic_tour(&self, matrix: &DistanceMatrix) -> Result<Permutation, TourError> {
        let n = require_square(matrix)?;
        if n > self.max_frames {
            return Err(TourError::TooManyFrames {
                frames: n,
                limit: self.max_frames,
            });
        }
        if n <= 3 {
            // Every cyclic order of at most three nodes has the same cost.
            return Ok(Permutation::identity(n));
        }
        Permutation::new(held_karp(matrix, n))
    }
}

/// Tour starting at node 0. Subsets range over nodes `1..n` (bit `k-1` ↔ node `k`).
fn held_karp(d: &DistanceMatrix, n: usize) -> Vec<usize> {
    let m = n - 1;
    let full = (1usize << m) - 1;
    let mut cost = vec![f64::INFINITY; (1 << m) * m];
    let mut parent = vec![usize::MAX; (1 << m) * m];
    let at = |mask: usize, last: usize| mask * m + last;

    for k in 0..m {
        cost[at(1 << k, k)] = d[(0, k + 1)];
    }
    for mask in 1..=full {
        for last in 0..m {
            if mask & (1 << last) == 0 {
                continue;
            }
            let here = cost[at(mask, last)];
            if !here.is_finite() {
                continue;
            }
            for next in 0..m {
                if mask & (1 << next) != 0 {
                    continue;
                }
                let grown = mask | (1 << next);
                let cand = here + d[(last + 1, next + 1)];
                if cand < cost[at(grown, next)] {
                    cost[at(grown, next)] = cand;
                    parent[at(grown, next)] = last;
                }
            }
        }
    }

    let mut best = (f64::INFINITY, 0);
    for last in 0..m {
        let total = cost[at(full, last)] + d[(last + 1, 0)];
        if total < best.0 {
            best = (total, last);
        }
    }

    let mut order = Vec::with_capacity(n);
    let (mut mask, mut last) = (full, best.1);
    while last != usize::MAX {
        order.push(last + 1);
        let prev = parent[at(mask, last)];
        mask &= !(1 << last);
        last = prev;
    }
    order.push(0);
    order.reverse();
    order
}
