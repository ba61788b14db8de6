//! Nearest-neighbour construction followed by 2-opt improvement.
//!
//! No optimality guarantee; useful when Concorde is unavailable and the frame
//! count is beyond the exact solver.

use super::{require_square, Permutation, TourError, TourSolver};
use crate::distance::DistanceMatrix;

#[derive(Clone, Copy, Debug)]
pub struct TwoOptSolver {
    /// Upper bound on full improvement sweeps.
    pub max_sweeps: usize,
}

impl Default for TwoOptSolver {
    fn default() -> Self {
        Self { max_sweeps: 1000 }
    }
}

impl TourSolver for TwoOptSolver {
    fn name(&self) -> &str {
        "two-opt"
    }

    fn solve_cyclic_tour(&self, matrix: &DistanceMatrix) -> Result<Permutation, TourError> {
        let n = require_square(matrix)?;
        let mut tour = nearest_neighbour(matrix, n);
        if n >= 4 {
            improve(matrix, &mut tour, self.max_sweeps);
        }
        Permutation::new(tour)
    }
}

fn nearest_neighbour(d: &DistanceMatrix, n: usize) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    let mut visited = vec![false; n];
    let mut tour = Vec::with_capacity(n);
    let mut current = 0;
    visited[0] = true;
    tour.push(0);
    while tour.len() < n {
        let next = (0..n)
            .filter(|&j| !visited[j])
            .min_by(|&a, &b| d[(current, a)].total_cmp(&d[(current, b)]))
            .unwrap_or(current);
        visited[next] = true;
        tour.push(next);
        current = next;
    }
    tour
}

/// Reverse segments while any reversal shortens the closed tour.
fn improve(d: &DistanceMatrix, tour: &mut [usize], max_sweeps: usize) {
    let n = tour.len();
    for _ in 0..max_sweeps {
        let mut improved = false;
        for i in 0..n - 1 {
            for j in i + 2..n {
                // Edges (a,b) and (c,e); skip the pair sharing node 0 at the seam.
                if i == 0 && j == n - 1 {
                    continue;
                }
                let (a, b) = (tour[i], tour[i + 1]);
                let (c, e) = (tour[j], tour[(j + 1) % n]);
                let delta = d[(a, c)] + d[(b, e)] - d[(a, b)] - d[(c, e)];
                if delta < -1e-12 {
                    tour[i + 1..=j].reverse();
                    improved = true;
                }
            }
        }
        if !improved {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::{cycle_cost, l1_distances};
    use crate::tour::ExactSolver;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn line_points_reach_the_optimum() {
        let frames: Vec<Vec<f64>> = [5.0, 1.0, 8.0, 3.0, 0.0, 6.0, 2.0, 9.0, 4.0, 7.0]
            .iter()
            .map(|&v| vec![v])
            .collect();
        let d = l1_distances(&frames);
        let perm = TwoOptSolver::default().solve_cyclic_tour(&d).unwrap();
        assert_eq!(perm.len(), 10);
        assert!((cycle_cost(&d, perm.as_slice()) - 18.0).abs() < 1e-9);
    }

    #[test]
    fn never_worse_than_identity_and_close_to_exact() {
        let mut rng = StdRng::seed_from_u64(7);
        let frames: Vec<Vec<f64>> = (0..10)
            .map(|_| (0..4).map(|_| rng.gen_range(0.0..10.0)).collect())
            .collect();
        let d = l1_distances(&frames);
        let heuristic = TwoOptSolver::default().solve_cyclic_tour(&d).unwrap();
        let exact = ExactSolver::default().solve_cyclic_tour(&d).unwrap();
        let h = cycle_cost(&d, heuristic.as_slice());
        let e = cycle_cost(&d, exact.as_slice());
        assert!(h >= e - 1e-9);
        assert!(h <= 1.5 * e, "2-opt {h} vs exact {e}");
    }

    #[test]
    fn tiny_inputs() {
        for n in 0..4 {
            let d = DistanceMatrix::from_element(n, n, 1.0);
            let perm = TwoOptSolver::default().solve_cyclic_tour(&d).unwrap();
            assert_eq!(perm.len(), n);
        }
    }
}
