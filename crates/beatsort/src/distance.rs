//! Pairwise frame dissimilarity (L1) for cyclic sequencing.
//!
//! Frames are compared on the Z=0, C=0 plane only, flattened over Y×X. The
//! matrix is the edge-weight input of the tour solver: larger distance means
//! less similar, hence a costlier adjacency.

use nalgebra::DMatrix;
use ndarray::{s, Axis};

use crate::stack::{Stack, StackError, StackShape};

/// Symmetric, zero-diagonal T×T matrix of frame distances.
pub type DistanceMatrix = DMatrix<f64>;

/// L1 distances between the flattened Z=0, C=0 frames of `stack`.
pub fn distance_matrix(stack: &Stack) -> Result<DistanceMatrix, StackError> {
    let shape = StackShape::of(stack);
    shape.require_non_empty()?;
    let plane = stack.slice(s![.., .., 0, 0, ..]);
    let frames: Vec<Vec<f64>> = plane
        .axis_iter(Axis(2))
        .map(|frame| frame.iter().copied().collect())
        .collect();
    Ok(l1_distances(&frames))
}

/// Pairwise L1 distances between equally long vectors.
pub fn l1_distances(frames: &[Vec<f64>]) -> DistanceMatrix {
    let n = frames.len();
    let mut d = DistanceMatrix::zeros(n, n);
    for i in 0..n {
        for j in i + 1..n {
            let v: f64 = frames[i]
                .iter()
                .zip(&frames[j])
                .map(|(a, b)| (a - b).abs())
                .sum();
            d[(i, j)] = v;
            d[(j, i)] = v;
        }
    }
    d
}

/// Total weight of the closed tour visiting `order` and returning to its start.
pub fn cycle_cost(matrix: &DistanceMatrix, order: &[usize]) -> f64 {
    if order.len() < 2 {
        return 0.0;
    }
    order
        .iter()
        .zip(order.iter().cycle().skip(1))
        .map(|(&a, &b)| matrix[(a, b)])
        .sum()
}
