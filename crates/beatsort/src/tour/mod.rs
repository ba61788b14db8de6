//! Cyclic frame sequencing: tour solvers and validated permutations.
//!
//! Purpose
//! - Resolve a frame distance matrix into a closed low-cost tour (a TSP
//!   instance) and hand back a validated permutation of `[0, T)`.
//!
//! Why this design
//! - Solvers are pluggable (`TourSolver`): the Concorde subprocess is the
//!   production backend; `ExactSolver` and `TwoOptSolver` run in-process for
//!   small inputs, tests, and machines without Concorde.
//! - `Permutation` can only be built through validation (length and
//!   bijectivity), so downstream reordering never sees a broken tour.
//!
//! References
//! - Code cross-refs: `tsplib` (problem/solution files), `crate::distance`,
//!   `crate::reorder`

mod concorde;
mod exact;
pub mod tsplib;
mod two_opt;

pub use concorde::ConcordeSolver;
pub use exact::ExactSolver;
pub use tsplib::SequencingFiles;
pub use two_opt::TwoOptSolver;

use std::path::PathBuf;

use rand::{seq::SliceRandom, Rng};
use thiserror::Error;

use crate::distance::DistanceMatrix;

/// Errors from solving, reading, or validating a tour.
#[derive(Debug, Error)]
pub enum TourError {
    #[error(
        "discrepancy between solution and input time points ({solution} / {frames})"
    )]
    FrameCountMismatch { solution: usize, frames: usize },
    #[error("solution is not a permutation of 0..{frames}: index {index} is repeated or out of range")]
    NotAPermutation { index: usize, frames: usize },
    #[error("solution file {0} not found")]
    SolutionNotFound(PathBuf),
    #[error("malformed solution file {path}: {reason}")]
    MalformedSolution { path: PathBuf, reason: String },
    #[error("failed to launch tour solver {program}: {source}")]
    SolverLaunch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{frames} frames exceed the exact solver limit of {limit}")]
    TooManyFrames { frames: usize, limit: usize },
    #[error("distance matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A validated visiting order: each of `0..len` appears exactly once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Permutation(Vec<usize>);

impl Permutation {
    /// Validate bijectivity over `0..indices.len()`.
    pub fn new(indices: Vec<usize>) -> Result<Self, TourError> {
        let n = indices.len();
        let mut seen = vec![false; n];
        for &i in &indices {
            if i >= n || seen[i] {
                return Err(TourError::NotAPermutation {
                    index: i,
                    frames: n,
                });
            }
            seen[i] = true;
        }
        Ok(Self(indices))
    }

    /// Validate against the frame count of the stack it will be applied to.
    pub fn for_frames(indices: Vec<usize>, frames: usize) -> Result<Self, TourError> {
        if indices.len() != frames {
            return Err(TourError::FrameCountMismatch {
                solution: indices.len(),
                frames,
            });
        }
        Self::new(indices)
    }

    pub fn identity(n: usize) -> Self {
        Self((0..n).collect())
    }

    /// Uniformly random permutation of `0..n`.
    pub fn shuffled<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Self {
        let mut v: Vec<usize> = (0..n).collect();
        v.shuffle(rng);
        Self(v)
    }

    #[inline]
    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<usize> {
        self.0
    }

    /// `q` with `q[p[k]] = k`; applying `p` then `q` restores the order.
    pub fn inverse(&self) -> Self {
        let mut inv = vec![0; self.0.len()];
        for (k, &i) in self.0.iter().enumerate() {
            inv[i] = k;
        }
        Self(inv)
    }

    /// Representative of the tour's rotation/reflection class: starts at 0 and
    /// continues towards the smaller neighbour.
    pub fn canonical_cycle(&self) -> Vec<usize> {
        let n = self.0.len();
        if n < 3 {
            let mut v = self.0.clone();
            v.sort_unstable();
            return v;
        }
        let start = self.0.iter().position(|&i| i == 0).unwrap_or(0);
        let forward: Vec<usize> = (0..n).map(|k| self.0[(start + k) % n]).collect();
        if forward[1] <= forward[n - 1] {
            forward
        } else {
            let mut backward = vec![forward[0]];
            backward.extend(forward[1..].iter().rev());
            backward
        }
    }
}

/// Pluggable closed-tour solver over a distance matrix.
pub trait TourSolver {
    /// Short backend name for logs and provenance.
    fn name(&self) -> &str;

    /// Solve for a low-cost Hamiltonian cycle; the result covers every frame.
    fn solve_cyclic_tour(&self, matrix: &DistanceMatrix) -> Result<Permutation, TourError>;
}

pub(crate) fn require_square(matrix: &DistanceMatrix) -> Result<usize, TourError> {
    if matrix.nrows() != matrix.ncols() {
        return Err(TourError::NotSquare {
            rows: matrix.nrows(),
            cols: matrix.ncols(),
        });
    }
    Ok(matrix.nrows())
}
