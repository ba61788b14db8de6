//! Orchestration of the two halves.
//!
//! Purpose
//! - Sorting: downsize the Z=0, C=0 plane → distance matrix → tour (solved or
//!   reused from a solution file) → reorder the full-resolution frames.
//! - Unshearing: LOADED → (ESTIMATING | SKIP_ESTIMATION) → SHIFT_DETERMINED →
//!   RECONSTRUCTING → DONE. Stages only move forward; the visited stages are
//!   returned with the outcome.
//!
//! Why this design
//! - Stages are pure functions composed here; the only state carried between
//!   estimation and reconstruction is the shift value.
//! - Each entry point has an in-memory form (`Stack`) and a row-streaming
//!   form (`RowSource` → `RowSink`) for disk-backed buffers.
//!
//! References
//! - Code cross-refs: `crate::tour`, `crate::shear::estimate_shift`,
//!   `crate::resample::reconstruct_into`

use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::distance::{cycle_cost, distance_matrix, DistanceMatrix};
use crate::downsize::{downsize, DownsizeFactors};
use crate::io::LoadError;
use crate::reorder::{reorder_frames, reorder_into, ReorderError};
use crate::resample::{reconstruct, reconstruct_into};
use crate::shear::minimize::ScalarMinimizer;
use crate::shear::{estimate_shift, ShearError, ShiftEstimate};
use crate::stack::{plane, RowSink, RowSource, Stack, StackError};
use crate::tour::{tsplib::read_solution, Permutation, TourError, TourSolver};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Stack(#[from] StackError),
    #[error(transparent)]
    Tour(#[from] TourError),
    #[error(transparent)]
    Shear(#[from] ShearError),
}

impl From<ReorderError> for PipelineError {
    fn from(e: ReorderError) -> Self {
        match e {
            ReorderError::Tour(e) => Self::Tour(e),
            ReorderError::Stack(e) => Self::Stack(e),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SortCfg {
    pub factors: DownsizeFactors,
}

/// Where the frame order comes from.
#[derive(Clone, Copy)]
pub enum Sequencing<'a> {
    /// Build the distance matrix and run a solver.
    Solve(&'a dyn TourSolver),
    /// Parse a previously computed solution file; no solving.
    Reuse(&'a Path),
}

#[derive(Clone, Debug)]
pub struct SortOutcome {
    pub permutation: Permutation,
    /// Absent when a solution file was reused.
    pub distances: Option<DistanceMatrix>,
    /// Downsizing actually applied; absent when a solution file was reused.
    pub factors: Option<DownsizeFactors>,
    /// Solver backend name, or `"reuse"`.
    pub backend: String,
}

impl SortOutcome {
    /// Closed-tour weight of the chosen order, when distances are known.
    pub fn tour_cost(&self) -> Option<f64> {
        self.distances
            .as_ref()
            .map(|d| cycle_cost(d, self.permutation.as_slice()))
    }
}

/// Determine the cyclic frame order of `src` without reordering it.
pub fn sequence_frames<S: RowSource + ?Sized>(
    src: &S,
    cfg: &SortCfg,
    sequencing: Sequencing<'_>,
) -> Result<SortOutcome, PipelineError> {
    let shape = src.shape();
    shape.require_non_empty()?;
    match sequencing {
        Sequencing::Reuse(path) => {
            info!(path = %path.display(), "reusing sequencing solution");
            let permutation = read_solution(path, shape.frames)?;
            Ok(SortOutcome {
                permutation,
                distances: None,
                factors: None,
                backend: "reuse".to_string(),
            })
        }
        Sequencing::Solve(solver) => {
            let reduced = downsize(&plane(src, 0, 0)?, cfg.factors);
            info!(
                rows = reduced.factors.rows,
                cols = reduced.factors.cols,
                "computing distance matrix"
            );
            let distances = distance_matrix(&reduced.stack)?;
            info!(solver = solver.name(), frames = shape.frames, "solving cyclic tour");
            let tour = solver.solve_cyclic_tour(&distances)?;
            let permutation = Permutation::for_frames(tour.into_inner(), shape.frames)?;
            info!(
                cost = cycle_cost(&distances, permutation.as_slice()),
                "sequencing done"
            );
            Ok(SortOutcome {
                permutation,
                distances: Some(distances),
                factors: Some(reduced.factors),
                backend: solver.name().to_string(),
            })
        }
    }
}

/// Sort an in-memory stack; returns the reordered stack.
pub fn sort_stack(
    stack: &Stack,
    cfg: &SortCfg,
    sequencing: Sequencing<'_>,
) -> Result<(Stack, SortOutcome), PipelineError> {
    let outcome = sequence_frames(stack, cfg, sequencing)?;
    let sorted = reorder_frames(stack, &outcome.permutation)?;
    info!("sorting done");
    Ok((sorted, outcome))
}

/// Row-streaming variant of [`sort_stack`].
pub fn sort_into<S, D>(
    src: &S,
    dst: &mut D,
    cfg: &SortCfg,
    sequencing: Sequencing<'_>,
) -> Result<SortOutcome, PipelineError>
where
    S: RowSource + ?Sized,
    D: RowSink + ?Sized,
{
    let outcome = sequence_frames(src, cfg, sequencing)?;
    reorder_into(src, dst, &outcome.permutation)?;
    info!("sorting done");
    Ok(outcome)
}

/// Where the shift comes from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ShiftSource {
    /// Minimize the shear objective from this initial guess.
    Estimate { initial: f64 },
    /// Apply this value as-is; estimation is skipped.
    Fixed(f64),
}

impl Default for ShiftSource {
    fn default() -> Self {
        Self::Estimate { initial: 5.3 }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct UnshearCfg {
    pub factors: DownsizeFactors,
    pub shift: ShiftSource,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnshearStage {
    Loaded,
    Estimating,
    SkipEstimation,
    ShiftDetermined,
    Reconstructing,
    Done,
}

#[derive(Clone, Debug)]
pub struct UnshearOutcome {
    /// Shift applied at full resolution.
    pub shift: f64,
    /// Present only when the shift was estimated.
    pub estimate: Option<ShiftEstimate>,
    pub stages: Vec<UnshearStage>,
}

fn enter(stages: &mut Vec<UnshearStage>, stage: UnshearStage) {
    info!(stage = ?stage, "unshearing");
    stages.push(stage);
}

/// LOADED → … → SHIFT_DETERMINED.
fn determine_shift<S: RowSource + ?Sized>(
    src: &S,
    cfg: &UnshearCfg,
    minimizer: &dyn ScalarMinimizer,
    stages: &mut Vec<UnshearStage>,
) -> Result<(f64, Option<ShiftEstimate>), PipelineError> {
    enter(stages, UnshearStage::Loaded);
    let (shift, estimate) = match cfg.shift {
        ShiftSource::Fixed(value) => {
            enter(stages, UnshearStage::SkipEstimation);
            if !value.is_finite() {
                return Err(ShearError::UnusableShift { value }.into());
            }
            (value, None)
        }
        ShiftSource::Estimate { initial } => {
            enter(stages, UnshearStage::Estimating);
            // The objective only looks at the first depth and channel.
            let est = estimate_shift(&plane(src, 0, 0)?, cfg.factors, initial, minimizer)?;
            (est.shift, Some(est))
        }
    };
    enter(stages, UnshearStage::ShiftDetermined);
    info!(shift, "shift determined");
    Ok((shift, estimate))
}

/// Correct an in-memory sorted stack.
pub fn unshear(
    sorted: &Stack,
    cfg: &UnshearCfg,
    minimizer: &dyn ScalarMinimizer,
) -> Result<(Stack, UnshearOutcome), PipelineError> {
    let mut stages = Vec::new();
    let (shift, estimate) = determine_shift(sorted, cfg, minimizer, &mut stages)?;
    enter(&mut stages, UnshearStage::Reconstructing);
    let corrected = reconstruct(sorted, shift)?;
    enter(&mut stages, UnshearStage::Done);
    Ok((
        corrected,
        UnshearOutcome {
            shift,
            estimate,
            stages,
        },
    ))
}

/// Row-streaming variant of [`unshear`].
pub fn unshear_into<S, D>(
    src: &S,
    dst: &mut D,
    cfg: &UnshearCfg,
    minimizer: &dyn ScalarMinimizer,
) -> Result<UnshearOutcome, PipelineError>
where
    S: RowSource + ?Sized,
    D: RowSink + ?Sized,
{
    let mut stages = Vec::new();
    let (shift, estimate) = determine_shift(src, cfg, minimizer, &mut stages)?;
    enter(&mut stages, UnshearStage::Reconstructing);
    reconstruct_into(src, dst, shift)?;
    enter(&mut stages, UnshearStage::Done);
    Ok(UnshearOutcome {
        shift,
        estimate,
        stages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shear::minimize::{Minimum, NelderMead};
    use crate::stack::{MappedStack, StackShape};
    use crate::synth::{travelling_wave, SynthCfg};
    use crate::tour::{tsplib::write_solution, ExactSolver};
    use std::cell::Cell;
    use tempfile::tempdir;

    struct Panicking;

    impl ScalarMinimizer for Panicking {
        fn minimize_scalar(&self, _: &mut dyn FnMut(f64) -> f64, _: f64) -> Minimum {
            panic!("minimizer must not run");
        }
    }

    #[test]
    fn fixed_shift_skips_estimation() {
        let stack = travelling_wave(&SynthCfg {
            rows: 4,
            cols: 4,
            frames: 6,
            shear: 0.5,
            shuffle_seed: None,
        })
        .stack;
        let cfg = UnshearCfg {
            shift: ShiftSource::Fixed(0.5),
            ..UnshearCfg::default()
        };
        let (out, outcome) = unshear(&stack, &cfg, &Panicking).unwrap();
        assert_eq!(
            outcome.stages,
            vec![
                UnshearStage::Loaded,
                UnshearStage::SkipEstimation,
                UnshearStage::ShiftDetermined,
                UnshearStage::Reconstructing,
                UnshearStage::Done
            ]
        );
        assert!(outcome.estimate.is_none());
        assert_eq!(out, reconstruct(&stack, 0.5).unwrap());
    }

    #[test]
    fn non_finite_fixed_shift_stops_before_reconstruction() {
        let stack = StackShape::new(2, 2, 1, 1, 4).zeros();
        let cfg = UnshearCfg {
            shift: ShiftSource::Fixed(f64::INFINITY),
            ..UnshearCfg::default()
        };
        let err = unshear(&stack, &cfg, &Panicking).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Shear(ShearError::UnusableShift { .. })
        ));
    }

    #[test]
    fn estimation_path_visits_estimating_stage() {
        let stack = travelling_wave(&SynthCfg {
            rows: 8,
            cols: 4,
            frames: 12,
            shear: 1.0,
            shuffle_seed: None,
        })
        .stack;
        let calls = Cell::new(0usize);
        struct Counting<'a>(&'a Cell<usize>, NelderMead);
        impl ScalarMinimizer for Counting<'_> {
            fn minimize_scalar(&self, f: &mut dyn FnMut(f64) -> f64, x0: f64) -> Minimum {
                self.0.set(self.0.get() + 1);
                self.1.minimize_scalar(f, x0)
            }
        }
        let cfg = UnshearCfg {
            factors: DownsizeFactors::identity(),
            shift: ShiftSource::Estimate { initial: 5.3 },
        };
        let mut mapped = MappedStack::zeros(StackShape::of(&stack)).unwrap();
        let outcome = unshear_into(
            &stack,
            &mut mapped,
            &cfg,
            &Counting(&calls, NelderMead::default()),
        )
        .unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(outcome.stages[1], UnshearStage::Estimating);
        assert!((outcome.shift - 1.0).abs() < 0.2, "{}", outcome.shift);
        assert_eq!(*outcome.stages.last().unwrap(), UnshearStage::Done);
    }

    #[test]
    fn reused_solution_skips_solving() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("solution.txt");
        let perm = Permutation::new(vec![1, 2, 0]).unwrap();
        write_solution(&path, &perm).unwrap();
        let stack = travelling_wave(&SynthCfg {
            rows: 2,
            cols: 2,
            frames: 3,
            ..SynthCfg::default()
        })
        .stack;
        let (sorted, outcome) =
            sort_stack(&stack, &SortCfg::default(), Sequencing::Reuse(&path)).unwrap();
        assert_eq!(outcome.permutation, perm);
        assert!(outcome.distances.is_none());
        assert_eq!(outcome.backend, "reuse");
        assert_eq!(sorted[[1, 1, 0, 0, 0]], stack[[1, 1, 0, 0, 1]]);

        let four = StackShape::new(2, 2, 1, 1, 4).zeros();
        assert!(matches!(
            sort_stack(&four, &SortCfg::default(), Sequencing::Reuse(&path)),
            Err(PipelineError::Tour(TourError::FrameCountMismatch { .. }))
        ));
    }

    #[test]
    fn solved_sorting_streams_the_optimal_order() {
        let synthetic = travelling_wave(&SynthCfg {
            rows: 4,
            cols: 8,
            frames: 10,
            shear: 0.0,
            shuffle_seed: Some(3),
        });
        let cfg = SortCfg {
            factors: DownsizeFactors::new(2, 2),
        };
        let solver = ExactSolver::default();
        let mut mapped = MappedStack::zeros(StackShape::of(&synthetic.stack)).unwrap();
        let outcome = sort_into(
            &synthetic.stack,
            &mut mapped,
            &cfg,
            Sequencing::Solve(&solver),
        )
        .unwrap();
        assert_eq!(outcome.factors, Some(DownsizeFactors::new(2, 2)));
        assert_eq!(outcome.backend, "exact");
        assert_eq!(
            mapped.to_stack().unwrap(),
            reorder_frames(&synthetic.stack, &outcome.permutation).unwrap()
        );
        // The phase order is one candidate tour; the exact optimum is no worse.
        let distances = outcome.distances.as_ref().unwrap();
        let by_phase = synthetic.shuffle.inverse();
        let cost = outcome.tour_cost().unwrap();
        assert!(cost > 0.0);
        assert!(cost <= cycle_cost(distances, by_phase.as_slice()) + 1e-9);
    }
}
