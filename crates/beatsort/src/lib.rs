//! Periodic-motion stack reconstruction: frame sequencing and scan-shear correction.
//!
//! Two independently invokable halves:
//! - Sorting: downsize → pairwise L1 distances → cyclic tour → reorder frames.
//! - Unshearing: estimate the per-row time shift on downsized data with a
//!   periodic-spline objective, then resample every row at full resolution.
//!
//! API Policy
//! - Pure functions over `Stack` (in-memory) and row-streaming variants over
//!   `RowSource`/`RowSink` (out-of-core). Orchestration lives in `pipeline`.
//! - External numerics (tour solver, scalar minimizer) sit behind traits so
//!   backends can be swapped without touching the algorithms.

pub mod distance;
pub mod downsize;
pub mod io;
pub mod pipeline;
pub mod reorder;
pub mod resample;
pub mod shear;
pub mod spline;
pub mod stack;
pub mod synth;
pub mod tour;

/// Library version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common exports for quick imports in callers.
pub mod prelude {
    pub use crate::distance::{cycle_cost, distance_matrix, DistanceMatrix};
    pub use crate::downsize::{downsize, DownsizeFactors, Downsized};
    pub use crate::io::{load_stack, write_npy, LoadedStack, SampleType};
    pub use crate::pipeline::{
        sequence_frames, sort_into, sort_stack, unshear, unshear_into, PipelineError,
        Sequencing, ShiftSource, SortCfg, SortOutcome, UnshearCfg, UnshearOutcome, UnshearStage,
    };
    pub use crate::reorder::{reorder_frames, reorder_into};
    pub use crate::resample::{reconstruct, reconstruct_into, PeriodicResampler, RowPhase};
    pub use crate::shear::minimize::{Minimum, NelderMead, NelderMeadCfg, ScalarMinimizer};
    pub use crate::shear::{estimate_shift, ShearError, ShearObjective, ShiftEstimate};
    pub use crate::spline::{CyclicSystem, PeriodicSpline, SplineError};
    pub use crate::stack::{MappedStack, RowSink, RowSource, Stack, StackError, StackShape};
    pub use crate::tour::{
        ConcordeSolver, ExactSolver, Permutation, SequencingFiles, TourError, TourSolver,
        TwoOptSolver,
    };
}
