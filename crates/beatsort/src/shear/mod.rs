//! Scan-shear estimation.
//!
//! Purpose
//! - Find the per-row time shift that best aligns vertically adjacent rows of
//!   a sorted stack, working on a downsized copy to keep the objective cheap.
//!
//! Why this design
//! - The objective is a pure function of one scalar; splines depend only on
//!   the data, so they are fitted once in `ShearObjective::new` and every
//!   evaluation only resamples and differences rows.
//! - Minimization is a pluggable capability (`minimize::ScalarMinimizer`).
//! - A shift that is not finite, or a minimizer that ran out of budget, is an
//!   error here and never reaches reconstruction.
//!
//! References
//! - O. Mariani, A. Ernst, N. Mercader, M. Liebling, "Reconstruction of Image
//!   Sequences From Ungated and Scanning-Aberrated Laser Scanning Microscopy
//!   Images of the Beating Heart", IEEE TCI 6 (2020)
//! - Code cross-refs: `crate::resample::{RowPhase, resample_series}`

pub mod minimize;

use ndarray::s;
use thiserror::Error;
use tracing::info;

use crate::downsize::{downsize, DownsizeFactors};
use crate::resample::{resample_series, RowPhase};
use crate::spline::{CyclicSystem, PeriodicSpline, SplineError};
use crate::stack::{Stack, StackError, StackShape};
use minimize::{Minimum, ScalarMinimizer};

#[derive(Debug, Error)]
pub enum ShearError {
    #[error(transparent)]
    Spline(#[from] SplineError),
    #[error(transparent)]
    Stack(#[from] StackError),
    #[error("shift {value} is not usable for reconstruction")]
    UnusableShift { value: f64 },
    #[error(
        "shift estimation did not converge after {iterations} iterations / {evaluations} evaluations (last x = {x})"
    )]
    NotConverged {
        x: f64,
        iterations: usize,
        evaluations: usize,
    },
}

/// Row-to-row misalignment of a (downsized) stack as a function of the shift.
///
/// Uses the Z=0, C=0 plane. Lower is better.
#[derive(Clone, Debug)]
pub struct ShearObjective {
    rows: usize,
    cols: usize,
    frames: usize,
    /// One spline per (y, x), row-major.
    splines: Vec<PeriodicSpline>,
}

impl ShearObjective {
    pub fn new(stack: &Stack) -> Result<Self, ShearError> {
        let shape = StackShape::of(stack);
        shape.require_non_empty()?;
        let system = CyclicSystem::new(shape.frames)?;
        let mut splines = Vec::with_capacity(shape.rows * shape.cols);
        let mut samples = Vec::with_capacity(shape.frames);
        for y in 0..shape.rows {
            for x in 0..shape.cols {
                samples.clear();
                samples.extend(stack.slice(s![y, x, 0, 0, ..]).iter().copied());
                splines.push(PeriodicSpline::fit_with(&system, &samples)?);
            }
        }
        Ok(Self {
            rows: shape.rows,
            cols: shape.cols,
            frames: shape.frames,
            splines,
        })
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Sum of absolute differences between adjacent resampled rows, over all
    /// columns and the T+1 closed time slots. Non-finite steps score +∞.
    pub fn evaluate(&self, step: f64) -> f64 {
        if !step.is_finite() {
            return f64::INFINITY;
        }
        // Negative steps run the same procedure on the row-reversed stack.
        let reversed = step < 0.0;
        let step = step.abs();
        let lane = self.frames + 1;
        let mut prev = vec![0.0; self.cols * lane];
        let mut cur = vec![0.0; self.cols * lane];
        let mut total = 0.0;
        for p in 0..self.rows {
            let y = if reversed { self.rows - 1 - p } else { p };
            let phase = RowPhase::for_row(step, p);
            for (x, out) in cur.chunks_exact_mut(lane).enumerate() {
                resample_series(&self.splines[y * self.cols + x], phase, out);
            }
            if p > 0 {
                total += cur
                    .iter()
                    .zip(&prev)
                    .map(|(a, b)| (a - b).abs())
                    .sum::<f64>();
            }
            std::mem::swap(&mut prev, &mut cur);
        }
        total
    }
}

/// Outcome of shift estimation.
#[derive(Clone, Copy, Debug)]
pub struct ShiftEstimate {
    /// Shift to apply at full resolution (rows of the input).
    pub shift: f64,
    /// Optimum on the downsized stack, before rescaling.
    pub reduced_shift: f64,
    /// Row downsizing factor actually applied.
    pub row_factor: usize,
    pub initial_value: f64,
    pub final_value: f64,
    pub minimum: Minimum,
}

/// Estimate the per-row shift of a sorted stack.
///
/// The stack is downsized by `factors`, the objective minimized from
/// `initial`, and the optimum divided by the effective row factor.
pub fn estimate_shift(
    sorted: &Stack,
    factors: DownsizeFactors,
    initial: f64,
    minimizer: &dyn ScalarMinimizer,
) -> Result<ShiftEstimate, ShearError> {
    let reduced = downsize(sorted, factors);
    let objective = ShearObjective::new(&reduced.stack)?;
    info!(
        initial,
        rows = reduced.factors.rows,
        cols = reduced.factors.cols,
        "starting shift estimation"
    );
    let initial_value = objective.evaluate(initial);
    let minimum = minimizer.minimize_scalar(&mut |step| objective.evaluate(step), initial);
    if !minimum.x.is_finite() {
        return Err(ShearError::UnusableShift { value: minimum.x });
    }
    if !minimum.converged {
        return Err(ShearError::NotConverged {
            x: minimum.x,
            iterations: minimum.iterations,
            evaluations: minimum.evaluations,
        });
    }
    let row_factor = reduced.factors.rows;
    let shift = minimum.x / row_factor as f64;
    info!(
        reduced_shift = minimum.x,
        shift,
        objective = minimum.value,
        evaluations = minimum.evaluations,
        "shift estimated"
    );
    Ok(ShiftEstimate {
        shift,
        reduced_shift: minimum.x,
        row_factor,
        initial_value,
        final_value: minimum.value,
        minimum,
    })
}
