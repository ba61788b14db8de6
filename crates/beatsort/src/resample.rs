//! Row-dependent periodic resampling (scan-shear correction).
//!
//! Purpose
//! - Undo a per-row time offset of `step · y` frames: every (x, z, c) lane of
//!   row `y` is fitted with a periodic cubic spline and resampled at
//!   `t + residue`, then rolled by the integer part `floor(step · y)`.
//!
//! Conventions
//! - Lanes are closed: the first frame is appended after the last before any
//!   spline work and the appended slot is stripped from the result, so the
//!   output has the input's T.
//! - Rolling is "advance": `out[t] = pre[(t + roll) mod T]`, so together with
//!   the residue `out[y, t] = S_y(t + step · y)`. The wrap slot mirrors `out[0]`.
//! - Negative shifts reverse the closed time axis and resample with `|shift|`.
//!
//! References
//! - Code cross-refs: `crate::spline::PeriodicSpline`, `crate::shear::ShearObjective`

use ndarray::{concatenate, s, Array4, ArrayView1, ArrayView4, Axis};
use tracing::{debug, info};

use crate::shear::ShearError;
use crate::spline::{CyclicSystem, PeriodicSpline};
use crate::stack::{
    append_wrap_frame, strip_wrap_frame, RowSink, RowSource, Stack, StackError, StackShape,
    AXIS_Y,
};

/// Integer roll and fractional residue of one row.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RowPhase {
    pub roll: i64,
    pub residue: f64,
}

impl RowPhase {
    pub fn for_row(step: f64, row: usize) -> Self {
        let offset = step * row as f64;
        let whole = offset.floor();
        Self {
            roll: whole as i64,
            residue: offset - whole,
        }
    }
}

/// Sample `spline` for one closed lane: `out.len()` must be `period + 1`.
pub fn resample_series(spline: &PeriodicSpline, phase: RowPhase, out: &mut [f64]) {
    let n = spline.period();
    debug_assert_eq!(out.len(), n + 1);
    let k = phase.roll.rem_euclid(n as i64) as usize;
    for (t, slot) in out.iter_mut().take(n).enumerate() {
        let src = (t + k) % n;
        *slot = spline.eval(src as f64 + phase.residue);
    }
    out[n] = out[0];
}

/// Resampler for one shift value and one frame count, shared by all rows.
#[derive(Clone, Debug)]
pub struct PeriodicResampler {
    system: CyclicSystem,
    step: f64,
    reverse_time: bool,
}

impl PeriodicResampler {
    /// `frames` is the open period (without the wrap frame).
    pub fn new(frames: usize, shift: f64) -> Result<Self, ShearError> {
        if !shift.is_finite() {
            return Err(ShearError::UnusableShift { value: shift });
        }
        Ok(Self {
            system: CyclicSystem::new(frames)?,
            step: shift.abs(),
            reverse_time: shift < 0.0,
        })
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.system.len()
    }

    #[inline]
    pub fn phase(&self, y: usize) -> RowPhase {
        RowPhase::for_row(self.step, y)
    }

    /// Resample a closed row `[X, Z, C, T+1]` into a new closed row.
    pub fn resample_closed_row(
        &self,
        y: usize,
        closed: ArrayView4<'_, f64>,
    ) -> Result<Array4<f64>, ShearError> {
        let frames = self.frames();
        let (cols, depth, channels, len) = closed.dim();
        if len != frames + 1 {
            return Err(StackError::RowShape {
                expected: [cols, depth, channels, frames + 1],
                found: closed.shape().to_vec(),
            }
            .into());
        }
        let phase = self.phase(y);
        let mut out = Array4::<f64>::zeros(closed.raw_dim());
        let mut samples = Vec::with_capacity(len);
        let mut lane_out = vec![0.0; len];
        for x in 0..cols {
            for z in 0..depth {
                for c in 0..channels {
                    samples.clear();
                    samples.extend(closed.slice(s![x, z, c, ..]).iter().copied());
                    if self.reverse_time {
                        samples.reverse();
                    }
                    // The closing sample is implied by periodicity.
                    let spline = PeriodicSpline::fit_with(&self.system, &samples[..frames])?;
                    resample_series(&spline, phase, &mut lane_out);
                    out.slice_mut(s![x, z, c, ..])
                        .assign(&ArrayView1::from(&lane_out[..]));
                }
            }
        }
        Ok(out)
    }
}

/// Append frame 0 to each lane of a `[X, Z, C, T]` row.
fn close_row(row: &Array4<f64>) -> Result<Array4<f64>, StackError> {
    let first = row.slice(s![.., .., .., 0..1]);
    concatenate(Axis(3), &[row.view(), first]).map_err(|_| StackError::RowShape {
        expected: [row.dim().0, row.dim().1, row.dim().2, row.dim().3 + 1],
        found: row.shape().to_vec(),
    })
}

/// Corrected copy of `stack` for `shift` frames per row; T is preserved.
pub fn reconstruct(stack: &Stack, shift: f64) -> Result<Stack, ShearError> {
    let shape = StackShape::of(stack);
    shape.require_non_empty()?;
    let resampler = PeriodicResampler::new(shape.frames, shift)?;
    info!(shift, rows = shape.rows, "starting reconstruction");
    let closed = append_wrap_frame(stack)?;
    let mut out = Stack::zeros(closed.raw_dim());
    for y in 0..shape.rows {
        debug!(row = y + 1, rows = shape.rows, "resampling row");
        let row = resampler.resample_closed_row(y, closed.index_axis(Axis(AXIS_Y), y))?;
        out.index_axis_mut(Axis(AXIS_Y), y).assign(&row);
    }
    Ok(strip_wrap_frame(&out))
}

/// Row-streaming variant of [`reconstruct`]: rows are read, corrected, and
/// written in increasing Y, one at a time.
pub fn reconstruct_into<S, D>(src: &S, dst: &mut D, shift: f64) -> Result<(), ShearError>
where
    S: RowSource + ?Sized,
    D: RowSink + ?Sized,
{
    let shape = src.shape();
    shape.require_non_empty()?;
    if dst.shape() != shape {
        return Err(StackError::StackShape {
            expected: dst.shape().dims(),
            found: shape.dims(),
        }
        .into());
    }
    let resampler = PeriodicResampler::new(shape.frames, shift)?;
    info!(shift, rows = shape.rows, "starting reconstruction");
    for y in 0..shape.rows {
        debug!(row = y + 1, rows = shape.rows, "resampling row");
        let closed = close_row(&src.read_row(y)?)?;
        let row = resampler.resample_closed_row(y, closed.view())?;
        dst.write_row(y, row.slice(s![.., .., .., ..shape.frames]))?;
    }
    Ok(())
}
